use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::games::create_game;
use super::{RequestHandler, Service, ServiceError, SharedRewards};
use crate::models::{
    games::{Game, NewGame},
    points::{Activity, Award},
    protection::SuspiciousActivity,
    stats::{Dashboard, UserActivity},
    users::{BanRequest, PointAdjustment, UserDetails, BANNED_LEVEL, DEFAULT_LEVEL},
    withdrawals::{
        WithdrawalDecision, WithdrawalFilter, WithdrawalRequest, WithdrawalStatus,
        WithdrawalWithUser,
    },
    Page, PageQuery,
};
use crate::repositories::{
    games::GameRepository,
    points::PointRepository,
    protection::ProtectionRepository,
    sessions::GameSessionRepository,
    stats::StatsRepository,
    users::UserRepository,
    withdrawals::WithdrawalRepository,
};
use crate::settings::{Protection, Rewards};
use crate::utils;

const RECENT_ACTIVITY: i64 = 10;

pub enum AdminRequest {
    Dashboard {
        response: oneshot::Sender<Result<Dashboard, ServiceError>>,
    },
    Users {
        search: Option<String>,
        page: PageQuery,
        response: oneshot::Sender<Result<Page<UserDetails>, ServiceError>>,
    },
    UserActivity {
        id: String,
        response: oneshot::Sender<Result<UserActivity, ServiceError>>,
    },
    AdjustPoints {
        admin_id: String,
        id: String,
        adjustment: PointAdjustment,
        response: oneshot::Sender<Result<Award, ServiceError>>,
    },
    Ban {
        admin_id: String,
        id: String,
        request: BanRequest,
        response: oneshot::Sender<Result<UserDetails, ServiceError>>,
    },
    Withdrawals {
        filter: WithdrawalFilter,
        response: oneshot::Sender<Result<Page<WithdrawalWithUser>, ServiceError>>,
    },
    ApproveWithdrawal {
        admin_id: String,
        id: String,
        decision: WithdrawalDecision,
        response: oneshot::Sender<Result<WithdrawalRequest, ServiceError>>,
    },
    RejectWithdrawal {
        admin_id: String,
        id: String,
        decision: WithdrawalDecision,
        response: oneshot::Sender<Result<WithdrawalRequest, ServiceError>>,
    },
    UploadGame {
        game: NewGame,
        response: oneshot::Sender<Result<Game, ServiceError>>,
    },
    SuspiciousActivity {
        response: oneshot::Sender<Result<SuspiciousActivity, ServiceError>>,
    },
    GetSettings {
        response: oneshot::Sender<Result<Rewards, ServiceError>>,
    },
    UpdateSettings {
        admin_id: String,
        patch: Value,
        response: oneshot::Sender<Result<Rewards, ServiceError>>,
    },
}

/// Applies a partial JSON object on top of the current reward settings.
/// Unknown keys and non-positive limits are refused.
pub fn merge_rewards(current: &Rewards, patch: Value) -> Result<Rewards, ServiceError> {
    let patch = match patch {
        Value::Object(patch) => patch,
        _ => return Err(ServiceError::validation("Settings must be a JSON object.")),
    };

    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(ServiceError::Internal("rewards are not an object".to_string())),
        Err(e) => return Err(ServiceError::Internal(e.to_string())),
    };

    for (key, value) in patch {
        if !merged.contains_key(&key) {
            return Err(ServiceError::validation(format!("Unknown setting: {}.", key)));
        }
        merged.insert(key, value);
    }

    let rewards: Rewards = serde_json::from_value(Value::Object(merged))
        .map_err(|e| ServiceError::validation(format!("Invalid settings: {}.", e)))?;

    if rewards.daily_points_cap <= 0
        || rewards.points_per_dollar <= 0
        || rewards.min_withdrawal_points <= 0
    {
        return Err(ServiceError::validation(
            "Daily cap, points per dollar and minimum withdrawal must be positive.",
        ));
    }
    if rewards.max_ads_per_day < 0 || rewards.max_game_ads_per_day < 0 {
        return Err(ServiceError::validation("Ad limits cannot be negative."));
    }

    Ok(rewards)
}

#[derive(Clone)]
pub struct AdminRequestHandler {
    pool: PgPool,
    users: UserRepository,
    points: PointRepository,
    games: GameRepository,
    sessions: GameSessionRepository,
    withdrawals: WithdrawalRepository,
    stats: StatsRepository,
    protection: ProtectionRepository,
    thresholds: Protection,
    rewards: SharedRewards,
}

impl AdminRequestHandler {
    pub fn new(pool: PgPool, rewards: SharedRewards, thresholds: Protection) -> Self {
        AdminRequestHandler {
            users: UserRepository::new(pool.clone()),
            points: PointRepository::new(pool.clone()),
            games: GameRepository::new(pool.clone()),
            sessions: GameSessionRepository::new(pool.clone()),
            withdrawals: WithdrawalRepository::new(pool.clone()),
            stats: StatsRepository::new(pool.clone()),
            protection: ProtectionRepository::new(pool.clone()),
            pool,
            thresholds,
            rewards,
        }
    }

    async fn users(
        &self,
        search: Option<String>,
        page: PageQuery,
    ) -> Result<Page<UserDetails>, ServiceError> {
        let (users, total) = self.users.search(utils::required(&search), &page).await?;
        let today = utils::start_of_day(Utc::now());

        let mut items = Vec::with_capacity(users.len());
        for user in users {
            let earned = self.points.earned_since(&self.pool, &user.id, today).await?;
            items.push(user.details(earned));
        }

        Ok(Page::new(items, total, &page))
    }

    async fn user_activity(&self, id: &str) -> Result<UserActivity, ServiceError> {
        let user = self
            .users
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let earned = self
            .points
            .earned_since(&self.pool, id, utils::start_of_day(Utc::now()))
            .await?;

        Ok(UserActivity {
            user: user.details(earned),
            recent_points: self.points.recent(id, RECENT_ACTIVITY).await?,
            recent_sessions: self.sessions.recent_for_user(id, RECENT_ACTIVITY).await?,
            withdrawals: self.withdrawals.list_for_user(id).await?,
        })
    }

    async fn adjust_points(
        &self,
        admin_id: &str,
        id: &str,
        adjustment: PointAdjustment,
    ) -> Result<Award, ServiceError> {
        let amount = adjustment.points.unwrap_or(0);
        if amount == 0 {
            return Err(ServiceError::validation("Points adjustment cannot be zero."));
        }

        let mut tx = self.pool.begin().await?;
        let user = self
            .users
            .lock_user(&mut *tx, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        if user.points as i64 + (amount as i64) < 0 {
            return Err(ServiceError::validation(
                "Adjustment would make the balance negative.",
            ));
        }

        let total_points = self
            .points
            .apply(&mut tx, id, amount, Activity::AdminAdjustment, None, None)
            .await?;
        tx.commit().await?;

        log::info!(
            "Admin {} adjusted points of {} by {} ({}).",
            admin_id,
            id,
            amount,
            adjustment.reason
        );

        Ok(Award {
            points_awarded: amount,
            total_points,
        })
    }

    async fn ban(
        &self,
        admin_id: &str,
        id: &str,
        request: BanRequest,
    ) -> Result<UserDetails, ServiceError> {
        if admin_id == id {
            return Err(ServiceError::validation("Admins cannot ban themselves."));
        }

        let level = if request.banned {
            BANNED_LEVEL
        } else {
            DEFAULT_LEVEL
        };
        if !self.users.set_level(id, level).await? {
            return Err(ServiceError::not_found("User"));
        }

        if request.banned {
            log::warn!("Admin {} banned user {}: {}.", admin_id, id, request.reason);
        } else {
            log::info!("Admin {} unbanned user {}.", admin_id, id);
        }

        self.user_activity(id).await.map(|activity| activity.user)
    }

    async fn withdrawals(
        &self,
        filter: WithdrawalFilter,
    ) -> Result<Page<WithdrawalWithUser>, ServiceError> {
        let status = match filter.status.as_deref() {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(
                WithdrawalStatus::parse(raw)
                    .ok_or_else(|| ServiceError::validation("Invalid withdrawal status."))?,
            ),
        };
        let page = PageQuery {
            page: filter.page,
            per_page: filter.per_page,
        };

        let (items, total) = self.withdrawals.list_with_users(status, &page).await?;

        Ok(Page::new(items, total, &page))
    }

    pub(super) async fn decide_withdrawal(
        &self,
        admin_id: &str,
        id: &str,
        status: WithdrawalStatus,
        decision: WithdrawalDecision,
    ) -> Result<WithdrawalRequest, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let withdrawal = self
            .withdrawals
            .lock_withdrawal(&mut *tx, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Withdrawal request"))?;
        if !withdrawal.is_pending() {
            return Err(ServiceError::validation(
                "Withdrawal request has already been processed.",
            ));
        }

        let updated = self
            .withdrawals
            .update_status(
                &mut *tx,
                id,
                status,
                decision.transaction_id.as_deref().filter(|t| !t.is_empty()),
            )
            .await?;

        if status == WithdrawalStatus::Rejected {
            self.points
                .apply(
                    &mut tx,
                    &withdrawal.user_id,
                    withdrawal.points_redeemed,
                    Activity::WithdrawalRefund,
                    None,
                    None,
                )
                .await?;
        }
        tx.commit().await?;

        log::info!(
            "Admin {} {} withdrawal {} ({} points for {}){}",
            admin_id,
            status.as_str(),
            id,
            withdrawal.points_redeemed,
            withdrawal.user_id,
            decision
                .reason
                .map(|r| format!(": {}.", r))
                .unwrap_or_else(|| ".".to_string())
        );

        Ok(updated)
    }

    async fn suspicious_activity(&self) -> Result<SuspiciousActivity, ServiceError> {
        let now = Utc::now();

        Ok(SuspiciousActivity {
            high_daily_points: self
                .protection
                .high_daily_earners(
                    utils::start_of_day(now),
                    self.thresholds.suspicious_daily_points,
                )
                .await?,
            duplicate_ips: self
                .protection
                .shared_ips(self.thresholds.max_accounts_per_ip)
                .await?,
            rapid_earners: self
                .protection
                .rapid_earners(
                    now - Duration::hours(1),
                    self.thresholds.suspicious_hourly_actions,
                )
                .await?,
        })
    }

    async fn update_settings(&self, admin_id: &str, patch: Value) -> Result<Rewards, ServiceError> {
        let mut rewards = self.rewards.write().await;
        let merged = merge_rewards(&rewards, patch)?;
        *rewards = merged.clone();

        log::info!("Admin {} updated reward settings: {:?}", admin_id, merged);
        Ok(merged)
    }
}

#[async_trait]
impl RequestHandler<AdminRequest> for AdminRequestHandler {
    async fn handle_request(&self, request: AdminRequest) {
        match request {
            AdminRequest::Dashboard { response } => {
                let result = self
                    .stats
                    .dashboard(utils::start_of_day(Utc::now()))
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            AdminRequest::Users {
                search,
                page,
                response,
            } => {
                let _ = response.send(self.users(search, page).await);
            }
            AdminRequest::UserActivity { id, response } => {
                let _ = response.send(self.user_activity(&id).await);
            }
            AdminRequest::AdjustPoints {
                admin_id,
                id,
                adjustment,
                response,
            } => {
                let result = self.adjust_points(&admin_id, &id, adjustment).await;
                let _ = response.send(result);
            }
            AdminRequest::Ban {
                admin_id,
                id,
                request,
                response,
            } => {
                let _ = response.send(self.ban(&admin_id, &id, request).await);
            }
            AdminRequest::Withdrawals { filter, response } => {
                let _ = response.send(self.withdrawals(filter).await);
            }
            AdminRequest::ApproveWithdrawal {
                admin_id,
                id,
                decision,
                response,
            } => {
                let result = self
                    .decide_withdrawal(&admin_id, &id, WithdrawalStatus::Approved, decision)
                    .await;
                let _ = response.send(result);
            }
            AdminRequest::RejectWithdrawal {
                admin_id,
                id,
                decision,
                response,
            } => {
                let result = self
                    .decide_withdrawal(&admin_id, &id, WithdrawalStatus::Rejected, decision)
                    .await;
                let _ = response.send(result);
            }
            AdminRequest::UploadGame { game, response } => {
                let _ = response.send(create_game(&self.games, game).await);
            }
            AdminRequest::SuspiciousActivity { response } => {
                let _ = response.send(self.suspicious_activity().await);
            }
            AdminRequest::GetSettings { response } => {
                let rewards = self.rewards.read().await.clone();
                let _ = response.send(Ok(rewards));
            }
            AdminRequest::UpdateSettings {
                admin_id,
                patch,
                response,
            } => {
                let _ = response.send(self.update_settings(&admin_id, patch).await);
            }
        }
    }
}

pub struct AdminService;

impl AdminService {
    pub fn new() -> Self {
        AdminService {}
    }
}

#[async_trait]
impl Service<AdminRequest, AdminRequestHandler> for AdminService {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_partial_settings() {
        let current = Rewards::default();
        let merged =
            merge_rewards(&current, json!({ "daily_points_cap": 80, "ad_watch_bonus": 7 }))
                .unwrap();

        assert_eq!(merged.daily_points_cap, 80);
        assert_eq!(merged.ad_watch_bonus, 7);
        assert_eq!(merged.min_withdrawal_points, current.min_withdrawal_points);
    }

    #[test]
    fn test_merge_empty_patch_keeps_settings() {
        let current = Rewards::default();
        assert_eq!(merge_rewards(&current, json!({})).unwrap(), current);
    }

    #[test]
    fn test_merge_rejects_unknown_key() {
        let err = merge_rewards(&Rewards::default(), json!({ "jackpot": 1 })).unwrap_err();
        assert_eq!(err.to_string(), "Unknown setting: jackpot.");
    }

    #[test]
    fn test_merge_rejects_bad_values() {
        let current = Rewards::default();
        assert!(matches!(
            merge_rewards(&current, json!({ "daily_points_cap": "lots" })),
            Err(ServiceError::Validation(_))
        ));
        assert!(merge_rewards(&current, json!({ "points_per_dollar": 0 })).is_err());
        assert!(merge_rewards(&current, json!({ "max_ads_per_day": -1 })).is_err());
        assert!(merge_rewards(&current, json!([1, 2, 3])).is_err());
    }
}
