use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use tokio::sync::{mpsc, oneshot};

use super::protection::{ensure_allowed, ProtectionRequest};
use super::{RequestHandler, Service, ServiceError, SharedRewards};
use crate::models::{
    points::{self, Activity, Award, Balance, PointStats},
    referrals::{ReferralAction, ReferralLink, ReferralOutcome},
    users::User,
    withdrawals::{self, NewWithdrawal, WithdrawalReceipt, PAYMENT_METHODS},
    Page, PageQuery,
};
use crate::repositories::{
    ads::AdRepository,
    points::{GameScope, PointRepository},
    referrals::ReferralRepository,
    users::UserRepository,
    withdrawals::WithdrawalRepository,
};
use crate::settings::Rewards;
use crate::utils;

pub enum PointRequest {
    Balance {
        user_id: String,
        response: oneshot::Sender<Result<Balance, ServiceError>>,
    },
    History {
        user_id: String,
        page: PageQuery,
        response: oneshot::Sender<Result<Page<points::PointLog>, ServiceError>>,
    },
    WatchAd {
        user_id: String,
        ip_address: Option<String>,
        ad_id: Option<String>,
        response: oneshot::Sender<Result<Award, ServiceError>>,
    },
    Refer {
        user_id: String,
        ip_address: Option<String>,
        action: ReferralAction,
        response: oneshot::Sender<Result<ReferralOutcome, ServiceError>>,
    },
    Withdraw {
        user_id: String,
        request: NewWithdrawal,
        response: oneshot::Sender<Result<WithdrawalReceipt, ServiceError>>,
    },
    Withdrawals {
        user_id: String,
        response: oneshot::Sender<Result<Vec<withdrawals::WithdrawalRequest>, ServiceError>>,
    },
    Stats {
        user_id: String,
        response: oneshot::Sender<Result<PointStats, ServiceError>>,
    },
}

/// Credits an earning activity when the (already locked) user is still under
/// their daily cap. Returns the new balance, or `None` when nothing was paid.
pub(super) async fn award_if_under_cap(
    points: &PointRepository,
    conn: &mut PgConnection,
    user: &User,
    amount: i32,
    activity: Activity,
    game_id: Option<&str>,
    ad_id: Option<&str>,
) -> Result<Option<i32>, ServiceError> {
    if user.is_banned() || amount <= 0 {
        return Ok(None);
    }

    let today = utils::start_of_day(Utc::now());
    let earned = points.earned_since(&mut *conn, &user.id, today).await?;
    if earned >= user.daily_points_cap as i64 {
        return Ok(None);
    }

    let balance = points
        .apply(conn, &user.id, amount, activity, game_id, ad_id)
        .await?;

    Ok(Some(balance))
}

/// Records a referral pair and pays the referrer's bonus if they are under cap.
pub(super) async fn record_referral(
    users: &UserRepository,
    points: &PointRepository,
    referrals: &ReferralRepository,
    conn: &mut PgConnection,
    referrer_id: &str,
    referred_id: &str,
    bonus: i32,
) -> Result<i32, ServiceError> {
    if referrer_id == referred_id {
        return Err(ServiceError::validation("Users cannot refer themselves."));
    }

    let referrer = users
        .lock_user(&mut *conn, referrer_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Referrer"))?;

    referrals
        .insert_referral(&mut *conn, referrer_id, referred_id)
        .await?
        .ok_or_else(|| ServiceError::validation("This user has already been referred."))?;

    let awarded = award_if_under_cap(
        points,
        conn,
        &referrer,
        bonus,
        Activity::InviteFriend,
        None,
        None,
    )
    .await?;

    Ok(if awarded.is_some() { bonus } else { 0 })
}

/// Pays for one ad view, standalone or inside a game, within the per-day view limit.
pub(super) async fn record_ad_view(
    pool: &PgPool,
    users: &UserRepository,
    points: &PointRepository,
    ads: &AdRepository,
    rewards: &Rewards,
    user_id: &str,
    scope: GameScope<'_>,
    ad_id: Option<&str>,
) -> Result<Award, ServiceError> {
    let reward = match ad_id {
        Some(ad_id) => {
            ads.get_ad(ad_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Ad"))?
                .points_reward
        }
        None => rewards.ad_watch_bonus,
    };
    let limit = match scope {
        GameScope::Game(_) => rewards.max_game_ads_per_day,
        _ => rewards.max_ads_per_day,
    };
    let game_id = match scope {
        GameScope::Game(game_id) => Some(game_id),
        _ => None,
    };

    let mut tx = pool.begin().await?;
    let user = users
        .lock_user(&mut *tx, user_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("User"))?;
    if user.is_banned() {
        return Err(ServiceError::forbidden("Account is banned."));
    }

    let today = utils::start_of_day(Utc::now());
    let earned = points.earned_since(&mut *tx, user_id, today).await?;
    if earned >= user.daily_points_cap as i64 {
        return Err(ServiceError::validation("Daily points limit reached."));
    }

    let views = points
        .count_activity_since(&mut *tx, user_id, Activity::WatchAd, scope, today)
        .await?;
    if views >= limit {
        return Err(ServiceError::validation("Daily ad view limit reached."));
    }

    let total_points = points
        .apply(&mut tx, user_id, reward, Activity::WatchAd, game_id, ad_id)
        .await?;
    tx.commit().await?;

    Ok(Award {
        points_awarded: reward,
        total_points,
    })
}

/// Validates a withdrawal request against the current economy settings.
pub fn validate_withdrawal(
    request: &NewWithdrawal,
    rewards: &Rewards,
) -> Result<(i32, String), ServiceError> {
    let payment_method = request
        .payment_method
        .as_deref()
        .filter(|method| PAYMENT_METHODS.contains(method))
        .ok_or_else(|| ServiceError::validation("Invalid payment method."))?;

    let amount = request.points.unwrap_or(0);
    if amount < rewards.min_withdrawal_points {
        return Err(ServiceError::validation(format!(
            "Minimum withdrawal is {} points.",
            rewards.min_withdrawal_points
        )));
    }

    Ok((amount, payment_method.to_string()))
}

#[derive(Clone)]
pub struct PointRequestHandler {
    pool: PgPool,
    users: UserRepository,
    points: PointRepository,
    ads: AdRepository,
    referrals: ReferralRepository,
    withdrawals: WithdrawalRepository,
    rewards: SharedRewards,
    protection_channel: mpsc::Sender<ProtectionRequest>,
}

impl PointRequestHandler {
    pub fn new(
        pool: PgPool,
        rewards: SharedRewards,
        protection_channel: mpsc::Sender<ProtectionRequest>,
    ) -> Self {
        PointRequestHandler {
            users: UserRepository::new(pool.clone()),
            points: PointRepository::new(pool.clone()),
            ads: AdRepository::new(pool.clone()),
            referrals: ReferralRepository::new(),
            withdrawals: WithdrawalRepository::new(pool.clone()),
            pool,
            rewards,
            protection_channel,
        }
    }

    async fn get_user(&self, user_id: &str) -> Result<User, ServiceError> {
        self.users
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))
    }

    async fn balance(&self, user_id: &str) -> Result<Balance, ServiceError> {
        let user = self.get_user(user_id).await?;
        let daily_points_earned = self
            .points
            .earned_since(&self.pool, user_id, utils::start_of_day(Utc::now()))
            .await?;

        Ok(Balance {
            points: user.points,
            daily_points_earned,
            daily_points_cap: user.daily_points_cap,
            level: user.level,
        })
    }

    async fn history(
        &self,
        user_id: &str,
        page: PageQuery,
    ) -> Result<Page<points::PointLog>, ServiceError> {
        let (logs, total) = self.points.history(user_id, &page).await?;

        Ok(Page::new(logs, total, &page))
    }

    async fn watch_ad(
        &self,
        user_id: &str,
        ip_address: Option<String>,
        ad_id: Option<String>,
    ) -> Result<Award, ServiceError> {
        ensure_allowed(&self.protection_channel, user_id, ip_address).await?;
        let rewards = self.rewards.read().await.clone();

        record_ad_view(
            &self.pool,
            &self.users,
            &self.points,
            &self.ads,
            &rewards,
            user_id,
            GameScope::Standalone,
            ad_id.as_deref(),
        )
        .await
    }

    async fn refer(
        &self,
        user_id: &str,
        ip_address: Option<String>,
        action: ReferralAction,
    ) -> Result<ReferralOutcome, ServiceError> {
        match action {
            ReferralAction::CreateLink => Ok(ReferralOutcome::Link(ReferralLink {
                referral_link: format!("/register?ref={}", user_id),
                referral_code: format!("ref_{}_{}", user_id, Utc::now().timestamp()),
            })),
            ReferralAction::ProcessReferral { referred_email } => {
                let email = utils::required(&referred_email)
                    .ok_or_else(|| ServiceError::validation("Referred email is required."))?;
                let referred = self
                    .users
                    .get_user_by_email(email)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Referred user"))?;

                ensure_allowed(&self.protection_channel, user_id, ip_address).await?;
                let bonus = self.rewards.read().await.referral_bonus;

                let mut tx = self.pool.begin().await?;
                let points_awarded = record_referral(
                    &self.users,
                    &self.points,
                    &self.referrals,
                    &mut tx,
                    user_id,
                    &referred.id,
                    bonus,
                )
                .await?;
                tx.commit().await?;

                Ok(ReferralOutcome::Processed { points_awarded })
            }
        }
    }

    pub(super) async fn withdraw(
        &self,
        user_id: &str,
        request: NewWithdrawal,
    ) -> Result<WithdrawalReceipt, ServiceError> {
        let rewards = self.rewards.read().await.clone();
        let (amount, payment_method) = validate_withdrawal(&request, &rewards)?;

        let mut tx = self.pool.begin().await?;
        let user = self
            .users
            .lock_user(&mut *tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        if user.is_banned() {
            return Err(ServiceError::forbidden("Account is banned."));
        }
        if user.points < amount {
            return Err(ServiceError::validation("Insufficient points balance."));
        }

        let withdrawal = self
            .withdrawals
            .insert_withdrawal(
                &mut *tx,
                user_id,
                amount,
                rewards.amount_in_cents(amount),
                &payment_method,
            )
            .await?;
        let remaining_points = self
            .points
            .apply(&mut tx, user_id, -amount, Activity::Withdrawal, None, None)
            .await?;
        tx.commit().await?;

        log::info!(
            "Withdrawal {} requested by {}: {} points via {}.",
            withdrawal.id,
            user_id,
            amount,
            payment_method
        );

        Ok(WithdrawalReceipt {
            withdrawal_id: withdrawal.id,
            amount_in_cents: withdrawal.amount_in_cents,
            remaining_points,
        })
    }

    async fn stats(&self, user_id: &str) -> Result<PointStats, ServiceError> {
        let user = self.get_user(user_id).await?;
        let now = Utc::now();

        Ok(PointStats {
            today_points: self
                .points
                .earned_since(&self.pool, user_id, utils::start_of_day(now))
                .await?,
            week_points: self
                .points
                .earned_since(&self.pool, user_id, utils::days_ago(now, 7))
                .await?,
            month_points: self
                .points
                .earned_since(&self.pool, user_id, utils::days_ago(now, 30))
                .await?,
            total_earned: self.points.total_earned(user_id).await?,
            current_balance: user.points,
        })
    }
}

#[async_trait]
impl RequestHandler<PointRequest> for PointRequestHandler {
    async fn handle_request(&self, request: PointRequest) {
        match request {
            PointRequest::Balance { user_id, response } => {
                let _ = response.send(self.balance(&user_id).await);
            }
            PointRequest::History {
                user_id,
                page,
                response,
            } => {
                let _ = response.send(self.history(&user_id, page).await);
            }
            PointRequest::WatchAd {
                user_id,
                ip_address,
                ad_id,
                response,
            } => {
                let result = self.watch_ad(&user_id, ip_address, ad_id).await;
                let _ = response.send(result);
            }
            PointRequest::Refer {
                user_id,
                ip_address,
                action,
                response,
            } => {
                let result = self.refer(&user_id, ip_address, action).await;
                let _ = response.send(result);
            }
            PointRequest::Withdraw {
                user_id,
                request,
                response,
            } => {
                let _ = response.send(self.withdraw(&user_id, request).await);
            }
            PointRequest::Withdrawals { user_id, response } => {
                let result = self
                    .withdrawals
                    .list_for_user(&user_id)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            PointRequest::Stats { user_id, response } => {
                let _ = response.send(self.stats(&user_id).await);
            }
        }
    }
}

pub struct PointService;

impl PointService {
    pub fn new() -> Self {
        PointService {}
    }
}

#[async_trait]
impl Service<PointRequest, PointRequestHandler> for PointService {}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(points: Option<i32>, method: Option<&str>) -> NewWithdrawal {
        NewWithdrawal {
            points,
            payment_method: method.map(str::to_string),
        }
    }

    #[test]
    fn test_valid_withdrawal() {
        let rewards = Rewards::default();
        let (amount, method) =
            validate_withdrawal(&request(Some(2500), Some("payeer")), &rewards).unwrap();
        assert_eq!(amount, 2500);
        assert_eq!(method, "payeer");
    }

    #[test]
    fn test_withdrawal_below_minimum() {
        let rewards = Rewards::default();
        let err = validate_withdrawal(&request(Some(1999), Some("gift_card")), &rewards)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(err.to_string(), "Minimum withdrawal is 2000 points.");

        assert!(validate_withdrawal(&request(None, Some("gift_card")), &rewards).is_err());
    }

    #[test]
    fn test_withdrawal_payment_method() {
        let rewards = Rewards::default();
        assert!(validate_withdrawal(&request(Some(3000), Some("mobile_credit")), &rewards).is_ok());

        let err =
            validate_withdrawal(&request(Some(3000), Some("bitcoin")), &rewards).unwrap_err();
        assert_eq!(err.to_string(), "Invalid payment method.");
        assert!(validate_withdrawal(&request(Some(3000), None), &rewards).is_err());
    }
}
