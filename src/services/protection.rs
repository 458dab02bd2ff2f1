use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use super::{call, RequestHandler, Service, ServiceError, SharedRewards};
use crate::models::{
    points::Activity,
    protection::{
        ActivitySnapshot, AdCompletion, Assessment, DailyLimits, DeviceInfo, SuspiciousReport,
        Verdict,
    },
    users::BANNED_LEVEL,
};
use crate::repositories::{
    points::{GameScope, PointRepository},
    users::UserRepository,
};
use crate::settings::Protection;
use crate::utils;

pub mod detector;

use detector::Detector;

const DEFAULT_AD_SECONDS: f64 = 15.0;
const MIN_WATCH_RATIO: f64 = 0.8;
const MIN_INTERACTIONS: usize = 2;

pub enum ProtectionRequest {
    Assess {
        user_id: String,
        ip_address: Option<String>,
        response: oneshot::Sender<Result<Assessment, ServiceError>>,
    },
    RegisterDevice {
        user_id: String,
        ip_address: Option<String>,
        user_agent: String,
        device: DeviceInfo,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
    DailyLimits {
        user_id: String,
        response: oneshot::Sender<Result<DailyLimits, ServiceError>>,
    },
    VerifyAdCompletion {
        user_id: String,
        completion: AdCompletion,
        response: oneshot::Sender<Result<AdVerification, ServiceError>>,
    },
    Report {
        user_id: String,
        report: SuspiciousReport,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct AdVerification {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Asks the protection service for a verdict and refuses blocked or banned users.
pub async fn ensure_allowed(
    channel: &mpsc::Sender<ProtectionRequest>,
    user_id: &str,
    ip_address: Option<String>,
) -> Result<Assessment, ServiceError> {
    let assessment = call("Protection", channel, |response| ProtectionRequest::Assess {
        user_id: user_id.to_string(),
        ip_address,
        response,
    })
    .await?;

    if assessment.verdict.is_allowed() {
        Ok(assessment)
    } else {
        Err(ServiceError::forbidden("Suspicious activity detected."))
    }
}

/// Checks watch time and interaction count; the rapid-action flag is passed in.
pub fn check_ad_completion(completion: &AdCompletion, rapid_clicking: bool) -> AdVerification {
    let expected = completion.expected_duration.unwrap_or(DEFAULT_AD_SECONDS);

    let reason = if completion.watch_duration < expected * MIN_WATCH_RATIO {
        Some("Ad was not watched to completion.")
    } else if completion.interaction_events.len() < MIN_INTERACTIONS {
        Some("Not enough interaction with the ad was detected.")
    } else if rapid_clicking {
        Some("Suspicious activity detected.")
    } else {
        None
    };

    AdVerification {
        verified: reason.is_none(),
        reason: reason.map(str::to_string),
    }
}

#[derive(Clone)]
pub struct ProtectionRequestHandler {
    users: UserRepository,
    points: PointRepository,
    detector: Detector,
    rewards: SharedRewards,
}

impl ProtectionRequestHandler {
    pub fn new(pool: PgPool, settings: Protection, rewards: SharedRewards) -> Self {
        ProtectionRequestHandler {
            users: UserRepository::new(pool.clone()),
            points: PointRepository::new(pool),
            detector: Detector::new(settings),
            rewards,
        }
    }

    async fn snapshot(
        &self,
        user_id: &str,
        ip_address: Option<&str>,
        daily_points_cap: i32,
    ) -> Result<ActivitySnapshot, ServiceError> {
        let now = Utc::now();
        let settings = self.detector.settings();

        let recent_actions = self
            .points
            .count_since(user_id, now - Duration::minutes(settings.rapid_window_minutes))
            .await?;

        let accounts_on_ip = match ip_address {
            Some(ip) => self.users.count_by_ip(ip).await?,
            None => 0,
        };

        let earned_today = self
            .points
            .earned_since(self.points.pool(), user_id, utils::start_of_day(now))
            .await?;

        let recent_log_times = self
            .points
            .log_times_since(
                user_id,
                now - Duration::minutes(settings.regularity_window_minutes),
            )
            .await?;

        Ok(ActivitySnapshot {
            recent_actions,
            accounts_on_ip,
            earned_today,
            daily_points_cap,
            recent_log_times,
        })
    }

    pub(super) async fn assess(
        &self,
        user_id: &str,
        ip_address: Option<String>,
    ) -> Result<Assessment, ServiceError> {
        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;

        let ip_address = ip_address.or(user.ip_address.clone());
        let snapshot = self
            .snapshot(user_id, ip_address.as_deref(), user.daily_points_cap)
            .await?;
        let mut assessment = self.detector.assess(&snapshot);

        if user.is_banned() {
            assessment.verdict = Verdict::Ban;
            return Ok(assessment);
        }

        match assessment.verdict {
            Verdict::Ban => {
                self.users.set_level(user_id, BANNED_LEVEL).await?;
                log::warn!(
                    "Auto-banned user {} for {:?}.",
                    user_id,
                    assessment.checks.issues()
                );
            }
            Verdict::Block => {
                log::warn!(
                    "Blocked action for user {}: {:?}.",
                    user_id,
                    assessment.checks.issues()
                );
            }
            Verdict::Warn => {
                log::info!(
                    "Unusual activity for user {}: {:?}.",
                    user_id,
                    assessment.checks.issues()
                );
            }
            _ => (),
        }

        Ok(assessment)
    }

    async fn register_device(
        &self,
        user_id: &str,
        ip_address: Option<String>,
        user_agent: &str,
        device: DeviceInfo,
    ) -> Result<String, ServiceError> {
        let ip_address =
            ip_address.ok_or_else(|| ServiceError::validation("Client address is unknown."))?;

        self.users.update_ip_address(user_id, &ip_address).await?;

        let fingerprint = utils::device_fingerprint(&ip_address, user_agent);
        log::info!(
            "Device registered for user {}: fingerprint={} platform={:?} timezone={:?} language={:?} screen={:?}",
            user_id,
            fingerprint,
            device.platform,
            device.timezone,
            device.language,
            device.screen_resolution
        );

        Ok(fingerprint)
    }

    async fn daily_limits(&self, user_id: &str) -> Result<DailyLimits, ServiceError> {
        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let today = utils::start_of_day(Utc::now());
        let pool = self.points.pool();

        let earned = self.points.earned_since(pool, user_id, today).await?;
        let ads_watched_today = self
            .points
            .count_activity_since(pool, user_id, Activity::WatchAd, GameScope::Any, today)
            .await?;
        let games_played_today = self
            .points
            .count_activity_since(pool, user_id, Activity::PlayGame, GameScope::Any, today)
            .await?;
        let max_ads_per_day = self.rewards.read().await.max_ads_per_day;

        Ok(DailyLimits {
            daily_points_earned: earned,
            daily_points_cap: user.daily_points_cap,
            remaining_points: (user.daily_points_cap as i64 - earned).max(0),
            ads_watched_today,
            max_ads_per_day,
            games_played_today,
            can_earn_more: earned < user.daily_points_cap as i64,
        })
    }

    async fn verify_ad_completion(
        &self,
        user_id: &str,
        completion: AdCompletion,
    ) -> Result<AdVerification, ServiceError> {
        let settings = self.detector.settings();
        let recent_actions = self
            .points
            .count_since(
                user_id,
                Utc::now() - Duration::minutes(settings.rapid_window_minutes),
            )
            .await?;

        let verification =
            check_ad_completion(&completion, self.detector.is_rapid(recent_actions));
        if !verification.verified {
            log::info!(
                "Ad {:?} not verified for user {}: {:?}.",
                completion.ad_id,
                user_id,
                verification.reason
            );
        }

        Ok(verification)
    }

    fn report(&self, user_id: &str, report: SuspiciousReport) -> Result<(), ServiceError> {
        let reported = utils::required(&report.reported_user_id)
            .ok_or_else(|| ServiceError::validation("Reported user is required."))?;

        log::warn!(
            "Suspicious activity report from {} about {}: {} ({})",
            user_id,
            reported,
            report.reason,
            report.evidence
        );

        Ok(())
    }
}

#[async_trait]
impl RequestHandler<ProtectionRequest> for ProtectionRequestHandler {
    async fn handle_request(&self, request: ProtectionRequest) {
        match request {
            ProtectionRequest::Assess {
                user_id,
                ip_address,
                response,
            } => {
                let result = self.assess(&user_id, ip_address).await;
                let _ = response.send(result);
            }
            ProtectionRequest::RegisterDevice {
                user_id,
                ip_address,
                user_agent,
                device,
                response,
            } => {
                let result = self
                    .register_device(&user_id, ip_address, &user_agent, device)
                    .await;
                let _ = response.send(result);
            }
            ProtectionRequest::DailyLimits { user_id, response } => {
                let result = self.daily_limits(&user_id).await;
                let _ = response.send(result);
            }
            ProtectionRequest::VerifyAdCompletion {
                user_id,
                completion,
                response,
            } => {
                let result = self.verify_ad_completion(&user_id, completion).await;
                let _ = response.send(result);
            }
            ProtectionRequest::Report {
                user_id,
                report,
                response,
            } => {
                let _ = response.send(self.report(&user_id, report));
            }
        }
    }
}

pub struct ProtectionService;

impl ProtectionService {
    pub fn new() -> Self {
        ProtectionService {}
    }
}

#[async_trait]
impl Service<ProtectionRequest, ProtectionRequestHandler> for ProtectionService {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion(watched: f64, events: usize) -> AdCompletion {
        AdCompletion {
            ad_id: Some("ad-1".to_string()),
            watch_duration: watched,
            expected_duration: Some(30.0),
            interaction_events: (0..events).map(|i| json!({ "event": i })).collect(),
        }
    }

    #[test]
    fn test_full_watch_verifies() {
        let result = check_ad_completion(&completion(30.0, 3), false);
        assert!(result.verified);
        assert!(result.reason.is_none());
    }

    #[test]
    fn test_short_watch_fails() {
        let result = check_ad_completion(&completion(23.9, 3), false);
        assert!(!result.verified);
        assert_eq!(
            result.reason.as_deref(),
            Some("Ad was not watched to completion.")
        );
        assert!(check_ad_completion(&completion(24.5, 3), false).verified);
    }

    #[test]
    fn test_missing_interactions_fail() {
        let result = check_ad_completion(&completion(30.0, 1), false);
        assert!(!result.verified);
    }

    #[test]
    fn test_rapid_clicking_fails() {
        let result = check_ad_completion(&completion(30.0, 5), true);
        assert_eq!(result.reason.as_deref(), Some("Suspicious activity detected."));
    }

    #[test]
    fn test_default_expected_duration() {
        let mut watched = completion(12.5, 2);
        watched.expected_duration = None;
        assert!(check_ad_completion(&watched, false).verified);

        watched.watch_duration = 11.9;
        assert!(!check_ad_completion(&watched, false).verified);
    }
}
