use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::auth::{hash_password, verify_password};
use super::points::{award_if_under_cap, record_referral};
use super::{is_unique_violation, RequestHandler, Service, ServiceError, SharedRewards};
use crate::models::{
    points::Activity,
    users::{self, Credentials, NewUser, UserDetails},
};
use crate::repositories::{
    points::PointRepository,
    referrals::ReferralRepository,
    users::{UserRecord, UserRepository},
};
use crate::utils;

pub enum UserRequest {
    Register {
        user: NewUser,
        ip_address: Option<String>,
        response: oneshot::Sender<Result<UserDetails, ServiceError>>,
    },
    Login {
        credentials: Credentials,
        ip_address: Option<String>,
        response: oneshot::Sender<Result<UserDetails, ServiceError>>,
    },
    GetUser {
        id: String,
        response: oneshot::Sender<Result<Option<users::User>, ServiceError>>,
    },
    Profile {
        id: String,
        response: oneshot::Sender<Result<UserDetails, ServiceError>>,
    },
}

/// Registration fields after presence and format checks.
#[derive(Debug, PartialEq)]
pub struct ValidRegistration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub phone_number: Option<&'a str>,
}

pub fn validate_registration(user: &NewUser) -> Result<ValidRegistration<'_>, ServiceError> {
    let (name, email, password) = match (
        utils::required(&user.name),
        utils::required(&user.email),
        user.password.as_deref().filter(|p| !p.is_empty()),
    ) {
        (Some(name), Some(email), Some(password)) => (name, email, password),
        _ => {
            return Err(ServiceError::validation(
                "Name, email and password are required.",
            ))
        }
    };

    if !utils::is_valid_email(email) {
        return Err(ServiceError::validation("Invalid email format."));
    }

    let phone_number = utils::required(&user.phone_number);
    if let Some(phone) = phone_number {
        if !utils::is_valid_phone(phone) {
            return Err(ServiceError::validation("Invalid phone number format."));
        }
    }

    Ok(ValidRegistration {
        name,
        email,
        password,
        phone_number,
    })
}

#[derive(Clone)]
pub struct UserRequestHandler {
    pool: PgPool,
    repository: UserRepository,
    points: PointRepository,
    referrals: ReferralRepository,
    rewards: SharedRewards,
}

impl UserRequestHandler {
    pub fn new(sql_conn: PgPool, rewards: SharedRewards) -> Self {
        UserRequestHandler {
            repository: UserRepository::new(sql_conn.clone()),
            points: PointRepository::new(sql_conn.clone()),
            referrals: ReferralRepository::new(),
            pool: sql_conn,
            rewards,
        }
    }

    async fn details(&self, user: &users::User) -> Result<UserDetails, ServiceError> {
        let earned = self
            .points
            .earned_since(&self.pool, &user.id, utils::start_of_day(Utc::now()))
            .await?;

        Ok(user.details(earned))
    }

    async fn profile(&self, id: &str) -> Result<UserDetails, ServiceError> {
        let user = self
            .repository
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;

        self.details(&user).await
    }

    pub(super) async fn register(
        &self,
        user: NewUser,
        ip_address: Option<String>,
    ) -> Result<UserDetails, ServiceError> {
        let valid = validate_registration(&user)?;

        if self
            .repository
            .find_existing(valid.email, valid.phone_number)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict("User already exists.".to_string()));
        }

        let password_hash = hash_password(valid.password)?;
        let rewards = self.rewards.read().await.clone();

        let mut tx = self.pool.begin().await?;
        let created = match self
            .repository
            .insert_user(
                &mut *tx,
                &UserRecord {
                    name: valid.name,
                    email: valid.email,
                    password_hash: &password_hash,
                    phone_number: valid.phone_number,
                    google_id: utils::required(&user.google_id),
                    facebook_id: utils::required(&user.facebook_id),
                    daily_points_cap: rewards.daily_points_cap,
                    ip_address: ip_address.as_deref(),
                },
            )
            .await
        {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(ServiceError::Conflict("User already exists.".to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(referrer_id) = utils::required(&user.referred_by) {
            match record_referral(
                &self.repository,
                &self.points,
                &self.referrals,
                &mut tx,
                referrer_id,
                &created.id,
                rewards.referral_bonus,
            )
            .await
            {
                Ok(_) => (),
                Err(ServiceError::NotFound(_)) => {
                    log::info!("Ignoring unknown referrer {} at signup.", referrer_id)
                }
                Err(e) => return Err(e),
            }
        }
        tx.commit().await?;

        log::info!("Registered user {}.", created.id);
        Ok(created.details(0))
    }

    async fn login(
        &self,
        credentials: Credentials,
        ip_address: Option<String>,
    ) -> Result<UserDetails, ServiceError> {
        let (email, password) = match (
            utils::required(&credentials.email),
            credentials.password.as_deref().filter(|p| !p.is_empty()),
        ) {
            (Some(email), Some(password)) => (email, password),
            _ => {
                return Err(ServiceError::validation(
                    "Email and password are required.",
                ))
            }
        };

        let user = self.repository.get_user_by_email(email).await?;
        let user = match user {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                return Err(ServiceError::Unauthorized(
                    "Invalid email or password.".to_string(),
                ))
            }
        };
        if user.is_banned() {
            return Err(ServiceError::forbidden("Account is banned."));
        }

        let now = Utc::now();
        let today = utils::start_of_day(now);
        let bonus = self.rewards.read().await.daily_login_bonus;

        let mut tx = self.pool.begin().await?;
        let locked = self
            .repository
            .lock_user(&mut *tx, &user.id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;

        let first_login_today = locked.last_login.map_or(true, |last| last < today);
        if first_login_today {
            award_if_under_cap(
                &self.points,
                &mut tx,
                &locked,
                bonus,
                Activity::DailyLogin,
                None,
                None,
            )
            .await?;
        }

        self.repository
            .record_login(&mut *tx, &user.id, ip_address.as_deref(), now)
            .await?;
        tx.commit().await?;

        self.profile(&user.id).await
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register {
                user,
                ip_address,
                response,
            } => {
                let user = self.register(user, ip_address).await;
                let _ = response.send(user);
            }
            UserRequest::Login {
                credentials,
                ip_address,
                response,
            } => {
                let user = self.login(credentials, ip_address).await;
                let _ = response.send(user);
            }
            UserRequest::GetUser { id, response } => {
                let user = self
                    .repository
                    .get_user_by_id(&id)
                    .await
                    .map_err(|e| ServiceError::Database(e.to_string()));
                let _ = response.send(user);
            }
            UserRequest::Profile { id, response } => {
                let _ = response.send(self.profile(&id).await);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: &str, password: &str, phone: Option<&str>) -> NewUser {
        NewUser {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            phone_number: phone.map(str::to_string),
            google_id: None,
            facebook_id: None,
            referred_by: None,
        }
    }

    #[test]
    fn test_valid_registration() {
        let user = new_user(" Mona ", "mona@example.com", "s3cret!", Some("+201001234567"));
        let valid = validate_registration(&user).unwrap();
        assert_eq!(valid.name, "Mona");
        assert_eq!(valid.phone_number, Some("+201001234567"));
    }

    #[test]
    fn test_missing_fields() {
        let user = new_user("", "mona@example.com", "s3cret!", None);
        let err = validate_registration(&user).unwrap_err();
        assert_eq!(err.to_string(), "Name, email and password are required.");

        let user = new_user("Mona", "mona@example.com", "", None);
        assert!(validate_registration(&user).is_err());
    }

    #[test]
    fn test_bad_email_and_phone() {
        let user = new_user("Mona", "mona-at-example", "s3cret!", None);
        assert_eq!(
            validate_registration(&user).unwrap_err().to_string(),
            "Invalid email format."
        );

        let user = new_user("Mona", "mona@example.com", "s3cret!", Some("0000"));
        assert_eq!(
            validate_registration(&user).unwrap_err().to_string(),
            "Invalid phone number format."
        );
    }

    #[test]
    fn test_blank_phone_is_ignored() {
        let user = new_user("Mona", "mona@example.com", "s3cret!", Some("  "));
        assert_eq!(validate_registration(&user).unwrap().phone_number, None);
    }
}
