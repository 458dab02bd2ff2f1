use crate::models::referrals;

use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct ReferralRepository;

impl ReferralRepository {
    pub fn new() -> Self {
        ReferralRepository
    }

    /// Inserts the pair unless it already exists; `None` means a duplicate.
    pub async fn insert_referral<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        referrer_id: &str,
        referred_id: &str,
    ) -> Result<Option<referrals::Referral>, anyhow::Error> {
        let referral_id = Uuid::new_v4().hyphenated().to_string();

        let referral = sqlx::query_as::<_, referrals::Referral>(
            r#"INSERT INTO referrals (id, referrer_id, referred_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (referrer_id, referred_id) DO NOTHING
            RETURNING *"#,
        )
        .bind(referral_id)
        .bind(referrer_id)
        .bind(referred_id)
        .fetch_optional(executor)
        .await?;

        Ok(referral)
    }
}
