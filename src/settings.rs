use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Auth {
    pub token_ttl_hours: i64,
    pub admin_level: i32,
}

impl Default for Auth {
    fn default() -> Self {
        Auth {
            token_ttl_hours: 72,
            admin_level: 10,
        }
    }
}

/// Point economy knobs. Editable at runtime from the admin settings endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Rewards {
    pub daily_points_cap: i32,
    pub min_withdrawal_points: i32,
    pub points_per_dollar: i32,
    pub max_ads_per_day: i64,
    pub max_game_ads_per_day: i64,
    pub referral_bonus: i32,
    pub daily_login_bonus: i32,
    pub game_start_bonus: i32,
    pub long_play_bonus: i32,
    pub long_play_minutes: f64,
    pub ad_watch_bonus: i32,
}

impl Default for Rewards {
    fn default() -> Self {
        Rewards {
            daily_points_cap: 50,
            min_withdrawal_points: 2000,
            points_per_dollar: 1000,
            max_ads_per_day: 10,
            max_game_ads_per_day: 3,
            referral_bonus: 10,
            daily_login_bonus: 1,
            game_start_bonus: 1,
            long_play_bonus: 2,
            long_play_minutes: 3.0,
            ad_watch_bonus: 5,
        }
    }
}

impl Rewards {
    /// Cash value of a withdrawal, in cents.
    pub fn amount_in_cents(&self, points: i32) -> i32 {
        if self.points_per_dollar <= 0 {
            return 0;
        }

        ((points as i64 * 100) / self.points_per_dollar as i64) as i32
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Protection {
    pub rapid_window_minutes: i64,
    pub rapid_max_actions: i64,
    pub max_accounts_per_ip: i64,
    pub daily_cap_multiplier: i64,
    pub regularity_window_minutes: i64,
    pub regularity_min_logs: usize,
    pub regularity_tolerance_seconds: f64,
    pub regularity_ratio: f64,
    pub suspicious_daily_points: i64,
    pub suspicious_hourly_actions: i64,
}

impl Default for Protection {
    fn default() -> Self {
        Protection {
            rapid_window_minutes: 5,
            rapid_max_actions: 20,
            max_accounts_per_ip: 3,
            daily_cap_multiplier: 2,
            regularity_window_minutes: 60,
            regularity_min_logs: 5,
            regularity_tolerance_seconds: 2.0,
            regularity_ratio: 0.8,
            suspicious_daily_points: 100,
            suspicious_hourly_actions: 20,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub http: Http,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub rewards: Rewards,
    #[serde(default)]
    pub protection: Protection,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PLAYPOINTS").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(raw: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("settings should parse")
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let settings = parse(
            r#"
            [postgres]
            url = "postgres://localhost/playpoints"

            [http]
            listen = "127.0.0.1:8080"
            "#,
        );

        assert_eq!(settings.postgres.max_connections, 5);
        assert_eq!(settings.auth.admin_level, 10);
        assert_eq!(settings.rewards, Rewards::default());
        assert_eq!(settings.protection.rapid_max_actions, 20);
        assert_eq!(settings.protection.regularity_min_logs, 5);
    }

    #[test]
    fn test_partial_rewards_override() {
        let settings = parse(
            r#"
            [postgres]
            url = "postgres://localhost/playpoints"

            [http]
            listen = "127.0.0.1:8080"

            [rewards]
            ad_watch_bonus = 7
            "#,
        );

        assert_eq!(settings.rewards.ad_watch_bonus, 7);
        assert_eq!(settings.rewards.daily_points_cap, 50);
    }

    #[test]
    fn test_amount_in_cents() {
        let rewards = Rewards::default();
        assert_eq!(rewards.amount_in_cents(2000), 200);
        assert_eq!(rewards.amount_in_cents(2550), 255);

        let broken = Rewards {
            points_per_dollar: 0,
            ..Rewards::default()
        };
        assert_eq!(broken.amount_in_cents(5000), 0);
    }
}
