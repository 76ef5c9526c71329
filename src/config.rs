use dotenvy::dotenv;
use std::env;

use crate::error::{AppError, AppResult};
use crate::store::MAX_TRANSACTION_ATTEMPTS;

#[derive(Debug, Clone)]
pub struct Config {
    /// How many times an optimistic transaction is attempted before the
    /// conflict surfaces to the caller.
    pub max_transaction_attempts: u32,
    pub notifications_enabled: bool,
    /// Sender address stamped on outbound notifications.
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenv().ok();

        let max_transaction_attempts = match env::var("TX_MAX_ATTEMPTS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| AppError::Config(format!("TX_MAX_ATTEMPTS invalid: {}", raw)))?,
            Err(_) => MAX_TRANSACTION_ATTEMPTS,
        };
        if max_transaction_attempts == 0 {
            return Err(AppError::Config("TX_MAX_ATTEMPTS must be at least 1".into()));
        }

        let notifications_enabled = env::var("NOTIFICATIONS_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let mail_from =
            env::var("MAIL_FROM").unwrap_or_else(|_| "updates@convene.app".to_string());

        Ok(Self {
            max_transaction_attempts,
            notifications_enabled,
            mail_from,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_transaction_attempts: MAX_TRANSACTION_ATTEMPTS,
            notifications_enabled: true,
            mail_from: "updates@convene.app".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_transaction_attempts, MAX_TRANSACTION_ATTEMPTS);
        assert!(config.notifications_enabled);
    }
}
