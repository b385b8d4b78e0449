//! Engine settings.
//!
//! The surrounding system keeps free-form admin settings; the handful
//! that intersect the ledger core are modeled here as a typed structure
//! with enumerated keys, loaded from the environment with defaults.

use std::time::Duration;

/// Expiry-sweep policy.
#[derive(Debug, Clone)]
pub struct SweepPolicy {
    /// How often the sweep runs.
    pub interval: Duration,

    /// How long without a generation before a credit holder is nudged.
    pub idle_after: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600),
            idle_after: Duration::from_secs(5 * 24 * 3600),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Validity window applied when a grant does not specify one.
    /// 0 means granted credits never expire.
    pub default_valid_days: i64,

    /// Expiry-sweep policy.
    pub sweep: SweepPolicy,

    /// The community channel whose members may claim the free credit.
    pub free_credit_channel: String,

    /// Credits granted by the one-time free claim.
    pub free_credit_amount: i64,
}

impl Settings {
    /// Load settings from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_valid_days: env_i64("VOXBILL_DEFAULT_VALID_DAYS", defaults.default_valid_days),
            sweep: SweepPolicy {
                interval: Duration::from_secs(env_u64(
                    "VOXBILL_SWEEP_INTERVAL_SECS",
                    defaults.sweep.interval.as_secs(),
                )),
                idle_after: Duration::from_secs(env_u64(
                    "VOXBILL_IDLE_AFTER_SECS",
                    defaults.sweep.idle_after.as_secs(),
                )),
            },
            free_credit_channel: std::env::var("VOXBILL_FREE_CREDIT_CHANNEL")
                .unwrap_or(defaults.free_credit_channel),
            free_credit_amount: env_i64(
                "VOXBILL_FREE_CREDIT_AMOUNT",
                defaults.free_credit_amount,
            ),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_valid_days: 0,
            sweep: SweepPolicy::default(),
            free_credit_channel: "@voxbill".into(),
            free_credit_amount: 1,
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
