//! Runtime configuration resolved from `STARPORT_*` environment variables with defaults.

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Argon2id cost parameters used when hashing new passwords.
/// Verification reads the parameters back out of the stored PHC string, so changing these
/// only affects hashes produced afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl HashingConfig {
    /// Minimal cost; keeps unoptimised test builds fast. Never use for a real store.
    pub fn fast_for_tests() -> Self {
        Self { memory_kib: argon2::Params::MIN_M_COST.max(64), iterations: 1, parallelism: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Transactional mail endpoint; `None` selects the log-only notifier.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    pub sender_email: String,
    pub sender_name: String,
    /// Base of the confirmation link; the token is appended as `?token=`.
    pub confirm_base_url: String,
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            sender_email: "no-reply@starport.local".to_string(),
            sender_name: "Starport".to_string(),
            confirm_base_url: "http://127.0.0.1:5000/confirm".to_string(),
            timeout_secs: 10,
        }
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

pub const DEFAULT_RECOVERY_TTL_SECS: i64 = 5 * 60;
/// Longest accepted recovery code lifetime (one day).
pub const MAX_RECOVERY_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub store_path: PathBuf,
    pub recovery_code_ttl_secs: i64,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data").join("players.json"),
            recovery_code_ttl_secs: DEFAULT_RECOVERY_TTL_SECS,
            hashing: HashingConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl IdentityConfig {
    /// Build from the process environment. Missing variables keep their defaults; malformed
    /// numbers are reported and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Self {
        let mut cfg = Self::default();
        if let Some(p) = get("STARPORT_STORE") { cfg.store_path = PathBuf::from(p); }
        if let Some(v) = parse_num::<i64>(&get, "STARPORT_RECOVERY_TTL_SECS") {
            if ttl_in_range(v) {
                cfg.recovery_code_ttl_secs = v;
            } else {
                warn!(target: "starport::config", "ignoring STARPORT_RECOVERY_TTL_SECS={}: must be 1..={}", v, MAX_RECOVERY_TTL_SECS);
            }
        }
        if let Some(v) = parse_num::<u32>(&get, "STARPORT_ARGON2_MEMORY_KIB") { cfg.hashing.memory_kib = v; }
        if let Some(v) = parse_num::<u32>(&get, "STARPORT_ARGON2_ITERATIONS") { cfg.hashing.iterations = v; }
        if let Some(v) = parse_num::<u32>(&get, "STARPORT_ARGON2_PARALLELISM") { cfg.hashing.parallelism = v; }
        cfg.mail.api_url = get("STARPORT_MAIL_API_URL").or(cfg.mail.api_url);
        cfg.mail.api_key = get("STARPORT_MAIL_API_KEY").or(cfg.mail.api_key);
        if let Some(v) = get("STARPORT_MAIL_SENDER") { cfg.mail.sender_email = v; }
        if let Some(v) = get("STARPORT_MAIL_SENDER_NAME") { cfg.mail.sender_name = v; }
        if let Some(v) = get("STARPORT_CONFIRM_URL") { cfg.mail.confirm_base_url = v; }
        if let Some(v) = parse_num::<u64>(&get, "STARPORT_MAIL_TIMEOUT_SECS") { cfg.mail.timeout_secs = v; }
        cfg
    }

    /// Lifetime of an issued recovery code. Values outside `1..=MAX_RECOVERY_TTL_SECS` fall back
    /// to the default.
    pub fn recovery_code_ttl(&self) -> TimeDelta {
        let secs = if ttl_in_range(self.recovery_code_ttl_secs) { self.recovery_code_ttl_secs } else { DEFAULT_RECOVERY_TTL_SECS };
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::minutes(5))
    }
}

fn ttl_in_range(secs: i64) -> bool { (1..=MAX_RECOVERY_TTL_SECS).contains(&secs) }

fn parse_num<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = get(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "starport::config", "ignoring {}='{}': not a number", key, raw);
            None
        }
    }
}
