use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::IdentityConfig;
use crate::notifier::{self, Notifier};
use crate::recovery::RecoveryFlow;
use crate::repository::{shared_repository, PlayerRepository};
use crate::security::PasswordHashing;
use crate::service::PlayerService;

/// Everything a front end needs, wired from one configuration.
pub struct Identity {
    pub service: Arc<PlayerService>,
    pub recovery: RecoveryFlow,
}

impl Identity {
    pub fn new(repo: Arc<PlayerRepository>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, cfg: &IdentityConfig) -> Self {
        let service = Arc::new(PlayerService::new(repo, notifier));
        let recovery = RecoveryFlow::new(service.clone(), clock, cfg.recovery_code_ttl());
        Self { service, recovery }
    }

    /// Open a private repository at `cfg.store_path`.
    pub fn open(cfg: &IdentityConfig) -> Result<Self> {
        let repo = PlayerRepository::open(cfg.store_path.clone(), PasswordHashing::new(cfg.hashing))
            .with_context(|| format!("opening player store {}", cfg.store_path.display()))?;
        Self::wire(Arc::new(repo), cfg)
    }

    /// Use the process-wide repository, shared with any other front end in this process.
    pub fn shared(cfg: &IdentityConfig) -> Result<Self> {
        let repo = shared_repository(cfg)
            .with_context(|| format!("opening player store {}", cfg.store_path.display()))?;
        Self::wire(repo, cfg)
    }

    fn wire(repo: Arc<PlayerRepository>, cfg: &IdentityConfig) -> Result<Self> {
        let notifier = notifier::from_config(&cfg.mail).context("configuring mail notifier")?;
        info!(
            target: "starport",
            "identity ready: store='{}', players={}, recovery_ttl_secs={}, mail={}",
            repo.path().display(),
            repo.len(),
            cfg.recovery_code_ttl_secs,
            if cfg.mail.api_url.is_some() { "http" } else { "log" }
        );
        Ok(Self::new(repo, notifier, Arc::new(SystemClock), cfg))
    }
}
