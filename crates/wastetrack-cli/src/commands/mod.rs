//! Subcommands and the console setup they share

pub mod query;
pub mod scope;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use wastetrack_core::backend::BackendClient;
use wastetrack_core::config::DeploymentConfig;
use wastetrack_core::model::{BackendKey, EstablishmentFilter};
use wastetrack_engine::{AuthOutcome, Console};
use wastetrack_store::seed::load_seed_file;

#[derive(Debug, Args)]
pub struct BackendArgs {
    /// Deployment TOML; the standard SST/HPL deployment when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// YAML seed for the primary backend (holds the signed-in session)
    #[arg(long, global = true)]
    pub primary_seed: Option<PathBuf>,

    /// YAML seed for the secondary backend
    #[arg(long, global = true)]
    pub secondary_seed: Option<PathBuf>,
}

impl BackendArgs {
    fn seed_for(&self, key: BackendKey) -> Option<&PathBuf> {
        match key {
            BackendKey::Primary => self.primary_seed.as_ref(),
            BackendKey::Secondary => self.secondary_seed.as_ref(),
        }
    }
}

/// Load the deployment, seed every backend and log in
///
/// `establishment` is applied as the administrator's filter after login.
pub async fn open_console(
    args: &BackendArgs,
    establishment: Option<&str>,
) -> Result<Console, Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => DeploymentConfig::from_file(path)?,
        None => DeploymentConfig::default(),
    };

    let mut clients: BTreeMap<BackendKey, Arc<dyn BackendClient>> = BTreeMap::new();
    for backend in &config.backends {
        let path = args
            .seed_for(backend.key)
            .ok_or_else(|| format!("--{}-seed is required", backend.key))?;
        let client = load_seed_file(&backend.display_name, path)?;
        clients.insert(backend.key, Arc::new(client));
    }

    let mut console = Console::from_clients(config, clients)?;
    if let AuthOutcome::LoginRequired(err) = console.login().await {
        return Err(format!("login required: {}", err).into());
    }

    if let Some(token) = establishment {
        console
            .change_establishment_filter(EstablishmentFilter::parse(token)?)
            .await?;
    }

    Ok(console)
}
