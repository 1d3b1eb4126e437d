//! Scope command
//!
//! Usage: wastetrack --primary-seed <PATH> --secondary-seed <PATH> scope [--establishment TOKEN]

use clap::Args;
use wastetrack_core::model::LookupKind;

use super::{open_console, BackendArgs};

#[derive(Debug, Args)]
pub struct ScopeArgs {
    /// Establishment filter token (`primary-7`) or `all`; administrators only
    #[arg(long)]
    pub establishment: Option<String>,
}

pub async fn execute(backends: &BackendArgs, args: ScopeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let console = open_console(backends, args.establishment.as_deref()).await?;
    let state = console.state();

    if let Some(identity) = state.identity() {
        println!("user:          {} <{}>", identity.user_id(), identity.email());
        println!("role:          {}", identity.raw_role());
        match identity.establishment() {
            Some(est) => println!("establishment: {} ({}, {})", est.name, est.token(), est.backend),
            None => println!("establishment: none"),
        }
    }

    let scope = state.scope();
    println!("scope:         {}", scope.mode);
    if let Some(backend) = scope.backend {
        let name = console
            .registry()
            .get(backend)
            .map(|h| h.display_name())
            .unwrap_or_default();
        println!("backend:       {} ({})", backend, name);
    }
    if let Some(id) = &scope.establishment_id {
        println!("bound to:      {}", id);
    }
    if scope.needs_assignment() {
        println!("assignment required before data can be listed");
    }

    for kind in LookupKind::ALL {
        println!("{:<14} {} cached", format!("{}:", kind), state.lookup_records(kind).len());
    }

    Ok(())
}
