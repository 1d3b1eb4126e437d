//! Session propagation and identity resolution
//!
//! The primary backend issues the session; every secondary backend is handed
//! the same tokens. The identity is read from the primary's `profiles` table.
//!
//! Logging:
//! - `log_op_start!` at entry of each public operation
//! - `log_op_end!` on success
//! - `log_op_error!` on failure

use std::time::Instant;

use serde_json::Value;
use wastetrack_core::backend::{Predicate, SelectRequest};
use wastetrack_core::config::DeploymentConfig;
use wastetrack_core::errors::{Result, TrackError};
use wastetrack_core::model::{cell_text, BackendKey, EstablishmentRef, Identity, Row, Session};
use wastetrack_core::state::ViewState;
use wastetrack_core::{log_op_end, log_op_error, log_op_start};

use crate::registry::{BackendHandle, BackendRegistry};

const PROFILES_TABLE: &str = "profiles";
const ESTABLISHMENTS_TABLE: &str = "establishments";
const DEFAULT_ROLE: &str = "staff";

/// Result of an authentication check
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Authenticated(Identity),
    /// The caller must present the login surface
    LoginRequired(TrackError),
}

impl AuthOutcome {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthOutcome::Authenticated(identity) => Some(identity),
            AuthOutcome::LoginRequired(_) => None,
        }
    }
}

/// Read the primary session and mirror it onto every secondary backend
///
/// A secondary already holding the same access token is left alone.
///
/// # Errors
///
/// - `NoActiveSession` if the primary backend holds no session
/// - `CrossBackendAuthFailure` naming the first secondary that rejects it
pub async fn establish_session(registry: &BackendRegistry) -> Result<Session> {
    let start = Instant::now();
    log_op_start!("establish_session");

    let result = propagate_primary_session(registry).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => {
            log_op_end!("establish_session", duration_ms = duration_ms);
        }
        Err(err) => {
            log_op_error!("establish_session", err.clone(), duration_ms = duration_ms);
        }
    }
    result
}

async fn propagate_primary_session(registry: &BackendRegistry) -> Result<Session> {
    let primary = registry.primary();
    let session = match primary.client().current_session().await {
        Ok(Some(session)) => session,
        Ok(None) => return Err(TrackError::NoActiveSession),
        Err(err) => {
            tracing::warn!(
                backend = primary.display_name(),
                error = %err,
                "Could not read primary session"
            );
            return Err(TrackError::NoActiveSession);
        }
    };

    for handle in registry.secondaries() {
        let held = handle.client().current_session().await.ok().flatten();
        if held.is_some_and(|held| held.same_token(&session)) {
            tracing::debug!(backend = handle.display_name(), "Session already propagated");
            continue;
        }

        handle
            .client()
            .set_session(&session)
            .await
            .map_err(|err| TrackError::CrossBackendAuthFailure {
                backend: handle.display_name().to_string(),
                message: err.message().to_string(),
            })?;
    }

    Ok(session)
}

/// Resolve the identity for a session, creating a default profile on first login
///
/// The profile select is retried exactly once after the default profile is
/// inserted.
///
/// # Errors
///
/// - `ProfileCreationFailure` if the insert fails or the retry finds nothing
/// - `BackendQuery` if the first profile select fails
pub async fn load_identity(
    registry: &BackendRegistry,
    config: &DeploymentConfig,
    session: &Session,
) -> Result<Identity> {
    let start = Instant::now();
    log_op_start!("load_identity", user_id = session.user_id.as_str());

    let result = resolve_identity(registry, config, session).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(identity) => {
            log_op_end!(
                "load_identity",
                duration_ms = duration_ms,
                user_id = identity.user_id(),
                establishment_id = identity.establishment().map(|e| e.id.as_str()).unwrap_or("")
            );
        }
        Err(err) => {
            log_op_error!("load_identity", err.clone(), duration_ms = duration_ms);
        }
    }
    result
}

async fn resolve_identity(
    registry: &BackendRegistry,
    config: &DeploymentConfig,
    session: &Session,
) -> Result<Identity> {
    let primary = registry.primary();

    let profile = match fetch_profile(primary, &session.user_id).await? {
        Some(profile) => profile,
        None => {
            create_default_profile(primary, session).await?;
            fetch_profile(primary, &session.user_id)
                .await
                .map_err(|err| profile_creation_failure(session, err.to_string()))?
                .ok_or_else(|| {
                    profile_creation_failure(session, "profile still missing after creation")
                })?
        }
    };

    let raw_role = profile
        .get("role")
        .and_then(cell_text)
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());
    let email = profile
        .get("email")
        .and_then(cell_text)
        .unwrap_or_else(|| session.email.clone());
    let establishment = resolve_establishment(registry, config, &profile, &raw_role).await;

    Ok(Identity::new(
        session.user_id.clone(),
        email,
        raw_role,
        establishment,
    ))
}

async fn fetch_profile(primary: &BackendHandle, user_id: &str) -> Result<Option<Row>> {
    let request = SelectRequest::new(PROFILES_TABLE).filter(Predicate::eq("id", user_id));
    let rows = primary
        .client()
        .select(&request)
        .await
        .map_err(|err| TrackError::from_backend(primary.display_name(), PROFILES_TABLE, &err))?;
    Ok(rows.rows.into_iter().next())
}

async fn create_default_profile(primary: &BackendHandle, session: &Session) -> Result<()> {
    let mut profile = Row::new();
    profile.insert("id".to_string(), Value::from(session.user_id.as_str()));
    profile.insert("email".to_string(), Value::from(session.email.as_str()));
    profile.insert("role".to_string(), Value::from(DEFAULT_ROLE));

    primary
        .client()
        .insert(PROFILES_TABLE, vec![profile])
        .await
        .map_err(|err| profile_creation_failure(session, err.message()))?;

    tracing::info!(
        backend = primary.display_name(),
        user_id = session.user_id.as_str(),
        "Created default profile"
    );
    Ok(())
}

fn profile_creation_failure(session: &Session, message: impl Into<String>) -> TrackError {
    TrackError::ProfileCreationFailure {
        user_id: session.user_id.clone(),
        message: message.into(),
    }
}

/// Establishment assignment, most explicit source first
async fn resolve_establishment(
    registry: &BackendRegistry,
    config: &DeploymentConfig,
    profile: &Row,
    raw_role: &str,
) -> Option<EstablishmentRef> {
    let establishment_id = profile.get("establishment_id").and_then(cell_text);
    let establishment_backend = match profile
        .get("establishment_backend")
        .and_then(cell_text)
        .filter(|text| !text.trim().is_empty())
    {
        None => None,
        Some(text) => match BackendKey::parse(&text).filter(|key| registry.get(*key).is_some()) {
            Some(key) => Some(key),
            None => {
                // An explicit assignment is never reinterpreted
                tracing::warn!(
                    establishment_backend = text.as_str(),
                    "Profile names an unconfigured backend; establishment left unassigned"
                );
                return None;
            }
        },
    };

    match (establishment_backend, establishment_id) {
        (Some(backend), Some(id)) => Some(named_establishment(registry, config, backend, id).await),
        (Some(backend), None) => config.backend(backend).and_then(|b| b.sole_establishment_ref()),
        (None, Some(id)) => {
            Some(named_establishment(registry, config, BackendKey::Primary, id).await)
        }
        (None, None) => config
            .backends
            .iter()
            .find(|b| b.role_matches(raw_role))
            .and_then(|b| b.sole_establishment_ref()),
    }
}

/// Establishment reference with the best name available
async fn named_establishment(
    registry: &BackendRegistry,
    config: &DeploymentConfig,
    backend: BackendKey,
    id: String,
) -> EstablishmentRef {
    if let Some(handle) = registry.get(backend) {
        let request = SelectRequest::new(ESTABLISHMENTS_TABLE).filter(Predicate::eq("id", id.as_str()));
        match handle.client().select(&request).await {
            Ok(rows) => {
                if let Some(name) = rows.rows.first().and_then(|r| r.get("name")).and_then(cell_text) {
                    return EstablishmentRef::new(id, name, backend);
                }
            }
            Err(err) => tracing::debug!(
                backend = handle.display_name(),
                error = %err,
                "Establishment name unavailable"
            ),
        }
    }

    let sole_name = config
        .backend(backend)
        .and_then(|b| b.sole_establishment.as_ref())
        .filter(|sole| sole.id == id)
        .map(|sole| sole.name.clone());

    let name = sole_name.unwrap_or_else(|| id.clone());
    EstablishmentRef::new(id, name, backend)
}

/// Make sure a usable session and identity exist
///
/// On success the identity is written into the view state; a different user
/// than the stored one starts from a reset state. On any failure the view
/// state is reset so nothing from a previous user survives. Safe to call
/// repeatedly.
pub async fn require_authenticated(
    registry: &BackendRegistry,
    config: &DeploymentConfig,
    state: &mut ViewState,
) -> AuthOutcome {
    let result = match establish_session(registry).await {
        Ok(session) => load_identity(registry, config, &session).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(identity) => {
            let switched_user = state
                .identity()
                .is_some_and(|current| current.user_id() != identity.user_id());
            if switched_user {
                state.reset();
            }
            state.set_identity(identity.clone());
            AuthOutcome::Authenticated(identity)
        }
        Err(err) => {
            state.reset();
            AuthOutcome::LoginRequired(err)
        }
    }
}

/// Sign out of every backend and clear the view state
///
/// Backend failures are logged; local state is cleared regardless.
pub async fn sign_out(registry: &BackendRegistry, state: &mut ViewState) {
    let start = Instant::now();
    log_op_start!("sign_out");

    for handle in registry.iter() {
        if let Err(err) = handle.client().sign_out().await {
            tracing::warn!(
                backend = handle.display_name(),
                error = %err,
                "Sign-out failed"
            );
        }
    }
    state.reset();

    let duration_ms = start.elapsed().as_millis() as u64;
    log_op_end!("sign_out", duration_ms = duration_ms);
}
