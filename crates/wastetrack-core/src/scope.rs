//! Scope resolution
//!
//! Pure function of the signed-in identity and the administrator's
//! establishment filter. Callers recompute after every change to either
//! input instead of caching across changes.

use crate::model::{EstablishmentFilter, Identity, ScopeContext};

/// Derive the query scope
///
/// Rules, in priority order:
/// 1. admin with a specific establishment filter: single, bound to the token
/// 2. admin otherwise: federated
/// 3. identity with an establishment: single, bound to it (filter ignored)
/// 4. anything else: single with no backend; an assignment step must run
///    before any data query
pub fn resolve_scope(identity: Option<&Identity>, filter: &EstablishmentFilter) -> ScopeContext {
    let Some(identity) = identity else {
        return ScopeContext::unassigned();
    };

    if identity.is_admin() {
        return match filter {
            EstablishmentFilter::Specific(token) => ScopeContext::single(
                token.backend(),
                Some(token.establishment_id().to_string()),
            ),
            EstablishmentFilter::All => ScopeContext::federated(),
        };
    }

    match identity.establishment() {
        Some(est) => ScopeContext::single(est.backend, Some(est.id.clone())),
        None => ScopeContext::unassigned(),
    }
}
