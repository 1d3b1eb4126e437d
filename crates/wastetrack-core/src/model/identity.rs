//! Authenticated session and the identity derived from it

use wastetrack_core_types::Sensitive;

use crate::model::EstablishmentRef;

/// Session issued by the primary backend and mirrored onto the others
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: Sensitive<String>,
    pub refresh_token: Option<Sensitive<String>>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            access_token: Sensitive::new(access_token.into()),
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(Sensitive::new(token.into()));
        self
    }

    /// True when both sessions present the same access token
    pub fn same_token(&self, other: &Session) -> bool {
        self.access_token == other.access_token
    }
}

/// Role recorded on the user's profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
    /// Any other free-text role value
    Other(String),
}

impl Role {
    /// Parse a free-text role, case-insensitively
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "staff" => Role::Staff,
            _ => Role::Other(raw.trim().to_string()),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The signed-in user
///
/// Replaced wholesale on re-authentication; there are no setters.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    user_id: String,
    email: String,
    role: Role,
    raw_role: String,
    establishment: Option<EstablishmentRef>,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        raw_role: impl Into<String>,
        establishment: Option<EstablishmentRef>,
    ) -> Self {
        let raw_role = raw_role.into();
        Self {
            user_id: user_id.into(),
            email: email.into(),
            role: Role::parse(&raw_role),
            raw_role,
            establishment,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Role exactly as stored on the profile
    pub fn raw_role(&self) -> &str {
        &self.raw_role
    }

    pub fn establishment(&self) -> Option<&EstablishmentRef> {
        self.establishment.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackendKey;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Admin"), Role::Admin);
        assert_eq!(Role::parse(" staff "), Role::Staff);
        assert_eq!(Role::parse("staff_hpl"), Role::Other("staff_hpl".to_string()));
    }

    #[test]
    fn test_identity_derives_role() {
        let est = EstablishmentRef::new("7", "Norte", BackendKey::Primary);
        let identity = Identity::new("u1", "u1@example.org", "ADMIN", Some(est.clone()));
        assert!(identity.is_admin());
        assert_eq!(identity.raw_role(), "ADMIN");
        assert_eq!(identity.establishment(), Some(&est));
    }

    #[test]
    fn test_session_token_comparison_and_redaction() {
        let a = Session::new("u1", "u1@example.org", "tok-1");
        let b = Session::new("u1", "u1@example.org", "tok-1").with_refresh_token("r");
        assert!(a.same_token(&b));
        assert!(!format!("{:?}", b).contains("tok-1"));
    }
}
