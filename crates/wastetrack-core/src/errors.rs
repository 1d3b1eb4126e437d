use thiserror::Error;

/// Result type alias using TrackError
pub type Result<T> = std::result::Result<T, TrackError>;

/// Result type for calls crossing the backend boundary
pub type BackendResult<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code usable for programmatic handling,
/// structured logs, and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation (client-side, raised before dispatch)
    InvalidInput,
    UnknownTable,
    InvalidEstablishmentToken,
    InvalidConfig,

    // Authentication
    NoActiveSession,
    CrossBackendAuthFailure,
    ProfileCreationFailure,
    Unauthorised,

    // Scope
    EstablishmentUnassigned,

    // Backend
    /// The backend has no such table or relation
    RelationNotFound,
    BackendQuery,
    Mutation,
    ExternalService,

    // Integration/IO
    Io,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::UnknownTable => "ERR_UNKNOWN_TABLE",
            ExErrorKind::InvalidEstablishmentToken => "ERR_INVALID_ESTABLISHMENT_TOKEN",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::NoActiveSession => "ERR_NO_ACTIVE_SESSION",
            ExErrorKind::CrossBackendAuthFailure => "ERR_CROSS_BACKEND_AUTH_FAILURE",
            ExErrorKind::ProfileCreationFailure => "ERR_PROFILE_CREATION_FAILURE",
            ExErrorKind::Unauthorised => "ERR_UNAUTHORISED",
            ExErrorKind::EstablishmentUnassigned => "ERR_ESTABLISHMENT_UNASSIGNED",
            ExErrorKind::RelationNotFound => "ERR_RELATION_NOT_FOUND",
            ExErrorKind::BackendQuery => "ERR_BACKEND_QUERY",
            ExErrorKind::Mutation => "ERR_MUTATION",
            ExErrorKind::ExternalService => "ERR_EXTERNAL_SERVICE",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Backend clients report failures as `ExError` values; the engine inspects
/// the kind (notably `RelationNotFound`) to decide whether a failure is fatal.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    backend: Option<String>,
    table: Option<String>,
    entity_id: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            backend: None,
            table: None,
            entity_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add backend context (display name or key)
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// True when the backend reported a missing table or relation
    pub fn is_relation_not_found(&self) -> bool {
        self.kind == ExErrorKind::RelationNotFound
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(backend) = &self.backend {
            write!(f, " (backend: {})", backend)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for WasteTrack operations
#[derive(Error, Debug, Clone)]
pub enum TrackError {
    // ===== Authentication =====
    /// The primary backend holds no active session
    #[error("No active session on the primary backend")]
    NoActiveSession,

    /// A secondary backend rejected the propagated session
    #[error("Backend {backend} rejected the propagated session: {message}")]
    CrossBackendAuthFailure { backend: String, message: String },

    /// The default profile could not be created for a first-time user
    #[error("Could not create profile for user {user_id}: {message}")]
    ProfileCreationFailure { user_id: String, message: String },

    // ===== Scope =====
    /// The identity has no establishment and no federated rights
    #[error("No establishment assigned to the current user")]
    EstablishmentUnassigned,

    // ===== Backend =====
    /// The backend has no such table or relation
    #[error("Relation not found on {backend}: {table}")]
    RelationNotFound { backend: String, table: String },

    /// A backend query failed
    #[error("Query on {table} failed in {backend}: {message}")]
    BackendQuery {
        backend: String,
        table: String,
        message: String,
    },

    /// An insert, update or delete failed
    #[error("Could not save {table} in {backend}: {message}")]
    Mutation {
        backend: String,
        table: String,
        message: String,
    },

    // ===== Validation =====
    /// Input rejected before any request was dispatched
    #[error("Invalid input: {reason}")]
    Validation { reason: String },

    /// Table has no descriptor in the registry
    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    /// Establishment composite token could not be parsed
    #[error("Invalid establishment token: {token}")]
    InvalidEstablishmentToken { token: String },

    /// Deployment configuration is inconsistent
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ===== Generic =====
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrackError {
    /// Classify a backend failure for `table` on the named backend
    pub fn from_backend(backend: &str, table: &str, err: &ExError) -> Self {
        if err.is_relation_not_found() {
            TrackError::RelationNotFound {
                backend: backend.to_string(),
                table: table.to_string(),
            }
        } else {
            TrackError::BackendQuery {
                backend: backend.to_string(),
                table: table.to_string(),
                message: err.message().to_string(),
            }
        }
    }

    /// Shorthand for a validation failure
    pub fn validation(reason: impl Into<String>) -> Self {
        TrackError::Validation {
            reason: reason.into(),
        }
    }

    /// True for errors that must send the user back to the login surface
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            TrackError::NoActiveSession
                | TrackError::CrossBackendAuthFailure { .. }
                | TrackError::ProfileCreationFailure { .. }
        )
    }
}

impl From<TrackError> for ExError {
    fn from(err: TrackError) -> Self {
        let message = err.to_string();
        match err {
            TrackError::NoActiveSession => {
                ExError::new(ExErrorKind::NoActiveSession).with_message(message)
            }
            TrackError::CrossBackendAuthFailure { backend, .. } => {
                ExError::new(ExErrorKind::CrossBackendAuthFailure)
                    .with_backend(backend)
                    .with_message(message)
            }
            TrackError::ProfileCreationFailure { user_id, .. } => {
                ExError::new(ExErrorKind::ProfileCreationFailure)
                    .with_entity_id(user_id)
                    .with_message(message)
            }
            TrackError::EstablishmentUnassigned => {
                ExError::new(ExErrorKind::EstablishmentUnassigned).with_message(message)
            }
            TrackError::RelationNotFound { backend, table } => {
                ExError::new(ExErrorKind::RelationNotFound)
                    .with_backend(backend)
                    .with_table(table)
                    .with_message(message)
            }
            TrackError::BackendQuery { backend, table, .. } => {
                ExError::new(ExErrorKind::BackendQuery)
                    .with_backend(backend)
                    .with_table(table)
                    .with_message(message)
            }
            TrackError::Mutation { backend, table, .. } => ExError::new(ExErrorKind::Mutation)
                .with_backend(backend)
                .with_table(table)
                .with_message(message),
            TrackError::Validation { .. } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(message)
            }
            TrackError::UnknownTable { table } => ExError::new(ExErrorKind::UnknownTable)
                .with_table(table)
                .with_message(message),
            TrackError::InvalidEstablishmentToken { token } => {
                ExError::new(ExErrorKind::InvalidEstablishmentToken)
                    .with_entity_id(token)
                    .with_message(message)
            }
            TrackError::InvalidConfig { .. } => {
                ExError::new(ExErrorKind::InvalidConfig).with_message(message)
            }
            TrackError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}
