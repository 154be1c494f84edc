//! Error types for the search layer.
//!
//! Errors are organized by category: tenant resolution, input validation,
//! query translation, and backend failures. They flow between the backend
//! traits and the components built on them; the public search, mutation and
//! admin operations absorb them at their boundary and degrade to an empty,
//! zero or `false` result.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all backend-facing operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Tenant resolution errors
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Search operation errors
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to tenant resolution.
#[derive(Error, Debug)]
pub enum TenantError {
    /// The tenant id is blank and maps to no physical resource.
    #[error("tenant id is blank")]
    BlankTenant,

    /// The tenant id cannot be used as a physical resource name.
    #[error("invalid tenant '{tenant_id}': {reason}")]
    InvalidTenant { tenant_id: String, reason: String },
}

/// Errors related to input validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A required field was blank.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },

    /// The physical resource does not exist.
    #[error("resource not found: {name}")]
    ResourceNotFound { name: String },

    /// The physical resource already exists.
    #[error("resource already exists: {name}")]
    ResourceAlreadyExists { name: String },

    /// A source document could not be turned into an object.
    #[error("malformed document {id}: {message}")]
    MalformedDocument { id: String, message: String },
}

/// Errors related to search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Free-text query parsing failed.
    #[error("failed to parse search query '{query}': {message}")]
    QueryParseError { query: String, message: String },

    /// The native query uses a construct the backend does not evaluate.
    #[error("unsupported query construct: {construct}")]
    UnsupportedQuery { construct: String },

    /// The scroll cursor is unknown or expired.
    #[error("invalid scroll cursor: {scroll_id}")]
    InvalidScroll { scroll_id: String },
}

/// Errors originating from the index engine or the primary store.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BackendError {
    /// Creates an internal error for the named backend without a source.
    pub fn internal(backend_name: &str, message: impl Into<String>) -> Self {
        BackendError::Internal {
            backend_name: backend_name.to_string(),
            message: message.into(),
            source: None,
        }
    }
}

/// Result type alias for backend-facing operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for search operations.
pub type SearchResult<T> = Result<T, SearchError>;
