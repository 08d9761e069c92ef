//! Workflow error taxonomy.
//!
//! Every fatal condition inside a provisioning run maps to one variant so the
//! workflow and its callers can branch on [`ErrorKind`] instead of message text.

/// Result alias used by the workflow and its collaborators.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Errors that abort a provisioning run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A lookup returned more than one candidate where at most one may exist.
    #[error("ambiguous match for {what}: {count} candidates")]
    AmbiguousMatch {
        /// The filter that produced several candidates.
        what: String,
        /// Number of candidates returned.
        count: usize,
    },

    /// A lookup that is not allowed to create returned nothing usable.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },

    /// The case store failed at transport or application level.
    #[error("{operation} failed: {message}")]
    RemoteCall {
        /// Remote operation name, e.g. `CaseService/GetCases`.
        operation: &'static str,
        /// Failure detail.
        message: String,
    },

    /// Uploading a rendered document failed.
    #[error("upload to document {document_number} failed: {message}")]
    Upload {
        /// Target document number.
        document_number: String,
        /// Failure detail.
        message: String,
    },

    /// A document template could not be rendered.
    #[error("render {template} failed: {message}")]
    Render {
        /// Template path as configured.
        template: String,
        /// Failure detail.
        message: String,
    },

    /// The outcome notification could not be published.
    #[error("publish notification failed: {message}")]
    Publish {
        /// Failure detail.
        message: String,
    },
}

/// Discriminant of [`WorkflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AmbiguousMatch,
    NotFound,
    RemoteCall,
    Upload,
    Render,
    Publish,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RemoteCall { .. } => ErrorKind::RemoteCall,
            Self::Upload { .. } => ErrorKind::Upload,
            Self::Render { .. } => ErrorKind::Render,
            Self::Publish { .. } => ErrorKind::Publish,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn remote(operation: &'static str, message: impl std::fmt::Display) -> Self {
        Self::RemoteCall {
            operation,
            message: message.to_string(),
        }
    }
}
