//! Error types for profile-e2e

use thiserror::Error;

/// Result type alias using the profile Error
pub type Result<T> = std::result::Result<T, Error>;

/// Domain and store errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    /// Duplicate name; carries the server detail text verbatim
    #[error("{detail}")]
    Conflict { name: String, detail: String },

    #[error("{0}")]
    LastProfile(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    pub fn conflict(name: &str) -> Self {
        Error::Conflict {
            name: name.to_string(),
            detail: crate::conflict_detail(name),
        }
    }

    pub fn last_profile() -> Self {
        Error::LastProfile(crate::LAST_PROFILE_DETAIL.to_string())
    }

    /// HTTP status a control API answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Conflict { .. } | Error::LastProfile(_) => 409,
            Error::InvalidInput(_) => 422,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detail_is_verbatim_server_text() {
        let err = Error::conflict("Marketing");
        assert_eq!(err.to_string(), "Profile with name 'Marketing' already exists");
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_last_profile_maps_to_conflict_status() {
        let err = Error::last_profile();
        assert_eq!(err.to_string(), "Cannot delete the last profile");
        assert_eq!(err.status_code(), 409);
        assert_eq!(Error::not_found("profile", 7).status_code(), 404);
    }
}
