use thiserror::Error;

/// Main error type for shade operations
#[derive(Debug, Error)]
pub enum ShadeError {
    /// Expected repository metadata is missing. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A requested path resolved outside the live directory
    #[error("path security violation: {0}")]
    PathSecurity(String),

    /// Commit, rollback, restore or truncation failed inside the commit store
    #[error("version control error: {0}")]
    Vcs(String),

    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// Transaction misuse or a failed transaction apply
    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShadeError {
    /// Get the error code for JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            ShadeError::Configuration(_) => "configuration_error",
            ShadeError::PathSecurity(_) => "path_security",
            ShadeError::Vcs(_) => "vcs_error",
            ShadeError::NotInitialized(_) => "not_initialized",
            ShadeError::Transaction(_) => "transaction_error",
            ShadeError::NotFound(_) => "not_found",
            ShadeError::InvalidArgs(_) => "invalid_args",
            ShadeError::Io(_) => "io_error",
            ShadeError::Json(_) => "internal_error",
            ShadeError::TomlParse(_) => "invalid_args",
            ShadeError::TomlSerialize(_) => "internal_error",
            ShadeError::Internal(_) => "internal_error",
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            ShadeError::InvalidArgs(_) | ShadeError::TomlParse(_) => 2,
            ShadeError::NotFound(_) => 3,
            ShadeError::PathSecurity(_) => 4,
            ShadeError::Transaction(_) => 5,
            ShadeError::Vcs(_) | ShadeError::Io(_) => 6,
            ShadeError::NotInitialized(_) | ShadeError::Configuration(_) => 7,
            _ => 1,
        }
    }

    /// Get actionable suggestions for fixing the error
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            ShadeError::NotInitialized(_) => vec!["Run 'shade init' to create the shadow repository"],
            ShadeError::Configuration(_) => vec![
                "Check that the shadow directory still contains its .git metadata",
                "Delete the shadow directory and run 'shade init' to start over",
            ],
            ShadeError::PathSecurity(_) => {
                vec!["Use paths relative to the live directory without '..' segments"]
            }
            ShadeError::NotFound(msg) if msg.contains("ransaction") => {
                vec!["Run 'shade tx list' to see known transactions"]
            }
            ShadeError::Vcs(_) => vec!["Run 'shade log' to check the available commits"],
            _ => vec![],
        }
    }

    /// Create a NotFound error for a transaction id
    pub fn transaction_not_found(transaction_id: &str) -> Self {
        ShadeError::NotFound(format!("Transaction not found: {}", transaction_id))
    }
}
