use thiserror::Error;

pub const DOMAIN_RESTRICTED_MSG: &str =
    "Please use your official Iqra University email address (@iqra.edu.pk or @student.iqra.edu.pk)";

/// Everything the gateways can surface to the presentation layer.
#[derive(Error, Debug)]
pub enum CarpoolError {
    /// Sign-up email outside the university domains; raised before any request is made.
    #[error("{}", DOMAIN_RESTRICTED_MSG)]
    DomainRestricted,

    /// Rejected by the auth provider (bad credentials, duplicate account, ...).
    #[error("{0}")]
    Auth(String),

    /// Rejected by the data store.
    #[error("{message}")]
    Store { code: Option<String>, message: String },

    #[error("You must be logged in")]
    NotSignedIn,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CarpoolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CarpoolError>;
