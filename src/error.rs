use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found")]
    NotFound,

    // Same message for unknown-username and wrong-password; callers must
    // not be able to enumerate accounts.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication is disabled")]
    AuthDisabled,

    #[error("username already exists")]
    DuplicateUsername,

    #[error("system account role cannot be changed")]
    SystemUserProtected,

    #[error("deletion blocked: {0}")]
    DeletionBlocked(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("archive malformed: {0}")]
    ArchiveMalformed(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => Error::Io(io),
            other => Error::Validation(format!("csv error: {other:?}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
