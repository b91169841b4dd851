use thiserror::Error;

/// Failure taxonomy shared by every stage of a batch.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure or non-2xx status from the report API.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed or missing report, job or strip data.
    #[error("data error: {0}")]
    Data(String),

    /// A portal element or option was absent or not interactable.
    #[error("automation error: {0}")]
    Automation(String),

    #[error("database error: {0}")]
    Database(String),

    /// Soft failure: the weights are saved, only the final submission failed.
    #[error("identifier submission failed: {0}")]
    IdentifierSubmission(String),

    /// Top-level precondition; nothing has been attempted yet.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("another batch operation is already running")]
    Busy,

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub fn automation(msg: impl Into<String>) -> Self {
        Error::Automation(msg.into())
    }

    /// Short stable label used in outcomes and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Network(_) => "network",
            Error::Data(_) => "data",
            Error::Automation(_) => "automation",
            Error::Database(_) => "database",
            Error::IdentifierSubmission(_) => "identifier_submission",
            Error::Precondition(_) => "precondition",
            Error::Busy => "busy",
            Error::Config(_) => "config",
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => Error::Network(format!("http status {code}")),
            ureq::Error::Transport(transport) => {
                Error::Network(format!("transport ({:?}): {transport}", transport.kind()))
            }
        }
    }
}
