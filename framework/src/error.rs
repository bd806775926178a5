use crate::jobs::JobError;

/// Errors raised while building, resolving or delivering mail.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mailer [{0}] is not defined.")]
    MailerNotDefined(String),

    #[error("The mail transport must be specified.")]
    TransportNotSpecified,

    #[error("Unsupported mail transport [{0}].")]
    UnsupportedTransport(String),

    #[error("invalid {transport} transport options: {message}")]
    InvalidOptions {
        transport: String,
        message: String,
    },

    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("sendmail error: {0}")]
    Sendmail(#[from] lettre::transport::sendmail::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} rejected the message ({status}): {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("view [{view}] could not be rendered: {message}")]
    View { view: String, message: String },

    #[error("no view renderer configured for [{0}]")]
    NoViewRenderer(String),

    #[error("storage disk [{0}] is not defined")]
    DiskNotDefined(String),

    #[error("queue error: {0}")]
    Queue(#[from] JobError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MailError {
    pub(crate) fn options(transport: &str, err: impl std::fmt::Display) -> Self {
        MailError::InvalidOptions {
            transport: transport.to_string(),
            message: err.to_string(),
        }
    }
}
