use thiserror::Error;

pub use crate::messenger::RequestError;
pub use crate::protocol::error::Error as ProtocolError;

use crate::backoff::BackoffError;

/// What a failed request was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// A request for a specific topic.
    Topic(String),

    /// A request for a specific topic and partition.
    Partition(String, i32),

    /// A request concerning a consumer group.
    Group(String),

    /// A request to a specific broker.
    Broker(i32),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] crate::connection::Error),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Broker {0} is not part of the cluster metadata")]
    UnknownBroker(i32),

    #[error(
        "Server error {protocol_error:?} with message \"{}\" for {request:?}",
        message_or_empty(.error_message)
    )]
    ServerError {
        protocol_error: ProtocolError,
        error_message: Option<String>,
        request: RequestContext,
    },

    #[error("All retries failed: {0}")]
    RetryFailed(#[from] BackoffError),
}

impl Error {
    pub(crate) fn server(protocol_error: ProtocolError, request: RequestContext) -> Self {
        Self::ServerError {
            protocol_error,
            error_message: None,
            request,
        }
    }

    /// The broker error code behind this error, if any.
    pub fn protocol_error(&self) -> Option<ProtocolError> {
        match self {
            Self::ServerError { protocol_error, .. } => Some(*protocol_error),
            _ => None,
        }
    }
}

fn message_or_empty(message: &Option<String>) -> &str {
    message.as_deref().unwrap_or_default()
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
