//! Polls clusters and writes what it finds into [`State`](crate::state::State).

use std::time::Duration;

use thiserror::Error;

use crate::client::{self, ProtocolError};
use crate::protocol::traits::ReadError;

mod session;
mod supervisor;

pub use session::ClusterFetcher;
pub use supervisor::Monitor;

/// Delay before a failed refresh cycle is tried again.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Client error: {0}")]
    Client(#[from] client::Error),

    #[error("Group {group} reported {protocol_error:?}")]
    Group {
        group: String,
        protocol_error: ProtocolError,
    },

    #[error("Group {group} reported {protocol_error:?} for partition {partition} of topic {topic}")]
    Partition {
        group: String,
        topic: String,
        partition: i32,
        protocol_error: ProtocolError,
    },

    #[error("Cannot decode metadata of member {member} in group {group}: {source}")]
    MemberMetadata {
        group: String,
        member: String,
        source: ReadError,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("List of monitored clusters cannot be empty")]
    NoClusters,

    #[error("Cluster {0} is configured more than once")]
    DuplicateCluster(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
