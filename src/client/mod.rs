//! What the monitor needs to know about a cluster, and a Kafka implementation of it.

use std::collections::BTreeMap;
use std::future::Future;
use std::ops::ControlFlow;

use async_trait::async_trait;
use tracing::debug;

pub mod error;
mod kafka;

pub use crate::connection::Broker;
pub use error::{Error, ProtocolError, RequestContext, Result};
pub use kafka::{KafkaClient, KafkaConnector, DEFAULT_MAX_MESSAGE_SIZE};

use crate::backoff::{Backoff, BackoffConfig, ErrorOrThrottle};
use crate::config::ClusterConfig;
use crate::connection::{is_connection_broken, BrokerConnector};
use crate::protocol::messages::ConsumerGroupMemberMetadata;
use crate::protocol::traits::ReadError;

/// A group as listed by the broker coordinating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupListing {
    pub group_id: String,

    /// `consumer` for regular consumer groups, `connect` for Kafka Connect workers etc.
    pub protocol_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    pub group_id: String,

    /// Error reported for this group, if any.
    pub error: Option<ProtocolError>,

    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub member_id: String,
    pub client_id: String,
    pub client_host: String,

    /// Encoded subscription of the member.
    pub metadata: Vec<u8>,
}

impl GroupMember {
    /// Topics this member subscribed to.
    ///
    /// Members that have not joined yet carry no metadata and subscribe to nothing.
    pub fn subscribed_topics(&self) -> Result<Vec<String>, ReadError> {
        if self.metadata.is_empty() {
            return Ok(vec![]);
        }

        Ok(ConsumerGroupMemberMetadata::decode(&self.metadata)?.topics)
    }
}

/// Committed offset of one partition as reported by the group coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOffset {
    pub partition: i32,

    /// `-1` if the group never committed an offset for this partition.
    pub offset: i64,

    pub error: Option<ProtocolError>,
}

/// Queries a monitor session issues against one cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Refreshes cluster metadata and returns the live brokers.
    async fn brokers(&self) -> Result<Vec<Broker>>;

    /// Lists the groups coordinated by `broker`.
    async fn list_groups(&self, broker: &Broker) -> Result<Vec<GroupListing>>;

    /// Describes `groups`, all of which must be coordinated by `broker`.
    async fn describe_groups(
        &self,
        broker: &Broker,
        groups: Vec<String>,
    ) -> Result<Vec<GroupDescription>>;

    /// Refreshes cluster metadata and returns all non-internal topics.
    async fn topics(&self) -> Result<Vec<String>>;

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>>;

    /// Offset of the next message to be produced to a partition.
    async fn high_water_mark(&self, topic: &str, partition: i32) -> Result<i64>;

    /// Looks up the coordinator of `group` again, ignoring cached answers.
    async fn refresh_coordinator(&self, group: &str) -> Result<()>;

    async fn coordinator(&self, group: &str) -> Result<Broker>;

    /// Fetches the offsets `group` committed for the given partitions of each topic.
    async fn committed_offsets(
        &self,
        coordinator: &Broker,
        group: &str,
        partitions: &BTreeMap<String, Vec<i32>>,
    ) -> Result<BTreeMap<String, Vec<PartitionOffset>>>;
}

/// Opens [`ClusterClient`] sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Client: ClusterClient + 'static;

    async fn connect(&self, config: &ClusterConfig) -> Result<Self::Client>;
}

/// Error of a single attempt, with the broker whose connection should be
/// dropped if the error means it is broken.
type RetryError = ErrorOrThrottle<(Error, Option<i32>)>;

/// Retries `f` while it fails because of a broken connection.
///
/// Every other error is returned right away.
async fn maybe_retry<R, F, T>(
    backoff_config: &BackoffConfig,
    brokers: &BrokerConnector,
    request_name: &str,
    f: R,
) -> Result<T>
where
    R: (Fn() -> F) + Send + Sync,
    F: Future<Output = Result<T, RetryError>> + Send,
    T: Send,
{
    let mut backoff = Backoff::new(backoff_config);

    backoff
        .retry_with_backoff(request_name, || async {
            let (error, broker_id) = match f().await {
                Ok(v) => {
                    return ControlFlow::Break(Ok(v));
                }
                Err(ErrorOrThrottle::Throttle(throttle)) => {
                    return ControlFlow::Continue(ErrorOrThrottle::Throttle(throttle));
                }
                Err(ErrorOrThrottle::Error(e)) => e,
            };

            match &error {
                Error::Request(e) if is_connection_broken(e) => {
                    if let Some(broker_id) = broker_id {
                        brokers.invalidate(broker_id, "connection broken");
                    }
                }
                Error::Connection(_) => {}
                _ => {
                    debug!(e = %error, request_name, "request failed, not retrying");
                    return ControlFlow::Break(Err(error));
                }
            }

            ControlFlow::Continue(ErrorOrThrottle::Error(error))
        })
        .await?
}
