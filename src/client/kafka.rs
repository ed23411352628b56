use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{
    maybe_retry, Broker, ClusterClient, Connector, Error, GroupDescription, GroupListing,
    GroupMember, PartitionOffset, ProtocolError, RequestContext, Result,
};
use crate::backoff::{BackoffConfig, ErrorOrThrottle};
use crate::build_info::DEFAULT_CLIENT_ID;
use crate::config::ClusterConfig;
use crate::connection::{BrokerConnection, BrokerConnector};
use crate::protocol::messages::{
    CoordinatorType, DescribeGroupsRequest, FindCoordinatorRequest, ListGroupsRequest,
    ListOffsetsRequest, ListOffsetsRequestPartition, ListOffsetsRequestTopic, ListOffsetsResponse,
    OffsetFetchRequest, OffsetFetchRequestTopic, OffsetFetchResponse, LATEST_TIMESTAMP,
};
use crate::throttle::respect_throttle;
use crate::topic::Topic;

/// Frames larger than this are rejected instead of being buffered.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Requests give up on broken connections after a few seconds, the next
/// refresh cycle tries again anyway.
fn default_backoff_config() -> BackoffConfig {
    BackoffConfig {
        init_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
        base: 2.,
        deadline: Some(Duration::from_secs(5)),
    }
}

/// Opens [`KafkaClient`]s.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    client_id: Arc<str>,
    max_message_size: usize,
    connect_timeout: Option<Duration>,
    backoff_config: BackoffConfig,
}

impl Default for KafkaConnector {
    fn default() -> Self {
        Self {
            client_id: Arc::from(DEFAULT_CLIENT_ID),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout: None,
            backoff_config: default_backoff_config(),
        }
    }
}

impl KafkaConnector {
    /// Client ID sent with every request.
    pub fn client_id(mut self, client_id: impl Into<Arc<str>>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Maximum size of a single response frame.
    pub fn max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    /// Retry policy for requests that fail on broken connections.
    pub fn backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = backoff_config;
        self
    }
}

#[async_trait]
impl Connector for KafkaConnector {
    type Client = KafkaClient;

    async fn connect(&self, config: &ClusterConfig) -> Result<KafkaClient> {
        let mut brokers = BrokerConnector::new(
            config.brokers.clone(),
            Arc::clone(&self.client_id),
            self.max_message_size,
        );
        if let Some(connect_timeout) = self.connect_timeout {
            brokers = brokers.with_connect_timeout(connect_timeout);
        }

        let client = KafkaClient {
            brokers: Arc::new(brokers),
            backoff_config: self.backoff_config.clone(),
            topics: RwLock::new(BTreeMap::new()),
            coordinators: RwLock::new(HashMap::new()),
        };

        client.refresh_metadata(None).await?;
        info!(
            cluster = config.name.as_str(),
            brokers = client.brokers.topology.get_brokers().len(),
            "Connected to cluster",
        );

        Ok(client)
    }
}

/// [`ClusterClient`] speaking the Kafka protocol.
#[derive(Debug)]
pub struct KafkaClient {
    brokers: Arc<BrokerConnector>,

    backoff_config: BackoffConfig,

    /// Topics as of the last metadata response mentioning them.
    topics: RwLock<BTreeMap<String, Topic>>,

    /// Group coordinators keyed by group ID.
    coordinators: RwLock<HashMap<String, Broker>>,
}

impl KafkaClient {
    /// Requests metadata and updates the topic cache.
    ///
    /// `None` refreshes all topics and drops the ones that are gone.
    async fn refresh_metadata(&self, topics: Option<Vec<String>>) -> Result<()> {
        let topics = &topics;
        let response = maybe_retry(&self.backoff_config, &self.brokers, "metadata", || async move {
            self.brokers
                .request_metadata(topics.clone())
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), None)))
        })
        .await?;

        respect_throttle(response.throttle_time_ms, "metadata").await;

        let mut cache = self.topics.write();
        if topics.is_none() {
            cache.clear();
        }
        for topic in response.topics {
            cache.insert(topic.name.clone(), Topic::from(topic));
        }

        Ok(())
    }

    /// Cached metadata of `name`, fetched if unknown.
    async fn topic(&self, name: &str) -> Result<Topic> {
        let cached = self.topics.read().get(name).cloned();
        let topic = match cached {
            Some(topic) => topic,
            None => {
                self.refresh_metadata(Some(vec![name.to_string()])).await?;
                let fetched = self.topics.read().get(name).cloned();
                fetched.ok_or_else(|| {
                    Error::InvalidResponse(format!("Metadata response is missing topic {name}"))
                })?
            }
        };

        if let Some(protocol_error) = topic.error {
            self.topics.write().remove(name);
            return Err(Error::server(
                protocol_error,
                RequestContext::Topic(name.to_string()),
            ));
        }

        Ok(topic)
    }

    async fn leader(&self, topic: &str, partition: i32) -> Result<i32> {
        let context = || RequestContext::Partition(topic.to_string(), partition);

        let mut metadata = self.topic(topic).await?;
        let Some(p) = metadata.partitions.remove(&partition) else {
            return Err(Error::server(ProtocolError::UnknownTopicOrPartition, context()));
        };

        if p.leader_id < 0 {
            self.topics.write().remove(topic);
            return Err(Error::server(
                p.error.unwrap_or(ProtocolError::LeaderNotAvailable),
                context(),
            ));
        }

        Ok(p.leader_id)
    }

    async fn connection(&self, broker_id: i32) -> Result<BrokerConnection> {
        self.brokers
            .connect(broker_id)
            .await?
            .ok_or(Error::UnknownBroker(broker_id))
    }

    /// Any broker will do, preferring the lowest ID.
    async fn any_broker(&self) -> Result<i32> {
        if let Some(broker) = self.brokers.topology.get_brokers().first() {
            return Ok(broker.id);
        }

        self.refresh_metadata(None).await?;
        self.brokers
            .topology
            .get_brokers()
            .first()
            .map(|b| b.id)
            .ok_or_else(|| Error::InvalidResponse("Metadata response lists no brokers".to_string()))
    }
}

#[async_trait]
impl ClusterClient for KafkaClient {
    async fn brokers(&self) -> Result<Vec<Broker>> {
        self.refresh_metadata(None).await?;
        Ok(self.brokers.topology.get_brokers())
    }

    async fn list_groups(&self, broker: &Broker) -> Result<Vec<GroupListing>> {
        let broker_id = broker.id;

        maybe_retry(&self.backoff_config, &self.brokers, "list_groups", || async move {
            let conn = self
                .connection(broker_id)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = conn
                .request(ListGroupsRequest)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(broker_id))))?;

            respect_throttle(response.throttle_time_ms, "list_groups").await;

            if let Some(protocol_error) = response.error_code {
                return Err(ErrorOrThrottle::Error((
                    Error::server(protocol_error, RequestContext::Broker(broker_id)),
                    Some(broker_id),
                )));
            }

            Ok(response
                .groups
                .into_iter()
                .map(|g| GroupListing {
                    group_id: g.group_id,
                    protocol_type: g.protocol_type,
                })
                .collect())
        })
        .await
    }

    async fn describe_groups(
        &self,
        broker: &Broker,
        groups: Vec<String>,
    ) -> Result<Vec<GroupDescription>> {
        if groups.is_empty() {
            return Ok(vec![]);
        }

        let broker_id = broker.id;
        let request = &DescribeGroupsRequest {
            groups,
            include_authorized_operations: false,
        };

        maybe_retry(&self.backoff_config, &self.brokers, "describe_groups", || async move {
            let conn = self
                .connection(broker_id)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = conn
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(broker_id))))?;

            respect_throttle(response.throttle_time_ms, "describe_groups").await;

            Ok(response
                .groups
                .into_iter()
                .map(|g| GroupDescription {
                    group_id: g.group_id,
                    error: g.error_code,
                    members: g
                        .members
                        .into_iter()
                        .map(|m| GroupMember {
                            member_id: m.member_id,
                            client_id: m.client_id,
                            client_host: m.client_host,
                            metadata: m.member_metadata,
                        })
                        .collect(),
                })
                .collect())
        })
        .await
    }

    async fn topics(&self) -> Result<Vec<String>> {
        self.refresh_metadata(None).await?;

        // BTreeMap keys are already sorted
        Ok(self
            .topics
            .read()
            .values()
            .filter(|t| !t.is_internal && t.error.is_none())
            .map(|t| t.name.clone())
            .collect())
    }

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        Ok(self.topic(topic).await?.partitions.into_keys().collect())
    }

    async fn high_water_mark(&self, topic: &str, partition: i32) -> Result<i64> {
        let leader = self.leader(topic, partition).await?;
        let request = &ListOffsetsRequest {
            replica_id: -1,
            isolation_level: None,
            topics: vec![ListOffsetsRequestTopic {
                name: topic.to_string(),
                partitions: vec![ListOffsetsRequestPartition {
                    partition_index: partition,
                    timestamp: LATEST_TIMESTAMP,
                }],
            }],
        };

        let result = maybe_retry(&self.backoff_config, &self.brokers, "list_offsets", || async move {
            let conn = self
                .connection(leader)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = conn
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(leader))))?;

            respect_throttle(response.throttle_time_ms, "list_offsets").await;

            high_water_mark_from(response, topic, partition)
                .map_err(|e| ErrorOrThrottle::Error((e, Some(leader))))
        })
        .await;

        if let Err(e) = &result {
            if matches!(
                e.protocol_error(),
                Some(
                    ProtocolError::NotLeaderOrFollower
                        | ProtocolError::LeaderNotAvailable
                        | ProtocolError::UnknownTopicOrPartition
                )
            ) {
                debug!(topic, partition, e = %e, "Dropping cached topic metadata");
                self.topics.write().remove(topic);
            }
        }

        result
    }

    async fn refresh_coordinator(&self, group: &str) -> Result<()> {
        let broker_id = self.any_broker().await?;
        let request = &FindCoordinatorRequest {
            key: group.to_string(),
            key_type: CoordinatorType::Group,
        };

        let coordinator = maybe_retry(&self.backoff_config, &self.brokers, "find_coordinator", || async move {
            let conn = self
                .connection(broker_id)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = conn
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(broker_id))))?;

            respect_throttle(response.throttle_time_ms, "find_coordinator").await;

            if let Some(protocol_error) = response.error_code {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: response.error_message,
                        request: RequestContext::Group(group.to_string()),
                    },
                    Some(broker_id),
                )));
            }

            Ok(Broker {
                id: response.node_id,
                host: response.host,
                port: response.port,
            })
        })
        .await?;

        debug!(group, coordinator = %coordinator, "Found group coordinator");
        self.coordinators
            .write()
            .insert(group.to_string(), coordinator);

        Ok(())
    }

    async fn coordinator(&self, group: &str) -> Result<Broker> {
        let cached = self.coordinators.read().get(group).cloned();
        if let Some(broker) = cached {
            return Ok(broker);
        }

        self.refresh_coordinator(group).await?;
        let coordinator = self.coordinators.read().get(group).cloned();
        coordinator.ok_or_else(|| {
            Error::InvalidResponse(format!("No coordinator recorded for group {group}"))
        })
    }

    async fn committed_offsets(
        &self,
        coordinator: &Broker,
        group: &str,
        partitions: &BTreeMap<String, Vec<i32>>,
    ) -> Result<BTreeMap<String, Vec<PartitionOffset>>> {
        if partitions.is_empty() {
            return Ok(BTreeMap::new());
        }

        let broker_id = coordinator.id;
        let request = &OffsetFetchRequest {
            group_id: group.to_string(),
            topics: Some(
                partitions
                    .iter()
                    .map(|(name, partition_indexes)| OffsetFetchRequestTopic {
                        name: name.clone(),
                        partition_indexes: partition_indexes.clone(),
                    })
                    .collect(),
            ),
        };

        let result = maybe_retry(&self.backoff_config, &self.brokers, "offset_fetch", || async move {
            let conn = self
                .connection(broker_id)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = conn
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(broker_id))))?;

            respect_throttle(response.throttle_time_ms, "offset_fetch").await;

            committed_offsets_from(response, group)
                .map_err(|e| ErrorOrThrottle::Error((e, Some(broker_id))))
        })
        .await;

        if let Err(e) = &result {
            if matches!(
                e.protocol_error(),
                Some(
                    ProtocolError::NotCoordinator
                        | ProtocolError::CoordinatorNotAvailable
                        | ProtocolError::CoordinatorLoadInProgress
                )
            ) {
                debug!(group, e = %e, "Dropping cached group coordinator");
                self.coordinators.write().remove(group);
            }
        }

        result
    }
}

fn high_water_mark_from(response: ListOffsetsResponse, topic: &str, partition: i32) -> Result<i64> {
    let found = response
        .topics
        .into_iter()
        .filter(|t| t.name == topic)
        .flat_map(|t| t.partitions)
        .find(|p| p.partition_index == partition);

    let Some(p) = found else {
        return Err(Error::InvalidResponse(format!(
            "ListOffsets response is missing partition {partition} of topic {topic}"
        )));
    };

    match p.error_code {
        Some(protocol_error) => Err(Error::server(
            protocol_error,
            RequestContext::Partition(topic.to_string(), partition),
        )),
        None => Ok(p.offset),
    }
}

fn committed_offsets_from(
    response: OffsetFetchResponse,
    group: &str,
) -> Result<BTreeMap<String, Vec<PartitionOffset>>> {
    if let Some(protocol_error) = response.error_code {
        return Err(Error::server(
            protocol_error,
            RequestContext::Group(group.to_string()),
        ));
    }

    Ok(response
        .topics
        .into_iter()
        .map(|t| {
            let offsets = t
                .partitions
                .into_iter()
                .map(|p| PartitionOffset {
                    partition: p.partition_index,
                    offset: p.committed_offset,
                    error: p.error_code,
                })
                .collect();
            (t.name, offsets)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::protocol::messages::{
        ListOffsetsResponsePartition, ListOffsetsResponseTopic, OffsetFetchResponseTopic,
        OffsetFetchResponseTopicPartition,
    };

    fn list_offsets_response(error_code: Option<ProtocolError>) -> ListOffsetsResponse {
        ListOffsetsResponse {
            throttle_time_ms: None,
            topics: vec![ListOffsetsResponseTopic {
                name: "one-topic".to_string(),
                partitions: vec![
                    ListOffsetsResponsePartition {
                        partition_index: 0,
                        error_code: None,
                        timestamp: -1,
                        offset: 2345,
                    },
                    ListOffsetsResponsePartition {
                        partition_index: 1,
                        error_code,
                        timestamp: -1,
                        offset: 6789,
                    },
                ],
            }],
        }
    }

    #[test]
    fn high_water_mark() {
        assert_eq!(
            high_water_mark_from(list_offsets_response(None), "one-topic", 1).unwrap(),
            6789
        );
    }

    #[test]
    fn high_water_mark_partition_error() {
        let err = high_water_mark_from(
            list_offsets_response(Some(ProtocolError::NotLeaderOrFollower)),
            "one-topic",
            1,
        )
        .unwrap_err();

        assert_matches!(
            err,
            Error::ServerError {
                protocol_error: ProtocolError::NotLeaderOrFollower,
                request: RequestContext::Partition(topic, 1),
                ..
            } if topic == "one-topic"
        );
    }

    #[test]
    fn high_water_mark_missing_partition() {
        let err = high_water_mark_from(list_offsets_response(None), "one-topic", 7).unwrap_err();
        assert_matches!(err, Error::InvalidResponse(_));

        let err = high_water_mark_from(list_offsets_response(None), "other", 0).unwrap_err();
        assert_matches!(err, Error::InvalidResponse(_));
    }

    #[test]
    fn committed_offsets() {
        let response = OffsetFetchResponse {
            throttle_time_ms: Some(0),
            topics: vec![OffsetFetchResponseTopic {
                name: "one-topic".to_string(),
                partitions: vec![
                    OffsetFetchResponseTopicPartition {
                        partition_index: 0,
                        committed_offset: 125,
                        committed_leader_epoch: None,
                        metadata: Some(String::new()),
                        error_code: None,
                    },
                    OffsetFetchResponseTopicPartition {
                        partition_index: 1,
                        committed_offset: -1,
                        committed_leader_epoch: None,
                        metadata: None,
                        error_code: Some(ProtocolError::UnknownTopicOrPartition),
                    },
                ],
            }],
            error_code: None,
        };

        let offsets = committed_offsets_from(response, "csmx").unwrap();
        assert_eq!(
            offsets["one-topic"],
            vec![
                PartitionOffset {
                    partition: 0,
                    offset: 125,
                    error: None,
                },
                PartitionOffset {
                    partition: 1,
                    offset: -1,
                    error: Some(ProtocolError::UnknownTopicOrPartition),
                },
            ]
        );
    }

    #[test]
    fn committed_offsets_group_error() {
        let response = OffsetFetchResponse {
            throttle_time_ms: Some(0),
            topics: vec![],
            error_code: Some(ProtocolError::NotCoordinator),
        };

        let err = committed_offsets_from(response, "csmx").unwrap_err();
        assert_eq!(err.protocol_error(), Some(ProtocolError::NotCoordinator));
    }
}
