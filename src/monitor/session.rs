use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{Error, Result, FALLBACK_INTERVAL};
use crate::client::{self, ClusterClient, Connector, ProtocolError};
use crate::config::ClusterConfig;
use crate::protocol::messages::CONSUMER_PROTOCOL_TYPE;
use crate::state::ClusterState;

/// A live session with one cluster.
///
/// Refreshes metadata and offsets on independent schedules and writes the
/// results into the cluster's [`ClusterState`].
#[derive(Debug)]
pub struct ClusterFetcher<C> {
    config: ClusterConfig,
    client: C,
    state: Arc<ClusterState>,

    /// group -> subscribed topics, as of the last successful metadata refresh
    groups: BTreeMap<String, Vec<String>>,
}

impl<C> ClusterFetcher<C>
where
    C: ClusterClient,
{
    /// Opens a session through `connector`.
    pub async fn connect<K>(
        connector: &K,
        config: ClusterConfig,
        state: Arc<ClusterState>,
    ) -> Result<Self>
    where
        K: Connector<Client = C> + ?Sized,
    {
        let client = connector.connect(&config).await?;
        Ok(Self::new(config, client, state))
    }

    pub fn new(config: ClusterConfig, client: C, state: Arc<ClusterState>) -> Self {
        Self {
            config,
            client,
            state,
            groups: BTreeMap::new(),
        }
    }

    /// Consumer groups and the topics their members subscribed to.
    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    /// Refreshes until `token` is cancelled.
    ///
    /// Both refreshes are due right away. Failed cycles are retried after
    /// [`FALLBACK_INTERVAL`], successful ones after the configured interval.
    pub async fn run(mut self, token: CancellationToken) {
        let cluster = self.config.name.clone();

        let meta_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(meta_timer);
        let offset_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(offset_timer);

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    break;
                }
                _ = &mut meta_timer => {
                    let start = Instant::now();
                    let next = match self.refresh_metadata(&token).await {
                        Ok(()) => {
                            info!(
                                cluster = cluster.as_str(),
                                elapsed = ?start.elapsed(),
                                groups = self.groups.len(),
                                "Refreshed metadata",
                            );
                            self.config.meta_refresh
                        }
                        Err(Error::Cancelled) => break,
                        Err(e) => {
                            error!(cluster = cluster.as_str(), e = %e, "Error refreshing metadata");
                            FALLBACK_INTERVAL
                        }
                    };
                    meta_timer.as_mut().reset(Instant::now() + next);
                }
                _ = &mut offset_timer => {
                    let start = Instant::now();
                    let next = match self.refresh_offsets(&token).await {
                        Ok(()) => {
                            info!(
                                cluster = cluster.as_str(),
                                elapsed = ?start.elapsed(),
                                "Refreshed offsets",
                            );
                            self.config.offset_refresh
                        }
                        Err(Error::Cancelled) => break,
                        Err(e) => {
                            error!(cluster = cluster.as_str(), e = %e, "Error refreshing offsets");
                            FALLBACK_INTERVAL
                        }
                    };
                    offset_timer.as_mut().reset(Instant::now() + next);
                }
            }
        }

        info!(cluster = cluster.as_str(), "Session stopped");
    }

    /// Updates the broker list and rediscovers consumer groups with their topics.
    ///
    /// The group map is only replaced if every broker answered.
    pub async fn refresh_metadata(&mut self, token: &CancellationToken) -> Result<()> {
        let brokers = cancellable(token, self.client.brokers()).await?;
        self.state
            .update_brokers(brokers.iter().map(ToString::to_string));

        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for broker in &brokers {
            let consumers: Vec<String> = cancellable(token, self.client.list_groups(broker))
                .await?
                .into_iter()
                .filter(|g| g.protocol_type == CONSUMER_PROTOCOL_TYPE)
                .map(|g| g.group_id)
                .collect();
            if consumers.is_empty() {
                continue;
            }

            let described =
                cancellable(token, self.client.describe_groups(broker, consumers)).await?;
            for group in described {
                if let Some(protocol_error) = group.error {
                    return Err(Error::Group {
                        group: group.group_id,
                        protocol_error,
                    });
                }

                let topics = groups.entry(group.group_id.clone()).or_default();
                for member in &group.members {
                    let subscribed =
                        member
                            .subscribed_topics()
                            .map_err(|source| Error::MemberMetadata {
                                group: group.group_id.clone(),
                                member: member.member_id.clone(),
                                source,
                            })?;
                    topics.extend(subscribed);
                }
            }
        }

        self.groups = groups
            .into_iter()
            .map(|(group, topics)| (group, topics.into_iter().collect()))
            .collect();

        Ok(())
    }

    /// Updates high-water marks of every topic, then the committed offsets
    /// of every known group.
    pub async fn refresh_offsets(&self, token: &CancellationToken) -> Result<()> {
        for topic in cancellable(token, self.client.topics()).await? {
            let partitions = cancellable(token, self.client.partitions(&topic)).await?;

            let mut offsets = vec![0; vector_len(&partitions)];
            for &partition in &partitions {
                let Some(i) = index(partition) else {
                    continue;
                };
                offsets[i] =
                    cancellable(token, self.client.high_water_mark(&topic, partition)).await?;
            }

            self.state.update_topic(topic, offsets);
        }

        for (group, topics) in &self.groups {
            self.refresh_group_offsets(token, group, topics).await?;
        }

        Ok(())
    }

    async fn refresh_group_offsets(
        &self,
        token: &CancellationToken,
        group: &str,
        topics: &[String],
    ) -> Result<()> {
        let mut partitions = BTreeMap::new();
        for topic in topics {
            match cancellable(token, self.client.partitions(topic)).await {
                Ok(p) => {
                    partitions.insert(topic.clone(), p);
                }
                Err(Error::Client(e))
                    if e.protocol_error() == Some(ProtocolError::UnknownTopicOrPartition) =>
                {
                    debug!(
                        cluster = self.config.name.as_str(),
                        group,
                        topic = topic.as_str(),
                        "Skipping unknown topic"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        if partitions.is_empty() {
            return Ok(());
        }

        cancellable(token, self.client.refresh_coordinator(group)).await?;
        let coordinator = cancellable(token, self.client.coordinator(group)).await?;
        let fetched = cancellable(
            token,
            self.client
                .committed_offsets(&coordinator, group, &partitions),
        )
        .await?;
        let timestamp = Utc::now().timestamp();

        // check every partition before the first write
        let mut updates = Vec::with_capacity(fetched.len());
        for (topic, offsets) in fetched {
            let mut committed: Vec<i64> = Vec::new();
            for p in offsets {
                match p.error {
                    None => {}
                    Some(ProtocolError::UnknownTopicOrPartition) => continue,
                    Some(protocol_error) => {
                        return Err(Error::Partition {
                            group: group.to_string(),
                            topic,
                            partition: p.partition,
                            protocol_error,
                        });
                    }
                }

                // never committed
                if p.offset < 0 {
                    continue;
                }
                let Some(i) = index(p.partition) else {
                    continue;
                };
                if committed.len() <= i {
                    committed.resize(i + 1, 0);
                }
                committed[i] = p.offset;
            }
            updates.push((topic, committed));
        }

        for (topic, offsets) in updates {
            self.state
                .update_consumer_offsets(group, topic, timestamp, offsets);
        }

        Ok(())
    }
}

/// Runs `fut` unless `token` gets cancelled first.
async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = client::Result<T>>,
{
    tokio::select! {
        biased;

        _ = token.cancelled() => Err(Error::Cancelled),
        res = fut => Ok(res?),
    }
}

fn index(partition: i32) -> Option<usize> {
    usize::try_from(partition).ok()
}

/// Length of a partition-indexed vector holding all of `partitions`.
fn vector_len(partitions: &[i32]) -> usize {
    partitions
        .iter()
        .filter_map(|&p| index(p))
        .map(|i| i + 1)
        .max()
        .unwrap_or_default()
}
