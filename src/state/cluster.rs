use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use serde::Serialize;

use crate::lag::{self, ConsumerOffset};

/// Lag of one group on one topic, assembled at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerTopic {
    pub topic: String,

    /// Unix seconds at which the offsets were fetched.
    pub timestamp: i64,

    pub offsets: Vec<ConsumerOffset>,
}

#[derive(Debug, Clone)]
struct ConsumerOffsetRecord {
    offsets: Vec<i64>,
    timestamp: i64,
}

#[derive(Debug, Default)]
struct Inner {
    brokers: BTreeSet<String>,

    /// High-water marks indexed by partition.
    topics: BTreeMap<String, Vec<i64>>,

    /// group -> topic -> committed offsets
    consumers: BTreeMap<String, BTreeMap<String, ConsumerOffsetRecord>>,
}

/// Everything known about one cluster.
///
/// Writers replace whole records, readers get copies.
#[derive(Debug, Default)]
pub struct ClusterState {
    inner: RwLock<Inner>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker addresses, sorted.
    pub fn brokers(&self) -> Vec<String> {
        self.inner.read().brokers.iter().cloned().collect()
    }

    pub fn update_brokers<I>(&self, addrs: I)
    where
        I: IntoIterator<Item = String>,
    {
        let brokers = addrs.into_iter().collect();
        self.inner.write().brokers = brokers;
    }

    /// Topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.inner.read().topics.keys().cloned().collect()
    }

    pub fn topic_offsets(&self, topic: &str) -> Option<Vec<i64>> {
        self.inner.read().topics.get(topic).cloned()
    }

    pub fn update_topic(&self, topic: impl Into<String>, offsets: Vec<i64>) {
        self.inner.write().topics.insert(topic.into(), offsets);
    }

    /// Groups with at least one stored record, sorted.
    pub fn consumer_groups(&self) -> Vec<String> {
        self.inner.read().consumers.keys().cloned().collect()
    }

    /// Lag of `group` on every topic it committed to, sorted by topic.
    ///
    /// Topics without known high-water marks are left out. Returns `None` if
    /// nothing is stored for the group.
    pub fn consumer_topics(&self, group: &str) -> Option<Vec<ConsumerTopic>> {
        let inner = self.inner.read();
        let topics = inner.consumers.get(group)?;

        Some(
            topics
                .iter()
                .filter_map(|(topic, record)| {
                    let maxima = inner.topics.get(topic)?;
                    Some(ConsumerTopic {
                        topic: topic.clone(),
                        timestamp: record.timestamp,
                        offsets: lag::compute(maxima, &record.offsets),
                    })
                })
                .collect(),
        )
    }

    /// Stores the offsets `group` committed on `topic` as of `timestamp`.
    ///
    /// Writes older than the stored record are dropped, equal timestamps replace.
    pub fn update_consumer_offsets(
        &self,
        group: impl Into<String>,
        topic: impl Into<String>,
        timestamp: i64,
        offsets: Vec<i64>,
    ) {
        let mut inner = self.inner.write();
        let topics = inner.consumers.entry(group.into()).or_default();

        let topic = topic.into();
        if let Some(current) = topics.get(&topic) {
            if timestamp < current.timestamp {
                return;
            }
        }
        topics.insert(topic, ConsumerOffsetRecord { offsets, timestamp });
    }

    /// Drops records fetched before `cutoff` and groups left without records.
    pub fn expire_consumer_groups(&self, cutoff: i64) {
        let mut inner = self.inner.write();
        inner.consumers.retain(|_, topics| {
            topics.retain(|_, record| record.timestamp >= cutoff);
            !topics.is_empty()
        });
    }
}
