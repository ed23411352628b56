//! In-memory view of every monitored cluster.

use std::collections::BTreeMap;
use std::sync::Arc;

mod cluster;

pub use cluster::{ClusterState, ConsumerTopic};

/// Name used when no cluster is configured explicitly.
pub const DEFAULT_CLUSTER: &str = "default";

/// Fixed set of named clusters, created once at startup.
#[derive(Debug)]
pub struct State {
    clusters: BTreeMap<String, Arc<ClusterState>>,
}

impl State {
    /// One [`ClusterState`] per name, or a single `default` cluster if `names` is empty.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut clusters: BTreeMap<String, Arc<ClusterState>> = names
            .into_iter()
            .map(|name| (name.into(), Arc::new(ClusterState::new())))
            .collect();
        if clusters.is_empty() {
            clusters.insert(DEFAULT_CLUSTER.to_string(), Arc::new(ClusterState::new()));
        }

        Self { clusters }
    }

    /// Cluster names, sorted.
    pub fn clusters(&self) -> Vec<String> {
        self.clusters.keys().cloned().collect()
    }

    pub fn cluster(&self, name: &str) -> Option<Arc<ClusterState>> {
        self.clusters.get(name).map(Arc::clone)
    }

    /// Applies [`ClusterState::expire_consumer_groups`] to every cluster.
    pub fn expire_consumer_groups(&self, cutoff: i64) {
        for cluster in self.clusters.values() {
            cluster.expire_consumer_groups(cutoff);
        }
    }
}
