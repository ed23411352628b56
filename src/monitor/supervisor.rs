use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use super::{ClusterFetcher, Error, Result};
use crate::backoff::{Backoff, BackoffConfig};
use crate::client::Connector;
use crate::config::ClusterConfig;
use crate::state::{ClusterState, State};

/// Keeps one session per configured cluster alive.
#[derive(Debug)]
pub struct Monitor {
    clusters: Vec<ClusterConfig>,
    backoff_config: BackoffConfig,
}

impl Monitor {
    pub fn new(clusters: Vec<ClusterConfig>) -> Result<Self> {
        if clusters.is_empty() {
            return Err(Error::NoClusters);
        }

        let mut names = HashSet::with_capacity(clusters.len());
        if let Some(dup) = clusters.iter().find(|c| !names.insert(c.name.as_str())) {
            return Err(Error::DuplicateCluster(dup.name.clone()));
        }

        Ok(Self {
            clusters,
            backoff_config: BackoffConfig::default(),
        })
    }

    /// Delays between reconnect attempts.
    pub fn with_backoff(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = backoff_config;
        self
    }

    pub fn clusters(&self) -> &[ClusterConfig] {
        &self.clusters
    }

    /// Monitors every cluster until `token` is cancelled.
    ///
    /// Returns once all sessions have stopped.
    pub async fn run<K>(&self, connector: Arc<K>, state: Arc<State>, token: CancellationToken)
    where
        K: Connector + 'static,
    {
        let tracker = TaskTracker::new();

        for config in &self.clusters {
            let Some(cluster_state) = state.cluster(&config.name) else {
                error!(cluster = config.name.as_str(), "Cluster has no state, skipping");
                continue;
            };

            tracker.spawn(supervise(
                Arc::clone(&connector),
                config.clone(),
                cluster_state,
                self.backoff_config.clone(),
                token.clone(),
            ));
        }

        tracker.close();
        tracker.wait().await;

        info!("All sessions stopped");
    }
}

/// Reconnects to one cluster whenever its session ends, until cancelled.
async fn supervise<K>(
    connector: Arc<K>,
    config: ClusterConfig,
    state: Arc<ClusterState>,
    backoff_config: BackoffConfig,
    token: CancellationToken,
) where
    K: Connector,
{
    let mut backoff = Backoff::new(&backoff_config);

    while !token.is_cancelled() {
        let connected = tokio::select! {
            biased;

            _ = token.cancelled() => break,
            res = ClusterFetcher::connect(connector.as_ref(), config.clone(), Arc::clone(&state)) => res,
        };

        match connected {
            Ok(session) => {
                backoff.reset();
                session.run(token.clone()).await;
            }
            Err(e) => {
                let delay = backoff.next();
                error!(
                    cluster = config.name.as_str(),
                    e = %e,
                    backoff_secs = delay.as_secs_f64(),
                    "Cannot connect to cluster",
                );

                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn needs_clusters() {
        assert_matches!(Monitor::new(vec![]), Err(Error::NoClusters));

        let monitor =
            Monitor::new(vec![ClusterConfig::new("default", vec!["k1:9092".to_string()])]).unwrap();
        assert_eq!(monitor.clusters().len(), 1);
    }

    #[test]
    fn rejects_duplicate_clusters() {
        let config = |name: &str| ClusterConfig::new(name, vec!["k1:9092".to_string()]);

        assert_matches!(
            Monitor::new(vec![config("eu"), config("us"), config("eu")]),
            Err(Error::DuplicateCluster(name)) if name == "eu"
        );
    }
}
