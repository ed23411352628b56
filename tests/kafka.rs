mod test_helpers;

use std::collections::BTreeMap;
use std::sync::Arc;

use lagwatch::client::{ClusterClient, Connector, KafkaConnector};
use lagwatch::config::ClusterConfig;
use lagwatch::monitor::ClusterFetcher;
use lagwatch::state::ClusterState;
use tokio_util::sync::CancellationToken;

use crate::test_helpers::maybe_start_logging;

fn cluster_config(brokers: Vec<String>) -> ClusterConfig {
    ClusterConfig::new("integration", brokers)
}

#[tokio::test]
async fn client_reads_cluster() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let client = KafkaConnector::default()
        .connect(&cluster_config(test_cfg.bootstrap_brokers))
        .await
        .unwrap();

    let brokers = client.brokers().await.unwrap();
    assert!(!brokers.is_empty());

    let topics = client.topics().await.unwrap();
    assert!(!topics.iter().any(|t| t == "__consumer_offsets"));

    for topic in topics.iter().take(3) {
        let partitions = client.partitions(topic).await.unwrap();
        assert!(!partitions.is_empty());

        for partition in partitions {
            let hwm = client.high_water_mark(topic, partition).await.unwrap();
            assert!(hwm >= 0);
        }
    }

    for broker in &brokers {
        let groups = client.list_groups(broker).await.unwrap();
        let ids: Vec<String> = groups.into_iter().map(|g| g.group_id).collect();
        if ids.is_empty() {
            continue;
        }

        let descriptions = client.describe_groups(broker, ids.clone()).await.unwrap();
        assert_eq!(descriptions.len(), ids.len());

        let group = &ids[0];
        client.refresh_coordinator(group).await.unwrap();
        let coordinator = client.coordinator(group).await.unwrap();

        let requested = topics
            .iter()
            .take(1)
            .map(|t| (t.clone(), vec![0]))
            .collect::<BTreeMap<_, _>>();
        let offsets = client
            .committed_offsets(&coordinator, group, &requested)
            .await
            .unwrap();
        assert_eq!(offsets.len(), requested.len());
    }
}

#[tokio::test]
async fn session_refreshes_state() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let state = Arc::new(ClusterState::new());
    let mut fetcher = ClusterFetcher::connect(
        &KafkaConnector::default(),
        cluster_config(test_cfg.bootstrap_brokers),
        Arc::clone(&state),
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    fetcher.refresh_metadata(&token).await.unwrap();
    fetcher.refresh_offsets(&token).await.unwrap();

    assert!(!state.brokers().is_empty());
    for group in state.consumer_groups() {
        assert!(state.consumer_topics(&group).is_some());
    }
}
