use std::collections::BTreeMap;

use crate::protocol::error::Error as ProtocolError;
use crate::protocol::messages::MetadataResponseTopic;

/// Topic layout as reported by the last metadata response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// The name of this topic.
    pub name: String,

    /// Whether this is an internal topic such as `__consumer_offsets`.
    pub is_internal: bool,

    /// Topic level error reported by the broker, if any.
    pub error: Option<ProtocolError>,

    /// Partition information
    pub partitions: BTreeMap<i32, Partition>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Partition {
    /// Partition level error reported by the broker, if any.
    pub error: Option<ProtocolError>,

    /// The ID of the leader broker, `-1` during leader election.
    pub leader_id: i32,

    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,

    /// The set of all nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,
}

impl From<MetadataResponseTopic> for Topic {
    fn from(topic: MetadataResponseTopic) -> Self {
        Self {
            name: topic.name,
            is_internal: topic.is_internal,
            error: topic.error,
            partitions: topic
                .partitions
                .into_iter()
                .map(|p| {
                    (
                        p.partition_index,
                        Partition {
                            error: p.error,
                            leader_id: p.leader_id,
                            replica_nodes: p.replica_nodes,
                            isr_nodes: p.isr_nodes,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::MetadataResponsePartition;

    #[test]
    fn from_metadata() {
        let topic = Topic::from(MetadataResponseTopic {
            error: None,
            name: "one-topic".to_string(),
            is_internal: false,
            partitions: vec![
                MetadataResponsePartition {
                    error: None,
                    partition_index: 1,
                    leader_id: 2,
                    replica_nodes: vec![2, 3],
                    isr_nodes: vec![2],
                },
                MetadataResponsePartition {
                    error: Some(ProtocolError::LeaderNotAvailable),
                    partition_index: 0,
                    leader_id: -1,
                    replica_nodes: vec![1],
                    isr_nodes: vec![],
                },
            ],
        });

        assert_eq!(topic.partitions.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(topic.partitions[&0].leader_id, -1);
        assert_eq!(topic.partitions[&1].isr_nodes, vec![2]);
    }
}
