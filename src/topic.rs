use std::collections::BTreeMap;

use crate::protocol::error::Error as ApiError;

#[derive(Debug)]
pub struct Topic {
    /// The name of this topic.
    pub name: String,

    /// The topic-level error from the last metadata refresh that named it, if any
    /// (e.g. `UnknownTopicOrPartition` for a topic that doesn't exist).
    pub error: Option<ApiError>,

    /// Partition information, keyed by partition index.
    pub partitions: BTreeMap<i32, Partition>,
}

#[derive(Debug, Eq, PartialEq)]
pub struct Partition {
    /// The ID of the leader broker.
    pub leader_id: i32,

    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,

    /// The set of all nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,

    /// The partition-level error from the last metadata refresh, if any (§4.5 step 4:
    /// this is what the routing/retry loop inspects to decide whether to refresh
    /// metadata and retry against a different leader).
    pub error: Option<ApiError>,
}

impl Topic {
    pub fn from_metadata(meta: &crate::protocol::messages::MetadataResponseTopic) -> Self {
        let partitions = meta
            .partitions
            .iter()
            .map(|p| {
                (
                    p.partition_index,
                    Partition {
                        leader_id: p.leader_id,
                        replica_nodes: p.replica_nodes.clone(),
                        isr_nodes: p.isr_nodes.clone(),
                        error: p.error,
                    },
                )
            })
            .collect();

        Self {
            name: meta.name.clone(),
            error: meta.error,
            partitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{MetadataResponsePartition, MetadataResponseTopic};

    #[test]
    fn from_metadata_carries_errors_through() {
        let meta = MetadataResponseTopic {
            error: Some(ApiError::LeaderNotAvailable),
            name: "topic-a".to_string(),
            partitions: vec![MetadataResponsePartition {
                error: None,
                partition_index: 0,
                leader_id: 1,
                replica_nodes: vec![1, 2],
                isr_nodes: vec![1],
            }],
        };

        let topic = Topic::from_metadata(&meta);
        assert_eq!(topic.error, Some(ApiError::LeaderNotAvailable));
        assert_eq!(topic.partitions[&0].leader_id, 1);
        assert_eq!(topic.partitions[&0].error, None);
    }
}
