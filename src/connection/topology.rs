use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use parking_lot::RwLock;
use tracing::info;

use crate::protocol::messages::MetadataResponseBroker;

#[derive(Debug, Default)]
pub struct BrokerTopology {
    /// Brokers keyed by broker ID
    topology: RwLock<BTreeMap<i32, Broker>>,
}

/// A broker as announced by cluster metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Broker {
    /// broker ID from the topology metadata
    pub id: i32,
    pub host: String,
    pub port: i32,
}

impl Display for Broker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl<'a> From<&'a MetadataResponseBroker> for Broker {
    fn from(b: &'a MetadataResponseBroker) -> Self {
        Self {
            id: b.node_id,
            host: b.host.clone(),
            port: b.port,
        }
    }
}

impl BrokerTopology {
    pub fn is_empty(&self) -> bool {
        self.topology.read().is_empty()
    }

    /// Returns the broker for the provided broker ID
    pub fn get_broker(&self, broker_id: i32) -> Option<Broker> {
        self.topology.read().get(&broker_id).cloned()
    }

    /// Returns all brokers ordered by ID
    pub fn get_brokers(&self) -> Vec<Broker> {
        self.topology.read().values().cloned().collect()
    }

    /// Replaces the topology with the provided broker metadata.
    ///
    /// Brokers missing from `brokers` are dropped. Returns the IDs of brokers
    /// that were removed or moved to another address.
    pub fn update(&self, brokers: &[MetadataResponseBroker]) -> Vec<i32> {
        let new: BTreeMap<i32, Broker> = brokers
            .iter()
            .map(|b| (b.node_id, Broker::from(b)))
            .collect();

        let mut stale = Vec::new();
        let mut topology = self.topology.write();
        for (id, broker) in &new {
            match topology.get(id) {
                Some(current) if current == broker => {}
                Some(current) => {
                    info!(
                        broker = id,
                        current = %current,
                        new = %broker,
                        "Broker update",
                    );
                    stale.push(*id);
                }
                None => info!(broker = id, new = %broker, "New broker"),
            }
        }
        for (id, current) in topology.iter() {
            if !new.contains_key(id) {
                info!(broker = id, current = %current, "Broker removed");
                stale.push(*id);
            }
        }

        *topology = new;
        stale
    }
}
