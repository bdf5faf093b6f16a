use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use tracing::info;

use crate::protocol::messages::MetadataResponseBroker;

/// The set of brokers known from the most recent metadata refresh, keyed by broker id.
///
/// Unlike the teacher's topology cache, this is plain owned state rather than
/// `Arc<parking_lot::RwLock<_>>`: a `Connection` (and everything it owns, including this
/// struct) is used from one task at a time (§5), so shared-mutability primitives meant
/// for concurrent access would be dead weight here.
#[derive(Debug, Default)]
pub struct BrokerTopology {
    topology: HashMap<i32, Broker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broker {
    /// Broker id from the cluster metadata.
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
        self.topology.is_empty()
    }

    pub fn get_broker(&self, broker_id: i32) -> Option<&Broker> {
        self.topology.get(&broker_id)
    }

    pub fn brokers(&self) -> impl Iterator<Item = &Broker> {
        self.topology.values()
    }

    /// Replaces/augments the cache with freshly fetched broker metadata, logging any
    /// broker whose address changed or that wasn't known before.
    pub fn update(&mut self, brokers: &[MetadataResponseBroker]) {
        for broker in brokers {
            match self.topology.entry(broker.node_id) {
                Entry::Occupied(mut o) => {
                    let current = o.get_mut();
                    if current.host != broker.host || current.port != broker.port {
                        let new = Broker::from(broker);
                        info!(
                            broker=broker.node_id,
                            current=%current,
                            new=%new,
                            "broker address changed",
                        );
                        *current = new;
                    }
                }
                Entry::Vacant(v) => {
                    let new = Broker::from(broker);
                    info!(broker = broker.node_id, new = %new, "new broker");
                    v.insert(new);
                }
            }
        }
    }
}
