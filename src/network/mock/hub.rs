use crate::core::Address;
use crate::network::mock::network::MockNetwork;
use crate::network::{MessageProcessor, Request, Response};
use anyhow::{anyhow, bail};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type ProcessorSlot = Arc<RwLock<Option<MessageProcessor>>>;

/// NetworkHub is a central hub that manages multiple mock networks.
/// It allows for the creation of new mock networks and routing requests between them.
/// Requests are routed completely through the hub in an in-memory fashion, simulating a network
/// environment without actual network communication.
///
/// Failures are injected per address: a disconnected address can neither send nor receive, and a
/// blackholed address accepts requests but never answers them.
pub struct NetworkHub {
    networks: RwLock<HashMap<Address, ProcessorSlot>>,
    disconnected: RwLock<HashSet<Address>>,
    blackholed: RwLock<HashSet<Address>>,
}

impl NetworkHub {
    pub fn new() -> Arc<Self> {
        Arc::new(NetworkHub {
            networks: RwLock::new(HashMap::new()),
            disconnected: RwLock::new(HashSet::new()),
            blackholed: RwLock::new(HashSet::new()),
        })
    }

    /// Creates a new mock network with the given address and registers it in the hub.
    pub fn new_mock_network(hub: &Arc<Self>, address: Address) -> anyhow::Result<MockNetwork> {
        let mut networks = hub.networks.write();
        if networks.contains_key(&address) {
            bail!("network with address {} already exists", address);
        }
        let slot: ProcessorSlot = Arc::new(RwLock::new(None));
        networks.insert(address, slot.clone());
        Ok(MockNetwork::new(Arc::downgrade(hub), address, slot))
    }

    /// Cuts `address` off the hub until it is reconnected.
    pub fn disconnect(&self, address: Address) {
        self.disconnected.write().insert(address);
    }

    /// Makes requests to `address` hang forever, so only the caller's timeout ends them.
    pub fn blackhole(&self, address: Address) {
        self.blackholed.write().insert(address);
    }

    /// Lifts every failure injected for `address`.
    pub fn reconnect(&self, address: Address) {
        self.disconnected.write().remove(&address);
        self.blackholed.write().remove(&address);
    }

    /// Routes a request to the processor registered for `target`.
    pub async fn route_request(
        &self,
        origin: Address,
        target: Address,
        request: Request,
    ) -> anyhow::Result<Response> {
        {
            let disconnected = self.disconnected.read();
            if disconnected.contains(&origin) {
                bail!("{} is disconnected from the hub", origin);
            }
            if disconnected.contains(&target) {
                bail!("{} is disconnected from the hub", target);
            }
        }
        let blackholed = self.blackholed.read().contains(&target);
        if blackholed {
            std::future::pending::<()>().await;
        }

        let processor = {
            let networks = self.networks.read();
            let slot = networks
                .get(&target)
                .ok_or_else(|| anyhow!("network with address {} not found", target))?;
            let processor = slot.read().clone();
            processor.ok_or_else(|| anyhow!("no message processor registered at {}", target))?
        };
        Ok(processor.process_incoming_request(origin, request).await)
    }
}
