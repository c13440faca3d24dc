use crate::core::Address;
use crate::network::mock::hub::NetworkHub;
use crate::network::{MessageProcessor, Network, Request, Response};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// MockNetwork is a mock implementation of the Network trait for testing purposes.
/// It does not perform any real network operations but simulates request routing and processing
/// through a `NetworkHub`.
#[derive(Clone)]
pub struct MockNetwork {
    hub: Weak<NetworkHub>,
    address: Address,
    processor: Arc<RwLock<Option<MessageProcessor>>>,
}

impl MockNetwork {
    pub(crate) fn new(
        hub: Weak<NetworkHub>,
        address: Address,
        processor: Arc<RwLock<Option<MessageProcessor>>>,
    ) -> Self {
        MockNetwork {
            hub,
            address,
            processor,
        }
    }
}

#[async_trait]
impl Network for MockNetwork {
    fn local_address(&self) -> Address {
        self.address
    }

    /// Sends a request through the mock network by routing it through the NetworkHub.
    async fn send(&self, target: Address, request: Request) -> anyhow::Result<Response> {
        let hub = self
            .hub
            .upgrade()
            .ok_or_else(|| anyhow!("network hub has been dropped"))?;
        hub.route_request(self.address, target, request)
            .await
            .with_context(|| format!("failed to route request from {} to {}", self.address, target))
    }

    fn register_processor(&self, processor: MessageProcessor) -> anyhow::Result<()> {
        let mut slot = self.processor.write();
        match slot.as_ref() {
            Some(_) => Err(anyhow!("a message processor is already registered")),
            None => {
                *slot = Some(processor);
                Ok(())
            }
        }
    }
}
