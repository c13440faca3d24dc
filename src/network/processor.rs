use crate::core::Address;
use crate::network::{MessageProcessorCore, Request, Response};
use std::sync::Arc;

/// A cloneable handle around the processor core registered at a network endpoint.
/// The core is responsible for its own internal synchronization.
#[derive(Clone)]
pub struct MessageProcessor {
    core: Arc<dyn MessageProcessorCore>,
}

impl MessageProcessor {
    pub fn new(core: Arc<dyn MessageProcessorCore>) -> Self {
        Self { core }
    }

    /// Hands an incoming request to the core and returns its answer.
    pub async fn process_incoming_request(&self, origin: Address, request: Request) -> Response {
        self.core.process_incoming_request(origin, request).await
    }
}
