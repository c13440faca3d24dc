pub mod chord_node;
mod maintenance;
pub mod peer;
#[cfg(test)]
mod peer_test;
mod responsibility;

pub use chord_node::{ActionHandler, ChordNode, Phase};
pub use peer::{LocalPeer, Peer, RemotePeer};
