pub mod address;
pub mod identifier;
pub mod peer_ref;
pub mod responsibility;
