pub mod hub;
pub mod network;
