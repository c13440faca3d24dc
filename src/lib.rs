//! Chord-style ring overlay: consistent-hash routing, ring maintenance and a
//! replicated responsibility store used by the publish/subscribe layer.

pub mod core;
pub mod logging;
pub mod network;
pub mod node;
