pub mod clock;
pub mod config;
pub mod error;
pub mod lookup;
pub mod model;
pub mod ring;
pub mod store;
#[cfg(test)]
pub mod testutil;

pub use crate::core::clock::{Clock, SystemClock};
pub use crate::core::config::RingConfig;
pub use crate::core::error::{ChordError, ChordResult};
pub use crate::core::lookup::finger_table::{FingerTable, FingerTableLevel};
pub use crate::core::lookup::successor_list::SuccessorList;
pub use crate::core::model::address::Address;
pub use crate::core::model::identifier::Identifier;
pub use crate::core::model::peer_ref::PeerRef;
pub use crate::core::model::responsibility::Responsibility;
pub use crate::core::store::{ResponsibilityStore, Versioned};
