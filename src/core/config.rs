use crate::core::error::ChordError;
use std::env;
use std::time::Duration;

/// Largest supported ring bit-width; ids and finger offsets must fit a u64.
pub const MAX_RING_BITS: u32 = 63;

/// RingConfig carries the protocol constants of one ring. Every node of a ring must agree on them.
#[derive(Debug, Clone, PartialEq)]
pub struct RingConfig {
    /// Ring bit-width M; ids live in `[0, 2^M)` and the finger table has M entries.
    pub bits: u32,
    /// Successor-list size R; responsibilities are replicated to the first R - 1 successors.
    pub successor_list_size: usize,
    /// Bound on every remote call. Expiry is indistinguishable from peer death.
    pub rpc_timeout: Duration,
    /// Stabilize interval T; the other maintenance tasks run at fractions of it.
    pub stabilize_interval: Duration,
    /// Number of stabilize ticks between two responsibility move / replication refresh rounds.
    pub responsibility_cooldown: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        RingConfig {
            bits: 32,
            successor_list_size: 3,
            rpc_timeout: Duration::from_secs(3),
            stabilize_interval: Duration::from_secs(1),
            responsibility_cooldown: 5,
        }
    }
}

impl RingConfig {
    pub fn with_bits(mut self, bits: u32) -> Self {
        self.bits = bits;
        self
    }

    pub fn with_successor_list_size(mut self, size: usize) -> Self {
        self.successor_list_size = size;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_stabilize_interval(mut self, interval: Duration) -> Self {
        self.stabilize_interval = interval;
        self
    }

    pub fn with_responsibility_cooldown(mut self, ticks: u32) -> Self {
        self.responsibility_cooldown = ticks;
        self
    }

    /// Number of finger table entries.
    pub fn finger_count(&self) -> usize {
        self.bits as usize
    }

    /// Checks that the constants describe a usable ring.
    pub fn validate(&self) -> Result<(), ChordError> {
        if self.bits == 0 || self.bits > MAX_RING_BITS {
            return Err(ChordError::Validation(format!(
                "ring bit-width must be within 1..={MAX_RING_BITS}, got {}",
                self.bits
            )));
        }
        if self.successor_list_size == 0 {
            return Err(ChordError::Validation(
                "successor list size must be at least 1".to_string(),
            ));
        }
        if self.rpc_timeout.is_zero() {
            return Err(ChordError::Validation("rpc timeout must be positive".to_string()));
        }
        if self.stabilize_interval.is_zero() {
            return Err(ChordError::Validation(
                "stabilize interval must be positive".to_string(),
            ));
        }
        if self.responsibility_cooldown == 0 {
            return Err(ChordError::Validation(
                "responsibility cooldown must be at least one tick".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds a configuration from `CHORD_*` environment variables, falling back to the defaults
    /// for anything unset. Set but unparsable values are rejected.
    pub fn from_env() -> Result<Self, ChordError> {
        let defaults = RingConfig::default();
        let config = RingConfig {
            bits: env_parse("CHORD_RING_BITS")?.unwrap_or(defaults.bits),
            successor_list_size: env_parse("CHORD_SUCCESSOR_LIST_SIZE")?
                .unwrap_or(defaults.successor_list_size),
            rpc_timeout: env_parse("CHORD_RPC_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.rpc_timeout),
            stabilize_interval: env_parse("CHORD_STABILIZE_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.stabilize_interval),
            responsibility_cooldown: env_parse("CHORD_RESPONSIBILITY_COOLDOWN")?
                .unwrap_or(defaults.responsibility_cooldown),
        };
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ChordError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ChordError::Validation(format!("{name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
