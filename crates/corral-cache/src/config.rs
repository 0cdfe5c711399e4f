//! Per-cache configuration.

use std::time::Duration;

use serde::Deserialize;

/// Serialization format used for cached values.
///
/// `Binary` (MessagePack) is the default; `Text` (JSON) trades space for
/// values that can be inspected with `redis-cli` and belongs in debugging
/// setups, not production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Binary,
    Text,
}

/// Configuration for one named cache.
///
/// Immutable once handed to the [`CacheManager`](crate::CacheManager);
/// there is exactly one config per cache name.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Unique cache name; becomes part of every Redis key.
    pub name: String,

    /// Value serialization format.
    #[serde(default)]
    pub codec: CodecKind,

    /// Time-to-live for cached values, in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Separate TTL for cached "confirmed absent" markers, in milliseconds.
    /// When unset, loader results of `None` are not cached at all.
    #[serde(default)]
    pub null_ttl_ms: Option<u64>,

    /// Upper bound on L1 entry count. Unbounded when unset.
    #[serde(default)]
    pub max_l1_entries: Option<usize>,

    /// Whether the in-process L1 tier is used at all.
    #[serde(default = "default_l1_enabled")]
    pub l1_enabled: bool,

    /// Allow `clear()` to fall back to a full `KEYS` listing instead of
    /// cursor iteration. `KEYS` blocks Redis on large keyspaces; leave
    /// this off outside of throwaway environments.
    #[serde(default)]
    pub allow_unscanned_clear: bool,
}

fn default_ttl_ms() -> u64 {
    60_000
}

fn default_l1_enabled() -> bool {
    true
}

impl CacheConfig {
    /// Create a config with defaults: binary codec, 60s TTL, no negative
    /// caching, unbounded L1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            codec: CodecKind::default(),
            ttl_ms: default_ttl_ms(),
            null_ttl_ms: None,
            max_l1_entries: None,
            l1_enabled: default_l1_enabled(),
            allow_unscanned_clear: false,
        }
    }

    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Enable negative caching with the given marker TTL.
    pub fn with_null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_max_l1_entries(mut self, max: usize) -> Self {
        self.max_l1_entries = Some(max);
        self
    }

    pub fn with_l1_enabled(mut self, enabled: bool) -> Self {
        self.l1_enabled = enabled;
        self
    }

    pub fn with_unscanned_clear(mut self, allow: bool) -> Self {
        self.allow_unscanned_clear = allow;
        self
    }

    pub(crate) fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub(crate) fn null_ttl(&self) -> Option<Duration> {
        self.null_ttl_ms.map(Duration::from_millis)
    }
}
