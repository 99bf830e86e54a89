//! Devices distinct from processor entities (§3). In this engine the only
//! device kind observed is "cache", but the shape is generic (type tag plus
//! affinity mask plus named string attributes) in case another device class
//! is added later.

use crate::bitmask::CpuMask;

/// A stable index into a [`crate::Context`]'s device arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub(crate) usize);

/// The one device kind this engine discovers.
pub const DEVICE_TYPE_CACHE: &str = "cache";

#[derive(Clone, Debug)]
pub struct Device {
    pub(crate) type_tag: String,
    pub(crate) mask: CpuMask,
    pub(crate) attributes: Vec<(String, String)>,
    /// Dedup key built from (level, type, shared_cpu_map); see
    /// `builder::cache_signature`. Kept for inspection, not part of the
    /// public query surface.
    pub(crate) signature: String,
}

impl Device {
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn cpumask(&self) -> &CpuMask {
        &self.mask
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}
