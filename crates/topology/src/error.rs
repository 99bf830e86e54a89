use thiserror::Error;

/// Errors produced while discovering or probing the topology of the running
/// machine.
///
/// Lookup misses (`traverse`, `find_device_by_type`, `device_attribute`) are
/// not represented here; they are conveyed as `None` returns, matching the
/// distinction the discovery engine draws between "nothing found" and "could
/// not determine the topology at all".
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("could not determine cpu bitmask width: {0}")]
    Probe(String),

    #[error("cpu bitmask width unsupported on this platform")]
    UnsupportedPlatform,

    #[error("kernel reports more cpus ({sysfs_width} bytes) than this process can address ({sched_width} bytes); set LIBTOPOLOGY_CPUMASK_OVERRIDE to proceed anyway")]
    CpumaskTooNarrow { sched_width: usize, sysfs_width: usize },

    #[error("failed to read sysfs at `{path}`: {source}")]
    Sysfs {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no cpu directories found under `{0}`")]
    NoCpusFound(String),

    #[error("malformed kernel bitmask: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to parse integer from sysfs: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
}

/// Failure to parse a kernel comma-separated hex bitmask string (§4.1).
///
/// Only raised by [`crate::bitmask::CpuMask::parse`]; cache discovery
/// absorbs this locally and never lets it escape as a [`TopologyError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("bitmask string contains no hex digit")]
    NoHexDigit,
    #[error("invalid character `{0}` in bitmask string")]
    InvalidChar(char),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
