//! Discovers a Linux machine's CPU topology and cache devices from sysfs and
//! exposes them through a small traversal and query interface.
//!
//! [`Context::discover`] walks `/sys/devices/system/{cpu,node}` (or
//! `$LIBTOPOLOGY_SYSFS_ROOT`) once, building an in-memory tree of
//! [`entity::ProcEnt`] nodes — system, NUMA node, package, core, hardware
//! thread — plus a flat list of [`device::Device`]s (currently only caches).
//! The result is a snapshot: it never changes after construction, and
//! queries against it (`traverse`, `find_device_by_type`, attribute lookup,
//! mask copies) are read-only and safe to call from multiple threads at
//! once.

pub mod bitmask;
mod builder;
pub mod context;
pub mod device;
mod env_vars;
pub mod entity;
pub mod error;
mod probe;
mod sysfs;

pub use bitmask::CpuMask;
pub use context::Context;
pub use device::{Device, DeviceId, DEVICE_TYPE_CACHE};
pub use entity::{Level, ProcEnt, ProcEntId};
pub use error::{ParseError, Result, TopologyError};
pub use sysfs::SYSFS_ROOT_VAR;
