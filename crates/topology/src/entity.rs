//! Processor entities and the level hierarchy (§3).

use crate::bitmask::CpuMask;

/// A stable index into a [`crate::Context`]'s entity arena. Indices from one
/// context are never valid against another (§9 — arena-plus-index, not
/// shared reference counting).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcEntId(pub(crate) usize);

/// Levels of the processor hierarchy, totally ordered: THREAD < CORE <
/// PACKAGE < NODE < SYSTEM. A parent's level is always exactly one more
/// than its child's (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Thread = 1,
    Core = 2,
    Package = 3,
    Node = 4,
    System = 5,
}

impl Level {
    /// The level one step closer to [`Level::Thread`], or `None` for
    /// [`Level::Thread`] itself.
    pub fn child(self) -> Option<Level> {
        match self {
            Level::Thread => None,
            Level::Core => Some(Level::Thread),
            Level::Package => Some(Level::Core),
            Level::Node => Some(Level::Package),
            Level::System => Some(Level::Node),
        }
    }

    /// The level one step closer to [`Level::System`], or `None` for
    /// [`Level::System`] itself.
    pub fn parent(self) -> Option<Level> {
        match self {
            Level::Thread => Some(Level::Core),
            Level::Core => Some(Level::Package),
            Level::Package => Some(Level::Node),
            Level::Node => Some(Level::System),
            Level::System => None,
        }
    }
}

/// One node of the processor hierarchy: a system, NUMA node, package, core,
/// or hardware thread (§3).
#[derive(Clone, Debug)]
pub struct ProcEnt {
    pub(crate) level: Level,
    /// Representative logical CPU id: for THREAD this is the CPU's own id;
    /// for coalesced levels it's the id of whichever thread happened to
    /// create the entity first, used only as a tie-break and for path
    /// construction by callers that walk back to sysfs.
    pub(crate) id: usize,
    pub(crate) parent: Option<ProcEntId>,
    pub(crate) children: Vec<ProcEntId>,
    pub(crate) mask: CpuMask,
    /// Reserved for NODE entities; not populated from sysfs by this engine
    /// (§9 Open Question — the original's memory field is carried as
    /// structure but left unpopulated until a sysfs source is identified).
    pub(crate) memory_size: Option<u64>,
    /// Coalescing key used only during construction (core_siblings for
    /// packages, thread_siblings for cores); irrelevant once the graph is
    /// built, kept for debugging/inspection.
    pub(crate) signature: Option<String>,
}

impl ProcEnt {
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn parent(&self) -> Option<ProcEntId> {
        self.parent
    }

    pub fn children(&self) -> &[ProcEntId] {
        &self.children
    }

    pub fn cpumask(&self) -> &CpuMask {
        &self.mask
    }

    /// Memory size in bytes, reserved for NODE entities (§3, §9). Always
    /// `None` today; no sysfs attribute currently feeds it.
    pub fn memory_size(&self) -> Option<u64> {
        self.memory_size
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
}
