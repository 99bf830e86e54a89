//! Context lifecycle and the query surface (§4.5, §4.6).

use std::path::PathBuf;

use tracing::debug;

use crate::bitmask::CpuMask;
use crate::builder;
use crate::device::{Device, DeviceId};
use crate::entity::{Level, ProcEnt, ProcEntId};
use crate::error::Result;
use crate::probe;
use crate::sysfs::SysfsReader;

/// Owns every entity, device, attribute string, and bitmask buffer reachable
/// from it (§3, §5). Built once by [`Context::discover`] and read-only for
/// the rest of its life; concurrent readers need no external
/// synchronization, matching §5's "immutable and Sync after construction".
///
/// There is no C-style `free_context` here: dropping the `Context` releases
/// everything, and a consumed/moved-from context simply can't be queried
/// again, which is the idiomatic substitute for the spec's "a freed handle
/// must not be reused" rule (§4.6, §9).
#[derive(Debug)]
pub struct Context {
    sysfs_root: PathBuf,
    width: usize,
    entities: Vec<ProcEnt>,
    devices: Vec<Device>,
    system: ProcEntId,
}

impl Context {
    /// Probes the bitmask width and builds the full entity graph and device
    /// list in one transactional pass (§4.6). On any error nothing is
    /// returned — the partially built state is simply dropped.
    pub fn discover() -> Result<Self> {
        let sysfs = SysfsReader::from_env();
        let width = probe::probe_width(&sysfs)?;
        debug!(width, root = %sysfs.root().display(), "probed cpu bitmask width");
        let built = builder::build(&sysfs, width)?;
        debug!(
            entities = built.entities.len(),
            devices = built.devices.len(),
            "topology discovery complete"
        );
        Ok(Self {
            sysfs_root: sysfs.root().to_path_buf(),
            width,
            entities: built.entities,
            devices: built.devices,
            system: built.system,
        })
    }

    /// Root sysfs path this context was built from.
    pub fn sysfs_root(&self) -> &std::path::Path {
        &self.sysfs_root
    }

    /// Byte width shared by every [`CpuMask`] this context produces.
    pub fn cpumask_width(&self) -> usize {
        self.width
    }

    /// The single SYSTEM entity (§3 — exactly one per context, no parent).
    pub fn system(&self) -> ProcEntId {
        self.system
    }

    pub fn entity(&self, id: ProcEntId) -> &ProcEnt {
        &self.entities[id.0]
    }

    pub fn device(&self, id: DeviceId) -> &Device {
        &self.devices[id.0]
    }

    pub fn entities(&self) -> impl Iterator<Item = (ProcEntId, &ProcEnt)> {
        self.entities.iter().enumerate().map(|(idx, e)| (ProcEntId(idx), e))
    }

    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &Device)> {
        self.devices.iter().enumerate().map(|(idx, d)| (DeviceId(idx), d))
    }

    /// Copies `ent`'s bitmask into `dst`, which must be `cpumask_width()`
    /// bytes wide (§4.5's `copy_cpumask`/`procent_cpumask`). Prefer
    /// [`Context::cpumask_of`] when a borrow suffices.
    pub fn copy_cpumask(&self, ent: ProcEntId, dst: &mut CpuMask) {
        dst.copy_from(&self.entity(ent).mask);
    }

    pub fn cpumask_of(&self, ent: ProcEntId) -> &CpuMask {
        &self.entity(ent).mask
    }

    pub fn device_cpumask(&self, dev: DeviceId) -> &CpuMask {
        &self.device(dev).mask
    }

    pub fn device_attribute(&self, dev: DeviceId, name: &str) -> Option<&str> {
        self.device(dev).attribute(name)
    }

    /// Finds the next device whose type tag matches `type_tag`, scanning the
    /// global device list from just after `prev` (or from the start when
    /// `prev` is `None`). Enumeration order follows the device arena's
    /// insertion order, which callers must not rely on beyond "every device
    /// is visited exactly once" (§4.5).
    pub fn find_device_by_type(&self, prev: Option<DeviceId>, type_tag: &str) -> Option<DeviceId> {
        let start = prev.map(|id| id.0 + 1).unwrap_or(0);
        self.devices[start..]
            .iter()
            .position(|d| d.type_tag == type_tag)
            .map(|offset| DeviceId(start + offset))
    }

    /// Returns the next entity at level `to` reachable from `from`,
    /// continuing after `iter` (or starting fresh when `iter` is `None`).
    /// Case analysis exactly follows §4.5:
    ///
    /// - `to == from.level`: `None` (self-iteration undefined).
    /// - `to` is `from`'s immediate parent level: `from.parent` (ignores `iter`).
    /// - `to` is `from`'s immediate child level: first child, or the child
    ///   after `iter` in insertion order.
    /// - `to` is a strict ancestor more than one level up: recurse on
    ///   `from`'s parent.
    /// - `to` is a descendant more than one level down: flat scan of the
    ///   global entity list for the next entity at level `to` whose
    ///   ancestry chain passes through `from`.
    pub fn traverse(&self, from: ProcEntId, iter: Option<ProcEntId>, to: Level) -> Option<ProcEntId> {
        let from_level = self.entity(from).level;
        if to == from_level {
            return None;
        }

        if to as u8 == from_level as u8 + 1 {
            return self.entity(from).parent;
        }

        if to as u8 + 1 == from_level as u8 {
            let children = &self.entity(from).children;
            return match iter {
                None => children.first().copied(),
                Some(prev) => {
                    let pos = children.iter().position(|&c| c == prev)?;
                    children.get(pos + 1).copied()
                }
            };
        }

        if (to as u8) > (from_level as u8) {
            let parent = self.entity(from).parent?;
            return self.traverse(parent, None, to);
        }

        // Descendant more than one level down: flat scan in global order.
        let start = iter.map(|id| id.0 + 1).unwrap_or(0);
        (start..self.entities.len())
            .map(ProcEntId)
            .find(|&id| self.entity(id).level == to && self.is_ancestor(from, id))
    }

    fn is_ancestor(&self, ancestor: ProcEntId, mut descendant: ProcEntId) -> bool {
        loop {
            if descendant == ancestor {
                return true;
            }
            match self.entity(descendant).parent {
                Some(parent) => descendant = parent,
                None => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    /// Builds a `Context` straight from a fake tree without touching
    /// `$LIBTOPOLOGY_SYSFS_ROOT` — `discover()` itself is exercised by
    /// `probe`'s tests; this exists so the query surface can be tested
    /// without racing other tests over a shared process-wide env var.
    fn context_from_fake(root: &std::path::Path, width: usize) -> Context {
        let sysfs = SysfsReader::new(root);
        let built = builder::build(&sysfs, width).expect("fake tree should build");
        Context {
            sysfs_root: sysfs.root().to_path_buf(),
            width,
            entities: built.entities,
            devices: built.devices,
            system: built.system,
        }
    }

    fn fake_smt4(root: &std::path::Path) {
        for id in 0..4 {
            let topo = root.join(format!("devices/system/cpu/cpu{id}/topology"));
            fs::create_dir_all(&topo).unwrap();
            fs::write(topo.join("core_siblings"), "f").unwrap();
            fs::write(topo.join("thread_siblings"), "f").unwrap();
        }
    }

    /// End-to-end smoke test exercising the whole query surface together,
    /// as opposed to the builder's own unit tests which inspect its output
    /// directly.
    #[test]
    fn query_smt4() {
        let root = tempfile::tempdir().unwrap();
        fake_smt4(root.path());
        let ctx = context_from_fake(root.path(), 1);

        let system = ctx.system();
        assert_eq!(ctx.entity(system).level(), Level::System);

        let node = ctx.traverse(system, None, Level::Node).expect("system must have a descendant node");
        assert!(ctx.traverse(system, Some(node), Level::Node).is_none(), "only one node expected");

        let package = ctx.traverse(node, None, Level::Package).unwrap();
        let core = ctx.traverse(package, None, Level::Core).unwrap();
        assert_eq!(ctx.cpumask_of(core).count(), 4);

        // traverse(traverse(x, null, parent), null, child) must reach x again.
        let parent_of_core = ctx.traverse(core, None, Level::Package).unwrap();
        assert_eq!(parent_of_core, package);
        let mut seen_core = false;
        let mut cursor = None;
        while let Some(candidate) = ctx.traverse(parent_of_core, cursor, Level::Core) {
            if candidate == core {
                seen_core = true;
            }
            cursor = Some(candidate);
        }
        assert!(seen_core);

        let first_thread = ctx.traverse(core, None, Level::Thread).unwrap();
        assert_eq!(ctx.cpumask_of(first_thread).count(), 1);

        // Descendant scan more than one level down: system -> thread.
        let mut thread_count = 0;
        let mut cursor = None;
        while let Some(t) = ctx.traverse(system, cursor, Level::Thread) {
            thread_count += 1;
            cursor = Some(t);
        }
        assert_eq!(thread_count, 4);

        assert!(ctx.find_device_by_type(None, "cache").is_none());
    }

    #[test]
    fn traverse_self_level_is_none() {
        let root = tempfile::tempdir().unwrap();
        fake_smt4(root.path());
        let ctx = context_from_fake(root.path(), 1);
        let system = ctx.system();
        assert!(ctx.traverse(system, None, Level::System).is_none());
    }

    #[test]
    fn copy_cpumask_matches_borrowed_mask() {
        let root = tempfile::tempdir().unwrap();
        fake_smt4(root.path());
        let ctx = context_from_fake(root.path(), 1);
        let system = ctx.system();

        let mut copy = CpuMask::new(ctx.cpumask_width());
        ctx.copy_cpumask(system, &mut copy);
        assert_eq!(copy.as_bytes(), ctx.cpumask_of(system).as_bytes());
    }
}
