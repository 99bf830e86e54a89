//! The entity graph builder (§4.4): walks sysfs to produce the SYSTEM entity
//! and every descendant, coalescing packages and cores by sibling-mask
//! signature and deduplicating cache devices seen from multiple CPUs.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::bitmask::CpuMask;
use crate::device::{Device, DeviceId, DEVICE_TYPE_CACHE};
use crate::entity::{Level, ProcEnt, ProcEntId};
use crate::error::{Result, TopologyError};
use crate::sysfs::SysfsReader;

const CPU_ROOT: &str = "devices/system/cpu";
const NODE_ROOT: &str = "devices/system/node";

pub(crate) struct BuildOutput {
    pub(crate) entities: Vec<ProcEnt>,
    pub(crate) devices: Vec<Device>,
    pub(crate) system: ProcEntId,
}

/// Transient state used only during construction (§3 — "transient lookup
/// tables used only during construction"). Dropped in full once `build`
/// returns, whether it succeeds or fails.
struct BuildState<'a> {
    sysfs: &'a SysfsReader,
    width: usize,
    entities: Vec<ProcEnt>,
    devices: Vec<Device>,
    packages_by_signature: HashMap<String, ProcEntId>,
    cores_by_signature: HashMap<(ProcEntId, String), ProcEntId>,
    devices_by_signature: HashMap<String, DeviceId>,
}

impl<'a> BuildState<'a> {
    fn new(sysfs: &'a SysfsReader, width: usize) -> Self {
        // §4.4: per-build tables sized to 8x the bitmask width in bytes, i.e.
        // bounded by the number of addressable CPUs, and never grown.
        let table_capacity = 8 * width;
        Self {
            sysfs,
            width,
            entities: Vec::new(),
            devices: Vec::new(),
            packages_by_signature: HashMap::with_capacity(table_capacity),
            cores_by_signature: HashMap::with_capacity(table_capacity),
            devices_by_signature: HashMap::new(),
        }
    }

    fn new_mask(&self) -> CpuMask {
        CpuMask::new(self.width)
    }

    fn push_entity(&mut self, entity: ProcEnt) -> ProcEntId {
        let id = ProcEntId(self.entities.len());
        self.entities.push(entity);
        id
    }

    fn entity_mut(&mut self, id: ProcEntId) -> &mut ProcEnt {
        &mut self.entities[id.0]
    }

    /// Sets bit `cpu_id` on `entity` and every ancestor up to SYSTEM (§4.4 —
    /// "propagate the set upward").
    fn propagate_bit(&mut self, mut entity: ProcEntId, cpu_id: usize) {
        loop {
            self.entity_mut(entity).mask.set(cpu_id);
            match self.entities[entity.0].parent {
                Some(parent) => entity = parent,
                None => break,
            }
        }
    }

    /// Returns the package with `signature`, creating one as a child of
    /// `node` if none exists yet. `representative_id` — the cpu id that
    /// first brought this package into being — becomes the package's `id`
    /// (§3: "a representative logical CPU id, used for path construction
    /// and as a tie-break").
    fn package_for(&mut self, node: ProcEntId, signature: &str, representative_id: usize) -> ProcEntId {
        if let Some(&id) = self.packages_by_signature.get(signature) {
            return id;
        }
        let pkg = ProcEnt {
            level: Level::Package,
            id: representative_id,
            parent: Some(node),
            children: Vec::new(),
            mask: self.new_mask(),
            memory_size: None,
            signature: Some(signature.to_owned()),
        };
        let id = self.push_entity(pkg);
        self.entity_mut(node).children.push(id);
        self.packages_by_signature.insert(signature.to_owned(), id);
        debug!(signature, "new package entity");
        id
    }

    fn core_for(&mut self, package: ProcEntId, signature: &str, representative_id: usize) -> ProcEntId {
        let key = (package, signature.to_owned());
        if let Some(&id) = self.cores_by_signature.get(&key) {
            return id;
        }
        let core = ProcEnt {
            level: Level::Core,
            id: representative_id,
            parent: Some(package),
            children: Vec::new(),
            mask: self.new_mask(),
            memory_size: None,
            signature: Some(signature.to_owned()),
        };
        let id = self.push_entity(core);
        self.entity_mut(package).children.push(id);
        self.cores_by_signature.insert(key, id);
        debug!(signature, "new core entity");
        id
    }

    fn register_cache(&mut self, device: Device) {
        if self.devices_by_signature.contains_key(&device.signature) {
            return;
        }
        let signature = device.signature.clone();
        let id = DeviceId(self.devices.len());
        self.devices.push(device);
        self.devices_by_signature.insert(signature, id);
    }
}

pub(crate) fn build(sysfs: &SysfsReader, width: usize) -> Result<BuildOutput> {
    let mut state = BuildState::new(sysfs, width);

    let system = state.push_entity(ProcEnt {
        level: Level::System,
        id: 0,
        parent: None,
        children: Vec::new(),
        mask: state.new_mask(),
        memory_size: None,
        signature: None,
    });

    let mut nodes = sysfs
        .list_numbered(NODE_ROOT, "node")
        .map_err(|source| TopologyError::Sysfs { path: NODE_ROOT.to_owned(), source })?;
    nodes.sort_by_key(|(id, _)| *id);

    if nodes.is_empty() {
        debug!("no NUMA node directories found; synthesizing a single node 0");
        build_node(&mut state, system, 0, None)?;
    } else {
        for (node_id, node_path) in nodes {
            build_node(&mut state, system, node_id, Some(node_path))?;
        }
    }

    Ok(BuildOutput { entities: state.entities, devices: state.devices, system })
}

fn build_node(
    state: &mut BuildState<'_>,
    system: ProcEntId,
    node_id: usize,
    node_path: Option<std::path::PathBuf>,
) -> Result<()> {
    let node = state.push_entity(ProcEnt {
        level: Level::Node,
        id: node_id,
        parent: Some(system),
        children: Vec::new(),
        mask: state.new_mask(),
        memory_size: None,
        signature: None,
    });
    state.entity_mut(system).children.push(node);

    let mut cpus = match &node_path {
        Some(path) => state
            .sysfs
            .list_numbered(path, "cpu")
            .map_err(|source| TopologyError::Sysfs { path: path.display().to_string(), source })?,
        None => state
            .sysfs
            .list_numbered(CPU_ROOT, "cpu")
            .map_err(|source| TopologyError::Sysfs { path: CPU_ROOT.to_owned(), source })?,
    };
    cpus.sort_by_key(|(id, _)| *id);

    if cpus.is_empty() {
        if node_path.is_none() {
            return Err(TopologyError::NoCpusFound(state.sysfs.root().display().to_string()));
        }
        warn!(node_id, "NUMA node has no cpu entries");
    }

    for (cpu_id, _) in cpus {
        build_cpu(state, node, cpu_id)?;
    }

    Ok(())
}

fn build_cpu(state: &mut BuildState<'_>, node: ProcEntId, cpu_id: usize) -> Result<()> {
    let cpu_dir = format!("{CPU_ROOT}/cpu{cpu_id}");

    let online = state
        .sysfs
        .read_attr(format!("{cpu_dir}/online"))
        .map_err(|source| TopologyError::Sysfs { path: format!("{cpu_dir}/online"), source })?;
    if online.as_deref() == Some("0") {
        debug!(cpu_id, "cpu offline, skipping");
        return Ok(());
    }

    let pkg_sig = state
        .sysfs
        .read_attr(format!("{cpu_dir}/topology/core_siblings"))
        .map_err(|source| TopologyError::Sysfs { path: format!("{cpu_dir}/topology/core_siblings"), source })?
        .unwrap_or_else(|| cpu_id.to_string());
    let package = state.package_for(node, &pkg_sig, cpu_id);

    let core_sig = state
        .sysfs
        .read_attr(format!("{cpu_dir}/topology/thread_siblings"))
        .map_err(|source| TopologyError::Sysfs { path: format!("{cpu_dir}/topology/thread_siblings"), source })?
        .unwrap_or_else(|| cpu_id.to_string());
    let core = state.core_for(package, &core_sig, cpu_id);

    let thread = state.push_entity(ProcEnt {
        level: Level::Thread,
        id: cpu_id,
        parent: Some(core),
        children: Vec::new(),
        mask: state.new_mask(),
        memory_size: None,
        signature: None,
    });
    state.entity_mut(core).children.push(thread);

    state.propagate_bit(thread, cpu_id);
    trace!(cpu_id, package = ?pkg_sig, core = ?core_sig, "thread discovered");

    discover_caches(state, &cpu_dir, cpu_id);

    Ok(())
}

/// Best-effort cache discovery for one thread (§4.4). Every failure mode
/// here — a missing attribute, an unparseable `shared_cpu_map`, the thread
/// not actually being a member of the cache it's enumerating — abandons
/// just that one cache and moves to the next index. None of it can fail the
/// build (§7).
fn discover_caches(state: &mut BuildState<'_>, cpu_dir: &str, cpu_id: usize) {
    let indices = match state.sysfs.list_numbered(format!("{cpu_dir}/cache"), "index") {
        Ok(indices) => indices,
        Err(_) => return,
    };

    for (_, index_path) in indices {
        match read_cache(state.sysfs, &index_path, state.width, cpu_id) {
            Ok(device) => state.register_cache(device),
            Err(reason) => trace!(cpu_id, path = %index_path.display(), reason, "cache entry abandoned"),
        }
    }
}

fn read_cache(
    sysfs: &SysfsReader,
    index_path: &std::path::Path,
    width: usize,
    cpu_id: usize,
) -> std::result::Result<Device, &'static str> {
    let read = |name: &str| sysfs.read_attr(index_path.join(name)).ok().flatten();

    let size = read("size").ok_or("missing size")?;
    let type_attr = read("type").ok_or("missing type")?;
    let level = read("level").ok_or("missing level")?;
    let shared_cpu_map = read("shared_cpu_map").ok_or("missing shared_cpu_map")?;

    let mask = CpuMask::parse(&shared_cpu_map, width).map_err(|_| "malformed shared_cpu_map")?;
    if !mask.test(cpu_id) {
        return Err("thread not a member of its own shared_cpu_map");
    }

    let signature = format!("cache-L{level}-{type_attr}-{shared_cpu_map}");

    Ok(Device {
        type_tag: DEVICE_TYPE_CACHE.to_owned(),
        mask,
        attributes: vec![
            ("level".to_owned(), level),
            ("type".to_owned(), type_attr),
            ("size".to_owned(), size),
            ("shared_cpu_map".to_owned(), shared_cpu_map),
        ],
        signature,
    })
}
