//! Determines the CPU bitmask width used across a [`crate::Context`] (§4.3).

use crate::env_vars;
use crate::error::{Result, TopologyError};
use crate::sysfs::SysfsReader;

/// Name of the flag that permits a sysfs-derived width wider than what the
/// affinity syscall accepts (§6).
pub const CPUMASK_OVERRIDE_VAR: &str = "LIBTOPOLOGY_CPUMASK_OVERRIDE";

/// Smallest width tried against the affinity syscall before doubling (§4.3
/// step 2). 8 bytes covers a single `unsigned long` on a 64-bit kernel, the
/// smallest granularity `sched_getaffinity` is ever sized in.
const INITIAL_SCHED_WIDTH: usize = 8;

/// Computes the bitmask width `W` (in bytes) to use for every [`crate::bitmask::CpuMask`]
/// this context produces.
pub fn probe_width(sysfs: &SysfsReader) -> Result<usize> {
    let sched_width = sched_affinity_width()?;
    let sys_width = sysfs_width(sysfs)?;

    if sys_width <= sched_width {
        Ok(sched_width)
    } else if env_vars::flag(CPUMASK_OVERRIDE_VAR) {
        Ok(sys_width)
    } else {
        Err(TopologyError::CpumaskTooNarrow { sched_width, sysfs_width: sys_width })
    }
}

/// Maximum `cpu{N}` seen under `devices/system/cpu`, converted into a byte
/// width covering bits `0..=N` (§4.3 step 3).
fn sysfs_width(sysfs: &SysfsReader) -> Result<usize> {
    let cpus = sysfs
        .list_numbered("devices/system/cpu", "cpu")
        .map_err(|source| TopologyError::Sysfs { path: "devices/system/cpu".to_owned(), source })?;

    let max_id = cpus
        .iter()
        .map(|(id, _)| *id)
        .max()
        .ok_or_else(|| TopologyError::NoCpusFound(sysfs.root().display().to_string()))?;

    Ok((max_id + 1).div_ceil(8))
}

#[cfg(target_os = "linux")]
fn sched_affinity_width() -> Result<usize> {
    let mut width = INITIAL_SCHED_WIDTH;
    loop {
        let mut buf = vec![0u8; width];
        // SAFETY: `buf` is a valid, uniquely-owned buffer of `width` bytes;
        // sched_getaffinity writes at most `width` bytes into it and returns
        // -1/EINVAL if `width` is too small to hold the running kernel's
        // affinity mask, which we detect below rather than relying on the
        // buffer being touched.
        let ret = unsafe { libc::sched_getaffinity(0, width, buf.as_mut_ptr().cast()) };
        if ret == 0 {
            return Ok(width);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINVAL) {
            width = width
                .checked_mul(2)
                .ok_or_else(|| TopologyError::Probe("cpu bitmask width overflowed".to_owned()))?;
            continue;
        }
        return Err(TopologyError::Probe(format!("sched_getaffinity failed: {err}")));
    }
}

#[cfg(not(target_os = "linux"))]
fn sched_affinity_width() -> Result<usize> {
    Err(TopologyError::UnsupportedPlatform)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn sched_affinity_width_is_power_of_two_multiple_of_initial() {
        let width = sched_affinity_width().expect("probe should succeed under test");
        assert!(width >= INITIAL_SCHED_WIDTH);
        assert_eq!(width % INITIAL_SCHED_WIDTH, 0);
    }

    #[test]
    fn sysfs_width_from_fake_tree() {
        let root = tempfile::tempdir().unwrap();
        for id in [0, 1, 2, 3] {
            std::fs::create_dir_all(root.path().join(format!("devices/system/cpu/cpu{id}"))).unwrap();
        }
        let reader = SysfsReader::new(root.path());
        assert_eq!(sysfs_width(&reader).unwrap(), 1);
    }

    #[test]
    fn sysfs_width_no_cpus_errors() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("devices/system/cpu")).unwrap();
        let reader = SysfsReader::new(root.path());
        assert!(matches!(sysfs_width(&reader), Err(TopologyError::NoCpusFound(_))));
    }
}
