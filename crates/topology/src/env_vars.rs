//! Environment variable lookups used to configure sysfs discovery (§4.2, §4.3).

/// Reads an environment variable for the current process.
///
/// Compared to [`std::env::var`] this collapses "not present" to `Ok(None)`
/// instead of an error, so callers don't have to match on [`std::env::VarError`]
/// at every call site.
pub fn var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => Some(value),
        Err(std::env::VarError::NotPresent) => None,
        Err(std::env::VarError::NotUnicode(_)) => None,
    }
}

/// Reads a presence-only flag: set to any value, including an empty string,
/// means "on". Used for `LIBTOPOLOGY_CPUMASK_OVERRIDE`, whose contract (§6)
/// is "if set (any value)".
pub fn flag(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_missing_is_none() {
        assert_eq!(var("LIBTOPOLOGY_DEFINITELY_UNSET_VAR"), None);
    }

    #[test]
    fn flag_missing_is_false() {
        assert!(!flag("LIBTOPOLOGY_DEFINITELY_UNSET_FLAG"));
    }

    #[test]
    fn flag_present_empty_is_true() {
        // SAFETY: test runs single-threaded w.r.t. this variable and restores it.
        unsafe { std::env::set_var("LIBTOPOLOGY_TEST_FLAG", "") };
        assert!(flag("LIBTOPOLOGY_TEST_FLAG"));
        unsafe { std::env::remove_var("LIBTOPOLOGY_TEST_FLAG") };
    }
}
