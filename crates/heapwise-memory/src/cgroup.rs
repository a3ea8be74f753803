use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// cgroup entries relevant to memory limits, parsed from `/proc/self/cgroup`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcSelfCgroup {
    /// Unified (v2) hierarchy path, from a `0::/path` line.
    pub v2_path: Option<String>,
    /// v1 memory controller path, from a `N:memory:/path` line.
    pub v1_memory_path: Option<String>,
}

/// Extract the v2 and v1-memory cgroup paths from `/proc/self/cgroup` contents.
///
/// Pure; does not touch the filesystem.
pub fn parse_proc_self_cgroup(contents: &str) -> ProcSelfCgroup {
    let mut parsed = ProcSelfCgroup::default();

    for line in contents.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let mut fields = line.splitn(3, ':');
        let (Some(hierarchy), Some(controllers), Some(path)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let path = path.trim();

        if parsed.v2_path.is_none() && hierarchy == "0" && controllers.is_empty() && !path.is_empty()
        {
            parsed.v2_path = Some(path.to_owned());
        }

        if parsed.v1_memory_path.is_none()
            && controllers.split(',').any(|name| name.trim() == "memory")
        {
            parsed.v1_memory_path = Some(path.to_owned());
        }
    }

    parsed
}

// v1 reports "no limit" as a page-aligned value close to i64::MAX.
const UNLIMITED_THRESHOLD_BYTES: u64 = 1 << 60;

/// Parse a `memory.max` (v2) or `memory.limit_in_bytes` (v1) value.
///
/// Returns `None` for `max`, near-`u64::MAX` sentinels and anything unparsable.
pub fn parse_cgroup_memory_limit_bytes(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "max" {
        return None;
    }

    match raw.parse::<u64>() {
        Ok(value) if value >= UNLIMITED_THRESHOLD_BYTES => None,
        Ok(value) => Some(value),
        Err(err) => {
            static REPORTED: OnceLock<()> = OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target: "heapwise.memory",
                    raw,
                    error = %err,
                    "ignoring unparsable cgroup memory limit"
                );
            }
            None
        }
    }
}

/// Mount points of the cgroup hierarchies.
///
/// The defaults are the standard Linux locations; tests point these at a scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupRoots {
    pub v2: PathBuf,
    pub v1_memory: PathBuf,
}

impl Default for CgroupRoots {
    fn default() -> Self {
        Self {
            v2: PathBuf::from("/sys/fs/cgroup"),
            v1_memory: PathBuf::from("/sys/fs/cgroup/memory"),
        }
    }
}

impl CgroupRoots {
    /// Effective memory limit for the given cgroup membership.
    ///
    /// Limits are inherited, so every ancestor is consulted and the tightest one wins. The v2
    /// hierarchy takes precedence; v1 is only consulted when v2 yields nothing.
    pub fn memory_limit_bytes(&self, cgroup: &ProcSelfCgroup) -> Option<u64> {
        let v2 = cgroup
            .v2_path
            .as_deref()
            .and_then(|path| tightest_limit(&self.v2, path, "memory.max"));
        if v2.is_some() {
            return v2;
        }

        cgroup
            .v1_memory_path
            .as_deref()
            .and_then(|path| tightest_limit(&self.v1_memory, path, "memory.limit_in_bytes"))
    }
}

fn tightest_limit(mount: &Path, cgroup_path: &str, file_name: &str) -> Option<u64> {
    let mut rel = PathBuf::from(cgroup_path.trim_start_matches('/'));
    let mut best: Option<u64> = None;

    loop {
        let limit = read_trimmed(&mount.join(&rel).join(file_name))
            .and_then(|raw| parse_cgroup_memory_limit_bytes(&raw));
        if let Some(limit) = limit {
            best = Some(best.map_or(limit, |best| best.min(limit)));
        }

        if !rel.pop() {
            break;
        }
    }

    best
}

fn read_trimmed(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text.trim().to_owned()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            static REPORTED: OnceLock<()> = OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target: "heapwise.memory",
                    path = %path.display(),
                    error = %err,
                    "failed to read cgroup file"
                );
            }
            None
        }
    }
}

/// Memory limit imposed on the current process by its cgroup, if any.
///
/// Always `None` outside Linux.
pub fn cgroup_memory_limit_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let contents = match std::fs::read_to_string("/proc/self/cgroup") {
            Ok(contents) => contents,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(
                        target: "heapwise.memory",
                        error = %err,
                        "failed to read /proc/self/cgroup"
                    );
                }
                return None;
            }
        };
        CgroupRoots::default().memory_limit_bytes(&parse_proc_self_cgroup(&contents))
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
