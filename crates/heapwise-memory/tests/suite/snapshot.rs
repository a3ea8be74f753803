use heapwise_memory::{
    effective_total_memory_bytes, total_physical_memory_bytes, MemorySnapshot, GB,
};

#[test]
fn cgroup_limit_caps_physical_memory() {
    let snapshot = MemorySnapshot {
        physical_bytes: 64 * GB,
        cgroup_limit_bytes: Some(4 * GB),
    };
    assert_eq!(snapshot.effective_bytes(true), 4 * GB);
    assert_eq!(snapshot.effective_bytes(false), 64 * GB);
}

#[test]
fn cgroup_limit_above_physical_is_ignored() {
    let snapshot = MemorySnapshot {
        physical_bytes: 8 * GB,
        cgroup_limit_bytes: Some(32 * GB),
    };
    assert_eq!(snapshot.effective_bytes(true), 8 * GB);
}

#[test]
fn unknown_physical_memory_falls_back_to_cgroup_limit() {
    let snapshot = MemorySnapshot {
        physical_bytes: 0,
        cgroup_limit_bytes: Some(GB),
    };
    assert_eq!(snapshot.effective_bytes(true), GB);
    assert_eq!(snapshot.effective_bytes(false), 0);
}

#[test]
fn snapshot_serializes_with_snake_case_fields() {
    let snapshot = MemorySnapshot {
        physical_bytes: 1,
        cgroup_limit_bytes: None,
    };
    let json = serde_json::to_value(snapshot).unwrap();
    assert_eq!(json["physical_bytes"], 1);
    assert!(json["cgroup_limit_bytes"].is_null());
}

#[test]
fn capture_does_not_panic() {
    let snapshot = MemorySnapshot::capture();
    let ceiling = snapshot
        .physical_bytes
        .max(snapshot.cgroup_limit_bytes.unwrap_or(0));
    assert!(snapshot.effective_bytes(true) <= ceiling);
}

#[test]
fn effective_total_without_cgroup_is_physical_memory() {
    assert_eq!(
        effective_total_memory_bytes(false),
        total_physical_memory_bytes()
    );
}
