use std::sync::{Arc, Barrier};
use std::thread;

use heapwise_advisor::{AdjustmentOutcome, HeapSizeAdvisor, InMemoryProperties};

use super::support::{CountingProbe, FakeVmOptions};

#[test]
fn concurrent_startups_adjust_at_most_once() {
    const THREADS: usize = 8;

    let vm_options = Arc::new(FakeVmOptions::shipped(2048, 256));
    let probe = Arc::new(CountingProbe::mb(65536));
    let properties = Arc::new(InMemoryProperties::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let advisor =
                HeapSizeAdvisor::new(vm_options.clone(), probe.clone(), properties.clone());
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                advisor.maybe_adjust_heap()
            })
        })
        .collect();

    let outcomes: Vec<AdjustmentOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let adjusted = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, AdjustmentOutcome::Adjusted { .. }))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|outcome| **outcome == AdjustmentOutcome::AlreadyAdjusted)
        .count();

    assert_eq!(adjusted, 1, "{outcomes:?}");
    assert_eq!(skipped, THREADS - 1, "{outcomes:?}");
    assert_eq!(vm_options.writes().len(), 1);
    assert_eq!(probe.calls(), 1);
}
