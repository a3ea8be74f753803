use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use heapwise_advisor::{
    HeapSizeAdvisor, InMemoryProperties, MemoryKind, PhysicalMemoryProbe, PropertiesStore,
    VmOptions, VmOptionsError,
};
use heapwise_memory::MB;
use tracing_subscriber::fmt::MakeWriter;

/// Scripted VM options that record every access.
#[derive(Default)]
pub struct FakeVmOptions {
    pub heap_user: Option<u64>,
    pub heap_shipped: Option<u64>,
    pub min_heap_user: Option<u64>,
    pub min_heap_shipped: Option<u64>,
    pub read_only: bool,
    pub reads: AtomicUsize,
    pub writes: Mutex<Vec<(MemoryKind, u64)>>,
}

impl FakeVmOptions {
    pub fn shipped(xmx_mb: u64, xms_mb: u64) -> Self {
        Self {
            heap_shipped: Some(xmx_mb),
            min_heap_shipped: Some(xms_mb),
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<(MemoryKind, u64)> {
        self.writes.lock().unwrap().clone()
    }
}

impl VmOptions for FakeVmOptions {
    fn read_option(&self, kind: MemoryKind, override_only: bool) -> Option<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match (kind, override_only) {
            (MemoryKind::Heap, true) => self.heap_user,
            (MemoryKind::Heap, false) => self.heap_shipped,
            (MemoryKind::MinHeap, true) => self.min_heap_user,
            (MemoryKind::MinHeap, false) => self.min_heap_shipped,
        }
    }

    fn set_option(&self, kind: MemoryKind, value_mb: u64) -> Result<(), VmOptionsError> {
        if self.read_only {
            return Err(VmOptionsError::ReadOnly {
                location: "/opt/app/bin/app64.vmoptions".to_owned(),
            });
        }
        self.writes.lock().unwrap().push((kind, value_mb));
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/opt/app/bin/app64.vmoptions"))
    }
}

/// VM options whose writes fail with an I/O error.
pub struct BrokenDiskVmOptions;

impl VmOptions for BrokenDiskVmOptions {
    fn read_option(&self, kind: MemoryKind, _override_only: bool) -> Option<u64> {
        match kind {
            MemoryKind::Heap => Some(2048),
            MemoryKind::MinHeap => Some(128),
        }
    }

    fn set_option(&self, _kind: MemoryKind, _value_mb: u64) -> Result<(), VmOptionsError> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied").into())
    }
}

pub struct CountingProbe {
    bytes: u64,
    calls: AtomicUsize,
}

impl CountingProbe {
    pub fn mb(total_mb: u64) -> Self {
        Self {
            bytes: total_mb * MB,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PhysicalMemoryProbe for CountingProbe {
    fn total_physical_memory_bytes(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bytes
    }
}

#[derive(Default)]
pub struct CountingProperties {
    pub inner: InMemoryProperties,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingProperties {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PropertiesStore for CountingProperties {
    fn is_true_value(&self, key: &str) -> bool {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.is_true_value(key)
    }

    fn set_value(&self, key: &str, value: bool) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_value(key, value);
    }
}

pub struct Harness {
    pub vm_options: Arc<FakeVmOptions>,
    pub probe: Arc<CountingProbe>,
    pub properties: Arc<CountingProperties>,
}

impl Harness {
    pub fn new(vm_options: FakeVmOptions, physical_memory_mb: u64) -> Self {
        Self {
            vm_options: Arc::new(vm_options),
            probe: Arc::new(CountingProbe::mb(physical_memory_mb)),
            properties: Arc::new(CountingProperties::default()),
        }
    }

    pub fn advisor(&self) -> HeapSizeAdvisor {
        HeapSizeAdvisor::new(
            self.vm_options.clone(),
            self.probe.clone(),
            self.properties.clone(),
        )
    }

    pub fn gate(&self) -> Option<bool> {
        self.properties.inner.get(heapwise_advisor::MEMORY_ADJUSTED_KEY)
    }
}

/// Collects formatted log output from a scoped subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
