//! In-process plugin libraries
//!
//! [`StaticPluginLoader`] resolves library paths against libraries
//! registered at startup instead of the filesystem. [`InMemoryLibrary`]
//! implements a plugin from a payload closure and counts every open,
//! populate and close, which makes handle balance observable.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::{CodecBackend, PluginEntry, PluginLibrary, PluginLoader};
use crate::types::{CodecConfigPackage, CodecDirection, CodecFormat, CodecMetadata};

type PayloadFactory = dyn Fn(CodecFormat, CodecDirection, &CodecMetadata) -> std::result::Result<CodecConfigPackage, i32>
    + Send
    + Sync;

/// Loader backed by libraries registered in-process
#[derive(Default)]
pub struct StaticPluginLoader {
    libraries: DashMap<PathBuf, Arc<dyn PluginLibrary>>,
    loads: AtomicUsize,
}

impl StaticPluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `library` loadable under `path`
    pub fn register(&self, path: impl AsRef<Path>, library: Arc<dyn PluginLibrary>) {
        self.libraries.insert(path.as_ref().to_path_buf(), library);
    }

    /// Number of successful loads served
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl PluginLoader for StaticPluginLoader {
    fn load(&self, path: &Path) -> std::result::Result<Arc<dyn PluginLibrary>, String> {
        let library = self
            .libraries
            .get(path)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| format!("{}: library not found", path.display()))?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(library)
    }
}

impl fmt::Debug for StaticPluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticPluginLoader")
            .field("libraries", &self.libraries.len())
            .field("loads", &self.load_count())
            .finish()
    }
}

/// Call counters of an [`InMemoryLibrary`]
#[derive(Debug, Default)]
pub struct PluginCounters {
    opens: AtomicUsize,
    populates: AtomicUsize,
    closes: AtomicUsize,
}

impl PluginCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn populates(&self) -> usize {
        self.populates.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Codec instances opened and not yet closed
    pub fn open_instances(&self) -> usize {
        self.opens().saturating_sub(self.closes())
    }
}

struct LibraryState {
    factory: Box<PayloadFactory>,
    open_status: AtomicI32,
    latency_ms: AtomicU32,
    counters: PluginCounters,
    last_metadata: Mutex<Option<CodecMetadata>>,
}

/// Plugin library implemented in-process
pub struct InMemoryLibrary {
    name: String,
    exports_entry: bool,
    state: Arc<LibraryState>,
}

impl InMemoryLibrary {
    /// Create a library whose codecs populate payloads with `factory`
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(CodecFormat, CodecDirection, &CodecMetadata) -> std::result::Result<CodecConfigPackage, i32>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            exports_entry: true,
            state: Arc::new(LibraryState {
                factory: Box::new(factory),
                open_status: AtomicI32::new(0),
                latency_ms: AtomicU32::new(0),
                counters: PluginCounters::default(),
                last_metadata: Mutex::new(None),
            }),
        }
    }

    /// Library that always returns the same package
    pub fn with_package(name: impl Into<String>, package: CodecConfigPackage) -> Self {
        Self::new(name, move |_, _, _| Ok(package.clone()))
    }

    /// Drop the open entry point from the library's exports
    pub fn without_entry_point(mut self) -> Self {
        self.exports_entry = false;
        self
    }

    /// Make `open` fail with `status` (0 restores success)
    pub fn set_open_status(&self, status: i32) {
        self.state.open_status.store(status, Ordering::SeqCst);
    }

    /// Latency added by codecs of this library
    pub fn set_latency(&self, latency_ms: u32) {
        self.state.latency_ms.store(latency_ms, Ordering::SeqCst);
    }

    pub fn counters(&self) -> &PluginCounters {
        &self.state.counters
    }

    /// Metadata passed to the most recent populate call
    pub fn last_metadata(&self) -> Option<CodecMetadata> {
        self.state.last_metadata.lock().clone()
    }
}

impl PluginLibrary for InMemoryLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn entry_point(&self) -> Option<Arc<dyn PluginEntry>> {
        if !self.exports_entry {
            return None;
        }
        Some(Arc::new(InMemoryEntry {
            state: Arc::clone(&self.state),
        }))
    }
}

impl fmt::Debug for InMemoryLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryLibrary")
            .field("name", &self.name)
            .field("counters", &self.state.counters)
            .finish()
    }
}

struct InMemoryEntry {
    state: Arc<LibraryState>,
}

impl PluginEntry for InMemoryEntry {
    fn open(
        &self,
        format: CodecFormat,
        direction: CodecDirection,
    ) -> std::result::Result<Box<dyn CodecBackend>, i32> {
        let status = self.state.open_status.load(Ordering::SeqCst);
        if status != 0 {
            return Err(status);
        }
        self.state.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryBackend {
            format,
            direction,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct InMemoryBackend {
    format: CodecFormat,
    direction: CodecDirection,
    state: Arc<LibraryState>,
    closed: bool,
}

impl CodecBackend for InMemoryBackend {
    fn populate_payload(
        &mut self,
        metadata: &CodecMetadata,
    ) -> std::result::Result<CodecConfigPackage, i32> {
        self.state.counters.populates.fetch_add(1, Ordering::SeqCst);
        *self.state.last_metadata.lock() = Some(metadata.clone());
        (self.state.factory)(self.format, self.direction, metadata)
    }

    fn codec_latency(&self, base_latency: u32) -> u32 {
        base_latency + self.state.latency_ms.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.counters.closes.fetch_add(1, Ordering::SeqCst);
            debug!(codec = %self.format, direction = %self.direction, "In-memory codec closed");
        }
    }
}
