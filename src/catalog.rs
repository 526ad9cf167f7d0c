//! Object catalog: a background worker discovers and resolves placeable objects, the UI
//! tick publishes them into the shared cache a bounded number at a time.

use crate::atlas::{AtlasRegion, RegionKind};
use crate::config::CatalogConfig;
use crate::definition::{self, ObjectDescriptor, ObjectKind, Rotations};
use crate::images::ImageRegistry;
use crate::model::{ObjectKey, ObjectModel};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Publishing,
}

/// Identifies what a scan was taken against. Results from an outdated context are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanContext {
    pub map: Option<String>,
    pub revision: u64,
}

impl ScanContext {
    pub fn capture<M: ObjectModel + ?Sized>(model: &M, map: Option<&str>) -> Self {
        Self { map: map.map(str::to_string), revision: model.revision() }
    }
}

/// Namespace/object snapshot taken when a scan starts.
#[derive(Debug, Clone)]
pub struct DiscoveryScan {
    generation: u64,
    context: ScanContext,
    ids: BTreeMap<String, BTreeSet<String>>,
    paths: HashMap<ObjectKey, PathBuf>,
}

impl DiscoveryScan {
    pub fn capture<M: ObjectModel + ?Sized>(model: &M, generation: u64, context: ScanContext) -> Self {
        let mut ids: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut paths = HashMap::new();
        for namespace in model.namespaces() {
            let known = ids.entry(namespace.clone()).or_default();
            for id in model.objects(&namespace) {
                let key = ObjectKey::new(namespace.clone(), id.clone());
                match model.object_path(&key) {
                    Some(path) => {
                        paths.insert(key, path);
                    }
                    None => warn!("[catalog] '{key}' has no definition file"),
                }
                known.insert(id);
            }
        }
        Self { generation, context, ids, paths }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.ids.get(&key.namespace).map(|ids| ids.contains(&key.id)).unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        self.ids
            .iter()
            .flat_map(|(namespace, ids)| ids.iter().map(move |id| ObjectKey::new(namespace.clone(), id.clone())))
            .collect()
    }

    pub fn path(&self, key: &ObjectKey) -> Option<&Path> {
        self.paths.get(key).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.ids.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ObjectKey,
    /// Image shown for the entry in the catalog.
    pub handle: String,
    pub images: Vec<String>,
    pub rotations: Rotations,
    pub alpha: f32,
    pub highlighted: bool,
    pub descriptor: Arc<ObjectDescriptor>,
    pub generation: u64,
}

impl CacheEntry {
    pub fn first_rotation(&self) -> Option<i32> {
        self.rotations.first().copied()
    }
}

struct CatalogStore {
    entries: BTreeMap<ObjectKey, CacheEntry>,
    context: Option<ScanContext>,
    state: ScanState,
    generation: u64,
    pending_rescan: bool,
    /// Latest generation at which each definition file was reported changed.
    invalidated: HashMap<PathBuf, u64>,
}

fn lock_store(store: &Mutex<CatalogStore>) -> MutexGuard<'_, CatalogStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

enum CatalogMessage {
    Descriptor { context: ScanContext, generation: u64, descriptor: ObjectDescriptor },
    ScanComplete { generation: u64, evicted: Vec<CacheEntry>, unresolved: Vec<ObjectKey> },
}

struct ScanJob {
    scan: DiscoveryScan,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub published: Vec<ObjectKey>,
    pub evicted: Vec<ObjectKey>,
    /// Snapshot objects the finished scan could not resolve.
    pub unresolved: Vec<ObjectKey>,
    pub discarded: usize,
    pub scan_started: bool,
    pub scan_finished: bool,
}

pub struct CatalogPipeline {
    store: Arc<Mutex<CatalogStore>>,
    jobs: Sender<ScanJob>,
    results: Receiver<CatalogMessage>,
    images: ImageRegistry,
    publish_budget: usize,
    default_alpha: f32,
    highlight_alpha: f32,
    worker_lost: bool,
}

impl CatalogPipeline {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let store = Arc::new(Mutex::new(CatalogStore {
            entries: BTreeMap::new(),
            context: None,
            state: ScanState::Idle,
            generation: 0,
            pending_rescan: false,
            invalidated: HashMap::new(),
        }));
        let (job_tx, job_rx) = mpsc::channel::<ScanJob>();
        let (result_tx, result_rx) = mpsc::sync_channel(config.pipeline.handoff_depth.max(1));
        let worker_store = Arc::clone(&store);
        thread::Builder::new()
            .name("catalog-scan".to_string())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if !run_scan(&worker_store, job.scan, &result_tx) {
                        break;
                    }
                }
            })
            .context("Spawning catalog scan worker")?;
        Ok(Self {
            store,
            jobs: job_tx,
            results: result_rx,
            images: ImageRegistry::new(),
            publish_budget: config.pipeline.publish_budget.max(1),
            default_alpha: config.toolbar.default_alpha,
            highlight_alpha: config.toolbar.highlight_alpha,
            worker_lost: false,
        })
    }

    /// Starts a scan, or marks a follow-up scan when one is already running. Returns true
    /// when a scan was started by this call.
    pub fn request_scan<M: ObjectModel + ?Sized>(&mut self, model: &M, map: Option<&str>) -> bool {
        let context = ScanContext::capture(model, map);
        {
            let mut store = lock_store(&self.store);
            store.context = Some(context.clone());
            if store.state != ScanState::Idle {
                if !store.pending_rescan {
                    debug!("[catalog] scan request coalesced into pending rescan");
                }
                store.pending_rescan = true;
                return false;
            }
        }
        self.start_scan(model, context)
    }

    fn start_scan<M: ObjectModel + ?Sized>(&mut self, model: &M, context: ScanContext) -> bool {
        if self.worker_lost {
            return false;
        }
        let generation = {
            let mut store = lock_store(&self.store);
            store.generation += 1;
            store.state = ScanState::Scanning;
            store.pending_rescan = false;
            store.generation
        };
        let scan = DiscoveryScan::capture(model, generation, context);
        debug!("[catalog] scan #{generation} started over {} object(s)", scan.len());
        if self.jobs.send(ScanJob { scan }).is_err() {
            warn!("[catalog] scan worker is gone; catalog will not refresh");
            self.worker_lost = true;
            lock_store(&self.store).state = ScanState::Idle;
            return false;
        }
        true
    }

    /// Per-tick hook: publishes at most `publish_budget` hand-off messages without blocking.
    pub fn update_contents<M: ObjectModel + ?Sized>(&mut self, model: &M, map: Option<&str>) -> TickReport {
        let mut report = TickReport::default();
        let context = ScanContext::capture(model, map);
        let context_changed = lock_store(&self.store).context.as_ref() != Some(&context);
        if context_changed {
            report.scan_started = self.request_scan(model, map);
        }
        for _ in 0..self.publish_budget {
            match self.results.try_recv() {
                Ok(CatalogMessage::Descriptor { context, generation, descriptor }) => {
                    match self.publish(&context, generation, descriptor) {
                        Some(key) => report.published.push(key),
                        None => report.discarded += 1,
                    }
                }
                Ok(CatalogMessage::ScanComplete { generation, evicted, unresolved }) => {
                    if !unresolved.is_empty() {
                        warn!("[catalog] scan #{generation}: {} object(s) could not be resolved", unresolved.len());
                    }
                    report.unresolved.extend(unresolved);
                    for entry in evicted {
                        self.release_entry_images(&entry);
                        report.evicted.push(entry.key);
                    }
                    report.scan_finished = true;
                    let pending = {
                        let mut store = lock_store(&self.store);
                        store.state = ScanState::Idle;
                        store.pending_rescan
                    };
                    debug!("[catalog] scan #{generation} finished ({} evicted)", report.evicted.len());
                    if pending {
                        report.scan_started |= self.request_scan(model, map);
                    }
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.worker_lost {
                        warn!("[catalog] scan worker disconnected");
                    }
                    self.worker_lost = true;
                    lock_store(&self.store).state = ScanState::Idle;
                    break;
                }
            }
        }
        report
    }

    fn publish(&mut self, context: &ScanContext, generation: u64, descriptor: ObjectDescriptor) -> Option<ObjectKey> {
        let mut store = lock_store(&self.store);
        if store.context.as_ref() != Some(context) {
            debug!("[catalog] discarding '{}' from stale scan #{generation}", descriptor.key);
            return None;
        }
        if store.entries.contains_key(&descriptor.key) {
            return None;
        }
        if store.invalidated.get(&descriptor.source).is_some_and(|&changed| generation <= changed) {
            debug!("[catalog] discarding '{}' parsed before {} changed", descriptor.key, descriptor.source.display());
            return None;
        }
        let images = match register_images(&mut self.images, &descriptor) {
            Ok(images) => images,
            Err(err) => {
                warn!("[catalog] '{}' not published: {err:#}", descriptor.key);
                return None;
            }
        };
        let Some(handle) = images.first().cloned() else {
            warn!("[catalog] '{}' has no frames to show", descriptor.key);
            return None;
        };
        let key = descriptor.key.clone();
        let entry = CacheEntry {
            key: key.clone(),
            handle,
            images,
            rotations: descriptor.rotations(),
            alpha: self.default_alpha,
            highlighted: false,
            descriptor: Arc::new(descriptor),
            generation,
        };
        store.entries.insert(key.clone(), entry);
        Some(key)
    }

    fn release_entry_images(&mut self, entry: &CacheEntry) {
        for image in &entry.images {
            self.images.release_image(image);
        }
    }

    /// Drops the entries defined by `file` so the next scan resolves them again. Results of
    /// scans up to the current generation that still carry the old contents are discarded at
    /// publish, and a running scan gets a follow-up.
    pub fn invalidate_file(&mut self, file: &Path) -> Vec<ObjectKey> {
        let removed: Vec<CacheEntry> = {
            let mut store = lock_store(&self.store);
            let generation = store.generation;
            store.invalidated.insert(file.to_path_buf(), generation);
            if store.state != ScanState::Idle {
                store.pending_rescan = true;
            }
            let keys: Vec<ObjectKey> = store
                .entries
                .values()
                .filter(|entry| entry.descriptor.source == file)
                .map(|entry| entry.key.clone())
                .collect();
            keys.iter().filter_map(|key| store.entries.remove(key)).collect()
        };
        for entry in &removed {
            self.release_entry_images(entry);
        }
        if !removed.is_empty() {
            info!("[catalog] {} changed; invalidated {} object(s)", file.display(), removed.len());
        }
        removed.into_iter().map(|entry| entry.key).collect()
    }

    /// Highlights `key` and resets every other entry to the default alpha.
    pub fn set_highlight(&mut self, key: &ObjectKey) -> bool {
        let mut store = lock_store(&self.store);
        if !store.entries.contains_key(key) {
            return false;
        }
        for entry in store.entries.values_mut() {
            let highlighted = &entry.key == key;
            entry.highlighted = highlighted;
            entry.alpha = if highlighted { self.highlight_alpha } else { self.default_alpha };
        }
        true
    }

    pub fn clear_highlights(&mut self) {
        let mut store = lock_store(&self.store);
        for entry in store.entries.values_mut() {
            entry.highlighted = false;
            entry.alpha = self.default_alpha;
        }
    }

    pub fn entry(&self, key: &ObjectKey) -> Option<CacheEntry> {
        lock_store(&self.store).entries.get(key).cloned()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        lock_store(&self.store).entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        lock_store(&self.store).entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock_store(&self.store).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> ScanState {
        lock_store(&self.store).state
    }

    pub fn generation(&self) -> u64 {
        lock_store(&self.store).generation
    }

    /// True when no scan is running and none is pending.
    pub fn is_idle(&self) -> bool {
        let store = lock_store(&self.store);
        store.state == ScanState::Idle && !store.pending_rescan
    }

    /// Definition files backing the cached entries.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let store = lock_store(&self.store);
        let files: BTreeSet<PathBuf> = store.entries.values().map(|entry| entry.descriptor.source.clone()).collect();
        files.into_iter().collect()
    }

    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }

    pub fn publish_budget(&self) -> usize {
        self.publish_budget
    }

    pub fn set_publish_budget(&mut self, budget: usize) {
        self.publish_budget = budget.max(1);
    }
}

fn texture_name(region: &AtlasRegion) -> String {
    match region.kind {
        RegionKind::Packed => format!("{}.atlas", region.sheet.display()),
        RegionKind::Loose => region.sheet.display().to_string(),
    }
}

/// Registers every frame of the descriptor; the preview frame comes first.
fn register_images(registry: &mut ImageRegistry, descriptor: &ObjectDescriptor) -> Result<Vec<String>> {
    let mut frames: Vec<(String, &AtlasRegion)> = Vec::with_capacity(descriptor.frame_count());
    match &descriptor.kind {
        ObjectKind::Static { directions } => {
            for direction in directions {
                for region in &direction.frames {
                    frames.push((format!("{}.{}", descriptor.key, direction.direction), region));
                }
            }
        }
        ObjectKind::Animated { actions } => {
            for action in actions {
                for direction in &action.directions {
                    for (index, region) in direction.frames.iter().enumerate() {
                        let name = format!("{}.{}.{}.{index}", descriptor.key, action.name, direction.direction);
                        frames.push((name, region));
                    }
                }
            }
        }
    }
    let mut registered: Vec<String> = Vec::with_capacity(frames.len());
    for (name, region) in frames {
        if let Err(err) = registry.retain_image(&name, &texture_name(region), &region.sheet, region.rect) {
            for done in &registered {
                registry.release_image(done);
            }
            return Err(err.context(format!("Registering image '{name}'")));
        }
        registered.push(name);
    }
    Ok(registered)
}

/// Worker side of one scan. Returns false once the UI side has hung up.
fn run_scan(store: &Mutex<CatalogStore>, scan: DiscoveryScan, results: &SyncSender<CatalogMessage>) -> bool {
    let cached: HashSet<ObjectKey> = lock_store(store).entries.keys().cloned().collect();
    let mut pending_files: BTreeMap<PathBuf, Vec<ObjectKey>> = BTreeMap::new();
    let mut unresolved = Vec::new();
    for key in scan.keys() {
        if cached.contains(&key) {
            continue;
        }
        match scan.path(&key) {
            Some(path) => pending_files.entry(path.to_path_buf()).or_default().push(key),
            None => unresolved.push(key),
        }
    }

    let mut enqueued: HashSet<ObjectKey> = HashSet::new();
    for (file, wanted) in pending_files {
        let descriptors = match definition::parse_file(&file) {
            Ok(descriptors) => descriptors,
            Err(err) => {
                warn!("[catalog] {err:#}");
                unresolved.extend(wanted);
                continue;
            }
        };
        for descriptor in descriptors {
            if !wanted.contains(&descriptor.key) || !enqueued.insert(descriptor.key.clone()) {
                continue;
            }
            let message =
                CatalogMessage::Descriptor { context: scan.context.clone(), generation: scan.generation, descriptor };
            if results.send(message).is_err() {
                return false;
            }
        }
        unresolved.extend(wanted.into_iter().filter(|key| !enqueued.contains(key)));
    }

    let evicted = {
        let mut store = lock_store(store);
        store.state = ScanState::Publishing;
        if store.context.as_ref() == Some(&scan.context) {
            let stale: Vec<ObjectKey> = store.entries.keys().filter(|key| !scan.contains(key)).cloned().collect();
            stale.iter().filter_map(|key| store.entries.remove(key)).collect()
        } else {
            debug!("[catalog] scan #{} outdated; eviction left to the follow-up scan", scan.generation);
            Vec::new()
        }
    };
    results.send(CatalogMessage::ScanComplete { generation: scan.generation, evicted, unresolved }).is_ok()
}
