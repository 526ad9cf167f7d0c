//! Host-facing object toolbar: owns the catalog pipeline, the placement controller and the
//! edit history, and routes editor input to them.

use crate::catalog::{CatalogPipeline, TickReport};
use crate::config::CatalogConfig;
use crate::events::{EditorEvent, EditorEventKind, EditorListener, Key, Modifiers, SubscriberId};
use crate::history::{EditContext, HistoryOutcome, UndoManager};
use crate::model::{MapHost, ObjectKey};
use crate::placement::{PlacementController, PlacementOutcome, PlacementTarget};
use crate::refcount::ImportRefCounts;
use crate::watch::DefinitionWatcher;
use anyhow::{bail, Result};
use log::{debug, info, warn};
use std::time::Duration;

/// Catalog element shown by the toolbar. Each item carries its own key, so a click
/// reports exactly the entry it was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub key: ObjectKey,
    pub tooltip: String,
    pub image: String,
    pub alpha: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolbarResponse {
    None,
    Placement(PlacementOutcome),
    History(HistoryOutcome),
    Rotated(Option<i32>),
}

pub struct ObjectToolbar {
    id: SubscriberId,
    rotate_key: char,
    catalog: CatalogPipeline,
    placement: PlacementController,
    history: UndoManager,
    refs: ImportRefCounts,
    watcher: Option<DefinitionWatcher>,
    items: Vec<CatalogItem>,
    layers: Vec<String>,
    active: bool,
}

impl ObjectToolbar {
    pub fn new(id: SubscriberId, config: &CatalogConfig) -> Result<Self> {
        let watcher = if config.watch.enabled {
            match DefinitionWatcher::new(Duration::from_millis(config.watch.poll_interval_ms)) {
                Ok(watcher) => Some(watcher),
                Err(err) => {
                    warn!("[toolbar] definition watcher unavailable: {err:#}");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            id,
            rotate_key: config.toolbar.rotate_key,
            catalog: CatalogPipeline::new(config)?,
            placement: PlacementController::new(),
            history: UndoManager::new(config.history.capacity),
            refs: ImportRefCounts::new(),
            watcher,
            items: Vec::new(),
            layers: Vec::new(),
            active: false,
        })
    }

    pub fn activate(&mut self, listener: &mut EditorListener, host: &mut dyn MapHost) {
        for kind in EditorEventKind::ALL {
            listener.subscribe(kind, self.id);
        }
        self.active = true;
        self.map_switched(host);
    }

    pub fn deactivate(&mut self, listener: &mut EditorListener, host: &mut dyn MapHost) {
        listener.unsubscribe_all(self.id);
        self.placement.deactivate(host, &mut self.catalog);
        self.refresh_items();
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The active map changed: picks its first layer and rescans.
    pub fn map_switched(&mut self, host: &mut dyn MapHost) {
        let map = host.active_map();
        self.layers = map.as_deref().map(|map| host.layers(map)).unwrap_or_default();
        self.placement.set_layer(host, self.layers.first().cloned());
        self.catalog.request_scan(host, map.as_deref());
    }

    /// Counts the instances a freshly loaded map already contains.
    pub fn map_loaded(&mut self, host: &dyn MapHost, map: &str) {
        self.refs.seed_from_map(host, map);
        debug!("[toolbar] map '{map}' references {} definition file(s)", self.refs.files(map).len());
    }

    pub fn objects_imported(&mut self, host: &dyn MapHost) {
        let map = host.active_map();
        self.catalog.request_scan(host, map.as_deref());
    }

    /// Per-frame hook.
    pub fn update_contents(&mut self, host: &mut dyn MapHost) -> TickReport {
        let changed_files = self.watcher.as_mut().map(DefinitionWatcher::drain_changed).unwrap_or_default();
        let mut invalidated = Vec::new();
        for file in &changed_files {
            invalidated.extend(self.catalog.invalidate_file(file));
        }
        let map = host.active_map();
        if !changed_files.is_empty() {
            self.catalog.request_scan(host, map.as_deref());
        }

        let report = self.catalog.update_contents(host, map.as_deref());
        for key in report.evicted.iter().chain(invalidated.iter()) {
            if self.placement.forget_selection(host, key) {
                info!("[toolbar] selected '{key}' left the catalog");
            }
        }
        if !report.published.is_empty() || !report.evicted.is_empty() || !invalidated.is_empty() {
            self.refresh_items();
        }
        if report.scan_finished {
            self.sync_watcher();
        }
        report
    }

    fn sync_watcher(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };
        if let Err(err) = watcher.sync(&self.catalog.source_files()) {
            warn!("[toolbar] {err:#}");
        }
    }

    fn refresh_items(&mut self) {
        self.items = self
            .catalog
            .keys()
            .into_iter()
            .filter_map(|key| self.catalog.entry(&key))
            .map(|entry| CatalogItem {
                tooltip: entry.key.to_string(),
                image: entry.handle,
                alpha: entry.alpha,
                key: entry.key,
            })
            .collect();
    }

    /// Routes queued events this toolbar subscribed to. Failures are logged per event.
    pub fn dispatch(&mut self, listener: &mut EditorListener, host: &mut dyn MapHost) -> Vec<ToolbarResponse> {
        if !self.active {
            return Vec::new();
        }
        let mut responses = Vec::new();
        for event in listener.drain_for(self.id) {
            match self.handle_event(host, event) {
                Ok(response) => responses.push(response),
                Err(err) => warn!("[toolbar] {event} failed: {err:#}"),
            }
        }
        responses
    }

    pub fn handle_event(&mut self, host: &mut dyn MapHost, event: EditorEvent) -> Result<ToolbarResponse> {
        match event {
            EditorEvent::MouseMoved { point } => {
                self.placement.mouse_moved(host, point)?;
                Ok(ToolbarResponse::None)
            }
            EditorEvent::MousePressed { point, button } => {
                let target = PlacementTarget { host, refs: &mut self.refs, history: &mut self.history };
                Ok(ToolbarResponse::Placement(self.placement.mouse_pressed(target, point, button)?))
            }
            EditorEvent::MouseDragged { point, button } => {
                let target = PlacementTarget { host, refs: &mut self.refs, history: &mut self.history };
                Ok(ToolbarResponse::Placement(self.placement.mouse_dragged(target, point, button)?))
            }
            EditorEvent::KeyPressed { key, modifiers } => self.key_pressed(host, key, modifiers),
        }
    }

    fn key_pressed(&mut self, host: &mut dyn MapHost, key: Key, modifiers: Modifiers) -> Result<ToolbarResponse> {
        let ctrl = modifiers.contains(Modifiers::CTRL);
        match key {
            Key::Char(c) if ctrl && c.eq_ignore_ascii_case(&'z') => {
                let outcome = if modifiers.contains(Modifiers::SHIFT) { self.redo(host)? } else { self.undo(host)? };
                Ok(ToolbarResponse::History(outcome))
            }
            Key::Char(c) if ctrl && c.eq_ignore_ascii_case(&'y') => Ok(ToolbarResponse::History(self.redo(host)?)),
            Key::Char(c) if !ctrl && c.eq_ignore_ascii_case(&self.rotate_key) => {
                Ok(ToolbarResponse::Rotated(self.placement.rotate(host)?))
            }
            Key::Escape => {
                self.placement.deactivate(host, &mut self.catalog);
                self.refresh_items();
                Ok(ToolbarResponse::None)
            }
            _ => Ok(ToolbarResponse::None),
        }
    }

    /// Selects the entry behind a clicked catalog item.
    pub fn item_clicked(&mut self, host: &mut dyn MapHost, key: &ObjectKey) -> Result<()> {
        self.placement.select(host, &mut self.catalog, key)?;
        self.refresh_items();
        Ok(())
    }

    pub fn select_layer(&mut self, host: &mut dyn MapHost, layer: &str) -> Result<()> {
        if !self.layers.iter().any(|known| known == layer) {
            bail!("Layer '{layer}' is not part of the active map");
        }
        self.placement.set_layer(host, Some(layer.to_string()));
        Ok(())
    }

    pub fn undo(&mut self, host: &mut dyn MapHost) -> Result<HistoryOutcome> {
        self.placement.clear_preview(host);
        let mut ctx = EditContext::new(host, &mut self.refs);
        self.history.undo(&mut ctx)
    }

    pub fn redo(&mut self, host: &mut dyn MapHost) -> Result<HistoryOutcome> {
        self.placement.clear_preview(host);
        let mut ctx = EditContext::new(host, &mut self.refs);
        self.history.redo(&mut ctx)
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn catalog(&self) -> &CatalogPipeline {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut CatalogPipeline {
        &mut self.catalog
    }

    pub fn placement(&self) -> &PlacementController {
        &self.placement
    }

    pub fn history(&self) -> &UndoManager {
        &self.history
    }

    pub fn refs(&self) -> &ImportRefCounts {
        &self.refs
    }
}
