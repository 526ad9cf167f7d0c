use crate::catalog::CatalogPipeline;
use crate::definition::Rotations;
use crate::events::PointerButton;
use crate::history::{ActionGroup, CreateInstance, EditContext, RemoveInstance, UndoManager};
use crate::model::{InstanceKind, InstanceSpec, MapHost, ObjectKey};
use crate::refcount::ImportRefCounts;
use anyhow::{anyhow, Result};
use glam::{IVec2, Vec2};
use log::{debug, info};

/// Placement feedback under the pointer. Never persisted, counted or recorded in history.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewInstance {
    pub map: String,
    pub id: String,
    pub layer: String,
    pub cell: IVec2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    Ignored,
    Removed(usize),
    Placed { instance: String, removed: usize },
    /// A world entity holds the cell; `removed` placed instances were still deleted.
    Blocked { cell: IVec2, removed: usize },
}

/// Mutable editing state a click commits into.
pub struct PlacementTarget<'a> {
    pub host: &'a mut dyn MapHost,
    pub refs: &'a mut ImportRefCounts,
    pub history: &'a mut UndoManager,
}

#[derive(Debug, Default)]
pub struct PlacementController {
    selected: Option<ObjectKey>,
    rotations: Rotations,
    rotation_index: usize,
    layer: Option<String>,
    preview: Option<PreviewInstance>,
    last_cell: Option<IVec2>,
    last_drag_cell: Option<IVec2>,
}

impl PlacementController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&ObjectKey> {
        self.selected.as_ref()
    }

    pub fn layer(&self) -> Option<&str> {
        self.layer.as_deref()
    }

    pub fn preview(&self) -> Option<&PreviewInstance> {
        self.preview.as_ref()
    }

    pub fn rotation_index(&self) -> usize {
        self.rotation_index
    }

    pub fn current_rotation(&self) -> Option<i32> {
        self.rotations.get(self.rotation_index).copied()
    }

    /// Selects a published entry and highlights it; the rotation starts at the entry's first.
    pub fn select(&mut self, host: &mut dyn MapHost, catalog: &mut CatalogPipeline, key: &ObjectKey) -> Result<()> {
        let entry = catalog.entry(key).ok_or_else(|| anyhow!("'{key}' is not in the catalog"))?;
        self.clear_preview(host);
        catalog.set_highlight(key);
        self.selected = Some(entry.key);
        self.rotations = entry.rotations;
        self.rotation_index = 0;
        self.last_cell = None;
        debug!("[placement] selected '{key}' rotation {:?}", self.current_rotation());
        Ok(())
    }

    pub fn set_layer(&mut self, host: &mut dyn MapHost, layer: Option<String>) {
        self.clear_preview(host);
        self.layer = layer;
        self.last_cell = None;
    }

    /// Advances to the next rotation, wrapping, and rebuilds the preview with it.
    pub fn rotate(&mut self, host: &mut dyn MapHost) -> Result<Option<i32>> {
        if self.selected.is_none() || self.rotations.is_empty() {
            return Ok(None);
        }
        self.rotation_index = (self.rotation_index + 1) % self.rotations.len();
        if let Some(preview) = self.preview.clone() {
            self.clear_preview(host);
            self.create_preview(host, &preview.map, &preview.layer, preview.cell)?;
        }
        Ok(self.current_rotation())
    }

    pub fn mouse_moved(&mut self, host: &mut dyn MapHost, point: Vec2) -> Result<()> {
        if self.selected.is_none() {
            return Ok(());
        }
        let (Some(layer), Some(map)) = (self.layer.clone(), host.active_map()) else {
            return Ok(());
        };
        let cell = host.cell_at(&map, &layer, point);
        if cell == self.last_cell {
            return Ok(());
        }
        self.last_cell = cell;
        self.clear_preview(host);
        match cell {
            Some(cell) => self.create_preview(host, &map, &layer, cell),
            None => Ok(()),
        }
    }

    pub fn mouse_pressed(&mut self, target: PlacementTarget<'_>, point: Vec2, button: PointerButton) -> Result<PlacementOutcome> {
        self.last_drag_cell = None;
        self.apply_click(target, point, button)
    }

    /// Dragging applies the click once per newly entered cell.
    pub fn mouse_dragged(&mut self, target: PlacementTarget<'_>, point: Vec2, button: PointerButton) -> Result<PlacementOutcome> {
        let cell = match (self.layer.as_deref(), target.host.active_map()) {
            (Some(layer), Some(map)) => target.host.cell_at(&map, layer, point),
            _ => None,
        };
        if cell.is_some() && cell == self.last_drag_cell {
            return Ok(PlacementOutcome::Ignored);
        }
        self.last_drag_cell = cell;
        self.apply_click(target, point, button)
    }

    fn apply_click(&mut self, target: PlacementTarget<'_>, point: Vec2, button: PointerButton) -> Result<PlacementOutcome> {
        let PlacementTarget { host, refs, history } = target;
        if button == PointerButton::Middle {
            return Ok(PlacementOutcome::Ignored);
        }
        self.clear_preview(host);
        self.last_cell = None;
        if button == PointerButton::Left && self.selected.is_none() {
            return Ok(PlacementOutcome::Ignored);
        }
        let (Some(layer), Some(map)) = (self.layer.clone(), host.active_map()) else {
            return Ok(PlacementOutcome::Ignored);
        };
        let Some(cell) = host.cell_at(&map, &layer, point) else {
            return Ok(PlacementOutcome::Ignored);
        };

        let occupants = host.instances_at(&map, &layer, cell);
        let blocked = occupants.iter().any(|record| record.kind == InstanceKind::WorldEntity);
        let mut group = ActionGroup::new(format!("Edit ({}, {}) on '{layer}'", cell.x, cell.y));
        for record in occupants.into_iter().filter(|record| record.kind == InstanceKind::Placed) {
            group.push(Box::new(RemoveInstance::from_record(map.clone(), record)));
        }
        let removed = group.len();
        let mut ctx = EditContext::new(host, refs);

        if button == PointerButton::Right || blocked {
            if removed > 0 {
                history.perform(Box::new(group), &mut ctx)?;
            }
            if blocked && button != PointerButton::Right {
                info!("[placement] cell ({}, {}) holds a world entity; not placing", cell.x, cell.y);
                return Ok(PlacementOutcome::Blocked { cell, removed });
            }
            return Ok(if removed > 0 { PlacementOutcome::Removed(removed) } else { PlacementOutcome::Ignored });
        }

        let Some(object) = self.selected.clone() else {
            return Ok(PlacementOutcome::Ignored);
        };
        let rotation = self.current_rotation().unwrap_or(0);
        let create = CreateInstance::new(map.clone(), layer.clone(), cell, object.clone(), rotation);
        if removed == 0 {
            history.perform(Box::new(create), &mut ctx)?;
        } else {
            group.push(Box::new(create));
            history.perform(Box::new(group), &mut ctx)?;
        }
        let instance = ctx
            .host
            .instances_at(&map, &layer, cell)
            .into_iter()
            .find(|record| record.kind == InstanceKind::Placed && record.object == object)
            .map(|record| record.id)
            .ok_or_else(|| anyhow!("placed '{object}' missing at ({}, {})", cell.x, cell.y))?;
        debug!("[placement] {}", history.next_undo_description().unwrap_or_default());
        Ok(PlacementOutcome::Placed { instance, removed })
    }

    /// Clears the preview, the highlight and the selection.
    pub fn deactivate(&mut self, host: &mut dyn MapHost, catalog: &mut CatalogPipeline) {
        self.clear_preview(host);
        catalog.clear_highlights();
        self.selected = None;
        self.rotations.clear();
        self.rotation_index = 0;
        self.last_cell = None;
        self.last_drag_cell = None;
    }

    /// Drops the selection when its entry left the catalog.
    pub fn forget_selection(&mut self, host: &mut dyn MapHost, key: &ObjectKey) -> bool {
        if self.selected.as_ref() != Some(key) {
            return false;
        }
        self.clear_preview(host);
        self.selected = None;
        self.rotations.clear();
        self.rotation_index = 0;
        self.last_cell = None;
        true
    }

    pub fn clear_preview(&mut self, host: &mut dyn MapHost) {
        if let Some(preview) = self.preview.take() {
            if let Err(err) = host.delete_instance(&preview.map, &preview.id) {
                debug!("[placement] preview '{}' already gone: {err:#}", preview.id);
            }
        }
    }

    fn create_preview(&mut self, host: &mut dyn MapHost, map: &str, layer: &str, cell: IVec2) -> Result<()> {
        let Some(object) = self.selected.clone() else {
            return Ok(());
        };
        let spec = InstanceSpec { layer: layer.to_string(), cell, object, identifier: None, kind: InstanceKind::Preview };
        let record = host.create_instance(map, spec)?;
        let rotation = self.current_rotation().unwrap_or(0);
        if let Err(err) = host.set_rotation(map, &record.id, rotation) {
            if let Err(cleanup) = host.delete_instance(map, &record.id) {
                debug!("[placement] preview '{}' could not be discarded: {cleanup:#}", record.id);
            }
            return Err(err);
        }
        self.preview = Some(PreviewInstance { map: map.to_string(), id: record.id, layer: layer.to_string(), cell });
        Ok(())
    }
}
