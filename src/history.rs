//! Undoable map edits. Every create/remove keeps the per-map import reference count in step
//! with the instances actually present on the map.

use crate::model::{InstanceKind, InstanceRecord, InstanceSpec, MapHost, ObjectKey};
use crate::refcount::ImportRefCounts;
use anyhow::{anyhow, Context, Result};
use glam::IVec2;
use log::{debug, warn};
use std::collections::VecDeque;

pub const DEFAULT_UNDO_CAPACITY: usize = 50;

/// Mutable state an action edits when it is applied or reverted.
pub struct EditContext<'a> {
    pub host: &'a mut dyn MapHost,
    pub refs: &'a mut ImportRefCounts,
}

impl<'a> EditContext<'a> {
    pub fn new(host: &'a mut dyn MapHost, refs: &'a mut ImportRefCounts) -> Self {
        Self { host, refs }
    }

    fn retain_import(&mut self, map: &str, object: &ObjectKey) {
        match self.host.object_path(object) {
            Some(file) => {
                self.refs.increase(map, &file);
            }
            None => warn!("[history] '{object}' has no definition file; reference count unchanged"),
        }
    }

    fn release_import(&mut self, map: &str, object: &ObjectKey) {
        if let Some(file) = self.host.object_path(object) {
            self.refs.decrease(map, &file);
        }
    }
}

pub trait UndoableAction {
    fn description(&self) -> String;
    fn redo(&mut self, ctx: &mut EditContext<'_>) -> Result<()>;
    fn undo(&mut self, ctx: &mut EditContext<'_>) -> Result<()>;
}

/// Creates one placed instance. The identifier generated by the first redo is kept so
/// every later redo recreates the identical instance.
#[derive(Debug, Clone)]
pub struct CreateInstance {
    map: String,
    layer: String,
    cell: IVec2,
    object: ObjectKey,
    rotation: i32,
    identifier: Option<String>,
}

impl CreateInstance {
    pub fn new(map: impl Into<String>, layer: impl Into<String>, cell: IVec2, object: ObjectKey, rotation: i32) -> Self {
        Self { map: map.into(), layer: layer.into(), cell, object, rotation, identifier: None }
    }

    /// Identifier of the created instance once the action has been applied.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }
}

impl UndoableAction for CreateInstance {
    fn description(&self) -> String {
        format!("Create {} at ({}, {}) on '{}'", self.object, self.cell.x, self.cell.y, self.layer)
    }

    fn redo(&mut self, ctx: &mut EditContext<'_>) -> Result<()> {
        let spec = InstanceSpec {
            layer: self.layer.clone(),
            cell: self.cell,
            object: self.object.clone(),
            identifier: self.identifier.clone(),
            kind: InstanceKind::Placed,
        };
        let record = ctx.host.create_instance(&self.map, spec).with_context(|| self.description())?;
        if let Err(err) = ctx.host.set_rotation(&self.map, &record.id, self.rotation) {
            if let Err(cleanup) = ctx.host.delete_instance(&self.map, &record.id) {
                warn!("[history] could not discard half-created '{}': {cleanup:#}", record.id);
            }
            return Err(err.context(format!("Rotating '{}' to {}", record.id, self.rotation)));
        }
        ctx.retain_import(&self.map, &self.object);
        self.identifier = Some(record.id);
        Ok(())
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> Result<()> {
        let id = self.identifier.as_deref().ok_or_else(|| anyhow!("'{}' was never applied", self.description()))?;
        ctx.host.delete_instance(&self.map, id).with_context(|| format!("Undoing '{}'", self.description()))?;
        ctx.release_import(&self.map, &self.object);
        Ok(())
    }
}

/// Removes an existing instance; undo restores it with its original identity.
#[derive(Debug, Clone)]
pub struct RemoveInstance {
    map: String,
    record: InstanceRecord,
}

impl RemoveInstance {
    pub fn from_record(map: impl Into<String>, record: InstanceRecord) -> Self {
        Self { map: map.into(), record }
    }

    pub fn capture(host: &dyn MapHost, map: &str, id: &str) -> Result<Self> {
        let record = host.instance(map, id).ok_or_else(|| anyhow!("Instance '{id}' not found on map '{map}'"))?;
        Ok(Self::from_record(map, record))
    }

    pub fn record(&self) -> &InstanceRecord {
        &self.record
    }
}

impl UndoableAction for RemoveInstance {
    fn description(&self) -> String {
        format!("Remove {} ({}) at ({}, {})", self.record.object, self.record.id, self.record.cell.x, self.record.cell.y)
    }

    fn redo(&mut self, ctx: &mut EditContext<'_>) -> Result<()> {
        ctx.host.delete_instance(&self.map, &self.record.id).with_context(|| self.description())?;
        ctx.release_import(&self.map, &self.record.object);
        Ok(())
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> Result<()> {
        let spec = InstanceSpec {
            layer: self.record.layer.clone(),
            cell: self.record.cell,
            object: self.record.object.clone(),
            identifier: Some(self.record.id.clone()),
            kind: self.record.kind,
        };
        let restored = ctx.host.create_instance(&self.map, spec).with_context(|| format!("Undoing '{}'", self.description()))?;
        if let Err(err) = ctx.host.set_rotation(&self.map, &restored.id, self.record.rotation) {
            if let Err(cleanup) = ctx.host.delete_instance(&self.map, &restored.id) {
                warn!("[history] could not discard half-restored '{}': {cleanup:#}", restored.id);
            }
            return Err(err.context(format!("Rotating '{}' to {}", restored.id, self.record.rotation)));
        }
        ctx.retain_import(&self.map, &self.record.object);
        Ok(())
    }
}

/// Several actions recorded as one user action. Undone in reverse order.
pub struct ActionGroup {
    description: String,
    actions: Vec<Box<dyn UndoableAction>>,
}

impl ActionGroup {
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), actions: Vec::new() }
    }

    pub fn push(&mut self, action: Box<dyn UndoableAction>) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl UndoableAction for ActionGroup {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn redo(&mut self, ctx: &mut EditContext<'_>) -> Result<()> {
        for index in 0..self.actions.len() {
            if let Err(err) = self.actions[index].redo(ctx) {
                for applied in self.actions[..index].iter_mut().rev() {
                    if let Err(rollback) = applied.undo(ctx) {
                        warn!("[history] rollback of '{}' failed: {rollback:#}", applied.description());
                    }
                }
                return Err(err.context(format!("Applying '{}'", self.description)));
            }
        }
        Ok(())
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> Result<()> {
        let count = self.actions.len();
        for index in (0..count).rev() {
            if let Err(err) = self.actions[index].undo(ctx) {
                for reverted in self.actions[index + 1..].iter_mut() {
                    if let Err(rollback) = reverted.redo(ctx) {
                        warn!("[history] rollback of '{}' failed: {rollback:#}", reverted.description());
                    }
                }
                return Err(err.context(format!("Reverting '{}'", self.description)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    Applied,
    NothingToUndo,
    NothingToRedo,
}

/// Bounded undo/redo stacks. Pushing clears redo; overflow drops the oldest undo entry.
pub struct UndoManager {
    capacity: usize,
    undo: VecDeque<Box<dyn UndoableAction>>,
    redo: Vec<Box<dyn UndoableAction>>,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_CAPACITY)
    }
}

impl UndoManager {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, undo: VecDeque::with_capacity(capacity), redo: Vec::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records an action that has already been applied.
    pub fn push(&mut self, action: Box<dyn UndoableAction>) {
        self.redo.clear();
        self.push_undo(action);
    }

    fn push_undo(&mut self, action: Box<dyn UndoableAction>) {
        while self.undo.len() >= self.capacity {
            if let Some(dropped) = self.undo.pop_front() {
                debug!("[history] dropping oldest action '{}'", dropped.description());
            }
        }
        self.undo.push_back(action);
    }

    /// Applies the action and records it.
    pub fn perform(&mut self, mut action: Box<dyn UndoableAction>, ctx: &mut EditContext<'_>) -> Result<()> {
        action.redo(ctx)?;
        self.push(action);
        Ok(())
    }

    pub fn undo(&mut self, ctx: &mut EditContext<'_>) -> Result<HistoryOutcome> {
        let Some(mut action) = self.undo.pop_back() else {
            return Ok(HistoryOutcome::NothingToUndo);
        };
        match action.undo(ctx) {
            Ok(()) => {
                debug!("[history] undid '{}'", action.description());
                self.redo.push(action);
                Ok(HistoryOutcome::Applied)
            }
            Err(err) => {
                self.undo.push_back(action);
                Err(err)
            }
        }
    }

    pub fn redo(&mut self, ctx: &mut EditContext<'_>) -> Result<HistoryOutcome> {
        let Some(mut action) = self.redo.pop() else {
            return Ok(HistoryOutcome::NothingToRedo);
        };
        match action.redo(ctx) {
            Ok(()) => {
                debug!("[history] redid '{}'", action.description());
                self.push_undo(action);
                Ok(HistoryOutcome::Applied)
            }
            Err(err) => {
                self.redo.push(action);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    pub fn next_undo_description(&self) -> Option<String> {
        self.undo.back().map(|action| action.description())
    }

    pub fn next_redo_description(&self) -> Option<String> {
        self.redo.last().map(|action| action.description())
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
