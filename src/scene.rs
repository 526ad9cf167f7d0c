//! In-memory editor scene: the object model plus one `bevy_ecs` world per map, where every
//! map instance is an entity. Implements the host traits consumed by the catalog toolbar.

use crate::definition;
use crate::model::{InstanceKind, InstanceRecord, InstanceSpec, MapHost, ObjectKey, ObjectModel};
use anyhow::{anyhow, bail, Context, Result};
use bevy_ecs::prelude::{Component, Entity, World};
use glam::{IVec2, Vec2};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Component, Debug, Clone)]
pub struct MapInstance {
    pub id: String,
    pub layer: String,
    pub cell: IVec2,
    pub object: ObjectKey,
    pub kind: InstanceKind,
}

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct InstanceRotation(pub i32);

/// Square-cell grid layer. Cell `(0, 0)` starts at `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: String,
    pub columns: u32,
    pub rows: u32,
    pub cell_size: f32,
    pub origin: Vec2,
}

impl LayerInfo {
    pub fn new(name: impl Into<String>, columns: u32, rows: u32, cell_size: f32) -> Self {
        Self { name: name.into(), columns, rows, cell_size, origin: Vec2::ZERO }
    }

    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    pub fn cell_at(&self, point: Vec2) -> Option<IVec2> {
        if self.cell_size <= 0.0 {
            return None;
        }
        let local = ((point - self.origin) / self.cell_size).floor();
        let cell = IVec2::new(local.x as i32, local.y as i32);
        let inside = cell.x >= 0 && cell.y >= 0 && (cell.x as u32) < self.columns && (cell.y as u32) < self.rows;
        inside.then_some(cell)
    }

    /// Pointer position at the centre of `cell`.
    pub fn cell_center(&self, cell: IVec2) -> Vec2 {
        self.origin + (cell.as_vec2() + Vec2::splat(0.5)) * self.cell_size
    }
}

struct EditorMap {
    layers: Vec<LayerInfo>,
    world: World,
    index: HashMap<String, Entity>,
}

impl EditorMap {
    fn layer(&self, name: &str) -> Option<&LayerInfo> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    fn record(&self, entity: Entity) -> Option<InstanceRecord> {
        let instance = self.world.get::<MapInstance>(entity)?;
        let rotation = self.world.get::<InstanceRotation>(entity).copied().unwrap_or_default();
        Some(InstanceRecord {
            id: instance.id.clone(),
            layer: instance.layer.clone(),
            cell: instance.cell,
            object: instance.object.clone(),
            rotation: rotation.0,
            kind: instance.kind,
        })
    }
}

#[derive(Default)]
pub struct EditorScene {
    objects: BTreeMap<String, BTreeMap<String, PathBuf>>,
    maps: BTreeMap<String, EditorMap>,
    active: Option<String>,
    revision: u64,
}

impl EditorScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the object was already registered from the same file.
    pub fn register_object(&mut self, key: ObjectKey, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let ids = self.objects.entry(key.namespace.clone()).or_default();
        if ids.get(&key.id) == Some(&path) {
            return false;
        }
        ids.insert(key.id, path);
        self.revision += 1;
        true
    }

    /// Registers every object a definition file declares.
    pub fn import_file(&mut self, path: &Path) -> Result<Vec<ObjectKey>> {
        let keys = definition::declared_keys(path).with_context(|| format!("Importing {}", path.display()))?;
        for key in &keys {
            self.register_object(key.clone(), path);
        }
        info!("[scene] imported {} object(s) from {}", keys.len(), path.display());
        Ok(keys)
    }

    pub fn remove_object(&mut self, key: &ObjectKey) -> bool {
        let Some(ids) = self.objects.get_mut(&key.namespace) else {
            return false;
        };
        let removed = ids.remove(&key.id).is_some();
        if ids.is_empty() {
            self.objects.remove(&key.namespace);
        }
        if removed {
            self.revision += 1;
        }
        removed
    }

    /// Adds a map; it becomes active when no map is active yet.
    pub fn add_map(&mut self, name: impl Into<String>, layers: Vec<LayerInfo>) -> Result<()> {
        let name = name.into();
        if self.maps.contains_key(&name) {
            bail!("Map '{name}' already exists");
        }
        for (index, layer) in layers.iter().enumerate() {
            if layers[..index].iter().any(|earlier| earlier.name == layer.name) {
                bail!("Map '{name}' declares layer '{}' twice", layer.name);
            }
        }
        self.maps.insert(name.clone(), EditorMap { layers, world: World::new(), index: HashMap::new() });
        if self.active.is_none() {
            self.active = Some(name);
        }
        Ok(())
    }

    pub fn switch_map(&mut self, name: &str) -> Result<()> {
        if !self.maps.contains_key(name) {
            bail!("Map '{name}' is not loaded");
        }
        debug!("[scene] active map -> '{name}'");
        self.active = Some(name.to_string());
        Ok(())
    }

    pub fn close_project(&mut self) {
        self.objects.clear();
        self.maps.clear();
        self.active = None;
        self.revision += 1;
    }

    pub fn spawn_world_entity(&mut self, map: &str, layer: &str, cell: IVec2, object: ObjectKey) -> Result<InstanceRecord> {
        let spec = InstanceSpec { layer: layer.to_string(), cell, object, identifier: None, kind: InstanceKind::WorldEntity };
        self.create_instance(map, spec)
    }

    pub fn layer_info(&self, map: &str, layer: &str) -> Option<&LayerInfo> {
        self.maps.get(map)?.layer(layer)
    }

    pub fn instance_count(&self, map: &str) -> usize {
        self.maps.get(map).map(|editor_map| editor_map.index.len()).unwrap_or(0)
    }

    fn map(&self, map: &str) -> Result<&EditorMap> {
        self.maps.get(map).ok_or_else(|| anyhow!("Map '{map}' is not loaded"))
    }

    fn map_mut(&mut self, map: &str) -> Result<&mut EditorMap> {
        self.maps.get_mut(map).ok_or_else(|| anyhow!("Map '{map}' is not loaded"))
    }
}

impl ObjectModel for EditorScene {
    fn namespaces(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    fn objects(&self, namespace: &str) -> Vec<String> {
        self.objects.get(namespace).map(|ids| ids.keys().cloned().collect()).unwrap_or_default()
    }

    fn object_path(&self, key: &ObjectKey) -> Option<PathBuf> {
        self.objects.get(&key.namespace)?.get(&key.id).cloned()
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

impl MapHost for EditorScene {
    fn active_map(&self) -> Option<String> {
        self.active.clone()
    }

    fn layers(&self, map: &str) -> Vec<String> {
        self.maps
            .get(map)
            .map(|editor_map| editor_map.layers.iter().map(|layer| layer.name.clone()).collect())
            .unwrap_or_default()
    }

    fn cell_at(&self, map: &str, layer: &str, point: Vec2) -> Option<IVec2> {
        self.maps.get(map)?.layer(layer)?.cell_at(point)
    }

    fn create_instance(&mut self, map: &str, spec: InstanceSpec) -> Result<InstanceRecord> {
        if self.object_path(&spec.object).is_none() {
            bail!("Object '{}' is not registered", spec.object);
        }
        let editor_map = self.map_mut(map)?;
        let layer = editor_map.layer(&spec.layer).ok_or_else(|| anyhow!("Layer '{}' not found on map '{map}'", spec.layer))?;
        if layer.cell_at(layer.cell_center(spec.cell)).is_none() {
            bail!("Cell ({}, {}) lies outside layer '{}'", spec.cell.x, spec.cell.y, spec.layer);
        }
        let id = spec.identifier.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if editor_map.index.contains_key(&id) {
            bail!("Instance '{id}' already exists on map '{map}'");
        }
        let instance = MapInstance { id: id.clone(), layer: spec.layer, cell: spec.cell, object: spec.object, kind: spec.kind };
        let entity = editor_map.world.spawn((instance, InstanceRotation::default())).id();
        editor_map.index.insert(id.clone(), entity);
        editor_map.record(entity).ok_or_else(|| anyhow!("Instance '{id}' vanished after spawn"))
    }

    fn delete_instance(&mut self, map: &str, id: &str) -> Result<InstanceRecord> {
        let editor_map = self.map_mut(map)?;
        let entity = editor_map.index.remove(id).ok_or_else(|| anyhow!("Instance '{id}' not found on map '{map}'"))?;
        let record = editor_map.record(entity).ok_or_else(|| anyhow!("Instance '{id}' has no components"))?;
        let _ = editor_map.world.despawn(entity);
        Ok(record)
    }

    fn set_rotation(&mut self, map: &str, id: &str, rotation: i32) -> Result<()> {
        let editor_map = self.map_mut(map)?;
        let entity = *editor_map.index.get(id).ok_or_else(|| anyhow!("Instance '{id}' not found on map '{map}'"))?;
        let mut current = editor_map
            .world
            .get_mut::<InstanceRotation>(entity)
            .ok_or_else(|| anyhow!("Instance '{id}' has no rotation"))?;
        current.0 = rotation;
        Ok(())
    }

    fn instance(&self, map: &str, id: &str) -> Option<InstanceRecord> {
        let editor_map = self.maps.get(map)?;
        editor_map.record(*editor_map.index.get(id)?)
    }

    fn instances_at(&self, map: &str, layer: &str, cell: IVec2) -> Vec<InstanceRecord> {
        self.instances(map).into_iter().filter(|record| record.layer == layer && record.cell == cell).collect()
    }

    fn instances(&self, map: &str) -> Vec<InstanceRecord> {
        let Ok(editor_map) = self.map(map) else {
            return Vec::new();
        };
        let mut records: Vec<InstanceRecord> =
            editor_map.index.values().filter_map(|entity| editor_map.record(*entity)).collect();
        records.sort_by(|a, b| {
            (a.layer.as_str(), a.cell.y, a.cell.x, a.id.as_str()).cmp(&(b.layer.as_str(), b.cell.y, b.cell.x, b.id.as_str()))
        });
        records
    }
}
