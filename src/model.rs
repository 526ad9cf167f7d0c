//! Narrow interfaces onto the host engine's object model and map layers.

use anyhow::Result;
use glam::{IVec2, Vec2};
use std::fmt;
use std::path::PathBuf;

/// Globally unique identity of a placeable object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub id: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), id: id.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.id)
    }
}

/// Object enumeration exposed by the host engine.
pub trait ObjectModel {
    fn namespaces(&self) -> Vec<String>;
    fn objects(&self, namespace: &str) -> Vec<String>;
    /// Definition file that declares the object. Also the asset file counted per map.
    fn object_path(&self, key: &ObjectKey) -> Option<PathBuf>;
    /// Bumped whenever the namespace/object set changes or the project closes.
    fn revision(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKind {
    /// Placement feedback under the pointer; never persisted.
    Preview,
    /// Regular map instance created by the editor.
    Placed,
    /// Instance backed by a persistent world entity; clicks never delete it.
    WorldEntity,
}

impl InstanceKind {
    pub fn is_persistent(self) -> bool {
        !matches!(self, InstanceKind::Preview)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSpec {
    pub layer: String,
    pub cell: IVec2,
    pub object: ObjectKey,
    /// `None` lets the host generate an identifier.
    pub identifier: Option<String>,
    pub kind: InstanceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub id: String,
    pub layer: String,
    pub cell: IVec2,
    pub object: ObjectKey,
    pub rotation: i32,
    pub kind: InstanceKind,
}

/// Map/layer/instance operations exposed by the host engine.
pub trait MapHost: ObjectModel {
    fn active_map(&self) -> Option<String>;
    fn layers(&self, map: &str) -> Vec<String>;
    /// Maps a pointer position to a cell of `layer`, `None` when outside the layer.
    fn cell_at(&self, map: &str, layer: &str, point: Vec2) -> Option<IVec2>;
    fn create_instance(&mut self, map: &str, spec: InstanceSpec) -> Result<InstanceRecord>;
    fn delete_instance(&mut self, map: &str, id: &str) -> Result<InstanceRecord>;
    fn set_rotation(&mut self, map: &str, id: &str, rotation: i32) -> Result<()>;
    fn instance(&self, map: &str, id: &str) -> Option<InstanceRecord>;
    fn instances_at(&self, map: &str, layer: &str, cell: IVec2) -> Vec<InstanceRecord>;
    fn instances(&self, map: &str) -> Vec<InstanceRecord>;
}
