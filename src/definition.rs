//! Object definition files: one JSON document lists the objects it declares, optionally
//! alongside a sibling atlas definition shared by its static images.

use crate::atlas::{self, resolve_relative, AtlasDefinition, AtlasFile, AtlasRegion, SheetLayout};
use crate::model::ObjectKey;
use anyhow::{bail, Context, Result};
use glam::IVec2;
use log::{debug, warn};
use serde::Deserialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type Rotations = SmallVec<[i32; 8]>;

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionFrame {
    pub direction: i32,
    pub frames: Vec<AtlasRegion>,
    /// Per-frame delay; zero for static images.
    pub delay_ms: u32,
    pub offset: IVec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionFrames {
    pub name: String,
    pub directions: Vec<DirectionFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Static { directions: Vec<DirectionFrame> },
    Animated { actions: Vec<ActionFrames> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDescriptor {
    pub key: ObjectKey,
    pub source: PathBuf,
    pub kind: ObjectKind,
}

impl ObjectDescriptor {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, ObjectKind::Static { .. })
    }

    /// Sorted, de-duplicated direction indices usable as rotations.
    pub fn rotations(&self) -> Rotations {
        let mut rotations: Rotations = match &self.kind {
            ObjectKind::Static { directions } => directions.iter().map(|dir| dir.direction).collect(),
            ObjectKind::Animated { actions } => actions
                .iter()
                .flat_map(|action| action.directions.iter().map(|dir| dir.direction))
                .collect(),
        };
        rotations.sort_unstable();
        rotations.dedup();
        rotations
    }

    pub fn frame_count(&self) -> usize {
        match &self.kind {
            ObjectKind::Static { directions } => directions.iter().map(|dir| dir.frames.len()).sum(),
            ObjectKind::Animated { actions } => actions
                .iter()
                .flat_map(|action| action.directions.iter())
                .map(|dir| dir.frames.len())
                .sum(),
        }
    }

    /// First frame of the lowest direction (of the first action for animated objects).
    pub fn preview_frame(&self) -> Option<&AtlasRegion> {
        let first_direction = match &self.kind {
            ObjectKind::Static { directions } => directions.first(),
            ObjectKind::Animated { actions } => actions.first().and_then(|action| action.directions.first()),
        };
        first_direction.and_then(|dir| dir.frames.first())
    }

    pub fn action(&self, name: &str) -> Option<&ActionFrames> {
        match &self.kind {
            ObjectKind::Animated { actions } => actions.iter().find(|action| action.name == name),
            ObjectKind::Static { .. } => None,
        }
    }
}

#[derive(Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    atlas: Option<AtlasRef>,
    objects: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AtlasRef {
    Path(String),
    Inline(AtlasFile),
}

#[derive(Deserialize)]
struct ObjectHeader {
    namespace: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct ObjectFile {
    namespace: String,
    id: String,
    #[serde(rename = "static")]
    is_static: bool,
    #[serde(default)]
    images: Vec<ImageFile>,
    #[serde(default)]
    actions: Vec<ActionFile>,
}

#[derive(Debug, Deserialize)]
struct ImageFile {
    direction: i32,
    source: String,
}

#[derive(Debug, Deserialize)]
struct ActionFile {
    id: String,
    #[serde(default)]
    animations: Vec<AnimationFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnimationFile {
    Atlas {
        atlas: String,
        width: u32,
        height: u32,
        directions: Vec<AtlasDirectionFile>,
    },
    External {
        direction: i32,
        source: String,
    },
    Frames {
        direction: i32,
        #[serde(default = "default_delay_ms")]
        delay: u32,
        frames: Vec<String>,
        #[serde(default)]
        x_offset: i32,
        #[serde(default)]
        y_offset: i32,
    },
}

#[derive(Debug, Deserialize)]
struct AtlasDirectionFile {
    dir: i32,
    frames: u32,
    #[serde(default = "default_delay_ms")]
    delay: u32,
}

#[derive(Debug, Deserialize)]
struct AnimationSourceFile {
    #[serde(default = "default_delay_ms")]
    delay: u32,
    frames: Vec<String>,
    #[serde(default)]
    x_offset: i32,
    #[serde(default)]
    y_offset: i32,
}

const fn default_delay_ms() -> u32 {
    100
}

fn read_definition(path: &Path) -> Result<DefinitionFile> {
    let bytes = fs::read(path).with_context(|| format!("Reading definition {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Parsing definition {}", path.display()))
}

fn base_dir_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Identities declared by a definition file, without resolving any image.
pub fn declared_keys(path: &Path) -> Result<Vec<ObjectKey>> {
    let file = read_definition(path)?;
    let mut keys = Vec::with_capacity(file.objects.len());
    for (index, raw) in file.objects.into_iter().enumerate() {
        match serde_json::from_value::<ObjectHeader>(raw) {
            Ok(header) => keys.push(ObjectKey::new(header.namespace, header.id)),
            Err(err) => warn!("[definition] {}: object #{index} has no identity: {err}", path.display()),
        }
    }
    Ok(keys)
}

/// Parses and resolves every object of a definition file. Malformed objects are skipped
/// individually; only an unreadable file or root fails the whole parse.
pub fn parse_file(path: &Path) -> Result<Vec<ObjectDescriptor>> {
    let file = read_definition(path)?;
    let base_dir = base_dir_of(path);
    let atlas = load_sibling_atlas(path, &base_dir, file.atlas);
    let mut descriptors = Vec::with_capacity(file.objects.len());
    for (index, raw) in file.objects.into_iter().enumerate() {
        let object: ObjectFile = match serde_json::from_value(raw) {
            Ok(object) => object,
            Err(err) => {
                warn!("[definition] {}: object #{index} is malformed, skipping: {err}", path.display());
                continue;
            }
        };
        let key = ObjectKey::new(object.namespace.clone(), object.id.clone());
        match build_object(path, &base_dir, atlas.as_ref(), object) {
            Ok(Some(descriptor)) => descriptors.push(descriptor),
            Ok(None) => warn!("[definition] {}: '{key}' resolved no frames, dropping it", path.display()),
            Err(err) => warn!("[definition] {}: skipping '{key}': {err:#}", path.display()),
        }
    }
    debug!("[definition] {}: {} object(s) resolved", path.display(), descriptors.len());
    Ok(descriptors)
}

fn load_sibling_atlas(path: &Path, base_dir: &Path, atlas: Option<AtlasRef>) -> Option<AtlasDefinition> {
    match atlas? {
        AtlasRef::Inline(file) => {
            let fallback = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("atlas").to_string();
            Some(AtlasDefinition::from_file(file, base_dir, fallback))
        }
        AtlasRef::Path(relative) => {
            let atlas_path = resolve_relative(base_dir, &relative);
            match AtlasDefinition::load(&atlas_path) {
                Ok(atlas) => Some(atlas),
                Err(err) => {
                    warn!("[definition] {}: sibling atlas unavailable: {err:#}", path.display());
                    None
                }
            }
        }
    }
}

fn build_object(
    path: &Path,
    base_dir: &Path,
    atlas: Option<&AtlasDefinition>,
    object: ObjectFile,
) -> Result<Option<ObjectDescriptor>> {
    let key = ObjectKey::new(object.namespace, object.id);
    let kind = if object.is_static {
        let directions = resolve_static_images(&key, base_dir, atlas, &object.images);
        if directions.is_empty() {
            return Ok(None);
        }
        ObjectKind::Static { directions }
    } else {
        let actions = resolve_actions(&key, base_dir, &object.actions)?;
        if actions.is_empty() {
            return Ok(None);
        }
        ObjectKind::Animated { actions }
    };
    Ok(Some(ObjectDescriptor { key, source: path.to_path_buf(), kind }))
}

fn upsert_direction(directions: &mut Vec<DirectionFrame>, frame: DirectionFrame) {
    match directions.iter_mut().find(|existing| existing.direction == frame.direction) {
        Some(existing) => *existing = frame,
        None => directions.push(frame),
    }
}

fn resolve_static_images(
    key: &ObjectKey,
    base_dir: &Path,
    atlas: Option<&AtlasDefinition>,
    images: &[ImageFile],
) -> Vec<DirectionFrame> {
    let mut directions = Vec::with_capacity(images.len());
    for image in images {
        let region = match atlas.filter(|atlas| atlas.contains(&image.source)) {
            Some(atlas) => atlas.region(&image.source),
            None => atlas::loose_region(&resolve_relative(base_dir, &image.source)),
        };
        let region = match region {
            Ok(region) => region,
            Err(err) => {
                warn!("[definition] '{key}': direction {} skipped: {err:#}", image.direction);
                continue;
            }
        };
        upsert_direction(
            &mut directions,
            DirectionFrame { direction: image.direction, frames: vec![region], delay_ms: 0, offset: IVec2::ZERO },
        );
    }
    directions.sort_by_key(|dir| dir.direction);
    directions
}

fn resolve_actions(key: &ObjectKey, base_dir: &Path, actions: &[ActionFile]) -> Result<Vec<ActionFrames>> {
    // Frame indices run in declaration order per sheet, shared by every animation of the object.
    let mut sheet_counters: HashMap<PathBuf, u32> = HashMap::new();
    let mut resolved: Vec<ActionFrames> = Vec::with_capacity(actions.len());
    for action in actions {
        if action.animations.is_empty() {
            bail!("action '{}' declares no animations", action.id);
        }
        let mut directions = Vec::new();
        for animation in &action.animations {
            match animation {
                AnimationFile::Frames { direction, delay, frames, x_offset, y_offset } => {
                    let offset = IVec2::new(*x_offset, *y_offset);
                    if let Some(frame) =
                        resolve_frame_list(key, &action.id, base_dir, *direction, *delay, frames, offset)
                    {
                        upsert_direction(&mut directions, frame);
                    }
                }
                AnimationFile::External { direction, source } => {
                    let source_path = resolve_relative(base_dir, source);
                    match load_animation_source(&source_path) {
                        Ok(file) => {
                            let offset = IVec2::new(file.x_offset, file.y_offset);
                            let source_dir = base_dir_of(&source_path);
                            if let Some(frame) = resolve_frame_list(
                                key,
                                &action.id,
                                &source_dir,
                                *direction,
                                file.delay,
                                &file.frames,
                                offset,
                            ) {
                                upsert_direction(&mut directions, frame);
                            }
                        }
                        Err(err) => warn!(
                            "[definition] '{key}': action '{}' direction {direction} skipped: {err:#}",
                            action.id
                        ),
                    }
                }
                AnimationFile::Atlas { atlas, width, height, directions: atlas_directions } => {
                    let sheet = resolve_relative(base_dir, atlas);
                    let (sheet_width, sheet_height) = match image::image_dimensions(&sheet) {
                        Ok(size) => size,
                        Err(err) => {
                            warn!(
                                "[definition] '{key}': action '{}' sheet {} unavailable: {err}",
                                action.id,
                                sheet.display()
                            );
                            continue;
                        }
                    };
                    let layout = SheetLayout::new(sheet, sheet_width, sheet_height, *width, *height)
                        .with_context(|| format!("action '{}'", action.id))?;
                    let counter = sheet_counters.entry(layout.sheet.clone()).or_insert(0);
                    let capacity = layout.capacity();
                    for atlas_direction in atlas_directions {
                        let available = capacity.saturating_sub(*counter);
                        let wanted = atlas_direction.frames.min(available);
                        let mut frames = Vec::with_capacity(wanted as usize);
                        for _ in 0..wanted {
                            let index = *counter;
                            *counter = counter.saturating_add(1);
                            match layout.region(index) {
                                Some(region) => frames.push(region),
                                None => warn!(
                                    "[definition] '{key}': frame {index} lies outside sheet {}, skipping frame",
                                    layout.sheet.display()
                                ),
                            }
                        }
                        if atlas_direction.frames > wanted {
                            warn!(
                                "[definition] '{key}': direction {} drops {} frame(s) past the end of sheet {}",
                                atlas_direction.dir,
                                atlas_direction.frames - wanted,
                                layout.sheet.display()
                            );
                            *counter = capacity;
                        }
                        if frames.is_empty() {
                            continue;
                        }
                        upsert_direction(
                            &mut directions,
                            DirectionFrame {
                                direction: atlas_direction.dir,
                                frames,
                                delay_ms: atlas_direction.delay,
                                offset: IVec2::ZERO,
                            },
                        );
                    }
                }
            }
        }
        if directions.is_empty() {
            warn!("[definition] '{key}': action '{}' resolved no frames, skipping action", action.id);
            continue;
        }
        directions.sort_by_key(|dir| dir.direction);
        let frames = ActionFrames { name: action.id.clone(), directions };
        match resolved.iter_mut().find(|existing| existing.name == frames.name) {
            Some(existing) => *existing = frames,
            None => resolved.push(frames),
        }
    }
    Ok(resolved)
}

fn load_animation_source(path: &Path) -> Result<AnimationSourceFile> {
    let bytes = fs::read(path).with_context(|| format!("Reading animation {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Parsing animation {}", path.display()))
}

fn resolve_frame_list(
    key: &ObjectKey,
    action: &str,
    base_dir: &Path,
    direction: i32,
    delay_ms: u32,
    frames: &[String],
    offset: IVec2,
) -> Option<DirectionFrame> {
    let mut regions = Vec::with_capacity(frames.len());
    for frame in frames {
        match atlas::loose_region(&resolve_relative(base_dir, frame)) {
            Ok(region) => regions.push(region),
            Err(err) => warn!("[definition] '{key}': action '{action}' frame skipped: {err:#}"),
        }
    }
    if regions.is_empty() {
        warn!("[definition] '{key}': action '{action}' direction {direction} has no frames");
        return None;
    }
    Some(DirectionFrame { direction, frames: regions, delay_ms, offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::Rect;

    fn frame(direction: i32, x: u32) -> DirectionFrame {
        DirectionFrame {
            direction,
            frames: vec![AtlasRegion::packed("sheet.png", Rect::new(x, 0, 16, 16))],
            delay_ms: 100,
            offset: IVec2::ZERO,
        }
    }

    #[test]
    fn animated_rotations_merge_all_actions() {
        let descriptor = ObjectDescriptor {
            key: ObjectKey::new("people", "guard"),
            source: PathBuf::from("guard.json"),
            kind: ObjectKind::Animated {
                actions: vec![
                    ActionFrames { name: "walk".into(), directions: vec![frame(90, 0), frame(270, 16)] },
                    ActionFrames { name: "idle".into(), directions: vec![frame(0, 32), frame(90, 48)] },
                ],
            },
        };
        assert_eq!(descriptor.rotations().as_slice(), &[0, 90, 270]);
        assert_eq!(descriptor.frame_count(), 4);
        assert_eq!(descriptor.preview_frame().map(|region| region.rect.x), Some(0));
        assert!(descriptor.action("idle").is_some());
        assert!(!descriptor.is_static());
    }

    #[test]
    fn malformed_root_fails_whole_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.json");
        fs::write(&path, br#"{ "objects": 3 }"#).expect("write");
        assert!(parse_file(&path).is_err());
        assert!(declared_keys(&path).is_err());
    }
}
