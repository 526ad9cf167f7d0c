use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.w > 0 && self.h > 0 && self.right() <= width && self.bottom() <= height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Sub-rectangle of a packed sheet.
    Packed,
    /// Dedicated image; the rectangle covers the whole file.
    Loose,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtlasRegion {
    pub sheet: PathBuf,
    pub rect: Rect,
    pub kind: RegionKind,
}

impl AtlasRegion {
    pub fn packed(sheet: impl Into<PathBuf>, rect: Rect) -> Self {
        Self { sheet: sheet.into(), rect, kind: RegionKind::Packed }
    }

    pub fn loose(image: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self { sheet: image.into(), rect: Rect::new(0, 0, width, height), kind: RegionKind::Loose }
    }
}

/// Number of whole cells that fit on one row of the sheet.
pub fn frames_per_row(sheet_width: u32, cell_width: u32) -> u32 {
    if cell_width == 0 {
        0
    } else {
        sheet_width / cell_width
    }
}

/// Rectangle of the `frame_index`-th cell of a row-major sheet. `frames_per_row` must be non-zero.
/// Coordinates saturate, so a cell past `u32` space never fits any sheet.
pub fn frame_rect(frame_index: u32, frames_per_row: u32, cell_width: u32, cell_height: u32) -> Rect {
    debug_assert!(frames_per_row > 0, "frames_per_row must be non-zero");
    let per_row = frames_per_row.max(1);
    let row = frame_index / per_row;
    let col = frame_index % per_row;
    Rect::new(col.saturating_mul(cell_width), row.saturating_mul(cell_height), cell_width, cell_height)
}

/// Cell grid of a packed sheet used by atlas-backed animations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub sheet: PathBuf,
    pub sheet_width: u32,
    pub sheet_height: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub frames_per_row: u32,
}

impl SheetLayout {
    pub fn new(
        sheet: impl Into<PathBuf>,
        sheet_width: u32,
        sheet_height: u32,
        cell_width: u32,
        cell_height: u32,
    ) -> Result<Self> {
        let sheet = sheet.into();
        if cell_width == 0 || cell_height == 0 {
            bail!("Sheet '{}' declares an empty cell size {cell_width}x{cell_height}", sheet.display());
        }
        let per_row = frames_per_row(sheet_width, cell_width);
        if per_row == 0 || cell_height > sheet_height {
            bail!(
                "Cell {cell_width}x{cell_height} does not fit sheet '{}' ({sheet_width}x{sheet_height})",
                sheet.display()
            );
        }
        Ok(Self { sheet, sheet_width, sheet_height, cell_width, cell_height, frames_per_row: per_row })
    }

    pub fn rows(&self) -> u32 {
        self.sheet_height / self.cell_height
    }

    pub fn capacity(&self) -> u32 {
        self.frames_per_row.saturating_mul(self.rows())
    }

    /// Region for a frame index, or `None` when the cell falls outside the sheet.
    pub fn region(&self, frame_index: u32) -> Option<AtlasRegion> {
        let rect = frame_rect(frame_index, self.frames_per_row, self.cell_width, self.cell_height);
        rect.fits_within(self.sheet_width, self.sheet_height)
            .then(|| AtlasRegion::packed(self.sheet.clone(), rect))
    }
}

/// Reads a loose image header and returns its whole-image region.
pub fn loose_region(image: &Path) -> Result<AtlasRegion> {
    let (width, height) =
        image::image_dimensions(image).with_context(|| format!("Reading image {}", image.display()))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("Image {} is empty", image.display()));
    }
    Ok(AtlasRegion::loose(image, width, height))
}

pub(crate) fn resolve_relative(base_dir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AtlasFile {
    #[serde(default)]
    name: Option<String>,
    image: String,
    width: u32,
    height: u32,
    #[serde(default)]
    regions: HashMap<String, Rect>,
}

/// Sibling atlas definition mapping sub-image ids to rectangles of one sheet.
#[derive(Debug, Clone)]
pub struct AtlasDefinition {
    pub name: String,
    pub image_path: PathBuf,
    pub width: u32,
    pub height: u32,
    regions: HashMap<String, Rect>,
}

impl AtlasDefinition {
    pub fn load(json_path: &Path) -> Result<Self> {
        let bytes = fs::read(json_path).with_context(|| format!("Reading atlas {}", json_path.display()))?;
        let file: AtlasFile =
            serde_json::from_slice(&bytes).with_context(|| format!("Parsing atlas {}", json_path.display()))?;
        let base_dir = json_path.parent().unwrap_or_else(|| Path::new(""));
        let fallback = json_path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("atlas").to_string();
        Ok(Self::from_file(file, base_dir, fallback))
    }

    pub(crate) fn from_file(file: AtlasFile, base_dir: &Path, fallback_name: String) -> Self {
        Self {
            name: file.name.unwrap_or(fallback_name),
            image_path: resolve_relative(base_dir, &file.image),
            width: file.width,
            height: file.height,
            regions: file.regions,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.regions.contains_key(id)
    }

    /// Packed region for a sub-image id. Rectangles outside the declared sheet size are rejected.
    pub fn region(&self, id: &str) -> Result<AtlasRegion> {
        let rect = self
            .regions
            .get(id)
            .ok_or_else(|| anyhow!("region '{id}' not found in atlas '{}'", self.name))?;
        if !rect.fits_within(self.width, self.height) {
            bail!(
                "region '{id}' ({}, {}, {}, {}) lies outside atlas '{}' ({}x{})",
                rect.x,
                rect.y,
                rect.w,
                rect.h,
                self.name,
                self.width,
                self.height
            );
        }
        Ok(AtlasRegion::packed(self.image_path.clone(), *rect))
    }

    pub fn region_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.regions.keys().cloned().collect();
        names.sort();
        names
    }
}
