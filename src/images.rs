use crate::atlas::Rect;
use anyhow::{anyhow, bail, Result};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    pub path: PathBuf,
    refs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub texture: String,
    pub rect: Rect,
    refs: usize,
}

/// Named textures and sub-rectangle images, de-duplicated by name and kept alive by
/// reference counts. A texture lives as long as at least one image uses it.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    textures: HashMap<String, TextureInfo>,
    images: HashMap<String, ImageInfo>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain_image(&mut self, name: &str, texture: &str, sheet: &Path, rect: Rect) -> Result<()> {
        if let Some(image) = self.images.get_mut(name) {
            if image.texture != texture {
                bail!("Image '{name}' is already defined on texture '{}', not '{texture}'", image.texture);
            }
            image.refs += 1;
            return Ok(());
        }
        match self.textures.get_mut(texture) {
            Some(existing) if existing.path != sheet => {
                bail!(
                    "Texture '{texture}' already loaded from {}, refusing {}",
                    existing.path.display(),
                    sheet.display()
                );
            }
            Some(existing) => existing.refs += 1,
            None => {
                debug!("[images] defining texture '{texture}' from {}", sheet.display());
                self.textures.insert(texture.to_string(), TextureInfo { path: sheet.to_path_buf(), refs: 1 });
            }
        }
        self.images.insert(name.to_string(), ImageInfo { texture: texture.to_string(), rect, refs: 1 });
        Ok(())
    }

    /// Returns false when the image was not defined.
    pub fn release_image(&mut self, name: &str) -> bool {
        let Some(image) = self.images.get_mut(name) else {
            return false;
        };
        image.refs -= 1;
        if image.refs > 0 {
            return true;
        }
        if let Some(image) = self.images.remove(name) {
            if let Some(texture) = self.textures.get_mut(&image.texture) {
                texture.refs -= 1;
                if texture.refs == 0 {
                    debug!("[images] texture '{}' released", image.texture);
                    self.textures.remove(&image.texture);
                }
            }
        }
        true
    }

    pub fn image(&self, name: &str) -> Option<&ImageInfo> {
        self.images.get(name)
    }

    pub fn texture_of(&self, name: &str) -> Result<&TextureInfo> {
        let image = self.images.get(name).ok_or_else(|| anyhow!("Image '{name}' is not defined"))?;
        self.textures
            .get(&image.texture)
            .ok_or_else(|| anyhow!("Texture '{}' of image '{name}' is missing", image.texture))
    }

    pub fn image_ref_count(&self, name: &str) -> usize {
        self.images.get(name).map(|image| image.refs).unwrap_or(0)
    }

    pub fn texture_ref_count(&self, name: &str) -> usize {
        self.textures.get(name).map(|texture| texture.refs).unwrap_or(0)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.textures.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_outlives_only_while_images_reference_it() {
        let mut registry = ImageRegistry::new();
        let sheet = Path::new("grass.png");
        registry.retain_image("grass.a.0", "grass.png.atlas", sheet, Rect::new(0, 0, 64, 64)).expect("first");
        registry.retain_image("grass.a.1", "grass.png.atlas", sheet, Rect::new(64, 0, 64, 64)).expect("second");
        registry.retain_image("grass.a.1", "grass.png.atlas", sheet, Rect::new(64, 0, 64, 64)).expect("dup");
        assert_eq!(registry.texture_count(), 1);
        assert_eq!(registry.texture_ref_count("grass.png.atlas"), 2);
        assert_eq!(registry.image_ref_count("grass.a.1"), 2);

        assert!(registry.release_image("grass.a.0"));
        assert!(registry.release_image("grass.a.1"));
        assert_eq!(registry.texture_count(), 1);
        assert!(registry.release_image("grass.a.1"));
        assert_eq!(registry.texture_count(), 0);
        assert!(!registry.release_image("grass.a.1"));
    }

    #[test]
    fn conflicting_texture_source_is_rejected() {
        let mut registry = ImageRegistry::new();
        registry.retain_image("a", "sheet", Path::new("one.png"), Rect::new(0, 0, 8, 8)).expect("first");
        assert!(registry.retain_image("b", "sheet", Path::new("two.png"), Rect::new(0, 0, 8, 8)).is_err());
        assert!(registry.retain_image("a", "other", Path::new("one.png"), Rect::new(0, 0, 8, 8)).is_err());
        assert_eq!(registry.texture_of("a").map(|texture| texture.path.clone()).ok(), Some(PathBuf::from("one.png")));
    }
}
