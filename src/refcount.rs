use crate::model::{InstanceKind, MapHost};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Live-instance count per imported asset file, scoped per map. Missing entries count as zero.
#[derive(Debug, Default, Clone)]
pub struct ImportRefCounts {
    maps: HashMap<String, HashMap<PathBuf, usize>>,
}

impl ImportRefCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increase(&mut self, map: &str, file: &Path) -> usize {
        let count = self.maps.entry(map.to_string()).or_default().entry(file.to_path_buf()).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns the remaining count, or `None` when the pair was not referenced.
    pub fn decrease(&mut self, map: &str, file: &Path) -> Option<usize> {
        let Some(files) = self.maps.get_mut(map) else {
            debug!("[refcount] release on unknown map '{map}' ignored");
            return None;
        };
        let Some(count) = files.get_mut(file) else {
            debug!("[refcount] release of unreferenced '{}' on '{map}' ignored", file.display());
            return None;
        };
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            files.remove(file);
            if files.is_empty() {
                self.maps.remove(map);
            }
        }
        Some(remaining)
    }

    pub fn count(&self, map: &str, file: &Path) -> usize {
        self.maps.get(map).and_then(|files| files.get(file)).copied().unwrap_or(0)
    }

    pub fn is_referenced(&self, map: &str, file: &Path) -> bool {
        self.count(map, file) > 0
    }

    pub fn files(&self, map: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> =
            self.maps.get(map).map(|files| files.keys().cloned().collect()).unwrap_or_default();
        files.sort();
        files
    }

    pub fn clear_map(&mut self, map: &str) {
        self.maps.remove(map);
    }

    /// Recounts a freshly loaded map from the instances it already contains.
    pub fn seed_from_map<H: MapHost + ?Sized>(&mut self, host: &H, map: &str) {
        self.clear_map(map);
        for instance in host.instances(map) {
            if instance.kind == InstanceKind::Preview {
                continue;
            }
            if let Some(file) = host.object_path(&instance.object) {
                self.increase(map, &file);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_increase_and_decrease_prunes_entry() {
        let mut refs = ImportRefCounts::new();
        let file = Path::new("objects/tree.json");
        for expected in 1..=3 {
            assert_eq!(refs.increase("forest", file), expected);
        }
        assert_eq!(refs.decrease("forest", file), Some(2));
        assert_eq!(refs.decrease("forest", file), Some(1));
        assert_eq!(refs.decrease("forest", file), Some(0));
        assert_eq!(refs.count("forest", file), 0);
        assert!(refs.files("forest").is_empty());
    }

    #[test]
    fn decrease_on_unknown_pair_is_ignored() {
        let mut refs = ImportRefCounts::new();
        let file = Path::new("objects/rock.json");
        assert_eq!(refs.decrease("forest", file), None);
        refs.increase("forest", file);
        assert_eq!(refs.decrease("forest", Path::new("objects/other.json")), None);
        assert_eq!(refs.decrease("desert", file), None);
        assert_eq!(refs.count("forest", file), 1);
    }

    #[test]
    fn counts_are_scoped_per_map() {
        let mut refs = ImportRefCounts::new();
        let file = Path::new("objects/tree.json");
        refs.increase("forest", file);
        refs.increase("desert", file);
        refs.decrease("forest", file);
        assert!(!refs.is_referenced("forest", file));
        assert!(refs.is_referenced("desert", file));
    }
}
