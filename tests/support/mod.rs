#![allow(dead_code)]

use glam::Vec2;
use kestrel_catalog::config::CatalogConfig;
use kestrel_catalog::scene::{EditorScene, LayerInfo};
use kestrel_catalog::{CatalogPipeline, ObjectToolbar, TickReport};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub const CELL: f32 = 32.0;

pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create image dir");
    }
    image::RgbaImage::new(width, height).save(path).expect("write png");
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create json dir");
    }
    fs::write(path, serde_json::to_vec_pretty(value).expect("encode json")).expect("write json");
}

/// `forest.tree.01` (static, four directions) and `forest.grass.a` (4 frames on a 256x64 sheet).
pub fn write_forest_definitions(dir: &Path) -> PathBuf {
    for direction in [0, 90, 180, 270] {
        write_png(&dir.join(format!("tree/{direction}.png")), 32, 48);
    }
    write_png(&dir.join("grass.png"), 256, 64);
    let path = dir.join("forest.json");
    write_json(
        &path,
        &json!({
            "objects": [
                { "namespace": "forest", "id": "tree.01", "static": true,
                  "images": [
                      { "direction": 0, "source": "tree/0.png" },
                      { "direction": 90, "source": "tree/90.png" },
                      { "direction": 180, "source": "tree/180.png" },
                      { "direction": 270, "source": "tree/270.png" } ] },
                { "namespace": "forest", "id": "grass.a", "static": false,
                  "actions": [ { "id": "sway", "animations": [
                      { "atlas": "grass.png", "width": 64, "height": 64,
                        "directions": [ { "dir": 0, "frames": 4, "delay": 120 } ] } ] } ] }
            ]
        }),
    );
    path
}

pub fn write_rock_definitions(dir: &Path) -> PathBuf {
    write_png(&dir.join("rock.png"), 16, 16);
    let path = dir.join("rocks.json");
    write_json(
        &path,
        &json!({
            "objects": [
                { "namespace": "rocks", "id": "boulder", "static": true,
                  "images": [ { "direction": 0, "source": "rock.png" } ] }
            ]
        }),
    );
    path
}

pub fn meadow_layers() -> Vec<LayerInfo> {
    vec![LayerInfo::new("ground", 10, 10, CELL), LayerInfo::new("decor", 10, 10, CELL)]
}

pub fn forest_scene(dir: &Path) -> (EditorScene, PathBuf) {
    let definitions = write_forest_definitions(dir);
    let mut scene = EditorScene::new();
    scene.import_file(&definitions).expect("import forest");
    scene.add_map("meadow", meadow_layers()).expect("add meadow");
    (scene, definitions)
}

pub fn test_config() -> CatalogConfig {
    let mut config = CatalogConfig::default();
    config.watch.enabled = false;
    config
}

pub fn cell_point(x: i32, y: i32) -> Vec2 {
    Vec2::new((x as f32 + 0.5) * CELL, (y as f32 + 0.5) * CELL)
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(10)
}

pub fn drive_pipeline(pipeline: &mut CatalogPipeline, scene: &EditorScene) -> Vec<TickReport> {
    let until = deadline();
    let mut reports = Vec::new();
    loop {
        let map = kestrel_catalog::MapHost::active_map(scene);
        reports.push(pipeline.update_contents(scene, map.as_deref()));
        if pipeline.is_idle() {
            return reports;
        }
        assert!(Instant::now() < until, "catalog scan did not settle");
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn drive_toolbar(toolbar: &mut ObjectToolbar, scene: &mut EditorScene) -> Vec<TickReport> {
    let until = deadline();
    let mut reports = Vec::new();
    loop {
        reports.push(toolbar.update_contents(scene));
        if toolbar.catalog().is_idle() {
            return reports;
        }
        assert!(Instant::now() < until, "catalog scan did not settle");
        thread::sleep(Duration::from_millis(1));
    }
}
