mod support;

use kestrel_catalog::atlas::{frame_rect, frames_per_row, AtlasDefinition, Rect, RegionKind};
use kestrel_catalog::definition::{parse_file, ObjectDescriptor, ObjectKind};
use serde_json::json;
use support::{write_forest_definitions, write_json, write_png};

fn find<'a>(descriptors: &'a [ObjectDescriptor], id: &str) -> &'a ObjectDescriptor {
    descriptors.iter().find(|descriptor| descriptor.key.id == id).expect("descriptor present")
}

#[test]
fn grass_frames_follow_row_major_layout() {
    let dir = tempfile::tempdir().expect("temp dir");
    let definitions = write_forest_definitions(dir.path());
    let descriptors = parse_file(&definitions).expect("parse forest");
    let grass = find(&descriptors, "grass.a");
    let sway = grass.action("sway").expect("sway action");
    assert_eq!(sway.directions.len(), 1);
    let direction = &sway.directions[0];
    assert_eq!(direction.delay_ms, 120);
    let rects: Vec<Rect> = direction.frames.iter().map(|region| region.rect).collect();
    assert_eq!(
        rects,
        vec![Rect::new(0, 0, 64, 64), Rect::new(64, 0, 64, 64), Rect::new(128, 0, 64, 64), Rect::new(192, 0, 64, 64)]
    );
    assert!(direction.frames.iter().all(|region| region.kind == RegionKind::Packed));
}

#[test]
fn frame_indices_continue_across_directions_and_stay_inside_sheet() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_png(&dir.path().join("walk.png"), 100, 70);
    let path = dir.path().join("walker.json");
    write_json(
        &path,
        &json!({ "objects": [
            { "namespace": "people", "id": "walker", "static": false,
              "actions": [ { "id": "walk", "animations": [
                  { "atlas": "walk.png", "width": 32, "height": 32,
                    "directions": [ { "dir": 0, "frames": 2 }, { "dir": 90, "frames": 6 } ] } ] } ] } ] }),
    );
    let descriptors = parse_file(&path).expect("parse walker");
    let walker = find(&descriptors, "walker");
    let ObjectKind::Animated { actions } = &walker.kind else {
        panic!("walker should be animated");
    };
    let walk = &actions[0];
    assert_eq!(walk.directions[0].frames.len(), 2);
    // 3 cells per row, 2 rows: indices 6 and 7 fall outside the sheet.
    let east = &walk.directions[1];
    assert_eq!(east.frames.len(), 4);
    assert_eq!(east.frames[0].rect, Rect::new(64, 0, 32, 32));
    assert_eq!(east.frames[1].rect, Rect::new(0, 32, 32, 32));
    for region in walk.directions.iter().flat_map(|direction| direction.frames.iter()) {
        assert!(region.rect.right() <= 100 && region.rect.bottom() <= 70, "{:?} escapes the sheet", region.rect);
    }
    assert_eq!(walker.rotations().as_slice(), &[0, 90]);
}

#[test]
fn static_images_resolve_through_sibling_atlas() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_png(&dir.path().join("sheets/trees.png"), 128, 64);
    write_png(&dir.path().join("stump.png"), 20, 10);
    write_json(
        &dir.path().join("sheets/trees.atlas.json"),
        &json!({ "image": "trees.png", "width": 128, "height": 64,
                 "regions": { "oak_s": { "x": 0, "y": 0, "w": 64, "h": 64 },
                              "oak_n": { "x": 64, "y": 0, "w": 64, "h": 64 } } }),
    );
    let path = dir.path().join("trees.json");
    write_json(
        &path,
        &json!({ "atlas": "sheets/trees.atlas.json",
                 "objects": [ { "namespace": "forest", "id": "oak", "static": true,
                                "images": [ { "direction": 180, "source": "oak_n" },
                                            { "direction": 0, "source": "oak_s" },
                                            { "direction": 90, "source": "stump.png" } ] } ] }),
    );
    let descriptors = parse_file(&path).expect("parse trees");
    let oak = find(&descriptors, "oak");
    let ObjectKind::Static { directions } = &oak.kind else {
        panic!("oak should be static");
    };
    let order: Vec<i32> = directions.iter().map(|direction| direction.direction).collect();
    assert_eq!(order, vec![0, 90, 180]);
    assert_eq!(directions[0].frames[0].rect, Rect::new(0, 0, 64, 64));
    assert_eq!(directions[0].frames[0].sheet, dir.path().join("sheets").join("trees.png"));
    assert_eq!(directions[1].frames[0].kind, RegionKind::Loose);
    assert_eq!(directions[1].frames[0].rect, Rect::new(0, 0, 20, 10));
    assert_eq!(directions[2].frames[0].rect, Rect::new(64, 0, 64, 64));

    let atlas = AtlasDefinition::load(&dir.path().join("sheets/trees.atlas.json")).expect("load atlas");
    assert_eq!(atlas.name, "trees.atlas");
    assert_eq!(atlas.region_names(), vec!["oak_n".to_string(), "oak_s".to_string()]);
}

#[test]
fn truncating_division_drops_partial_cells() {
    assert_eq!(frames_per_row(256, 64), 4);
    assert_eq!(frames_per_row(255, 64), 3);
    assert_eq!(frames_per_row(63, 64), 0);
    assert_eq!(frame_rect(4, 4, 64, 64), Rect::new(0, 64, 64, 64));
}

#[test]
fn oversized_frame_count_keeps_only_cells_on_the_sheet() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_png(&dir.path().join("spark.png"), 64, 64);
    let path = dir.path().join("spark.json");
    write_json(
        &path,
        &json!({ "objects": [
            { "namespace": "fx", "id": "spark", "static": false,
              "actions": [ { "id": "burst", "animations": [
                  { "atlas": "spark.png", "width": 64, "height": 64,
                    "directions": [ { "dir": 0, "frames": 70000000 }, { "dir": 90, "frames": 3 } ] } ] } ] } ] }),
    );
    let descriptors = parse_file(&path).expect("parse spark");
    let spark = find(&descriptors, "spark");
    let burst = spark.action("burst").expect("burst action");
    assert_eq!(burst.directions.len(), 1, "the sheet is used up by the first direction");
    assert_eq!(burst.directions[0].frames.len(), 1);
    assert_eq!(burst.directions[0].frames[0].rect, Rect::new(0, 0, 64, 64));
}
