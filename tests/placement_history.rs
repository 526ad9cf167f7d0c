mod support;

use glam::IVec2;
use kestrel_catalog::events::{EditorEvent, EditorListener, Key, Modifiers, PointerButton, SubscriberId};
use kestrel_catalog::history::{CreateInstance, EditContext, HistoryOutcome, UndoManager};
use kestrel_catalog::model::{InstanceKind, InstanceRecord};
use kestrel_catalog::placement::PlacementOutcome;
use kestrel_catalog::refcount::ImportRefCounts;
use kestrel_catalog::scene::EditorScene;
use kestrel_catalog::toolbar::ToolbarResponse;
use kestrel_catalog::{MapHost, ObjectKey, ObjectToolbar};
use std::path::PathBuf;
use support::{cell_point, drive_toolbar, forest_scene, test_config};

const TOOLBAR: SubscriberId = SubscriberId(1);

struct Fixture {
    _dir: tempfile::TempDir,
    scene: EditorScene,
    definitions: PathBuf,
    listener: EditorListener,
    toolbar: ObjectToolbar,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut scene, definitions) = forest_scene(dir.path());
    let mut listener = EditorListener::new();
    let mut toolbar = ObjectToolbar::new(TOOLBAR, &test_config()).expect("toolbar");
    toolbar.activate(&mut listener, &mut scene);
    drive_toolbar(&mut toolbar, &mut scene);
    Fixture { _dir: dir, scene, definitions, listener, toolbar }
}

fn tree() -> ObjectKey {
    ObjectKey::new("forest", "tree.01")
}

fn placed(scene: &EditorScene) -> Vec<InstanceRecord> {
    scene.instances("meadow").into_iter().filter(|record| record.kind == InstanceKind::Placed).collect()
}

fn previews(scene: &EditorScene) -> Vec<InstanceRecord> {
    scene.instances("meadow").into_iter().filter(|record| record.kind == InstanceKind::Preview).collect()
}

fn click(fx: &mut Fixture, x: i32, y: i32, button: PointerButton) -> PlacementOutcome {
    let event = EditorEvent::MousePressed { point: cell_point(x, y), button };
    match fx.toolbar.handle_event(&mut fx.scene, event).expect("click") {
        ToolbarResponse::Placement(outcome) => outcome,
        other => panic!("unexpected response {other:?}"),
    }
}

fn key(fx: &mut Fixture, key: Key, modifiers: Modifiers) -> ToolbarResponse {
    fx.toolbar.handle_event(&mut fx.scene, EditorEvent::KeyPressed { key, modifiers }).expect("key")
}

#[test]
fn catalog_items_follow_published_entries() {
    let fx = fixture();
    let keys: Vec<ObjectKey> = fx.toolbar.items().iter().map(|item| item.key.clone()).collect();
    assert_eq!(keys, vec![ObjectKey::new("forest", "grass.a"), tree()]);
    assert_eq!(fx.toolbar.layers(), &["ground".to_string(), "decor".to_string()]);
    assert_eq!(fx.toolbar.placement().layer(), Some("ground"));
}

#[test]
fn preview_follows_pointer_between_cells() {
    let mut fx = fixture();
    fx.toolbar.item_clicked(&mut fx.scene, &tree()).expect("select tree");
    assert!(fx.toolbar.items().iter().any(|item| item.key == tree() && (item.alpha - 1.0).abs() < f32::EPSILON));

    fx.listener.push(EditorEvent::MouseMoved { point: cell_point(3, 4) });
    fx.listener.push(EditorEvent::MouseMoved { point: cell_point(3, 4) });
    fx.listener.push(EditorEvent::MouseMoved { point: cell_point(3, 5) });
    fx.toolbar.dispatch(&mut fx.listener, &mut fx.scene);

    let ghosts = previews(&fx.scene);
    assert_eq!(ghosts.len(), 1);
    assert_eq!(ghosts[0].cell, IVec2::new(3, 5));
    assert_eq!(fx.toolbar.placement().preview().map(|preview| preview.cell), Some(IVec2::new(3, 5)));
    assert!(fx.toolbar.refs().files("meadow").is_empty(), "previews are never counted");
    assert!(!fx.toolbar.history().can_undo(), "previews are never recorded");

    fx.toolbar.deactivate(&mut fx.listener, &mut fx.scene);
    assert!(previews(&fx.scene).is_empty());
    assert!(fx.toolbar.placement().selected().is_none());
    assert!(fx.toolbar.items().iter().all(|item| (item.alpha - 0.75).abs() < f32::EPSILON));
}

#[test]
fn rotating_through_every_direction_returns_to_start() {
    let mut fx = fixture();
    fx.toolbar.item_clicked(&mut fx.scene, &tree()).expect("select tree");
    let start = fx.toolbar.placement().rotation_index();
    assert_eq!(fx.toolbar.placement().current_rotation(), Some(0));
    fx.toolbar.handle_event(&mut fx.scene, EditorEvent::MouseMoved { point: cell_point(1, 1) }).expect("move");

    let mut seen = Vec::new();
    for _ in 0..4 {
        match key(&mut fx, Key::Char('r'), Modifiers::empty()) {
            ToolbarResponse::Rotated(rotation) => seen.push(rotation),
            other => panic!("unexpected response {other:?}"),
        }
    }
    assert_eq!(seen, vec![Some(90), Some(180), Some(270), Some(0)]);
    assert_eq!(fx.toolbar.placement().rotation_index(), start);
    let ghosts = previews(&fx.scene);
    assert_eq!(ghosts.len(), 1, "rotation rebuilds the single preview");
    assert_eq!(ghosts[0].rotation, 0);
}

#[test]
fn create_undo_redo_restores_identical_instance() {
    let mut fx = fixture();
    fx.toolbar.item_clicked(&mut fx.scene, &tree()).expect("select tree");
    key(&mut fx, Key::Char('r'), Modifiers::empty());

    let PlacementOutcome::Placed { instance, removed } = click(&mut fx, 2, 6, PointerButton::Left) else {
        panic!("tree should be placed");
    };
    assert_eq!(removed, 0);
    let created = fx.scene.instance("meadow", &instance).expect("instance exists");
    assert_eq!(created.rotation, 90);
    assert_eq!(fx.toolbar.refs().count("meadow", &fx.definitions), 1);

    assert_eq!(key(&mut fx, Key::Char('z'), Modifiers::CTRL), ToolbarResponse::History(HistoryOutcome::Applied));
    assert!(fx.scene.instance("meadow", &instance).is_none());
    assert_eq!(fx.toolbar.refs().count("meadow", &fx.definitions), 0);

    assert_eq!(key(&mut fx, Key::Char('y'), Modifiers::CTRL), ToolbarResponse::History(HistoryOutcome::Applied));
    let restored = fx.scene.instance("meadow", &instance).expect("instance restored");
    assert_eq!(restored, created);
    assert_eq!(fx.toolbar.refs().count("meadow", &fx.definitions), 1);

    assert_eq!(
        key(&mut fx, Key::Char('z'), Modifiers::CTRL | Modifiers::SHIFT),
        ToolbarResponse::History(HistoryOutcome::NothingToRedo)
    );
}

#[test]
fn clicking_occupied_cell_replaces_as_one_action() {
    let mut fx = fixture();
    fx.toolbar.item_clicked(&mut fx.scene, &tree()).expect("select tree");
    let PlacementOutcome::Placed { instance: first, .. } = click(&mut fx, 4, 4, PointerButton::Left) else {
        panic!("first placement");
    };
    let PlacementOutcome::Placed { instance: second, removed } = click(&mut fx, 4, 4, PointerButton::Left) else {
        panic!("second placement");
    };
    assert_eq!(removed, 1);
    assert_ne!(first, second);
    assert_eq!(placed(&fx.scene).len(), 1);
    assert_eq!(fx.toolbar.refs().count("meadow", &fx.definitions), 1);
    assert_eq!(fx.toolbar.history().undo_count(), 2);

    fx.toolbar.undo(&mut fx.scene).expect("undo replace");
    let remaining = placed(&fx.scene);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, first, "undo restores the removed instance");
    assert_eq!(fx.toolbar.refs().count("meadow", &fx.definitions), 1);
}

#[test]
fn right_click_only_deletes_and_middle_is_ignored() {
    let mut fx = fixture();
    fx.toolbar.item_clicked(&mut fx.scene, &tree()).expect("select tree");
    click(&mut fx, 5, 5, PointerButton::Left);
    assert_eq!(click(&mut fx, 5, 5, PointerButton::Middle), PlacementOutcome::Ignored);
    assert_eq!(placed(&fx.scene).len(), 1);

    assert_eq!(click(&mut fx, 5, 5, PointerButton::Right), PlacementOutcome::Removed(1));
    assert!(placed(&fx.scene).is_empty());
    assert_eq!(fx.toolbar.refs().count("meadow", &fx.definitions), 0);
    assert_eq!(click(&mut fx, 5, 5, PointerButton::Right), PlacementOutcome::Ignored);

    fx.toolbar.undo(&mut fx.scene).expect("undo delete");
    assert_eq!(placed(&fx.scene).len(), 1);
    assert_eq!(fx.toolbar.refs().count("meadow", &fx.definitions), 1);
}

#[test]
fn world_entities_block_placement() {
    let mut fx = fixture();
    fx.scene.spawn_world_entity("meadow", "ground", IVec2::new(7, 7), tree()).expect("world entity");
    fx.toolbar.item_clicked(&mut fx.scene, &tree()).expect("select tree");
    assert_eq!(
        click(&mut fx, 7, 7, PointerButton::Left),
        PlacementOutcome::Blocked { cell: IVec2::new(7, 7), removed: 0 }
    );
    assert_eq!(click(&mut fx, 7, 7, PointerButton::Right), PlacementOutcome::Ignored);
    assert_eq!(fx.scene.instances_at("meadow", "ground", IVec2::new(7, 7)).len(), 1);
    assert!(!fx.toolbar.history().can_undo());
}

#[test]
fn blocked_click_reports_placed_instances_it_removed() {
    let mut fx = fixture();
    fx.toolbar.item_clicked(&mut fx.scene, &tree()).expect("select tree");
    click(&mut fx, 6, 6, PointerButton::Left);
    fx.scene.spawn_world_entity("meadow", "ground", IVec2::new(6, 6), tree()).expect("world entity");

    assert_eq!(
        click(&mut fx, 6, 6, PointerButton::Left),
        PlacementOutcome::Blocked { cell: IVec2::new(6, 6), removed: 1 }
    );
    assert!(placed(&fx.scene).is_empty());
    assert_eq!(fx.toolbar.history().undo_count(), 2);

    fx.toolbar.undo(&mut fx.scene).expect("undo removal");
    assert_eq!(placed(&fx.scene).len(), 1);
}

#[test]
fn left_click_without_selection_does_nothing() {
    let mut fx = fixture();
    assert_eq!(click(&mut fx, 1, 1, PointerButton::Left), PlacementOutcome::Ignored);
    assert_eq!(click(&mut fx, 20, 20, PointerButton::Right), PlacementOutcome::Ignored);
    assert_eq!(fx.toolbar.undo(&mut fx.scene).expect("undo"), HistoryOutcome::NothingToUndo);
}

#[test]
fn loaded_map_seeds_reference_counts() {
    let mut fx = fixture();
    fx.scene.spawn_world_entity("meadow", "ground", IVec2::new(0, 0), tree()).expect("world entity");
    fx.scene.spawn_world_entity("meadow", "decor", IVec2::new(1, 0), tree()).expect("world entity");
    fx.toolbar.map_loaded(&fx.scene, "meadow");
    assert_eq!(fx.toolbar.refs().count("meadow", &fx.definitions), 2);
}

#[test]
fn undo_capacity_drops_oldest_action() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut scene, definitions) = forest_scene(dir.path());
    let mut refs = ImportRefCounts::new();
    let mut history = UndoManager::new(50);
    {
        let mut ctx = EditContext::new(&mut scene, &mut refs);
        for index in 0..51 {
            let cell = IVec2::new(index % 10, index / 10);
            let create = CreateInstance::new("meadow", "ground", cell, tree(), 0);
            history.perform(Box::new(create), &mut ctx).expect("create");
        }
    }
    assert_eq!(history.undo_count(), 50);
    assert_eq!(refs.count("meadow", &definitions), 51);

    let mut ctx = EditContext::new(&mut scene, &mut refs);
    for _ in 0..50 {
        assert_eq!(history.undo(&mut ctx).expect("undo"), HistoryOutcome::Applied);
    }
    assert_eq!(history.undo(&mut ctx).expect("undo"), HistoryOutcome::NothingToUndo);
    let survivors = ctx.host.instances("meadow");
    assert_eq!(survivors.len(), 1, "the oldest creation can no longer be undone");
    assert_eq!(survivors[0].cell, IVec2::new(0, 0));
    assert_eq!(ctx.refs.count("meadow", &definitions), 1);
}
