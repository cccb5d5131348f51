use robot_garden::hint::CELEBRATION_TEXT;
use robot_garden::{walkthrough, ClipName, GardenApp, WorldManifest};

fn build_app() -> GardenApp {
    let manifest = WorldManifest::embedded().expect("embedded manifest parses");
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("assets");
    GardenApp::new(manifest, root).expect("session builds")
}

#[test]
fn full_quest_walkthrough_completes() {
    let mut app = build_app();
    let summary = walkthrough::run(&mut app).expect("walkthrough reaches the finale");

    assert!(summary.finale);
    assert_eq!(summary.watered_percent, 100);
    assert_eq!(summary.hint, CELEBRATION_TEXT);

    let flags = app.flags();
    assert!(flags.walls_up());
    assert!(flags.frames_done());
    assert!(flags.can_picked_up);
    assert!(app.grid().is_fully_watered());

    // both characters ended up dancing
    assert_eq!(app.player_clip(), ClipName::Dance);
    assert_eq!(app.companion_clip(), ClipName::Dance);

    // the walls ended upright and the can was set back down
    assert_eq!(app.world().get("wall1").unwrap().rotation.x, 0.0);
    assert_eq!(app.world().get("wall2").unwrap().rotation.x, 0.0);
    assert_eq!(app.world().get("can").unwrap().parent, None);
}

#[test]
fn watered_tiles_stay_watered_for_the_rest_of_the_session() {
    let mut app = build_app();
    walkthrough::run(&mut app).expect("walkthrough reaches the finale");

    let watered_before = app.grid().watered_count();
    for _ in 0..120 {
        app.advance(walkthrough::DT, walkthrough::VIEWPORT);
    }
    assert_eq!(app.grid().watered_count(), watered_before);
}
