use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Mat4, Vec2, Vec3};
use log::info;

use crate::animation::{AnimationSelector, ClipLibrary, ClipName, Mixer, MOVE_FADE, STATE_FADE};
use crate::assets::{validate_character, AssetLibrary};
use crate::garden::WateringGrid;
use crate::hint::{derive_hint, HelpBubble};
use crate::input::{Bindings, Control, InputState};
use crate::interact::{Interactions, Ray};
use crate::movement::{self, MoveInput};
use crate::quest::{Quest, QuestEvent};
use crate::render::{CameraParams, LightParams};
use crate::scene::{PropKind, StageId, WorldManifest};
use crate::world::WorldStore;

/// Near/far planes shared by the camera derivation.
const CAMERA_NEAR: f32 = 0.25;
const CAMERA_FAR: f32 = 100.0;
/// The camera looks at a point this far above the player's feet.
const CAMERA_TARGET_HEIGHT: f32 = 2.0;

/// The whole session: world, input, quest, garden, animation and hint state,
/// advanced once per rendered frame. All shared mutable state lives here and
/// is only touched between frames.
pub struct GardenApp {
    world: WorldStore,
    input: Arc<InputState>,
    bindings: Bindings,
    assets: AssetLibrary,
    grid: WateringGrid,
    quest: Quest,
    interactions: Interactions,
    bubble: HelpBubble,
    player: String,
    companion: Option<String>,
    help_object: Option<String>,
    camera_offset: Vec3,
    camera_fov: f32,
    player_mixer: Mixer,
    player_selector: AnimationSelector,
    companion_mixer: Mixer,
    companion_selector: AnimationSelector,
    watering_active: bool,
}

impl GardenApp {
    /// Builds the session from a parsed manifest. Character schema problems
    /// surface here; missing meshes only ever log later.
    pub fn new(manifest: WorldManifest, assets_root: impl Into<PathBuf>) -> Result<Self> {
        let clips: ClipLibrary = validate_character(&manifest.character)
            .context("character schema failed validation")?;

        let world = WorldStore::new();
        let quest = Quest::new(manifest, &world);

        let player = world
            .find_by_kind(PropKind::Player)
            .context("manifest defines no player")?;
        let companion = world.find_by_kind(PropKind::Companion);

        let (camera_offset, camera_fov) = world
            .find_by_kind(PropKind::Camera)
            .and_then(|name| world.get(&name))
            .map(|camera| (camera.position, camera.fov))
            .unwrap_or((Vec3::new(-5.0, 3.0, 10.0), 45.0));

        let mut assets = AssetLibrary::start(assets_root);
        assets.request_all(quest.stage_meshes(StageId::Initial));

        let mut player_mixer = Mixer::new(&clips);
        // the original starts its robot walking in place
        let player_selector = AnimationSelector::new(&mut player_mixer, ClipName::Walking);
        let mut companion_mixer = Mixer::with_forced_loops(&clips, &[ClipName::Wave]);
        let companion_selector = AnimationSelector::new(&mut companion_mixer, ClipName::Idle);

        let help_object = help_object_name(&world);

        let mut interactions = Interactions::new();
        rebuild_interactions(&mut interactions, &world, &quest);

        info!("session ready; player is {player}");
        Ok(Self {
            world,
            input: Arc::new(InputState::new()),
            bindings: Bindings::default(),
            assets,
            grid: WateringGrid::new(),
            quest,
            interactions,
            bubble: HelpBubble::new(),
            player,
            companion,
            help_object,
            camera_offset,
            camera_fov,
            player_mixer,
            player_selector,
            companion_mixer,
            companion_selector,
            watering_active: false,
        })
    }

    /// Advances one frame. Fixed order: asset poll, mixer advancement,
    /// movement integration, quest interaction and watering, proximity
    /// detection, hint derivation.
    pub fn advance(&mut self, dt: f32, viewport: (u32, u32)) {
        self.assets.poll();

        let finished = self.player_mixer.update(dt);
        self.player_selector
            .apply_finished(&mut self.player_mixer, &finished);
        let finished = self.companion_mixer.update(dt);
        self.companion_selector
            .apply_finished(&mut self.companion_mixer, &finished);

        let player_pos = self.integrate_movement(dt);

        let mut events = Vec::new();
        self.handle_presses(player_pos, &mut events);

        if let Some(event) = self
            .quest
            .try_pickup_can(player_pos, &self.player, &self.world)
        {
            events.push(event);
        }

        let watering_held = self.input.is_control_down(&self.bindings, Control::Interact);
        let (watering_active, event) =
            self.quest
                .water_tick(player_pos, watering_held, &mut self.grid, &self.world);
        self.watering_active = watering_active;
        events.extend(event);

        self.apply_events(&events);

        let camera = self.camera_params(aspect(viewport));
        self.handle_clicks(viewport, &camera);

        self.interactions.update(
            dt,
            player_pos,
            camera.position,
            self.quest.flags().stage4_initialized,
            &self.world,
        );

        let message = derive_hint(self.quest.flags(), &self.grid);
        self.bubble.refresh(message, self.watering_active);
        self.bubble.place(camera.view_proj, camera.position);
        if let Some(help) = self.help_object.as_deref() {
            self.world.set_position(help, self.bubble.anchor());
            let yaw = self.bubble.facing_yaw();
            self.world.update(help, |obj| obj.rotation.y = yaw);
        }
    }

    fn integrate_movement(&mut self, dt: f32) -> Vec2 {
        let move_input = MoveInput::sample(&self.input, &self.bindings);
        let position = self
            .world
            .get(&self.player)
            .map(|player| Vec2::new(player.position.x, player.position.z))
            .unwrap_or(Vec2::ZERO);

        let step = movement::integrate(position, move_input, dt);
        self.world.update(&self.player, |player| {
            player.position.x = step.position.x;
            player.position.z = step.position.y;
            if let Some(facing) = step.facing {
                player.rotation.y = facing;
            }
        });
        movement::drive_locomotion(
            &mut self.player_selector,
            &mut self.player_mixer,
            step.moving,
        );
        step.position
    }

    fn handle_presses(&mut self, player_pos: Vec2, events: &mut Vec<QuestEvent>) {
        for key in self.input.drain_pressed() {
            match self.bindings.control_for(key) {
                Some(Control::Jump) => {
                    self.player_selector.trigger_one_shot(
                        &mut self.player_mixer,
                        ClipName::Jump,
                        MOVE_FADE,
                    );
                }
                Some(Control::Punch) => {
                    self.player_selector.trigger_one_shot(
                        &mut self.player_mixer,
                        ClipName::Punch,
                        MOVE_FADE,
                    );
                }
                Some(Control::Interact) => {
                    events.extend(self.quest.interact(player_pos, &self.world));
                }
                Some(Control::Dance) => {
                    events.extend(self.quest.trigger_finale());
                }
                _ => {}
            }
        }
    }

    fn apply_events(&mut self, events: &[QuestEvent]) {
        let mut rebuild = false;
        for event in events {
            match event {
                QuestEvent::StageSpawned(stage) => {
                    self.assets.request_all(self.quest.stage_meshes(*stage));
                    rebuild = true;
                }
                QuestEvent::GardenCompleted => {
                    self.assets
                        .request_all(self.quest.stage_meshes(StageId::Stage4));
                    rebuild = true;
                }
                QuestEvent::CanPickedUp | QuestEvent::FrameDusted(_) => {
                    rebuild = true;
                }
                QuestEvent::FinaleTriggered => {
                    self.player_selector.set_state(
                        &mut self.player_mixer,
                        ClipName::Dance,
                        STATE_FADE,
                    );
                    self.companion_selector.set_state(
                        &mut self.companion_mixer,
                        ClipName::Dance,
                        STATE_FADE,
                    );
                }
                QuestEvent::WallRaised(_) => {}
            }
        }
        if rebuild {
            rebuild_interactions(&mut self.interactions, &self.world, &self.quest);
        }
    }

    fn handle_clicks(&mut self, viewport: (u32, u32), camera: &CameraParams) {
        for click in self.input.drain_clicks() {
            let ray = pick_ray(click, viewport, camera);
            let Some(hit) = self.interactions.click(ray, &self.world) else {
                continue;
            };
            if Some(hit.as_str()) == self.companion.as_deref() {
                self.companion_selector.trigger_one_shot(
                    &mut self.companion_mixer,
                    ClipName::Wave,
                    MOVE_FADE,
                );
            } else {
                self.player_selector.trigger_one_shot(
                    &mut self.player_mixer,
                    ClipName::Wave,
                    MOVE_FADE,
                );
            }
        }
    }

    /// Follow camera: a fixed offset from the player, looking at the
    /// player's upper body.
    pub fn camera_params(&self, aspect: f32) -> CameraParams {
        let player = self
            .world
            .get(&self.player)
            .map(|player| player.position)
            .unwrap_or(Vec3::ZERO);
        let position = player + self.camera_offset;
        let target = player + Vec3::new(0.0, CAMERA_TARGET_HEIGHT, 0.0);
        let view = Mat4::look_at_rh(position, target, Vec3::Y);
        let projection = Mat4::perspective_rh(
            self.camera_fov.to_radians(),
            aspect.max(0.01),
            CAMERA_NEAR,
            CAMERA_FAR,
        );
        CameraParams {
            view_proj: projection * view,
            position,
        }
    }

    pub fn light_params(&self) -> LightParams {
        self.world
            .find_by_kind(PropKind::Light)
            .and_then(|name| self.world.get(&name))
            .map(|light| LightParams {
                position: light.position,
                color: light.color,
                intensity: light.intensity.max(0.1),
            })
            .unwrap_or(LightParams {
                position: Vec3::new(0.0, 20.0, 10.0),
                color: Vec3::ONE,
                intensity: 3.0,
            })
    }

    pub fn input(&self) -> Arc<InputState> {
        Arc::clone(&self.input)
    }

    pub fn world(&self) -> &WorldStore {
        &self.world
    }

    pub fn assets(&self) -> &AssetLibrary {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetLibrary {
        &mut self.assets
    }

    pub fn flags(&self) -> &crate::quest::StageFlags {
        self.quest.flags()
    }

    pub fn grid(&self) -> &WateringGrid {
        &self.grid
    }

    pub fn bubble(&self) -> &HelpBubble {
        &self.bubble
    }

    pub fn player_position(&self) -> Vec2 {
        self.world
            .get(&self.player)
            .map(|player| Vec2::new(player.position.x, player.position.z))
            .unwrap_or(Vec2::ZERO)
    }

    pub fn player_clip(&self) -> ClipName {
        self.player_selector.active()
    }

    pub fn companion_clip(&self) -> ClipName {
        self.companion_selector.active()
    }
}

fn rebuild_interactions(interactions: &mut Interactions, world: &WorldStore, quest: &Quest) {
    let frames: Vec<String> = quest.frame_names().to_vec();
    let dusted: Vec<bool> = (0..frames.len())
        .map(|index| !quest.frame_needs_dusting(index))
        .collect();
    let can_free = !quest.flags().can_picked_up;
    interactions.rebuild(world, move |name, kind| match kind {
        PropKind::Frame => frames
            .iter()
            .position(|frame| frame == name)
            .map(|index| !dusted[index])
            .unwrap_or(false),
        PropKind::Can => can_free,
        _ => true,
    });
}

fn aspect(viewport: (u32, u32)) -> f32 {
    if viewport.1 == 0 {
        1.0
    } else {
        viewport.0 as f32 / viewport.1 as f32
    }
}

/// Screen coordinates → world-space picking ray through the camera.
pub fn pick_ray(screen: Vec2, viewport: (u32, u32), camera: &CameraParams) -> Ray {
    let (width, height) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
    let ndc = Vec2::new(
        2.0 * screen.x / width - 1.0,
        1.0 - 2.0 * screen.y / height,
    );
    let inverse = camera.view_proj.inverse();
    let near = inverse.project_point3(Vec3::new(ndc.x, ndc.y, 0.0));
    let far = inverse.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
    Ray {
        origin: near,
        dir: (far - near).normalize_or_zero(),
    }
}

/// The screen-anchored help bubble is the one un-parented overlay.
fn help_object_name(world: &WorldStore) -> Option<String> {
    world
        .all_objects()
        .into_iter()
        .find(|object| object.kind == PropKind::Overlay && object.parent.is_none())
        .map(|object| object.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::CELEBRATION_TEXT;
    use crate::input::{KeyCode, NamedKey};
    use crate::scene::WorldManifest;

    const DT: f32 = 1.0 / 60.0;
    const VIEWPORT: (u32, u32) = (1280, 720);

    fn app() -> GardenApp {
        let manifest = WorldManifest::embedded().unwrap();
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("assets");
        GardenApp::new(manifest, root).unwrap()
    }

    #[test]
    fn session_builds_from_the_embedded_manifest() {
        let app = app();
        assert_eq!(app.flags().stage(), crate::quest::Stage::RaisingWalls);
        assert_eq!(app.player_clip(), ClipName::Walking);
        assert!(app.world().get("wall1").is_some());
    }

    #[test]
    fn holding_forward_moves_the_player_north() {
        let mut app = app();
        app.input().set_key_down(KeyCode::Character('W'));
        for _ in 0..60 {
            app.advance(DT, VIEWPORT);
        }
        app.input().set_key_up(KeyCode::Character('W'));
        let pos = app.player_position();
        assert!(pos.y < -2.0, "player moved north, got {pos:?}");
        assert_eq!(app.player_clip(), ClipName::Walking);

        for _ in 0..60 {
            app.advance(DT, VIEWPORT);
        }
        assert_eq!(app.player_clip(), ClipName::Idle);
    }

    #[test]
    fn jump_emote_plays_and_restores() {
        let mut app = app();
        // settle into idle
        for _ in 0..30 {
            app.advance(DT, VIEWPORT);
        }
        app.input().set_key_down(KeyCode::Named(NamedKey::Space));
        app.advance(DT, VIEWPORT);
        app.input().set_key_up(KeyCode::Named(NamedKey::Space));
        assert_eq!(app.player_clip(), ClipName::Jump);

        // run past the clip duration
        for _ in 0..240 {
            app.advance(DT, VIEWPORT);
        }
        assert_ne!(app.player_clip(), ClipName::Jump);
    }

    #[test]
    fn dance_key_is_inert_before_stage_four() {
        let mut app = app();
        app.advance(DT, VIEWPORT);
        let epoch_before = app.bubble().epoch();
        let hint_before = app.bubble().message().to_string();

        app.input().set_key_down(KeyCode::Character('N'));
        app.advance(DT, VIEWPORT);
        app.input().set_key_up(KeyCode::Character('N'));
        app.advance(DT, VIEWPORT);

        assert_ne!(app.player_clip(), ClipName::Dance);
        assert_ne!(app.bubble().message(), CELEBRATION_TEXT);
        assert_eq!(app.bubble().message(), hint_before);
        assert_eq!(app.bubble().epoch(), epoch_before);
    }

    #[test]
    fn hint_epoch_is_stable_while_idle() {
        let mut app = app();
        app.advance(DT, VIEWPORT);
        let epoch = app.bubble().epoch();
        for _ in 0..30 {
            app.advance(DT, VIEWPORT);
        }
        assert_eq!(app.bubble().epoch(), epoch);
    }

    #[test]
    fn pick_ray_points_into_the_scene() {
        let app = app();
        let camera = app.camera_params(16.0 / 9.0);
        let ray = pick_ray(Vec2::new(640.0, 360.0), VIEWPORT, &camera);
        assert!((ray.dir.length() - 1.0).abs() < 1e-4);
        // the center ray heads from the camera toward the player
        let toward = (Vec3::new(0.0, 2.0, 0.0) - camera.position).normalize();
        assert!(ray.dir.dot(toward) > 0.95);
    }
}
