use glam::{Vec2, Vec3};
use log::info;

use crate::garden::{WateringGrid, DRY_COLOR, TILE_SIZE, WATERED_COLOR, WATERING_RADIUS};
use crate::scene::{PropKind, StageId, WorldManifest};
use crate::world::{WorldObject, WorldStore};

/// Reach of the wall-raise and frame-dust actions.
pub const INTERACT_RANGE: f32 = 3.0;
/// Walking this close to the can picks it up.
pub const CAN_PICKUP_RADIUS: f32 = 2.0;
/// A raised wall pivots this much about its local X axis.
pub const WALL_RAISE_ANGLE: f32 = 90.0;
/// Carry offset of the can once parented to the player.
pub const CAN_CARRY_OFFSET: Vec3 = Vec3::new(0.45, 1.0, 0.3);
/// Mesh shared by every generated garden tile.
pub const TILE_MESH: &str = "models/tile.obj";

/// One-time world events. Every flag is monotonic: it flips false → true at
/// most once per session and is never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    pub wall1_up: bool,
    pub wall2_up: bool,
    pub stage2_initialized: bool,
    pub frames_dusted: [bool; 4],
    pub stage3_initialized: bool,
    pub can_picked_up: bool,
    pub stage4_initialized: bool,
    pub finale_triggered: bool,
}

impl StageFlags {
    /// True iff both constituent wall flags are set.
    pub fn walls_up(&self) -> bool {
        self.wall1_up && self.wall2_up
    }

    pub fn dusted_count(&self) -> usize {
        self.frames_dusted.iter().filter(|dusted| **dusted).count()
    }

    pub fn frames_done(&self) -> bool {
        self.frames_dusted.iter().all(|dusted| *dusted)
    }

    /// Current phase of the linear quest, derived latest-first.
    pub fn stage(&self) -> Stage {
        if self.finale_triggered {
            Stage::Finale
        } else if self.stage4_initialized {
            Stage::ReadyToCelebrate
        } else if self.can_picked_up {
            Stage::Watering
        } else if self.stage3_initialized {
            Stage::FindingCan
        } else if self.stage2_initialized {
            Stage::DustingFrames
        } else {
            Stage::RaisingWalls
        }
    }
}

/// Phases of the scripted quest, each unlocked by completing the previous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RaisingWalls,
    DustingFrames,
    FindingCan,
    Watering,
    ReadyToCelebrate,
    Finale,
}

/// Notable transitions surfaced to the frame loop, which turns them into
/// asset requests and animation cues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestEvent {
    WallRaised(usize),
    StageSpawned(StageId),
    FrameDusted(usize),
    CanPickedUp,
    GardenCompleted,
    FinaleTriggered,
}

/// The quest state machine. Owns the staged prop groups from the manifest
/// and spawns each group into the world exactly once; every transition is an
/// idempotent no-op once its guard flag is set.
pub struct Quest {
    manifest: WorldManifest,
    flags: StageFlags,
    walls: Vec<String>,
    frames: Vec<String>,
    can: Option<String>,
}

impl Quest {
    /// Spawns the initial prop group and records the wall sites.
    pub fn new(manifest: WorldManifest, world: &WorldStore) -> Self {
        world.spawn(manifest.props_for(StageId::Initial));
        let walls = world.names_by_kind(PropKind::Wall);
        Self {
            manifest,
            flags: StageFlags::default(),
            walls,
            frames: Vec::new(),
            can: None,
        }
    }

    pub fn flags(&self) -> &StageFlags {
        &self.flags
    }

    pub fn wall_names(&self) -> &[String] {
        &self.walls
    }

    pub fn frame_names(&self) -> &[String] {
        &self.frames
    }

    pub fn can_name(&self) -> Option<&str> {
        self.can.as_deref()
    }

    /// Whether the frame at `index` still needs dusting.
    pub fn frame_needs_dusting(&self, index: usize) -> bool {
        !self.flags.frames_dusted.get(index).copied().unwrap_or(true)
    }

    /// Mesh paths needed once the given stage group spawns.
    pub fn stage_meshes(&self, stage: StageId) -> Vec<String> {
        let mut meshes = self.manifest.meshes_for(stage);
        if stage == StageId::Stage3 {
            meshes.push(TILE_MESH.to_string());
        }
        meshes
    }

    /// Handles one press of the interact key at the player's position:
    /// raises a nearby un-raised wall, or dusts a nearby un-dusted frame.
    pub fn interact(&mut self, player: Vec2, world: &WorldStore) -> Vec<QuestEvent> {
        let mut events = Vec::new();

        if !self.flags.walls_up() {
            self.raise_nearby_wall(player, world, &mut events);
        } else if self.flags.stage2_initialized && !self.flags.frames_done() {
            self.dust_nearby_frame(player, world, &mut events);
        }

        events
    }

    fn raise_nearby_wall(&mut self, player: Vec2, world: &WorldStore, events: &mut Vec<QuestEvent>) {
        for index in 0..self.walls.len().min(2) {
            let raised = match index {
                0 => self.flags.wall1_up,
                _ => self.flags.wall2_up,
            };
            if raised {
                continue;
            }
            let name = self.walls[index].clone();
            let Some(wall) = world.get(&name) else {
                continue;
            };
            if planar(wall.position).distance(player) > INTERACT_RANGE {
                continue;
            }
            world.update(&name, |obj| obj.rotation.x += WALL_RAISE_ANGLE);
            match index {
                0 => self.flags.wall1_up = true,
                _ => self.flags.wall2_up = true,
            }
            info!("wall {name} raised");
            events.push(QuestEvent::WallRaised(index));
        }

        if self.flags.walls_up() && !self.flags.stage2_initialized {
            self.flags.stage2_initialized = true;
            self.spawn_stage(StageId::Stage2, world);
            self.frames = world.names_by_kind(PropKind::Frame);
            info!("both walls up; picture frames arrive");
            events.push(QuestEvent::StageSpawned(StageId::Stage2));
        }
    }

    fn dust_nearby_frame(&mut self, player: Vec2, world: &WorldStore, events: &mut Vec<QuestEvent>) {
        let mut best: Option<(usize, f32)> = None;
        for (index, name) in self.frames.iter().enumerate().take(4) {
            if self.flags.frames_dusted[index] {
                continue;
            }
            let Some(frame) = world.get(name) else {
                continue;
            };
            let distance = planar(frame.position).distance(player);
            if distance <= INTERACT_RANGE && best.map_or(true, |(_, d)| distance < d) {
                best = Some((index, distance));
            }
        }

        let Some((index, _)) = best else {
            return;
        };
        let name = self.frames[index].clone();
        self.flags.frames_dusted[index] = true;
        world.update(&name, |obj| obj.color = (obj.color * 1.6).min(Vec3::ONE));
        if let Some(overlay) = overlay_for(world, &name) {
            world.set_visible(&overlay, false);
        }
        info!("frame {name} dusted ({}/4)", self.flags.dusted_count());
        events.push(QuestEvent::FrameDusted(index));

        if self.flags.frames_done() && !self.flags.stage3_initialized {
            self.flags.stage3_initialized = true;
            self.spawn_stage(StageId::Stage3, world);
            self.can = world.find_by_kind(PropKind::Can);
            info!("all frames dusted; the garden needs water");
            events.push(QuestEvent::StageSpawned(StageId::Stage3));
        }
    }

    /// Proximity pickup: walking close enough to the can re-parents it to
    /// the player so it rides along from then on.
    pub fn try_pickup_can(
        &mut self,
        player: Vec2,
        player_name: &str,
        world: &WorldStore,
    ) -> Option<QuestEvent> {
        if self.flags.can_picked_up || !self.flags.stage3_initialized {
            return None;
        }
        let name = self.can.clone()?;
        let can = world.get(&name)?;
        if planar(can.position).distance(player) > CAN_PICKUP_RADIUS {
            return None;
        }
        world.set_parent(&name, Some(player_name));
        world.set_position(&name, CAN_CARRY_OFFSET);
        self.flags.can_picked_up = true;
        info!("watering can picked up");
        Some(QuestEvent::CanPickedUp)
    }

    /// One frame of watering while the action key is held. Returns whether
    /// watering is active this frame (drives the live hint refresh) plus the
    /// completion event when the last tile is covered.
    pub fn water_tick(
        &mut self,
        player: Vec2,
        held: bool,
        grid: &mut WateringGrid,
        world: &WorldStore,
    ) -> (bool, Option<QuestEvent>) {
        if !self.flags.can_picked_up || self.flags.stage4_initialized || !held {
            return (false, None);
        }

        for index in grid.water(player, WATERING_RADIUS) {
            world.set_color(&WateringGrid::tile_name(index), WATERED_COLOR);
        }

        if !grid.is_fully_watered() {
            return (true, None);
        }

        self.flags.stage4_initialized = true;
        self.spawn_stage(StageId::Stage4, world);
        if let Some(can) = self.can.as_deref() {
            world.set_parent(can, None);
            world.set_position(can, Vec3::new(player.x, 0.0, player.y));
        }
        info!("garden fully watered; the finale awaits");
        (true, Some(QuestEvent::GardenCompleted))
    }

    /// The dance key: a no-op until stage 4 is active, terminal afterwards.
    pub fn trigger_finale(&mut self) -> Option<QuestEvent> {
        if !self.flags.stage4_initialized || self.flags.finale_triggered {
            return None;
        }
        self.flags.finale_triggered = true;
        info!("finale triggered");
        Some(QuestEvent::FinaleTriggered)
    }

    fn spawn_stage(&self, stage: StageId, world: &WorldStore) {
        world.spawn(self.manifest.props_for(stage));
        if stage == StageId::Stage3 {
            world.spawn_objects(build_tiles());
        }
    }
}

fn planar(position: Vec3) -> Vec2 {
    Vec2::new(position.x, position.z)
}

/// Overlay object attached to the named owner, if one exists.
pub fn overlay_for(world: &WorldStore, owner: &str) -> Option<String> {
    world
        .all_objects()
        .into_iter()
        .find(|object| object.kind == PropKind::Overlay && object.parent.as_deref() == Some(owner))
        .map(|object| object.name)
}

fn build_tiles() -> Vec<WorldObject> {
    let grid = WateringGrid::new();
    grid.tiles()
        .iter()
        .enumerate()
        .map(|(index, tile)| WorldObject {
            name: WateringGrid::tile_name(index),
            kind: PropKind::Tile,
            mesh: Some(TILE_MESH.to_string()),
            color: DRY_COLOR,
            position: Vec3::new(tile.center.x, 0.02, tile.center.y),
            rotation: Vec3::ZERO,
            scale: Vec3::new(TILE_SIZE * 0.92, 1.0, TILE_SIZE * 0.92),
            visible: true,
            parent: None,
            fov: 45.0,
            intensity: 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static WORLD_XML: Lazy<String> = Lazy::new(|| {
        r#"
        <world>
            <stage name="initial">
                <prop><name>player</name><kind>player</kind></prop>
                <prop><name>wall1</name><kind>wall</kind><position>19.5 0 0</position></prop>
                <prop><name>wall2</name><kind>wall</kind><position>-19.5 0 0</position></prop>
            </stage>
            <stage name="stage2">
                <prop><name>frame1</name><kind>frame</kind><position>-6 3 -19</position></prop>
                <prop><name>frame1_bubble</name><kind>overlay</kind><parent>frame1</parent><visible>false</visible></prop>
                <prop><name>frame2</name><kind>frame</kind><position>-2 3 -19</position></prop>
                <prop><name>frame3</name><kind>frame</kind><position>2 3 -19</position></prop>
                <prop><name>frame4</name><kind>frame</kind><position>6 3 -19</position></prop>
            </stage>
            <stage name="stage3">
                <prop><name>can</name><kind>can</kind><position>8 0 8</position></prop>
            </stage>
            <stage name="stage4">
                <prop><name>tree</name><kind>tree</kind><position>0 0 -10</position></prop>
            </stage>
        </world>
        "#
        .to_string()
    });

    fn setup() -> (Quest, WorldStore) {
        let manifest = WorldManifest::from_xml(&WORLD_XML).unwrap();
        let world = WorldStore::new();
        let quest = Quest::new(manifest, &world);
        (quest, world)
    }

    fn raise_both_walls(quest: &mut Quest, world: &WorldStore) {
        quest.interact(Vec2::new(19.0, 0.0), world);
        quest.interact(Vec2::new(-19.0, 0.0), world);
    }

    fn dust_all_frames(quest: &mut Quest, world: &WorldStore) {
        for x in [-6.0, -2.0, 2.0, 6.0] {
            quest.interact(Vec2::new(x, -18.0), world);
        }
    }

    #[test]
    fn wall_raise_near_wall_one_sets_only_its_flag() {
        let (mut quest, world) = setup();
        let events = quest.interact(Vec2::new(19.0, 0.0), &world);
        assert_eq!(events, vec![QuestEvent::WallRaised(0)]);
        assert!(quest.flags().wall1_up);
        assert!(!quest.flags().walls_up());
        assert_eq!(world.get("wall1").unwrap().rotation.x, WALL_RAISE_ANGLE);
        assert_eq!(world.get("wall2").unwrap().rotation.x, 0.0);
    }

    #[test]
    fn wall_raise_is_idempotent() {
        let (mut quest, world) = setup();
        quest.interact(Vec2::new(19.0, 0.0), &world);
        let again = quest.interact(Vec2::new(19.0, 0.0), &world);
        assert!(again.is_empty());
        assert_eq!(world.get("wall1").unwrap().rotation.x, WALL_RAISE_ANGLE);
    }

    #[test]
    fn wall_raise_out_of_range_does_nothing() {
        let (mut quest, world) = setup();
        let events = quest.interact(Vec2::new(10.0, 0.0), &world);
        assert!(events.is_empty());
        assert!(!quest.flags().wall1_up);
    }

    #[test]
    fn both_walls_spawn_stage_two_exactly_once() {
        let (mut quest, world) = setup();
        raise_both_walls(&mut quest, &world);
        assert!(quest.flags().walls_up());
        assert!(quest.flags().stage2_initialized);
        assert_eq!(quest.frame_names().len(), 4);

        let count = world.all_objects().len();
        quest.interact(Vec2::new(19.0, 0.0), &world);
        assert_eq!(world.all_objects().len(), count);
    }

    #[test]
    fn dusting_all_frames_spawns_stage_three() {
        let (mut quest, world) = setup();
        raise_both_walls(&mut quest, &world);

        let events = quest.interact(Vec2::new(-6.0, -18.0), &world);
        assert_eq!(events, vec![QuestEvent::FrameDusted(0)]);
        assert!(!world.get("frame1_bubble").unwrap().visible);
        let again = quest.interact(Vec2::new(-6.0, -18.0), &world);
        assert!(again.is_empty(), "dusting is one-shot per frame");

        for x in [-2.0, 2.0, 6.0] {
            quest.interact(Vec2::new(x, -18.0), &world);
        }
        assert!(quest.flags().frames_done());
        assert!(quest.flags().stage3_initialized);
        assert!(world.get("can").is_some());
        assert!(world.get("tile_0_0").is_some());
        assert_eq!(quest.can_name(), Some("can"));
    }

    #[test]
    fn can_pickup_requires_proximity_and_fires_once() {
        let (mut quest, world) = setup();
        raise_both_walls(&mut quest, &world);
        dust_all_frames(&mut quest, &world);

        assert!(quest
            .try_pickup_can(Vec2::new(0.0, 0.0), "player", &world)
            .is_none());
        let event = quest.try_pickup_can(Vec2::new(7.5, 8.0), "player", &world);
        assert_eq!(event, Some(QuestEvent::CanPickedUp));
        assert_eq!(world.get("can").unwrap().parent.as_deref(), Some("player"));
        assert!(quest
            .try_pickup_can(Vec2::new(7.5, 8.0), "player", &world)
            .is_none());
    }

    #[test]
    fn watering_completion_spawns_stage_four_and_detaches_the_can() {
        let (mut quest, world) = setup();
        raise_both_walls(&mut quest, &world);
        dust_all_frames(&mut quest, &world);
        quest.try_pickup_can(Vec2::new(7.5, 8.0), "player", &world);

        let mut grid = WateringGrid::new();
        let (active, event) = quest.water_tick(Vec2::ZERO, true, &mut grid, &world);
        assert!(active);
        assert!(event.is_none());
        assert_eq!(
            world.get("tile_9_9").unwrap().color,
            WATERED_COLOR,
            "tiles near the player are recolored"
        );

        // cover the rest of the grid
        grid.water(Vec2::ZERO, 100.0);
        let (_, event) = quest.water_tick(Vec2::ZERO, true, &mut grid, &world);
        assert_eq!(event, Some(QuestEvent::GardenCompleted));
        assert!(quest.flags().stage4_initialized);
        assert!(world.get("tree").is_some());
        assert_eq!(world.get("can").unwrap().parent, None);

        let (active, event) = quest.water_tick(Vec2::ZERO, true, &mut grid, &world);
        assert!(!active, "watering idles once stage four is active");
        assert!(event.is_none());
    }

    #[test]
    fn watering_without_the_can_is_inert() {
        let (mut quest, world) = setup();
        let mut grid = WateringGrid::new();
        let (active, event) = quest.water_tick(Vec2::ZERO, true, &mut grid, &world);
        assert!(!active);
        assert!(event.is_none());
        assert_eq!(grid.watered_count(), 0);
    }

    #[test]
    fn finale_is_gated_on_stage_four_and_fires_once() {
        let (mut quest, world) = setup();
        assert!(quest.trigger_finale().is_none());

        raise_both_walls(&mut quest, &world);
        dust_all_frames(&mut quest, &world);
        quest.try_pickup_can(Vec2::new(7.5, 8.0), "player", &world);
        let mut grid = WateringGrid::new();
        grid.water(Vec2::ZERO, 100.0);
        quest.water_tick(Vec2::ZERO, true, &mut grid, &world);

        assert_eq!(quest.trigger_finale(), Some(QuestEvent::FinaleTriggered));
        assert!(quest.trigger_finale().is_none());
        assert_eq!(quest.flags().stage(), Stage::Finale);
    }

    #[test]
    fn stage_derivation_is_latest_first() {
        let mut flags = StageFlags::default();
        assert_eq!(flags.stage(), Stage::RaisingWalls);
        flags.stage2_initialized = true;
        assert_eq!(flags.stage(), Stage::DustingFrames);
        flags.stage3_initialized = true;
        assert_eq!(flags.stage(), Stage::FindingCan);
        flags.can_picked_up = true;
        assert_eq!(flags.stage(), Stage::Watering);
        flags.stage4_initialized = true;
        assert_eq!(flags.stage(), Stage::ReadyToCelebrate);
        flags.finale_triggered = true;
        assert_eq!(flags.stage(), Stage::Finale);
    }
}
