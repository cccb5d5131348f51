use glam::{Mat4, Vec3, Vec4};

use crate::garden::WateringGrid;
use crate::quest::{Stage, StageFlags};

/// Terminal hint shown once the finale fires.
pub const CELEBRATION_TEXT: &str = "Hooray! The garden is alive — everybody dance!";

/// Normalized-device-space point the bubble hangs from.
pub const BUBBLE_NDC: (f32, f32) = (-0.6, 0.75);
/// How far along the unprojected ray the bubble sits.
pub const BUBBLE_CAMERA_DISTANCE: f32 = 6.0;

/// Derives the single hint line from the quest flags and garden progress.
/// The latest unlocked stage wins.
pub fn derive_hint(flags: &StageFlags, grid: &WateringGrid) -> String {
    match flags.stage() {
        Stage::Finale => CELEBRATION_TEXT.to_string(),
        Stage::ReadyToCelebrate => "The garden is finished! Press N to celebrate".to_string(),
        Stage::Watering => format!(
            "Hold Y to water the garden — {}% soaked",
            grid.progress_percent()
        ),
        Stage::FindingCan => "A garden! Find the watering can and walk up to it".to_string(),
        Stage::DustingFrames => format!(
            "Those picture frames are dusty — press Y nearby to clean them ({}/4)",
            flags.dusted_count()
        ),
        Stage::RaisingWalls => "Walk to a fallen wall and press Y to raise it".to_string(),
    }
}

/// Screen-anchored help bubble. The text texture itself is drawn elsewhere;
/// this tracks the message, a render epoch that only advances when the
/// backing texture must be redrawn, and the world-space anchor transform.
#[derive(Debug, Default)]
pub struct HelpBubble {
    message: String,
    epoch: u64,
    anchor: Vec3,
    facing_yaw: f32,
}

impl HelpBubble {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Number of times the backing texture has been redrawn.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn anchor(&self) -> Vec3 {
        self.anchor
    }

    pub fn facing_yaw(&self) -> f32 {
        self.facing_yaw
    }

    /// Adopts the derived message. Redraws only when the text changed,
    /// except while watering is live, where every frame redraws to keep the
    /// percentage current. Returns whether a redraw happened.
    pub fn refresh(&mut self, message: String, live: bool) -> bool {
        if message != self.message {
            self.message = message;
            self.epoch += 1;
            true
        } else if live {
            self.epoch += 1;
            true
        } else {
            false
        }
    }

    /// Recomputes the anchor: unproject the fixed NDC point through the
    /// camera, step a fixed distance along that ray, face the camera.
    pub fn place(&mut self, view_proj: Mat4, camera_position: Vec3) {
        let inverse = view_proj.inverse();
        let clip = Vec4::new(BUBBLE_NDC.0, BUBBLE_NDC.1, 0.5, 1.0);
        let unprojected = inverse * clip;
        if unprojected.w.abs() <= f32::EPSILON {
            return;
        }
        let point = unprojected.truncate() / unprojected.w;
        let dir = (point - camera_position).normalize_or_zero();
        self.anchor = camera_position + dir * BUBBLE_CAMERA_DISTANCE;
        let to_camera = camera_position - self.anchor;
        self.facing_yaw = to_camera.x.atan2(to_camera.z).to_degrees();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> StageFlags {
        StageFlags::default()
    }

    #[test]
    fn hint_priority_follows_the_latest_stage() {
        let grid = WateringGrid::new();
        let mut f = flags();
        assert!(derive_hint(&f, &grid).contains("raise"));

        f.wall1_up = true;
        f.wall2_up = true;
        f.stage2_initialized = true;
        assert!(derive_hint(&f, &grid).contains("0/4"));
        f.frames_dusted = [true, true, false, false];
        assert!(derive_hint(&f, &grid).contains("2/4"));

        f.frames_dusted = [true; 4];
        f.stage3_initialized = true;
        assert!(derive_hint(&f, &grid).contains("watering can"));

        f.can_picked_up = true;
        assert!(derive_hint(&f, &grid).contains("0% soaked"));

        f.stage4_initialized = true;
        assert!(derive_hint(&f, &grid).contains("Press N"));

        f.finale_triggered = true;
        assert_eq!(derive_hint(&f, &grid), CELEBRATION_TEXT);
    }

    #[test]
    fn watering_hint_tracks_progress() {
        let mut grid = WateringGrid::new();
        let mut f = flags();
        f.stage2_initialized = true;
        f.stage3_initialized = true;
        f.can_picked_up = true;
        grid.water(glam::Vec2::ZERO, 100.0);
        assert!(derive_hint(&f, &grid).contains("100% soaked"));
    }

    #[test]
    fn bubble_redraws_only_on_change_unless_live() {
        let mut bubble = HelpBubble::new();
        assert!(bubble.refresh("hello".into(), false));
        assert_eq!(bubble.epoch(), 1);
        assert!(!bubble.refresh("hello".into(), false));
        assert_eq!(bubble.epoch(), 1);

        assert!(bubble.refresh("hello".into(), true));
        assert!(bubble.refresh("hello".into(), true));
        assert_eq!(bubble.epoch(), 3);

        assert!(bubble.refresh("goodbye".into(), false));
        assert_eq!(bubble.epoch(), 4);
    }

    #[test]
    fn bubble_sits_a_fixed_distance_from_the_camera() {
        let camera_position = Vec3::new(-5.0, 3.0, 10.0);
        let view = Mat4::look_at_rh(camera_position, Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        let proj = Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 0.25, 100.0);
        let mut bubble = HelpBubble::new();
        bubble.place(proj * view, camera_position);

        let distance = bubble.anchor().distance(camera_position);
        assert!((distance - BUBBLE_CAMERA_DISTANCE).abs() < 1e-3);

        // facing yaw points back at the camera
        let to_camera = camera_position - bubble.anchor();
        let expected = to_camera.x.atan2(to_camera.z).to_degrees();
        assert!((bubble.facing_yaw() - expected).abs() < 1e-4);
    }
}
