use glam::Vec2;

use crate::animation::{AnimationSelector, ClipName, Mixer, MOVE_FADE};
use crate::input::{Bindings, Control, InputState};

/// Player speed in world units per second.
pub const MOVE_SPEED: f32 = 3.0;
/// Symmetric clamp applied to both planar coordinates.
pub const ARENA_HALF_EXTENT: f32 = 20.0;

/// Directional keys held this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveInput {
    pub fn sample(input: &InputState, bindings: &Bindings) -> Self {
        Self {
            forward: input.is_control_down(bindings, Control::Forward),
            back: input.is_control_down(bindings, Control::Back),
            left: input.is_control_down(bindings, Control::Left),
            right: input.is_control_down(bindings, Control::Right),
        }
    }

    pub fn any(&self) -> bool {
        self.forward || self.back || self.left || self.right
    }
}

/// Result of one integration step. `facing` is a yaw in degrees, present
/// only when the player actually moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub position: Vec2,
    pub facing: Option<f32>,
    pub moving: bool,
}

/// Converts held keys into a planar displacement: unit direction (diagonals
/// scaled by 1/√2 so the resultant speed matches a single axis), speed × dt,
/// then clamp to the arena bounds. Facing follows the direction of travel.
pub fn integrate(position: Vec2, input: MoveInput, dt: f32) -> Step {
    let mut direction = Vec2::ZERO;
    if input.forward {
        direction.y -= 1.0;
    }
    if input.back {
        direction.y += 1.0;
    }
    if input.left {
        direction.x -= 1.0;
    }
    if input.right {
        direction.x += 1.0;
    }

    let moving = direction != Vec2::ZERO;
    if direction.x != 0.0 && direction.y != 0.0 {
        direction *= std::f32::consts::FRAC_1_SQRT_2;
    }

    let mut next = position + direction * MOVE_SPEED * dt;
    next.x = next.x.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT);
    next.y = next.y.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT);

    let facing = moving.then(|| direction.x.atan2(direction.y).to_degrees());
    Step {
        position: next,
        facing,
        moving,
    }
}

/// Switches the locomotion clip from the movement result. Any movement
/// forces `Walking`; stopping falls back to `Idle` from `Walking` only.
/// Both paths are gated on the explicit one-shot tag so emotes play out.
pub fn drive_locomotion(selector: &mut AnimationSelector, mixer: &mut Mixer, moving: bool) {
    if selector.one_shot_active() {
        return;
    }
    if moving {
        selector.set_state(mixer, ClipName::Walking, MOVE_FADE);
    } else if selector.active() == ClipName::Walking {
        selector.set_state(mixer, ClipName::Idle, MOVE_FADE);
    }
}
