use glam::{Vec2, Vec3};
use log::debug;

use crate::scene::PropKind;
use crate::world::WorldStore;

/// Showing an object's contextual overlay requires the player this close.
pub const OVERLAY_RANGE: f32 = 4.0;
/// The companion's bubble uses its own, wider threshold.
pub const COMPANION_BUBBLE_RANGE: f32 = 6.0;
/// Click feedback: momentary scale factor and how long it lasts.
pub const PULSE_SCALE: f32 = 1.15;
pub const PULSE_SECS: f32 = 0.35;
/// Pick-ray hit radius around an interactive object's origin.
pub const PICK_RADIUS: f32 = 1.4;

/// World-space picking ray.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Nearest positive hit distance against a sphere, if any.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.dir);
        let c = oc.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();
        let near = -b - sqrt_d;
        let far = -b + sqrt_d;
        if near > 0.0 {
            Some(near)
        } else if far > 0.0 {
            Some(far)
        } else {
            None
        }
    }
}

/// An object the player can stand near or click.
#[derive(Debug, Clone, PartialEq)]
pub struct Interactive {
    pub name: String,
    pub overlay: Option<String>,
}

#[derive(Debug)]
struct Pulse {
    name: String,
    original_scale: Vec3,
    remaining: f32,
}

/// Per-frame proximity detector and click picker.
///
/// At most one tracked object's overlay is visible at a time: the nearest
/// one within range. The companion's bubble is governed by a parallel check
/// with its own threshold and does not participate in that invariant.
#[derive(Debug, Default)]
pub struct Interactions {
    items: Vec<Interactive>,
    companion: Option<String>,
    companion_bubble: Option<String>,
    nearby: Option<String>,
    pulse: Option<Pulse>,
}

impl Interactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the tracked set from the current world: un-dusted frames and
    /// the free-standing can, plus the companion and its bubble. Overlays of
    /// objects that dropped out of the set are hidden.
    pub fn rebuild<F>(&mut self, world: &WorldStore, still_active: F)
    where
        F: Fn(&str, PropKind) -> bool,
    {
        let previous: Vec<String> = self
            .items
            .iter()
            .filter_map(|item| item.overlay.clone())
            .collect();

        self.items.clear();
        self.companion = None;
        self.companion_bubble = None;

        for object in world.all_objects() {
            match object.kind {
                PropKind::Frame | PropKind::Can => {
                    if still_active(&object.name, object.kind) {
                        let overlay = crate::quest::overlay_for(world, &object.name);
                        self.items.push(Interactive {
                            name: object.name,
                            overlay,
                        });
                    }
                }
                PropKind::Companion => {
                    self.companion_bubble = crate::quest::overlay_for(world, &object.name);
                    self.companion = Some(object.name);
                }
                _ => {}
            }
        }

        let tracked: Vec<&String> = self
            .items
            .iter()
            .filter_map(|item| item.overlay.as_ref())
            .collect();
        for overlay in previous {
            if !tracked.contains(&&overlay) {
                world.set_visible(&overlay, false);
            }
        }
        self.nearby = None;
    }

    pub fn tracked_count(&self) -> usize {
        self.items.len()
    }

    /// Name of the object whose overlay is currently shown, if any.
    pub fn nearby(&self) -> Option<&str> {
        self.nearby.as_deref()
    }

    /// Per-frame proximity pass.
    pub fn update(
        &mut self,
        dt: f32,
        player: Vec2,
        camera_position: Vec3,
        companion_bubble_active: bool,
        world: &WorldStore,
    ) {
        self.tick_pulse(dt, world);

        let mut nearest: Option<(usize, f32)> = None;
        for (index, item) in self.items.iter().enumerate() {
            let Some(object) = world.get(&item.name) else {
                continue;
            };
            let distance = planar(object.position).distance(player);
            if distance <= OVERLAY_RANGE && nearest.map_or(true, |(_, d)| distance < d) {
                nearest = Some((index, distance));
            }
        }

        self.nearby = nearest.map(|(index, _)| self.items[index].name.clone());
        for (index, item) in self.items.iter().enumerate() {
            let Some(overlay) = item.overlay.as_deref() else {
                continue;
            };
            let show = nearest.map_or(false, |(nearest_index, _)| nearest_index == index);
            world.set_visible(overlay, show);
            if show {
                billboard(world, &item.name, overlay, camera_position);
            }
        }

        // parallel companion check with its own threshold
        if let (Some(companion), Some(bubble)) =
            (self.companion.as_deref(), self.companion_bubble.as_deref())
        {
            let show = companion_bubble_active
                && world
                    .get(companion)
                    .map(|object| planar(object.position).distance(player) <= COMPANION_BUBBLE_RANGE)
                    .unwrap_or(false);
            world.set_visible(bubble, show);
            if show {
                billboard(world, companion, bubble, camera_position);
            }
        }
    }

    /// Click pick against the interactive set plus the companion. On a hit
    /// the object flashes (scale pulse, reverted after a fixed delay); the
    /// stage machine is never touched from here.
    pub fn click(&mut self, ray: Ray, world: &WorldStore) -> Option<String> {
        let mut candidates: Vec<&str> = self.items.iter().map(|item| item.name.as_str()).collect();
        if let Some(companion) = self.companion.as_deref() {
            candidates.push(companion);
        }

        let mut hit: Option<(String, f32)> = None;
        for name in candidates {
            let Some(object) = world.get(name) else {
                continue;
            };
            if let Some(t) = ray.intersect_sphere(object.position, PICK_RADIUS) {
                if hit.as_ref().map_or(true, |(_, best)| t < *best) {
                    hit = Some((name.to_string(), t));
                }
            }
        }

        let (name, _) = hit?;
        debug!("clicked {name}");
        self.start_pulse(&name, world);
        Some(name)
    }

    fn start_pulse(&mut self, name: &str, world: &WorldStore) {
        // revert any pulse still in flight before starting the next
        self.tick_pulse(f32::INFINITY, world);
        let Some(object) = world.get(name) else {
            return;
        };
        let original_scale = object.scale;
        world.set_scale(name, original_scale * PULSE_SCALE);
        self.pulse = Some(Pulse {
            name: name.to_string(),
            original_scale,
            remaining: PULSE_SECS,
        });
    }

    fn tick_pulse(&mut self, dt: f32, world: &WorldStore) {
        if let Some(pulse) = self.pulse.as_mut() {
            pulse.remaining -= dt;
            if pulse.remaining <= 0.0 {
                world.set_scale(&pulse.name, pulse.original_scale);
                self.pulse = None;
            }
        }
    }
}

fn planar(position: Vec3) -> Vec2 {
    Vec2::new(position.x, position.z)
}

/// Yaws the overlay so it faces the viewer.
fn billboard(world: &WorldStore, owner: &str, overlay: &str, camera_position: Vec3) {
    let Some(object) = world.get(owner) else {
        return;
    };
    let to_camera = camera_position - object.position;
    let yaw = to_camera.x.atan2(to_camera.z).to_degrees();
    world.update(overlay, |obj| obj.rotation.y = yaw);
}
