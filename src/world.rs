use std::sync::Arc;

use glam::{Mat4, Vec3};
use log::debug;
use parking_lot::RwLock;

use crate::scene::{PropKind, PropSpec};

/// Live scene-graph entry. Rotation is stored in degrees, matching the
/// manifest; `parent` is a weak by-name link used for attachments (the
/// watering can riding on the player, overlays pinned to their owner).
#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pub name: String,
    pub kind: PropKind,
    pub mesh: Option<String>,
    pub color: Vec3,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub visible: bool,
    pub parent: Option<String>,
    pub fov: f32,
    pub intensity: f32,
}

impl From<&PropSpec> for WorldObject {
    fn from(spec: &PropSpec) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.kind,
            mesh: spec.mesh.clone(),
            color: spec.color,
            position: spec.position,
            rotation: spec.rotation,
            scale: spec.scale,
            visible: spec.visible,
            parent: spec.parent.clone(),
            fov: spec.fov,
            intensity: spec.intensity,
        }
    }
}

impl WorldObject {
    /// Model matrix for this object's own transform.
    pub fn model_matrix(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        let rotation = Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_x(self.rotation.x.to_radians());
        let scale = Mat4::from_scale(self.scale);
        translation * rotation * scale
    }
}

/// Thread-safe container mirroring the mutable state of the scene graph.
#[derive(Debug, Default)]
pub struct WorldStore {
    objects: Arc<RwLock<Vec<WorldObject>>>,
}

impl Clone for WorldStore {
    fn clone(&self) -> Self {
        Self {
            objects: Arc::clone(&self.objects),
        }
    }
}

impl WorldStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group of props to the world. Names already present are left
    /// untouched so repeated stage spawns stay idempotent.
    pub fn spawn(&self, specs: &[PropSpec]) {
        let mut guard = self.objects.write();
        for spec in specs {
            if guard.iter().any(|object| object.name == spec.name) {
                debug!("skipping duplicate spawn of {}", spec.name);
                continue;
            }
            guard.push(WorldObject::from(spec));
        }
    }

    /// Adds already-built objects (used for the procedurally generated
    /// garden tiles).
    pub fn spawn_objects(&self, objects: Vec<WorldObject>) {
        let mut guard = self.objects.write();
        for object in objects {
            if guard.iter().any(|existing| existing.name == object.name) {
                continue;
            }
            guard.push(object);
        }
    }

    /// Returns a clone of the requested object.
    pub fn get(&self, name: &str) -> Option<WorldObject> {
        self.objects
            .read()
            .iter()
            .find(|object| object.name == name)
            .cloned()
    }

    /// Applies a mutation to the requested object.
    pub fn update<F, R>(&self, name: &str, mut updater: F) -> Option<R>
    where
        F: FnMut(&mut WorldObject) -> R,
    {
        let mut guard = self.objects.write();
        let object = guard.iter_mut().find(|object| object.name == name)?;
        Some(updater(object))
    }

    pub fn set_position(&self, name: &str, position: Vec3) -> bool {
        self.update(name, |obj| obj.position = position).is_some()
    }

    pub fn set_rotation(&self, name: &str, rotation: Vec3) -> bool {
        self.update(name, |obj| obj.rotation = rotation).is_some()
    }

    pub fn set_color(&self, name: &str, color: Vec3) -> bool {
        self.update(name, |obj| obj.color = color).is_some()
    }

    pub fn set_visible(&self, name: &str, visible: bool) -> bool {
        self.update(name, |obj| obj.visible = visible).is_some()
    }

    pub fn set_scale(&self, name: &str, scale: Vec3) -> bool {
        self.update(name, |obj| obj.scale = scale).is_some()
    }

    /// Re-parents an object; `None` detaches it back to world space.
    pub fn set_parent(&self, name: &str, parent: Option<&str>) -> bool {
        let parent = parent.map(|p| p.to_string());
        self.update(name, |obj| obj.parent = parent.clone())
            .is_some()
    }

    /// Name of the first object of the given kind, if any.
    pub fn find_by_kind(&self, kind: PropKind) -> Option<String> {
        self.objects
            .read()
            .iter()
            .find(|object| object.kind == kind)
            .map(|object| object.name.clone())
    }

    /// Names of every object of the given kind, in spawn order.
    pub fn names_by_kind(&self, kind: PropKind) -> Vec<String> {
        self.objects
            .read()
            .iter()
            .filter(|object| object.kind == kind)
            .map(|object| object.name.clone())
            .collect()
    }

    /// Returns a snapshot of all stored objects, parent links unresolved.
    pub fn all_objects(&self) -> Vec<WorldObject> {
        self.objects.read().clone()
    }

    /// Snapshot with one level of parent attachment resolved: a child's
    /// stored position is treated as an offset rotated by the parent's yaw
    /// and added to the parent's position.
    pub fn resolved_snapshot(&self) -> Vec<WorldObject> {
        let guard = self.objects.read();
        let mut resolved = Vec::with_capacity(guard.len());
        for object in guard.iter() {
            let mut object = object.clone();
            if let Some(parent_name) = object.parent.as_deref() {
                if let Some(parent) = guard.iter().find(|o| o.name == parent_name) {
                    let yaw = parent.rotation.y.to_radians();
                    let offset = glam::Quat::from_rotation_y(yaw) * object.position;
                    object.position = parent.position + offset;
                    if !parent.visible {
                        object.visible = false;
                    }
                }
            }
            resolved.push(object);
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PropSpec;

    fn spec(name: &str, kind: PropKind) -> PropSpec {
        PropSpec {
            name: name.to_string(),
            kind,
            ..PropSpec::default()
        }
    }

    #[test]
    fn spawn_and_get_object() {
        let world = WorldStore::new();
        world.spawn(&[spec("wall1", PropKind::Wall)]);
        assert!(world.get("wall1").is_some());
        assert!(world.get("wall2").is_none());
    }

    #[test]
    fn spawning_the_same_name_twice_is_a_no_op() {
        let world = WorldStore::new();
        world.spawn(&[spec("frame1", PropKind::Frame)]);
        world.set_color("frame1", Vec3::new(1.0, 0.0, 0.0));
        world.spawn(&[spec("frame1", PropKind::Frame)]);
        assert_eq!(world.all_objects().len(), 1);
        assert_eq!(world.get("frame1").unwrap().color, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn update_returns_none_for_missing_object() {
        let world = WorldStore::new();
        assert!(!world.set_color("ghost", Vec3::ONE));
    }

    #[test]
    fn resolved_snapshot_applies_parent_offset() {
        let world = WorldStore::new();
        world.spawn(&[spec("player", PropKind::Player), spec("can", PropKind::Can)]);
        world.set_position("player", Vec3::new(4.0, 0.0, -2.0));
        world.set_parent("can", Some("player"));
        world.set_position("can", Vec3::new(0.0, 1.0, 0.0));

        let snapshot = world.resolved_snapshot();
        let can = snapshot.iter().find(|o| o.name == "can").unwrap();
        assert_eq!(can.position, Vec3::new(4.0, 1.0, -2.0));

        world.set_parent("can", None);
        let snapshot = world.resolved_snapshot();
        let can = snapshot.iter().find(|o| o.name == "can").unwrap();
        assert_eq!(can.position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn hidden_parent_hides_attached_overlay() {
        let world = WorldStore::new();
        world.spawn(&[spec("frame1", PropKind::Frame)]);
        let mut bubble = spec("frame1_bubble", PropKind::Overlay);
        bubble.parent = Some("frame1".to_string());
        world.spawn(&[bubble]);

        world.set_visible("frame1", false);
        let snapshot = world.resolved_snapshot();
        let bubble = snapshot.iter().find(|o| o.name == "frame1_bubble").unwrap();
        assert!(!bubble.visible);
    }

    #[test]
    fn names_by_kind_preserves_spawn_order() {
        let world = WorldStore::new();
        world.spawn(&[
            spec("frame2", PropKind::Frame),
            spec("frame1", PropKind::Frame),
        ]);
        assert_eq!(world.names_by_kind(PropKind::Frame), vec!["frame2", "frame1"]);
    }
}
