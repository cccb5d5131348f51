//! Core modules for the Robot Garden runtime, a native rework of an
//! interactive browser scene.
//!
//! The crate exposes high level building blocks that can be composed to
//! drive the quest headlessly or under a real window.  Rendering and
//! platform integration are kept behind narrow seams so that the game
//! systems stay testable without a GPU.

pub mod animation;
pub mod app;
pub mod assets;
pub mod garden;
pub mod hint;
pub mod input;
pub mod interact;
pub mod mesh;
pub mod movement;
pub mod quest;
pub mod render;
pub mod scene;
pub mod walkthrough;
pub mod world;

pub use animation::{AnimationSelector, ClipLibrary, ClipName, Mixer};
pub use app::GardenApp;
pub use assets::{validate_character, AssetError, AssetLibrary, Loadable};
pub use garden::WateringGrid;
pub use hint::HelpBubble;
pub use input::{Bindings, Control, InputState, KeyCode, NamedKey};
pub use mesh::{parse_obj, MeshData};
pub use quest::{Quest, QuestEvent, Stage, StageFlags};
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::{PropKind, StageId, WorldManifest};
pub use world::{WorldObject, WorldStore};
