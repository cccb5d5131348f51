use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

/// Default world manifest bundled with the crate.
const EMBEDDED_WORLD: &str = include_str!("../assets/world.xml");

/// Quest stage a prop group belongs to. Props in later groups are spawned
/// when the corresponding stage initializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageId {
    Initial,
    Stage2,
    Stage3,
    Stage4,
}

impl StageId {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "initial" => Some(Self::Initial),
            "stage2" => Some(Self::Stage2),
            "stage3" => Some(Self::Stage3),
            "stage4" => Some(Self::Stage4),
            _ => None,
        }
    }
}

/// Role of a placed object; drives interaction registration and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropKind {
    Player,
    Companion,
    Camera,
    Light,
    Ground,
    Wall,
    Frame,
    Can,
    Flower,
    Tree,
    Grass,
    Tile,
    Overlay,
    Prop,
}

impl PropKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "player" => Self::Player,
            "companion" => Self::Companion,
            "camera" => Self::Camera,
            "light" => Self::Light,
            "ground" => Self::Ground,
            "wall" => Self::Wall,
            "frame" => Self::Frame,
            "can" => Self::Can,
            "flower" => Self::Flower,
            "tree" => Self::Tree,
            "grass" => Self::Grass,
            "tile" => Self::Tile,
            "overlay" => Self::Overlay,
            "prop" => Self::Prop,
            _ => return None,
        })
    }
}

/// Prop placement as described by the world manifest.
///
/// Transform values are scene tuning data with no algorithmic significance;
/// they live here rather than in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropSpec {
    pub name: String,
    pub kind: PropKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    #[serde(default = "default_color")]
    pub color: Vec3,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
}

impl Default for PropSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: PropKind::Prop,
            mesh: None,
            color: default_color(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            parent: None,
            visible: true,
            fov: default_fov(),
            intensity: default_intensity(),
        }
    }
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_visible() -> bool {
    true
}

fn default_fov() -> f32 {
    45.0
}

fn default_intensity() -> f32 {
    1.0
}

/// Named animation clip with its source duration in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipEntry {
    pub name: String,
    pub duration: f32,
}

/// Skinned character schema: clip table, named nodes, and the morphable
/// facial mesh the model is expected to carry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterSpec {
    pub face: Option<String>,
    pub nodes: Vec<String>,
    pub clips: Vec<ClipEntry>,
}

/// Parsed world manifest: staged prop groups plus the character schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldManifest {
    pub stages: Vec<(StageId, Vec<PropSpec>)>,
    pub character: CharacterSpec,
}

impl WorldManifest {
    /// Parses the manifest XML produced alongside the scene assets.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid world manifest XML")?;
        let root = document.root_element();
        if !root.has_tag_name("world") {
            return Err(anyhow!("manifest root must be <world>"));
        }

        let mut stages = Vec::new();
        for stage_node in root.children().filter(|n| n.has_tag_name("stage")) {
            let stage_name = stage_node
                .attribute("name")
                .ok_or_else(|| anyhow!("<stage> is missing its name attribute"))?;
            let stage = StageId::from_name(stage_name)
                .ok_or_else(|| anyhow!("unknown stage name: {stage_name}"))?;
            let mut props = Vec::new();
            for node in stage_node.children().filter(|n| n.has_tag_name("prop")) {
                props.push(parse_prop(&node)?);
            }
            stages.push((stage, props));
        }

        let character = root
            .children()
            .find(|n| n.has_tag_name("character"))
            .map(|node| parse_character(&node))
            .transpose()?
            .unwrap_or_default();

        Ok(Self { stages, character })
    }

    /// Returns the manifest bundled with the crate.
    pub fn embedded() -> Result<Self> {
        Self::from_xml(EMBEDDED_WORLD).context("embedded world manifest is malformed")
    }

    /// Props belonging to the requested stage group.
    pub fn props_for(&self, stage: StageId) -> &[PropSpec] {
        self.stages
            .iter()
            .find(|(id, _)| *id == stage)
            .map(|(_, props)| props.as_slice())
            .unwrap_or(&[])
    }

    /// Mesh paths referenced by the requested stage group.
    pub fn meshes_for(&self, stage: StageId) -> Vec<String> {
        let mut meshes: Vec<String> = self
            .props_for(stage)
            .iter()
            .filter_map(|prop| prop.mesh.clone())
            .collect();
        meshes.sort();
        meshes.dedup();
        meshes
    }
}

fn parse_prop(node: &Node<'_, '_>) -> Result<PropSpec> {
    let mut prop = PropSpec::default();
    prop.name = required_text(node, "name")?;
    let kind = required_text(node, "kind")?;
    prop.kind = PropKind::from_name(&kind)
        .ok_or_else(|| anyhow!("prop {} has unknown kind {kind}", prop.name))?;
    prop.mesh = optional_text(node, "mesh");
    prop.color = parse_color(optional_text(node, "color"), prop.color)?;
    prop.position = parse_vec3(optional_text(node, "position"), prop.position)?;
    prop.rotation = parse_vec3(optional_text(node, "rotation"), prop.rotation)?;
    prop.scale = parse_vec3(optional_text(node, "scale"), prop.scale)?;
    prop.parent = optional_text(node, "parent");
    if let Some(value) = optional_text(node, "visible") {
        prop.visible = value == "true" || value == "1";
    }
    prop.fov = parse_f32(optional_text(node, "fov"), prop.fov)?;
    prop.intensity = parse_f32(optional_text(node, "intensity"), prop.intensity)?;
    Ok(prop)
}

fn parse_character(node: &Node<'_, '_>) -> Result<CharacterSpec> {
    let face = optional_text(node, "face");
    let nodes = node
        .children()
        .filter(|child| child.has_tag_name("node"))
        .filter_map(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    let mut clips = Vec::new();
    for clip in node.children().filter(|child| child.has_tag_name("clip")) {
        let name = required_text(&clip, "name")?;
        let duration = parse_f32(optional_text(&clip, "duration"), 1.0)?;
        if duration <= 0.0 {
            return Err(anyhow!("clip {name} has non-positive duration"));
        }
        clips.push(ClipEntry { name, duration });
    }

    Ok(CharacterSpec { face, nodes, clips })
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let x = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    let y = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    let z = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    Ok(Vec3::new(x, y, z))
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let rgb = parse_vec3(Some(value), default)?;
    Ok(rgb / 255.0)
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <world>
        <stage name="initial">
            <prop>
                <name>player</name>
                <kind>player</kind>
                <mesh>models/robot.obj</mesh>
                <color>120 144 156</color>
            </prop>
            <prop>
                <name>camera</name>
                <kind>camera</kind>
                <position>-5 3 10</position>
                <fov>45</fov>
            </prop>
        </stage>
        <stage name="stage2">
            <prop>
                <name>frame1</name>
                <kind>frame</kind>
                <position>-6 3 -19</position>
            </prop>
            <prop>
                <name>frame1_bubble</name>
                <kind>overlay</kind>
                <parent>frame1</parent>
                <visible>false</visible>
            </prop>
        </stage>
        <character>
            <face>Head_4</face>
            <node>Head_4</node>
            <clip><name>Idle</name><duration>7.46</duration></clip>
            <clip><name>Walking</name><duration>1.04</duration></clip>
        </character>
    </world>
    "#;

    #[test]
    fn parse_manifest_populates_stages_and_character() {
        let manifest = WorldManifest::from_xml(SAMPLE).unwrap();
        assert_eq!(manifest.props_for(StageId::Initial).len(), 2);
        assert_eq!(manifest.props_for(StageId::Stage2).len(), 2);
        assert!(manifest.props_for(StageId::Stage3).is_empty());

        let camera = &manifest.props_for(StageId::Initial)[1];
        assert_eq!(camera.kind, PropKind::Camera);
        assert_eq!(camera.position, Vec3::new(-5.0, 3.0, 10.0));
        assert_eq!(camera.fov, 45.0);

        let bubble = &manifest.props_for(StageId::Stage2)[1];
        assert_eq!(bubble.parent.as_deref(), Some("frame1"));
        assert!(!bubble.visible);

        assert_eq!(manifest.character.face.as_deref(), Some("Head_4"));
        assert_eq!(manifest.character.clips.len(), 2);
    }

    #[test]
    fn colors_are_normalized_from_bytes() {
        let manifest = WorldManifest::from_xml(SAMPLE).unwrap();
        let player = &manifest.props_for(StageId::Initial)[0];
        assert!((player.color.x - 120.0 / 255.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_name_is_an_error() {
        let bad = r#"<world><stage name="initial"><prop><kind>prop</kind></prop></stage></world>"#;
        assert!(WorldManifest::from_xml(bad).is_err());
    }

    #[test]
    fn unknown_stage_is_an_error() {
        let bad = r#"<world><stage name="bonus"></stage></world>"#;
        assert!(WorldManifest::from_xml(bad).is_err());
    }

    #[test]
    fn embedded_manifest_parses() {
        let manifest = WorldManifest::embedded().unwrap();
        assert!(!manifest.props_for(StageId::Initial).is_empty());
        assert!(!manifest.character.clips.is_empty());
    }
}
