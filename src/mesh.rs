use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// GPU-ready mesh buffers: `position.xyz normal.xyz` interleaved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Corner {
    position: usize,
    normal: Option<usize>,
}

/// Parses a Wavefront OBJ document from memory.
///
/// Supports `v`, `vn` and `f` records; polygons are fan-triangulated and
/// flat normals are computed for meshes that do not carry any.
pub fn parse_obj(source: &str) -> Result<MeshData> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut triangles: Vec<[Corner; 3]> = Vec::new();

    for (line_no, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let tag = fields.next().unwrap_or_default();
        match tag {
            "v" => positions.push(
                read_vec3(&mut fields)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                read_vec3(&mut fields)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let corners: Vec<Corner> = fields
                    .map(|field| read_corner(field, positions.len(), normals.len()))
                    .collect::<Result<_>>()
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                if corners.len() < 3 {
                    return Err(anyhow!("face on line {} has fewer than 3 corners", line_no + 1));
                }
                for i in 1..corners.len() - 1 {
                    triangles.push([corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ document does not define any vertices"));
    }
    if triangles.is_empty() {
        return Err(anyhow!("OBJ document does not define any faces"));
    }

    Ok(assemble(&positions, &normals, &triangles))
}

fn read_vec3<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut next = || -> Result<f32> {
        fields
            .next()
            .ok_or_else(|| anyhow!("missing component"))?
            .parse::<f32>()
            .map_err(|err| anyhow!("bad component: {err}"))
    };
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn read_corner(field: &str, position_count: usize, normal_count: usize) -> Result<Corner> {
    let mut parts = field.split('/');
    let position = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("face corner is missing a vertex index"))?
        .parse::<i64>()
        .map_err(|err| anyhow!("bad vertex index: {err}"))?;
    let _texture = parts.next();
    let normal = match parts.next().filter(|p| !p.is_empty()) {
        Some(raw) => Some(resolve_index(
            raw.parse::<i64>()
                .map_err(|err| anyhow!("bad normal index: {err}"))?,
            normal_count,
        )?),
        None => None,
    };
    Ok(Corner {
        position: resolve_index(position, position_count)?,
        normal,
    })
}

// OBJ indices are one-based; negative values count back from the end.
fn resolve_index(raw: i64, count: usize) -> Result<usize> {
    let resolved = if raw > 0 {
        raw - 1
    } else if raw < 0 {
        count as i64 + raw
    } else {
        return Err(anyhow!("OBJ indices are one-based, found 0"));
    };
    if resolved < 0 || resolved as usize >= count {
        return Err(anyhow!("index {raw} is out of range (count {count})"));
    }
    Ok(resolved as usize)
}

fn assemble(positions: &[Vec3], normals: &[Vec3], triangles: &[[Corner; 3]]) -> MeshData {
    let mut mesh = MeshData::default();
    let mut dedup: HashMap<(usize, Option<usize>), u32> = HashMap::new();

    for triangle in triangles {
        let flat = face_normal(positions, triangle);
        for corner in triangle {
            let key = (corner.position, corner.normal);
            let index = *dedup.entry(key).or_insert_with(|| {
                let normal = corner
                    .normal
                    .map(|i| normals[i])
                    .unwrap_or(flat)
                    .normalize_or_zero();
                let position = positions[corner.position];
                let index = (mesh.vertices.len() / 6) as u32;
                mesh.vertices.extend_from_slice(&[
                    position.x, position.y, position.z, normal.x, normal.y, normal.z,
                ]);
                index
            });
            mesh.indices.push(index);
        }
    }
    mesh
}

fn face_normal(positions: &[Vec3], triangle: &[Corner; 3]) -> Vec3 {
    let a = positions[triangle[0].position];
    let b = positions[triangle[1].position];
    let c = positions[triangle[2].position];
    (b - a).cross(c - a).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
";

    const QUAD_WITH_NORMALS: &str = "\
v -1 0 -1
v 1 0 -1
v 1 0 1
v -1 0 1
vn 0 1 0
f 1//1 2//1 3//1 4//1
";

    #[test]
    fn parses_a_triangle_and_computes_its_normal() {
        let mesh = parse_obj(TRIANGLE).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 18);
        // flat normal of the CCW triangle in the XY plane points +Z
        assert_eq!(&mesh.vertices[3..6], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn triangulates_quads_and_reuses_corners() {
        let mesh = parse_obj(QUAD_WITH_NORMALS).unwrap();
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.vertices.len() / 6, 4);
        assert_eq!(&mesh.vertices[3..6], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = parse_obj(source).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn out_of_range_face_is_an_error() {
        let source = "v 0 0 0\nf 1 2 3\n";
        assert!(parse_obj(source).is_err());
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(parse_obj("# nothing here\n").is_err());
    }
}
