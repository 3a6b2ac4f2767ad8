//! Procedural meshes for the demo scene. Triangle lists with shared corners; the kernel
//! derives flat normals from the winding.

use crate::scene::MeshData;

// 1x1 in the XZ plane, centred on the origin
pub fn plane() -> MeshData {
    let positions = vec![
        [-0.5, 0.0, 0.5],
        [0.5, 0.0, 0.5],
        [-0.5, 0.0, -0.5],
        [0.5, 0.0, -0.5],
    ];
    MeshData::new(positions, vec![0, 1, 2, 2, 1, 3])
}

/// Unit cube centred on the origin, four vertices per face.
pub fn cube() -> MeshData {
    let sides = [
        ([-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]), // front
        ([0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]), // back
        ([-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]), // top
        ([-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]), // bottom
        ([0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]), // right
        ([-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]), // left
    ];

    let mut positions = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (a, b, c, d) in sides {
        let base = positions.len() as u32;
        positions.extend_from_slice(&[a, b, c, d]);
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData::new(positions, indices)
}

/// Double pyramid with unit height above and below a square waist of half-width 0.5.
pub fn crystal() -> MeshData {
    let positions = vec![
        [0.0, 1.0, 0.0],
        [0.5, 0.0, 0.5],
        [0.5, 0.0, -0.5],
        [-0.5, 0.0, -0.5],
        [-0.5, 0.0, 0.5],
        [0.0, -1.0, 0.0],
    ];
    let mut indices = Vec::with_capacity(24);
    for i in 0..4u32 {
        let a = 1 + i;
        let b = 1 + (i + 1) % 4;
        indices.extend_from_slice(&[0, a, b]);
        indices.extend_from_slice(&[5, b, a]);
    }
    MeshData::new(positions, indices)
}
