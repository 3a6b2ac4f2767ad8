//! Fixed-layout records shared with the tracing kernel.
//!
//! Strides are part of the kernel contract and are checked at compile time.

use bytemuck::{Pod, Zeroable};

pub const SPHERE_STRIDE: usize = 40;
pub const MESH_STRIDE: usize = 112;
pub const VERTEX_STRIDE: usize = 12;
pub const INDEX_STRIDE: usize = 4;

// 40 bytes: 10 x f32
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SphereRecord {
    pub position: [f32; 3],
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
    pub radius: f32,
}

// 112 bytes: column-major matrix, bounding sphere, colours, index range
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshRecord {
    pub local_to_world: [[f32; 4]; 4],
    pub center: [f32; 3],
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
    pub radius: f32,
    pub indices_offset: u32, // first index of this mesh in the shared index pool
    pub indices_count: u32,
}

const _: () = assert!(std::mem::size_of::<SphereRecord>() == SPHERE_STRIDE);
const _: () = assert!(std::mem::size_of::<MeshRecord>() == MESH_STRIDE);
const _: () = assert!(std::mem::size_of::<[f32; 3]>() == VERTEX_STRIDE);
const _: () = assert!(std::mem::size_of::<u32>() == INDEX_STRIDE);

impl MeshRecord {
    pub fn index_range(&self) -> std::ops::Range<usize> {
        let start = self.indices_offset as usize;
        start..start + self.indices_count as usize
    }
}
