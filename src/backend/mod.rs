//! The seam between pipeline logic and the graphics API.
//!
//! The tracing kernel is addressed through named slots (`Spheres`, `Result`, ...) and two
//! parameter blocks. `StaticParams` changes only when geometry is rebuilt; `FrameParams`
//! changes every frame.

pub mod gpu;
pub mod host;
pub mod reference;

use crate::error::TracerResult;
use crate::scene::records::{INDEX_STRIDE, MESH_STRIDE, SPHERE_STRIDE, VERTEX_STRIDE};
use bytemuck::{Pod, Zeroable};

pub use gpu::WgpuBackend;
pub use host::{HostBackend, HostKernel, KernelInputs};
pub use reference::ReferenceKernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    Spheres,
    Meshes,
    Vertices,
    Indices,
}

impl BufferSlot {
    pub const ALL: [BufferSlot; 4] = [
        BufferSlot::Spheres,
        BufferSlot::Meshes,
        BufferSlot::Vertices,
        BufferSlot::Indices,
    ];

    /// Parameter name in the kernel.
    pub fn name(self) -> &'static str {
        match self {
            BufferSlot::Spheres => "Spheres",
            BufferSlot::Meshes => "Meshes",
            BufferSlot::Vertices => "Vertices",
            BufferSlot::Indices => "Indices",
        }
    }

    /// Element stride in bytes.
    pub fn stride(self) -> usize {
        match self {
            BufferSlot::Spheres => SPHERE_STRIDE,
            BufferSlot::Meshes => MESH_STRIDE,
            BufferSlot::Vertices => VERTEX_STRIDE,
            BufferSlot::Indices => INDEX_STRIDE,
        }
    }

    pub fn binding(self) -> u32 {
        match self {
            BufferSlot::Spheres => 1,
            BufferSlot::Meshes => 2,
            BufferSlot::Vertices => 3,
            BufferSlot::Indices => 4,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.binding() as usize - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Result,
    Skybox,
}

impl ImageSlot {
    pub fn name(self) -> &'static str {
        match self {
            ImageSlot::Result => "Result",
            ImageSlot::Skybox => "Skybox",
        }
    }

    pub fn binding(self) -> u32 {
        match self {
            ImageSlot::Result => 0,
            ImageSlot::Skybox => 5,
        }
    }
}

pub const STATIC_PARAMS_BINDING: u32 = 6;
pub const FRAME_PARAMS_BINDING: u32 = 7;

/// Set when a real skybox is bound; otherwise the kernel uses its gradient sky.
pub const FLAG_HAS_SKYBOX: u32 = 1;

/// DirectionalLight, DefaultAlbedo, DefaultSpecular, DefaultShadow, ReflectAmount, PixelSize,
/// plus the logical record counts of the geometry buffers.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct StaticParams {
    pub directional_light: [f32; 4], // xyz: direction, w: intensity
    pub default_albedo: [f32; 4],
    pub default_specular: [f32; 4],
    pub default_shadow: [f32; 4],
    pub reflect_amount: u32,
    pub pixel_size: u32,
    pub sphere_count: u32,
    pub mesh_count: u32,
    pub flags: u32,
    pub _pad: [u32; 3],
}

/// CameraToWorld, InverseProjection, PixelOffset.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameParams {
    pub camera_to_world: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub pixel_offset: [f32; 2],
    pub _pad: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<StaticParams>() == 96);
const _: () = assert!(std::mem::size_of::<FrameParams>() == 144);

/// Resource and dispatch operations the pipeline needs from a graphics API.
///
/// Handles returned by `create_*` are owned by the caller and must be handed back to the
/// matching `release_*`. Binding a handle does not transfer ownership; releasing a bound
/// handle leaves a dangling binding that the next `dispatch` reports as a fault.
pub trait Backend {
    type Buffer;
    type Image;

    /// Largest `tile * tile` work-group the kernel can be compiled with.
    fn max_workgroup_invocations(&self) -> u32;

    /// Allocates a storage buffer holding `contents`. Empty contents are valid and denote a
    /// zero-record buffer.
    fn create_buffer(&mut self, slot: BufferSlot, contents: &[u8]) -> TracerResult<Self::Buffer>;
    fn release_buffer(&mut self, buffer: Self::Buffer);

    /// Allocates a writable RGBA 32-bit float image.
    fn create_image(&mut self, label: &str, width: u32, height: u32) -> TracerResult<Self::Image>;
    /// Allocates a read-only RGBA 32-bit float image with the given row-major pixels.
    fn upload_image(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[[f32; 4]],
    ) -> TracerResult<Self::Image>;
    fn release_image(&mut self, image: Self::Image);
    fn image_extent(&self, image: &Self::Image) -> (u32, u32);

    fn bind_buffer(&mut self, slot: BufferSlot, buffer: &Self::Buffer);
    fn bind_image(&mut self, slot: ImageSlot, image: &Self::Image);
    fn set_static_params(&mut self, params: &StaticParams);
    fn set_frame_params(&mut self, params: &FrameParams);

    /// Runs the kernel over `groups` work-groups of `tile_size x tile_size` invocations.
    /// Does not wait for completion.
    fn dispatch(&mut self, groups: [u32; 2], tile_size: u32) -> TracerResult<()>;

    /// `history = history * (1 - weight) + current * weight`, per pixel.
    fn accumulate(
        &mut self,
        current: &Self::Image,
        history: &Self::Image,
        weight: f32,
    ) -> TracerResult<()>;
}
