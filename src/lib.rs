//! Compute-shader ray tracer: scene extraction, GPU geometry buffers and a progressive
//! tiled render loop behind a swappable [`backend::Backend`].

pub mod accumulate;
pub mod backend;
pub mod buffers;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod passes;
pub mod pipeline;
pub mod scene;
pub mod screenshot;
pub mod skybox;
pub mod target;
pub mod wgpu_ctx;
pub mod wgpu_utils;

pub use camera::{CameraController, CameraFrame};
pub use config::{KernelProfile, ResizePolicy, TracerConfig};
pub use error::{TracerError, TracerResult};
pub use pipeline::TracingPipeline;
pub use scene::SceneDescription;
