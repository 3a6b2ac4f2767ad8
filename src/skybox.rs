//! Equirectangular environment image bound as `Skybox`.

use crate::error::TracerResult;
use std::path::Path;

/// Row-major linear RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyboxImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl SkyboxImage {
    /// Decodes any format the `image` crate was built with (PNG, JPEG, HDR, EXR).
    pub fn load(path: impl AsRef<Path>) -> TracerResult<Self> {
        let path = path.as_ref();
        let image = image::open(path)?.to_rgba32f();
        log::info!(
            "loaded skybox {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self {
            width: image.width(),
            height: image.height(),
            pixels: image.pixels().map(|p| p.0).collect(),
        })
    }

    /// 1x1 stand-in so the `Skybox` slot is always bound. The kernel ignores it unless the
    /// skybox flag is set.
    pub fn placeholder() -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![[0.5, 0.7, 1.0, 1.0]],
        }
    }
}
