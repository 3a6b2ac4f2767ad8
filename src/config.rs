//! Pipeline configuration, loadable from JSON.

use crate::error::{TracerError, TracerResult};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kernel parameter profile. Selects tile size, pixelation and whether frames accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelProfile {
    /// Blocky preview: no accumulation, pixel coordinates quantised to `pixel_size`.
    PixelTrace { pixel_size: u32 },
    /// Full trace with progressive accumulation.
    RayTrace,
}

impl KernelProfile {
    pub fn default_tile_size(&self) -> u32 {
        match self {
            KernelProfile::PixelTrace { .. } => 8,
            KernelProfile::RayTrace => 22,
        }
    }

    pub fn pixel_size(&self) -> u32 {
        match self {
            KernelProfile::PixelTrace { pixel_size } => *pixel_size,
            KernelProfile::RayTrace => 1,
        }
    }

    pub fn accumulates(&self) -> bool {
        matches!(self, KernelProfile::RayTrace)
    }
}

/// What a presentation-surface resize does to temporal accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizePolicy {
    /// A resize counts as a change: the sample counter restarts at 0.
    #[default]
    ResetAccumulation,
    /// The counter keeps running; the recreated history starts zeroed and converges back.
    KeepSampleCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    /// Direction the light travels (its forward vector).
    pub direction: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.3, -1.0, 0.45).normalize(),
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    /// `xyz` = normalised direction, `w` = intensity, as the kernel expects.
    pub fn packed(&self) -> Vec4 {
        self.direction.normalize_or_zero().extend(self.intensity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub profile: KernelProfile,
    /// Overrides the profile's tile size.
    pub tile_size: Option<u32>,
    pub light: DirectionalLight,
    pub default_albedo: Vec4,
    pub default_specular: Vec4,
    pub default_shadow: Vec4,
    pub reflect_amount: u32,
    pub resize_policy: ResizePolicy,
    pub jitter_seed: u64,
    pub skybox: Option<PathBuf>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            profile: KernelProfile::RayTrace,
            tile_size: None,
            light: DirectionalLight::default(),
            default_albedo: Vec4::ONE,
            default_specular: Vec4::ONE,
            default_shadow: Vec4::new(0.0, 0.0, 0.0, 1.0),
            reflect_amount: 2,
            resize_policy: ResizePolicy::default(),
            jitter_seed: 0x5eed,
            skybox: None,
        }
    }
}

/// Upper bound on reflection bounces the kernel loop accepts.
pub const MAX_REFLECT_AMOUNT: u32 = 16;

impl TracerConfig {
    pub fn pixel_trace(pixel_size: u32) -> Self {
        Self {
            profile: KernelProfile::PixelTrace { pixel_size },
            ..Default::default()
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size.unwrap_or_else(|| self.profile.default_tile_size())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> TracerResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: TracerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// `max_invocations` is the backend's limit on threads per work-group.
    pub fn validate_for(&self, max_invocations: u32) -> TracerResult<()> {
        self.validate()?;
        let tile = self.tile_size();
        if tile.saturating_mul(tile) > max_invocations {
            return Err(TracerError::configuration(format!(
                "tile {}x{} exceeds the backend limit of {} invocations per work-group",
                tile, tile, max_invocations
            )));
        }
        Ok(())
    }

    pub fn validate(&self) -> TracerResult<()> {
        if self.tile_size() == 0 {
            return Err(TracerError::configuration("tile size must be at least 1"));
        }
        if self.profile.pixel_size() == 0 {
            return Err(TracerError::configuration("pixel size must be at least 1"));
        }
        if self.reflect_amount > MAX_REFLECT_AMOUNT {
            return Err(TracerError::configuration(format!(
                "reflect amount {} exceeds {}",
                self.reflect_amount, MAX_REFLECT_AMOUNT
            )));
        }
        if !self.light.direction.is_finite()
            || self.light.direction.length_squared() == 0.0
            || !self.light.intensity.is_finite()
        {
            return Err(TracerError::configuration(
                "directional light needs a finite, non-zero direction and finite intensity",
            ));
        }
        Ok(())
    }
}
