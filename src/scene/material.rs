use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Surface colours read by the extractor. A material without a specular channel
/// contributes a zero specular to its record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub albedo: Vec3,
    #[serde(default)]
    pub specular: Option<Vec3>,
}

impl Material {
    pub fn new(albedo: impl Into<Vec3>) -> Self {
        Self {
            albedo: albedo.into(),
            specular: None,
        }
    }

    pub fn specular(mut self, specular: impl Into<Vec3>) -> Self {
        self.specular = Some(specular.into());
        self
    }

    /// Mirror-like: dark albedo, bright specular.
    pub fn metal(tint: impl Into<Vec3>) -> Self {
        Self::new(Vec3::splat(0.04)).specular(tint)
    }

    pub fn specular_or_zero(&self) -> Vec3 {
        self.specular.unwrap_or(Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_specular_defaults_to_zero() {
        let mat = Material::new([1.0, 0.5, 0.25]);
        assert_eq!(mat.specular_or_zero(), Vec3::ZERO);
        assert_eq!(mat.specular([0.2; 3]).specular_or_zero(), Vec3::splat(0.2));
    }
}
