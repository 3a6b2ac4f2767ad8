//! Scene description handed to the extractor by the scene provider.
//!
//! Objects carry their components as optional fields. Which ones are required depends on the
//! list an object is placed in, and the extractor rejects objects that lack them.

pub mod extract;
pub mod material;
pub mod records;
pub mod scenes;

use crate::error::TracerResult;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use extract::{ExtractedScene, PrimitiveExtractor};
pub use material::Material;
pub use records::{MeshRecord, SphereRecord};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn local_to_world(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn max_scale(&self) -> f32 {
        self.scale.abs().max_element()
    }
}

/// Bounding sphere attached to an object. `center` is an offset from the object's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereCollider {
    #[serde(default)]
    pub center: Vec3,
    pub radius: f32,
}

impl SphereCollider {
    pub fn new(radius: f32) -> Self {
        Self {
            center: Vec3::ZERO,
            radius,
        }
    }
}

/// Local-space triangle list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub material: Option<Material>,
    #[serde(default)]
    pub collider: Option<SphereCollider>,
    #[serde(default)]
    pub mesh: Option<MeshData>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An object with everything a sphere entry needs.
    pub fn sphere(name: impl Into<String>, position: Vec3, radius: f32, material: Material) -> Self {
        Self::new(name)
            .with_transform(Transform::from_translation(position))
            .with_collider(SphereCollider::new(radius))
            .with_material(material)
    }

    /// An object with everything a mesh entry needs.
    pub fn mesh(
        name: impl Into<String>,
        transform: Transform,
        mesh: MeshData,
        material: Material,
    ) -> Self {
        Self::new(name)
            .with_transform(transform)
            .with_mesh(mesh)
            .with_material(material)
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_collider(mut self, collider: SphereCollider) -> Self {
        self.collider = Some(collider);
        self
    }

    pub fn with_mesh(mut self, mesh: MeshData) -> Self {
        self.mesh = Some(mesh);
        self
    }
}

/// Ordered sphere and mesh object lists. Enumeration order is the record order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub spheres: Vec<SceneObject>,
    #[serde(default)]
    pub meshes: Vec<SceneObject>,
}

impl SceneDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sphere(&mut self, object: SceneObject) -> &mut Self {
        self.spheres.push(object);
        self
    }

    pub fn add_mesh(&mut self, object: SceneObject) -> &mut Self {
        self.meshes.push(object);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty() && self.meshes.is_empty()
    }

    pub fn from_json_str(json: &str) -> TracerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> TracerResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }
}
