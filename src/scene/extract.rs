use super::records::{MeshRecord, SphereRecord};
use super::{Material, SceneDescription, SceneObject};
use crate::error::{TracerError, TracerResult};
use glam::Vec3;

/// Flattened geometry ready for upload: record lists plus the shared vertex and index pools.
///
/// Indices in `indices` are absolute positions into `vertices`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedScene {
    pub spheres: Vec<SphereRecord>,
    pub meshes: Vec<MeshRecord>,
    pub vertices: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl ExtractedScene {
    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty() && self.meshes.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Checks the pool invariants: every mesh range lies inside the index pool, ranges are
    /// contiguous in record order, and every index addresses the vertex pool.
    pub fn validate(&self) -> TracerResult<()> {
        let mut expected_offset = 0usize;
        for (i, mesh) in self.meshes.iter().enumerate() {
            let range = mesh.index_range();
            if range.start != expected_offset {
                return Err(TracerError::configuration(format!(
                    "mesh record {} starts at index {} but the previous mesh ended at {}",
                    i, range.start, expected_offset
                )));
            }
            if range.end > self.indices.len() {
                return Err(TracerError::configuration(format!(
                    "mesh record {} index range {:?} exceeds index pool of {}",
                    i,
                    range,
                    self.indices.len()
                )));
            }
            expected_offset = range.end;
        }

        let vertex_count = self.vertices.len();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(TracerError::configuration(format!(
                "index {} out of range for vertex pool of {}",
                bad, vertex_count
            )));
        }
        Ok(())
    }

    fn push_sphere(&mut self, object: &SceneObject) -> TracerResult<()> {
        let material = require_material(object)?;
        let collider = object.collider.ok_or_else(|| {
            TracerError::configuration(format!("sphere '{}' has no sphere collider", object.name))
        })?;

        self.spheres.push(SphereRecord {
            position: object.transform.translation.into(),
            albedo: material.albedo.into(),
            specular: material.specular_or_zero().into(),
            radius: collider.radius,
        });
        Ok(())
    }

    fn push_mesh(&mut self, object: &SceneObject) -> TracerResult<()> {
        let material = require_material(object)?;
        let mesh = object.mesh.as_ref().ok_or_else(|| {
            TracerError::configuration(format!("mesh object '{}' has no mesh data", object.name))
        })?;

        if mesh.indices.len() % 3 != 0 {
            return Err(TracerError::configuration(format!(
                "mesh '{}' has {} indices, not a whole number of triangles",
                object.name,
                mesh.indices.len()
            )));
        }
        let local_count = mesh.positions.len();
        if let Some(bad) = mesh.indices.iter().find(|&&i| i as usize >= local_count) {
            return Err(TracerError::configuration(format!(
                "mesh '{}' index {} out of range for {} vertices",
                object.name, bad, local_count
            )));
        }

        let first_vertex = pool_len(self.vertices.len(), &object.name)?;
        let first_index = pool_len(self.indices.len(), &object.name)?;
        pool_len(self.vertices.len() + local_count, &object.name)?;
        pool_len(self.indices.len() + mesh.indices.len(), &object.name)?;

        let local_to_world = object.transform.local_to_world();
        let (center, radius) = match object.collider {
            Some(collider) => (
                object.transform.translation + collider.center,
                collider.radius * object.transform.max_scale() * 3.0f32.sqrt(),
            ),
            None => {
                let (min, max) = mesh
                    .positions
                    .iter()
                    .map(|&p| local_to_world.transform_point3(Vec3::from(p)))
                    .fold(
                        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
                        |(min, max), p| (min.min(p), max.max(p)),
                    );
                if local_count == 0 {
                    (object.transform.translation, 0.0)
                } else {
                    ((min + max) * 0.5, (max - min).length() * 0.5)
                }
            }
        };

        self.vertices.extend_from_slice(&mesh.positions);
        self.indices.extend(mesh.indices.iter().map(|&i| i + first_vertex));

        self.meshes.push(MeshRecord {
            local_to_world: local_to_world.to_cols_array_2d(),
            center: center.into(),
            albedo: material.albedo.into(),
            specular: material.specular_or_zero().into(),
            radius,
            indices_offset: first_index,
            indices_count: mesh.indices.len() as u32,
        });
        Ok(())
    }
}

fn require_material(object: &SceneObject) -> TracerResult<Material> {
    object.material.ok_or_else(|| {
        TracerError::configuration(format!("object '{}' has no material", object.name))
    })
}

fn pool_len(len: usize, name: &str) -> TracerResult<u32> {
    u32::try_from(len).map_err(|_| {
        TracerError::configuration(format!(
            "geometry pools overflow 32-bit indexing at mesh '{}'",
            name
        ))
    })
}

/// Converts a scene description into GPU records in input order.
pub struct PrimitiveExtractor;

impl PrimitiveExtractor {
    /// Fails on the first object missing a required component; nothing is returned in that case.
    pub fn extract(scene: &SceneDescription) -> TracerResult<ExtractedScene> {
        let mut out = ExtractedScene::default();

        for object in &scene.spheres {
            out.push_sphere(object)?;
        }
        for object in &scene.meshes {
            out.push_mesh(object)?;
        }

        log::debug!(
            "extracted {} spheres, {} meshes ({} vertices, {} triangles)",
            out.spheres.len(),
            out.meshes.len(),
            out.vertices.len(),
            out.triangle_count()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MeshData, SphereCollider, Transform};

    fn triangle() -> MeshData {
        MeshData::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 1, 2],
        )
    }

    fn quad() -> MeshData {
        MeshData::new(
            vec![
                [-0.5, 0.0, 0.5],
                [0.5, 0.0, 0.5],
                [-0.5, 0.0, -0.5],
                [0.5, 0.0, -0.5],
            ],
            vec![0, 1, 2, 2, 1, 3],
        )
    }

    #[test]
    fn test_single_sphere_record() {
        let mut scene = SceneDescription::new();
        scene.add_sphere(SceneObject::sphere(
            "ball",
            Vec3::ZERO,
            1.0,
            Material::new([1.0, 1.0, 1.0]),
        ));

        let out = PrimitiveExtractor::extract(&scene).unwrap();
        assert_eq!(
            out.spheres,
            vec![SphereRecord {
                position: [0.0; 3],
                albedo: [1.0; 3],
                specular: [0.0; 3],
                radius: 1.0,
            }]
        );
        assert!(out.meshes.is_empty() && out.vertices.is_empty() && out.indices.is_empty());
    }

    #[test]
    fn test_single_triangle_mesh() {
        let mut scene = SceneDescription::new();
        scene.add_mesh(SceneObject::mesh(
            "tri",
            Transform::default(),
            triangle(),
            Material::new([0.5, 0.5, 0.5]),
        ));

        let out = PrimitiveExtractor::extract(&scene).unwrap();
        assert_eq!(out.vertices.len(), 3);
        assert_eq!(out.indices, vec![0, 1, 2]);
        assert_eq!(out.meshes[0].indices_offset, 0);
        assert_eq!(out.meshes[0].indices_count, 3);
    }

    #[test]
    fn test_indices_are_shifted_by_running_vertex_count() {
        let mut scene = SceneDescription::new();
        for (i, mesh) in [triangle(), quad(), triangle()].into_iter().enumerate() {
            scene.add_mesh(SceneObject::mesh(
                format!("m{}", i),
                Transform::from_translation(Vec3::X * i as f32),
                mesh,
                Material::new([1.0, 1.0, 1.0]),
            ));
        }

        let out = PrimitiveExtractor::extract(&scene).unwrap();
        assert_eq!(out.vertices.len(), 10);
        assert_eq!(out.indices, vec![0, 1, 2, 3, 4, 5, 5, 4, 6, 7, 8, 9]);

        let mut running = 0;
        for mesh in &out.meshes {
            assert_eq!(mesh.indices_offset, running);
            running += mesh.indices_count;
        }
        assert_eq!(running as usize, out.indices.len());
        assert!(out.indices.iter().all(|&i| (i as usize) < out.vertices.len()));
        out.validate().unwrap();
    }

    #[test]
    fn test_record_order_follows_input_order() {
        let mut scene = SceneDescription::new();
        for i in 0..5 {
            scene.add_sphere(SceneObject::sphere(
                format!("s{}", i),
                Vec3::new(i as f32, 0.0, 0.0),
                0.1 * (i + 1) as f32,
                Material::new([1.0, 1.0, 1.0]),
            ));
        }
        let out = PrimitiveExtractor::extract(&scene).unwrap();
        let xs: Vec<f32> = out.spheres.iter().map(|s| s.position[0]).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sphere_without_collider_fails_whole_extraction() {
        let mut scene = SceneDescription::new();
        scene.add_sphere(SceneObject::sphere(
            "ok",
            Vec3::ZERO,
            1.0,
            Material::new([1.0, 1.0, 1.0]),
        ));
        scene.add_sphere(SceneObject::new("bare").with_material(Material::new([1.0, 0.0, 0.0])));

        let err = PrimitiveExtractor::extract(&scene).unwrap_err();
        assert!(matches!(err, TracerError::Configuration(ref m) if m.contains("bare")));
    }

    #[test]
    fn test_missing_material_and_mesh_are_configuration_errors() {
        let mut scene = SceneDescription::new();
        scene.add_mesh(SceneObject::new("no-material").with_mesh(triangle()));
        assert!(matches!(
            PrimitiveExtractor::extract(&scene),
            Err(TracerError::Configuration(_))
        ));

        let mut scene = SceneDescription::new();
        scene.add_mesh(SceneObject::new("no-mesh").with_material(Material::new([1.0, 1.0, 1.0])));
        assert!(matches!(
            PrimitiveExtractor::extract(&scene),
            Err(TracerError::Configuration(_))
        ));
    }

    #[test]
    fn test_out_of_range_local_index_is_rejected() {
        let mut scene = SceneDescription::new();
        scene.add_mesh(SceneObject::mesh(
            "broken",
            Transform::default(),
            MeshData::new(vec![[0.0; 3]; 3], vec![0, 1, 3]),
            Material::new([1.0, 1.0, 1.0]),
        ));
        assert!(matches!(
            PrimitiveExtractor::extract(&scene),
            Err(TracerError::Configuration(_))
        ));
    }

    #[test]
    fn test_mesh_bounds_from_collider_and_from_vertices() {
        let transform = Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)).with_scale(Vec3::splat(2.0));
        let mut scene = SceneDescription::new();
        scene.add_mesh(
            SceneObject::mesh("collided", transform, quad(), Material::new([1.0, 1.0, 1.0]))
                .with_collider(SphereCollider {
                    center: Vec3::new(0.0, 0.5, 0.0),
                    radius: 1.0,
                }),
        );
        scene.add_mesh(SceneObject::mesh(
            "derived",
            transform,
            quad(),
            Material::new([1.0, 1.0, 1.0]),
        ));

        let out = PrimitiveExtractor::extract(&scene).unwrap();
        assert_eq!(out.meshes[0].center, [0.0, 2.5, 0.0]);
        assert!((out.meshes[0].radius - 2.0 * 3.0f32.sqrt()).abs() < 1e-5);

        // quad scaled by 2 spans [-1, 1] in x and z at y = 2
        assert_eq!(out.meshes[1].center, [0.0, 2.0, 0.0]);
        assert!((out.meshes[1].radius - 2.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_validate_catches_broken_pools() {
        let mut out = ExtractedScene {
            vertices: vec![[0.0; 3]; 3],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        out.meshes.push(MeshRecord {
            indices_offset: 0,
            indices_count: 6,
            ..bytemuck::Zeroable::zeroed()
        });
        assert!(out.validate().is_err());

        out.meshes[0].indices_count = 3;
        out.indices[2] = 7;
        assert!(out.validate().is_err());

        out.indices[2] = 2;
        out.validate().unwrap();
    }
}
