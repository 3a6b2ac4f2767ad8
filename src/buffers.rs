use crate::backend::{Backend, BufferSlot};
use crate::error::TracerResult;
use crate::scene::ExtractedScene;

/// Logical record counts of the four geometry buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryCounts {
    pub spheres: u32,
    pub meshes: u32,
    pub vertices: u32,
    pub indices: u32,
}

impl GeometryCounts {
    fn of(scene: &ExtractedScene) -> Self {
        Self {
            spheres: scene.spheres.len() as u32,
            meshes: scene.meshes.len() as u32,
            vertices: scene.vertices.len() as u32,
            indices: scene.indices.len() as u32,
        }
    }

    pub fn get(&self, slot: BufferSlot) -> u32 {
        match slot {
            BufferSlot::Spheres => self.spheres,
            BufferSlot::Meshes => self.meshes,
            BufferSlot::Vertices => self.vertices,
            BufferSlot::Indices => self.indices,
        }
    }
}

struct GeometryBuffers<B: Backend> {
    // one per BufferSlot, indexed by BufferSlot::index()
    slots: Vec<B::Buffer>,
    counts: GeometryCounts,
}

/// The Spheres, Meshes, Vertices and Indices buffers, always built and replaced together so
/// mesh index ranges stay consistent with the pools they point into.
pub struct GeometryBufferSet<B: Backend> {
    current: Option<GeometryBuffers<B>>,
    generation: u64,
}

impl<B: Backend> Default for GeometryBufferSet<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> GeometryBufferSet<B> {
    pub fn new() -> Self {
        Self {
            current: None,
            generation: 0,
        }
    }

    /// Replaces all four buffers with ones sized exactly to `scene`.
    ///
    /// The new set is fully allocated before the old one is released. If any allocation
    /// fails, the partial new set is freed and the previous buffers stay in place.
    pub fn rebuild(&mut self, backend: &mut B, scene: &ExtractedScene) -> TracerResult<()> {
        scene.validate()?;

        let contents: [&[u8]; 4] = [
            bytemuck::cast_slice(&scene.spheres),
            bytemuck::cast_slice(&scene.meshes),
            bytemuck::cast_slice(&scene.vertices),
            bytemuck::cast_slice(&scene.indices),
        ];

        let mut created = Vec::with_capacity(4);
        for slot in BufferSlot::ALL {
            match backend.create_buffer(slot, contents[slot.index()]) {
                Ok(buffer) => created.push(buffer),
                Err(err) => {
                    log::warn!(
                        "geometry rebuild failed at '{}', keeping previous buffers: {}",
                        slot.name(),
                        err
                    );
                    for buffer in created {
                        backend.release_buffer(buffer);
                    }
                    return Err(err);
                }
            }
        }

        self.release(backend);

        let counts = GeometryCounts::of(scene);
        log::info!(
            "geometry buffers rebuilt: {} spheres, {} meshes, {} vertices, {} indices",
            counts.spheres,
            counts.meshes,
            counts.vertices,
            counts.indices
        );
        self.current = Some(GeometryBuffers {
            slots: created,
            counts,
        });
        self.generation += 1;
        Ok(())
    }

    /// Binds every buffer to its kernel slot. Returns false when nothing has been built.
    pub fn bind(&self, backend: &mut B) -> bool {
        let Some(current) = &self.current else {
            return false;
        };
        for slot in BufferSlot::ALL {
            backend.bind_buffer(slot, &current.slots[slot.index()]);
        }
        true
    }

    pub fn release(&mut self, backend: &mut B) {
        if let Some(current) = self.current.take() {
            for buffer in current.slots {
                backend.release_buffer(buffer);
            }
        }
    }

    pub fn is_built(&self) -> bool {
        self.current.is_some()
    }

    pub fn counts(&self) -> Option<GeometryCounts> {
        self.current.as_ref().map(|c| c.counts)
    }

    pub fn buffer(&self, slot: BufferSlot) -> Option<&B::Buffer> {
        self.current.as_ref().map(|c| &c.slots[slot.index()])
    }

    /// Incremented on every successful rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{HostBackend, ResourceEvent};
    use crate::scene::{Material, PrimitiveExtractor, SceneDescription, SceneObject};
    use glam::Vec3;

    fn one_sphere() -> ExtractedScene {
        let mut scene = SceneDescription::new();
        scene.add_sphere(SceneObject::sphere(
            "ball",
            Vec3::ZERO,
            1.0,
            Material::new([1.0, 1.0, 1.0]),
        ));
        PrimitiveExtractor::extract(&scene).unwrap()
    }

    #[test]
    fn test_empty_scene_builds_zero_length_buffers() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut set = GeometryBufferSet::new();
        set.rebuild(&mut backend, &ExtractedScene::default()).unwrap();

        assert_eq!(set.counts(), Some(GeometryCounts::default()));
        for slot in BufferSlot::ALL {
            let buffer = set.buffer(slot).unwrap();
            assert_eq!(backend.read_buffer(buffer).unwrap().len(), 0);
        }
    }

    #[test]
    fn test_rebuild_replaces_all_four_buffers() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut set = GeometryBufferSet::new();
        set.rebuild(&mut backend, &one_sphere()).unwrap();
        backend.clear_events();

        set.rebuild(&mut backend, &ExtractedScene::default()).unwrap();
        let created = backend.count_events(|e| matches!(e, ResourceEvent::BufferCreated { .. }));
        let released = backend.count_events(|e| matches!(e, ResourceEvent::BufferReleased { .. }));
        assert_eq!((created, released), (4, 4));
        assert_eq!(backend.live_buffers(), 4);
        assert_eq!(set.generation(), 2);
    }

    #[test]
    fn test_sphere_buffer_holds_exact_bytes() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut set = GeometryBufferSet::new();
        let scene = one_sphere();
        set.rebuild(&mut backend, &scene).unwrap();

        let bytes = backend
            .read_buffer(set.buffer(BufferSlot::Spheres).unwrap())
            .unwrap();
        assert_eq!(bytes, bytemuck::cast_slice::<_, u8>(&scene.spheres));
        assert_eq!(bytes.len(), 40);
    }

    #[test]
    fn test_invalid_scene_keeps_previous_buffers() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut set = GeometryBufferSet::new();
        set.rebuild(&mut backend, &one_sphere()).unwrap();

        let mut broken = ExtractedScene::default();
        broken.indices.push(5);
        assert!(set.rebuild(&mut backend, &broken).is_err());
        assert_eq!(set.counts().unwrap().spheres, 1);
        assert_eq!(set.generation(), 1);
        assert_eq!(backend.live_buffers(), 4);
    }

    #[test]
    fn test_bind_before_build_reports_false() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let set = GeometryBufferSet::<HostBackend>::new();
        assert!(!set.bind(&mut backend));
    }
}
