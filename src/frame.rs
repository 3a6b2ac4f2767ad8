//! Per-frame kernel invocation: parameter binding and tiled dispatch.

use crate::backend::{Backend, FrameParams, ImageSlot, StaticParams, FLAG_HAS_SKYBOX};
use crate::buffers::GeometryBufferSet;
use crate::config::TracerConfig;
use crate::error::{TracerError, TracerResult};
use glam::{Mat4, Vec2};

/// Work-groups needed to cover `width x height` with `tile x tile` groups.
pub fn workgroup_count(width: u32, height: u32, tile: u32) -> [u32; 2] {
    [width.div_ceil(tile), height.div_ceil(tile)]
}

pub struct FrameRenderer {
    tile_size: u32,
    statics: StaticParams,
    // geometry generation the static block was last sent for
    bound_generation: Option<u64>,
    fault: Option<String>,
}

impl FrameRenderer {
    pub fn new(config: &TracerConfig) -> Self {
        let statics = StaticParams {
            directional_light: config.light.packed().to_array(),
            default_albedo: config.default_albedo.to_array(),
            default_specular: config.default_specular.to_array(),
            default_shadow: config.default_shadow.to_array(),
            reflect_amount: config.reflect_amount,
            pixel_size: config.profile.pixel_size(),
            sphere_count: 0,
            mesh_count: 0,
            flags: 0,
            _pad: [0; 3],
        };
        Self {
            tile_size: config.tile_size(),
            statics,
            bound_generation: None,
            fault: None,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn statics(&self) -> &StaticParams {
        &self.statics
    }

    pub fn set_skybox_present(&mut self, present: bool) {
        let flags = if present {
            self.statics.flags | FLAG_HAS_SKYBOX
        } else {
            self.statics.flags & !FLAG_HAS_SKYBOX
        };
        if flags != self.statics.flags {
            self.statics.flags = flags;
            self.bound_generation = None;
        }
    }

    /// Binds the geometry buffers and uploads the static block, but only if the geometry was
    /// rebuilt since the last call. Returns whether anything was sent.
    pub fn bind_static<B: Backend>(
        &mut self,
        backend: &mut B,
        geometry: &GeometryBufferSet<B>,
    ) -> TracerResult<bool> {
        let counts = geometry
            .counts()
            .ok_or_else(|| TracerError::not_ready("geometry buffers were never built"))?;
        if self.bound_generation == Some(geometry.generation()) {
            return Ok(false);
        }

        self.statics.sphere_count = counts.spheres;
        self.statics.mesh_count = counts.meshes;
        geometry.bind(backend);
        backend.set_static_params(&self.statics);
        self.bound_generation = Some(geometry.generation());
        log::debug!(
            "static parameters bound for geometry generation {}",
            geometry.generation()
        );
        Ok(true)
    }

    /// Binds `target` as `Result` plus the dynamic parameters and launches the kernel over it.
    ///
    /// A failed dispatch latches the renderer: later calls return `NotReady` until
    /// [`FrameRenderer::revalidate`].
    pub fn dispatch<B: Backend>(
        &mut self,
        backend: &mut B,
        target: &B::Image,
        camera_to_world: Mat4,
        inverse_projection: Mat4,
        jitter: Vec2,
    ) -> TracerResult<()> {
        if let Some(reason) = &self.fault {
            return Err(TracerError::not_ready(format!(
                "halted after dispatch fault: {}",
                reason
            )));
        }
        if self.bound_generation.is_none() {
            return Err(TracerError::not_ready("static parameters were never bound"));
        }

        let (width, height) = backend.image_extent(target);
        backend.bind_image(ImageSlot::Result, target);
        backend.set_frame_params(&FrameParams {
            camera_to_world: camera_to_world.to_cols_array_2d(),
            inverse_projection: inverse_projection.to_cols_array_2d(),
            pixel_offset: jitter.to_array(),
            _pad: [0.0; 2],
        });

        let groups = workgroup_count(width, height, self.tile_size);
        log::trace!(
            "dispatch {}x{} groups of {}x{}",
            groups[0],
            groups[1],
            self.tile_size,
            self.tile_size
        );
        backend.dispatch(groups, self.tile_size).inspect_err(|err| {
            if err.is_fatal() {
                log::error!("{}; rendering halted", err);
                self.fault = Some(err.to_string());
            }
        })
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Clears a latched fault and forces the static block to be sent again.
    pub fn revalidate(&mut self) {
        self.fault = None;
        self.bound_generation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{HostBackend, ResourceEvent};
    use crate::scene::{Material, PrimitiveExtractor, SceneDescription, SceneObject};
    use glam::Vec3;

    fn built_geometry(backend: &mut HostBackend, spheres: usize) -> GeometryBufferSet<HostBackend> {
        let mut scene = SceneDescription::new();
        for i in 0..spheres {
            scene.add_sphere(SceneObject::sphere(
                format!("s{}", i),
                Vec3::new(i as f32, 0.0, 0.0),
                0.5,
                Material::new([1.0, 1.0, 1.0]),
            ));
        }
        let extracted = PrimitiveExtractor::extract(&scene).unwrap();
        let mut geometry = GeometryBufferSet::new();
        geometry.rebuild(backend, &extracted).unwrap();
        geometry
    }

    #[test]
    fn test_workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(800, 600, 22), [37, 28]);
        assert_eq!(workgroup_count(800, 600, 8), [100, 75]);
        assert_eq!(workgroup_count(1, 1, 22), [1, 1]);
        assert_eq!(workgroup_count(44, 22, 22), [2, 1]);
    }

    #[test]
    fn test_static_block_sent_once_per_geometry_generation() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut geometry = built_geometry(&mut backend, 2);
        let mut renderer = FrameRenderer::new(&TracerConfig::default());

        assert!(renderer.bind_static(&mut backend, &geometry).unwrap());
        assert!(!renderer.bind_static(&mut backend, &geometry).unwrap());
        assert_eq!(backend.static_params().unwrap().sphere_count, 2);

        let extracted = PrimitiveExtractor::extract(&SceneDescription::new()).unwrap();
        geometry.rebuild(&mut backend, &extracted).unwrap();
        assert!(renderer.bind_static(&mut backend, &geometry).unwrap());
        assert_eq!(backend.static_params().unwrap().sphere_count, 0);
        assert_eq!(
            backend.count_events(|e| matches!(e, ResourceEvent::StaticParamsSet)),
            2
        );
    }

    #[test]
    fn test_dispatch_covers_target_in_tiles() {
        let mut backend = HostBackend::solid([0.25, 0.5, 0.75, 1.0]);
        let geometry = built_geometry(&mut backend, 1);
        let mut renderer = FrameRenderer::new(&TracerConfig::default());
        renderer.bind_static(&mut backend, &geometry).unwrap();
        let target = backend.create_image("target", 50, 30).unwrap();

        renderer
            .dispatch(&mut backend, &target, Mat4::IDENTITY, Mat4::IDENTITY, Vec2::new(0.5, 0.25))
            .unwrap();

        assert!(backend.events().contains(&ResourceEvent::Dispatched {
            groups: [3, 2],
            tile_size: 22
        }));
        assert_eq!(backend.frame_params().unwrap().pixel_offset, [0.5, 0.25]);
        assert!(backend
            .read_image(&target)
            .unwrap()
            .iter()
            .all(|p| *p == [0.25, 0.5, 0.75, 1.0]));
    }

    #[test]
    fn test_dispatch_before_static_bind_is_not_ready() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut renderer = FrameRenderer::new(&TracerConfig::default());
        let target = backend.create_image("target", 4, 4).unwrap();
        let err = renderer
            .dispatch(&mut backend, &target, Mat4::IDENTITY, Mat4::IDENTITY, Vec2::ZERO)
            .unwrap_err();
        assert!(matches!(err, TracerError::NotReady(_)));
    }

    #[test]
    fn test_fault_latches_until_revalidated() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let geometry = built_geometry(&mut backend, 1);
        let mut renderer = FrameRenderer::new(&TracerConfig::default());
        renderer.bind_static(&mut backend, &geometry).unwrap();
        let target = backend.create_image("target", 4, 4).unwrap();

        backend.inject_dispatch_fault("device lost");
        let err = renderer
            .dispatch(&mut backend, &target, Mat4::IDENTITY, Mat4::IDENTITY, Vec2::ZERO)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(renderer.is_faulted());

        let err = renderer
            .dispatch(&mut backend, &target, Mat4::IDENTITY, Mat4::IDENTITY, Vec2::ZERO)
            .unwrap_err();
        assert!(matches!(err, TracerError::NotReady(_)));

        renderer.revalidate();
        renderer.bind_static(&mut backend, &geometry).unwrap();
        renderer
            .dispatch(&mut backend, &target, Mat4::IDENTITY, Mat4::IDENTITY, Vec2::ZERO)
            .unwrap();
    }

    #[test]
    fn test_skybox_flag_forces_resend() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let geometry = built_geometry(&mut backend, 0);
        let mut renderer = FrameRenderer::new(&TracerConfig::default());
        renderer.bind_static(&mut backend, &geometry).unwrap();
        renderer.set_skybox_present(true);
        assert!(renderer.bind_static(&mut backend, &geometry).unwrap());
        assert_eq!(backend.static_params().unwrap().flags, FLAG_HAS_SKYBOX);
    }
}
