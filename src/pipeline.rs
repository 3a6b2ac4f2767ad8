//! Per-frame orchestration: init, render_frame, rescan, shutdown.

use crate::accumulate::{AccumulationController, AccumulationState};
use crate::backend::{Backend, ImageSlot};
use crate::buffers::{GeometryBufferSet, GeometryCounts};
use crate::camera::CameraFrame;
use crate::config::TracerConfig;
use crate::error::{TracerError, TracerResult};
use crate::frame::FrameRenderer;
use crate::scene::{PrimitiveExtractor, SceneDescription};
use crate::skybox::SkyboxImage;
use crate::target::RenderTargetManager;
use glam::Vec2;

/// Owns every GPU resource of the tracer. All methods run on the thread driving the backend;
/// rebuilds happen between frames.
pub struct TracingPipeline<B: Backend> {
    config: TracerConfig,
    geometry: GeometryBufferSet<B>,
    target: RenderTargetManager<B>,
    renderer: FrameRenderer,
    accumulation: Option<AccumulationController<B>>,
    skybox: Option<B::Image>,
    initialized: bool,
}

impl<B: Backend> TracingPipeline<B> {
    pub fn new(config: TracerConfig) -> Self {
        let accumulation = config
            .profile
            .accumulates()
            .then(|| AccumulationController::new(config.jitter_seed, config.resize_policy));
        Self {
            renderer: FrameRenderer::new(&config),
            geometry: GeometryBufferSet::new(),
            target: RenderTargetManager::new("Result Image"),
            accumulation,
            skybox: None,
            initialized: false,
            config,
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Extracts `scene`, builds the geometry buffers, allocates the output image, binds the
    /// skybox and uploads the static parameters.
    pub fn init(
        &mut self,
        backend: &mut B,
        scene: &SceneDescription,
        width: u32,
        height: u32,
    ) -> TracerResult<()> {
        self.config.validate_for(backend.max_workgroup_invocations())?;

        let extracted = PrimitiveExtractor::extract(scene)?;
        self.geometry.rebuild(backend, &extracted)?;
        self.target.ensure_target(backend, width, height)?;
        self.bind_skybox(backend)?;
        self.renderer.bind_static(backend, &self.geometry)?;
        if let Some(accumulation) = &mut self.accumulation {
            accumulation.mark_dirty();
        }

        self.initialized = true;
        log::info!(
            "pipeline ready: {:?}, {}x{} tiles, {}x{} target",
            self.config.profile,
            self.renderer.tile_size(),
            self.renderer.tile_size(),
            width,
            height
        );
        Ok(())
    }

    fn bind_skybox(&mut self, backend: &mut B) -> TracerResult<()> {
        let (sky, present) = match &self.config.skybox {
            Some(path) => (SkyboxImage::load(path)?, true),
            None => (SkyboxImage::placeholder(), false),
        };
        let image = backend.upload_image("Skybox", sky.width, sky.height, &sky.pixels)?;
        backend.bind_image(ImageSlot::Skybox, &image);
        if let Some(old) = self.skybox.replace(image) {
            backend.release_image(old);
        }
        self.renderer.set_skybox_present(present);
        Ok(())
    }

    /// Re-extracts the scene and replaces all geometry. On failure the previous buffers stay
    /// bound and the error is returned.
    pub fn rescan(&mut self, backend: &mut B, scene: &SceneDescription) -> TracerResult<()> {
        let extracted = PrimitiveExtractor::extract(scene)?;
        self.geometry.rebuild(backend, &extracted)?;
        if self.initialized {
            self.renderer.bind_static(backend, &self.geometry)?;
        }
        self.mark_dirty();
        Ok(())
    }

    /// Restarts accumulation on the next frame. Called by scene providers on changes the
    /// camera does not report.
    pub fn mark_dirty(&mut self) {
        if let Some(accumulation) = &mut self.accumulation {
            accumulation.mark_dirty();
        }
    }

    /// Renders one frame at `width x height` and returns the image to present: the output
    /// image directly, or the accumulated image when the profile accumulates.
    pub fn render_frame(
        &mut self,
        backend: &mut B,
        camera: &CameraFrame,
        width: u32,
        height: u32,
    ) -> TracerResult<&B::Image> {
        if !self.initialized {
            return Err(TracerError::not_ready("init has not completed"));
        }
        let target = self.target.ensure_target(backend, width, height)?;
        self.renderer.bind_static(backend, &self.geometry)?;

        match &mut self.accumulation {
            None => {
                self.renderer.dispatch(
                    backend,
                    target,
                    camera.camera_to_world,
                    camera.inverse_projection,
                    Vec2::ZERO,
                )?;
                Ok(target)
            }
            Some(accumulation) => {
                accumulation.begin_frame(camera.changed);
                let jitter = accumulation.next_jitter();
                self.renderer.dispatch(
                    backend,
                    target,
                    camera.camera_to_world,
                    camera.inverse_projection,
                    jitter,
                )?;
                accumulation.blend(backend, target)
            }
        }
    }

    /// Clears a latched dispatch fault. The static block is re-sent and accumulation restarts
    /// on the next frame.
    pub fn revalidate(&mut self) {
        log::info!("pipeline revalidated");
        self.renderer.revalidate();
        self.mark_dirty();
    }

    /// Releases every resource. `init` may be called again afterwards.
    pub fn shutdown(&mut self, backend: &mut B) {
        self.geometry.release(backend);
        self.target.release(backend);
        if let Some(accumulation) = &mut self.accumulation {
            accumulation.release(backend);
        }
        if let Some(skybox) = self.skybox.take() {
            backend.release_image(skybox);
        }
        self.initialized = false;
        log::info!("pipeline shut down");
    }

    pub fn is_ready(&self) -> bool {
        self.initialized && !self.renderer.is_faulted()
    }

    pub fn is_faulted(&self) -> bool {
        self.renderer.is_faulted()
    }

    pub fn geometry_counts(&self) -> Option<GeometryCounts> {
        self.geometry.counts()
    }

    pub fn geometry(&self) -> &GeometryBufferSet<B> {
        &self.geometry
    }

    pub fn target(&self) -> Option<&B::Image> {
        self.target.image()
    }

    pub fn sample_index(&self) -> Option<u32> {
        self.accumulation.as_ref().map(|a| a.sample_index())
    }

    pub fn accumulation_state(&self) -> Option<AccumulationState> {
        self.accumulation.as_ref().map(|a| a.state())
    }
}
