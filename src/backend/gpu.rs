//! wgpu implementation of [`Backend`]. Named slots map onto one bind group whose layout is
//! fixed by `shaders/raytrace.wgsl`; the group is rebuilt lazily after any binding changes.

use super::{Backend, BufferSlot, FrameParams, ImageSlot, StaticParams};
use crate::error::{TracerError, TracerResult};
use crate::passes::{AccumulatePass, BlitPass, TraceBindings, TracePass};
use crate::wgpu_ctx::WgpuContext;
use crate::wgpu_utils::*;
use bytemuck::Zeroable;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub struct WgpuBuffer {
    id: u64,
    slot: BufferSlot,
    buffer: wgpu::Buffer,
}

pub struct WgpuImage {
    id: u64,
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct Bound<T> {
    id: u64,
    resource: T,
}

pub struct WgpuBackend {
    ctx: WgpuContext,
    trace: TracePass,
    accumulate: AccumulatePass,
    blit: BlitPass,

    static_buffer: wgpu::Buffer,
    frame_buffer: wgpu::Buffer,
    statics_set: bool,
    frame_set: bool,

    bound_buffers: [Option<Bound<wgpu::Buffer>>; 4],
    bound_result: Option<Bound<wgpu::TextureView>>,
    bound_skybox: Option<Bound<wgpu::TextureView>>,
    bind_group: Option<wgpu::BindGroup>,

    live: HashSet<u64>,
    next_id: u64,
    // filled by the device's uncaptured-error handler
    errors: Arc<Mutex<Vec<String>>>,
}

impl WgpuBackend {
    pub fn new(ctx: WgpuContext) -> Self {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        ctx.device
            .on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
                log::error!("wgpu: {}", error);
                if let Ok(mut errors) = sink.lock() {
                    errors.push(error.to_string());
                }
            }));

        let trace = TracePass::new(&ctx.device);
        let accumulate = AccumulatePass::new(&ctx.device);
        let blit = BlitPass::new(&ctx.device, ctx.config.format);

        let static_buffer = create_buffer_init(
            &ctx.device,
            "Static Params Buffer",
            &[StaticParams::zeroed()],
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let frame_buffer = create_buffer_init(
            &ctx.device,
            "Frame Params Buffer",
            &[FrameParams::zeroed()],
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );

        Self {
            ctx,
            trace,
            accumulate,
            blit,
            static_buffer,
            frame_buffer,
            statics_set: false,
            frame_set: false,
            bound_buffers: Default::default(),
            bound_result: None,
            bound_skybox: None,
            bind_group: None,
            live: HashSet::new(),
            next_id: 1,
            errors,
        }
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.ctx.config.width, self.ctx.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
    }

    /// Tone-maps `image` onto the window surface.
    pub fn present(&mut self, image: &WgpuImage) -> TracerResult<()> {
        let output = match self.ctx.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.ctx.surface.configure(&self.ctx.device, &self.ctx.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface acquire timed out; frame skipped");
                return Ok(());
            }
            Err(e) => return Err(TracerError::dispatch(format!("surface: {}", e))),
        };
        let view = output.texture.create_view(&Default::default());

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Present Encoder"),
            });
        self.blit
            .execute(&self.ctx.device, &mut encoder, &image.view, &view);
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.check_errors()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        id
    }

    fn check_errors(&self) -> TracerResult<()> {
        let mut errors = match self.errors.lock() {
            Ok(errors) => errors,
            Err(poisoned) => poisoned.into_inner(),
        };
        if errors.is_empty() {
            return Ok(());
        }
        let message = errors.join("; ");
        errors.clear();
        Err(TracerError::dispatch(message))
    }

    fn live_bound<'a, T>(&self, bound: &'a Option<Bound<T>>, name: &str) -> TracerResult<&'a T> {
        let bound = bound
            .as_ref()
            .ok_or_else(|| TracerError::dispatch(format!("nothing bound to '{}'", name)))?;
        if !self.live.contains(&bound.id) {
            return Err(TracerError::dispatch(format!(
                "resource bound to '{}' was released",
                name
            )));
        }
        Ok(&bound.resource)
    }

    fn build_bind_group(&self) -> TracerResult<wgpu::BindGroup> {
        let result = self.live_bound(&self.bound_result, ImageSlot::Result.name())?;
        let skybox = self.live_bound(&self.bound_skybox, ImageSlot::Skybox.name())?;
        let mut buffers = Vec::with_capacity(4);
        for slot in BufferSlot::ALL {
            buffers.push(self.live_bound(&self.bound_buffers[slot.index()], slot.name())?);
        }
        let bindings = TraceBindings {
            result,
            buffers: [buffers[0], buffers[1], buffers[2], buffers[3]],
            skybox,
            statics: &self.static_buffer,
            frame: &self.frame_buffer,
        };
        Ok(self.trace.bind_group(&self.ctx.device, &bindings))
    }

    fn check_extent(&self, label: &str, width: u32, height: u32) -> TracerResult<()> {
        let max = self.ctx.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(TracerError::allocation(format!(
                "cannot allocate {} of {}x{} (limit {})",
                label, width, height, max
            )));
        }
        Ok(())
    }
}

impl Backend for WgpuBackend {
    type Buffer = WgpuBuffer;
    type Image = WgpuImage;

    fn max_workgroup_invocations(&self) -> u32 {
        let limits = self.ctx.device.limits();
        limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x.saturating_mul(limits.max_compute_workgroup_size_x))
            .min(limits.max_compute_workgroup_size_y.saturating_mul(limits.max_compute_workgroup_size_y))
    }

    fn create_buffer(&mut self, slot: BufferSlot, contents: &[u8]) -> TracerResult<WgpuBuffer> {
        let stride = slot.stride();
        if contents.len() % stride != 0 {
            return Err(TracerError::allocation(format!(
                "'{}' contents of {} bytes are not a multiple of the {}-byte stride",
                slot.name(),
                contents.len(),
                stride
            )));
        }
        // Zero-size bindings are invalid; an empty slot gets one zeroed record that the kernel
        // never reads because its count is 0.
        let size = contents.len().max(stride) as u64;
        let limit = u64::from(self.ctx.device.limits().max_storage_buffer_binding_size);
        if size > limit {
            return Err(TracerError::allocation(format!(
                "'{}' needs {} bytes, device limit is {}",
                slot.name(),
                size,
                limit
            )));
        }

        let usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let buffer = if contents.is_empty() {
            create_buffer(&self.ctx.device, slot.name(), size, usage)
        } else {
            create_buffer_init(&self.ctx.device, slot.name(), contents, usage)
        };
        let id = self.alloc_id();
        log::trace!("created '{}' buffer #{} ({} bytes)", slot.name(), id, size);
        Ok(WgpuBuffer { id, slot, buffer })
    }

    fn release_buffer(&mut self, buffer: WgpuBuffer) {
        if self.live.remove(&buffer.id) {
            log::trace!("released '{}' buffer #{}", buffer.slot.name(), buffer.id);
            self.bind_group = None;
            buffer.buffer.destroy();
        }
    }

    fn create_image(&mut self, label: &str, width: u32, height: u32) -> TracerResult<WgpuImage> {
        self.check_extent(label, width, height)?;
        let texture = create_float_texture(
            &self.ctx.device,
            label,
            width,
            height,
            wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let view = texture.create_view(&Default::default());
        Ok(WgpuImage {
            id: self.alloc_id(),
            width,
            height,
            texture,
            view,
        })
    }

    fn upload_image(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[[f32; 4]],
    ) -> TracerResult<WgpuImage> {
        self.check_extent(label, width, height)?;
        if pixels.len() as u64 != width as u64 * height as u64 {
            return Err(TracerError::allocation(format!(
                "{} has {} pixels, expected {}x{}",
                label,
                pixels.len(),
                width,
                height
            )));
        }
        let texture = create_float_texture(
            &self.ctx.device,
            label,
            width,
            height,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(pixels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 16),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&Default::default());
        Ok(WgpuImage {
            id: self.alloc_id(),
            width,
            height,
            texture,
            view,
        })
    }

    fn release_image(&mut self, image: WgpuImage) {
        if self.live.remove(&image.id) {
            self.bind_group = None;
            image.texture.destroy();
        }
    }

    fn image_extent(&self, image: &WgpuImage) -> (u32, u32) {
        (image.width, image.height)
    }

    fn bind_buffer(&mut self, slot: BufferSlot, buffer: &WgpuBuffer) {
        self.bound_buffers[slot.index()] = Some(Bound {
            id: buffer.id,
            resource: buffer.buffer.clone(),
        });
        self.bind_group = None;
    }

    fn bind_image(&mut self, slot: ImageSlot, image: &WgpuImage) {
        let bound = Some(Bound {
            id: image.id,
            resource: image.view.clone(),
        });
        let target = match slot {
            ImageSlot::Result => &mut self.bound_result,
            ImageSlot::Skybox => &mut self.bound_skybox,
        };
        if target.as_ref().map(|b| b.id) != Some(image.id) {
            *target = bound;
            self.bind_group = None;
        }
    }

    fn set_static_params(&mut self, params: &StaticParams) {
        self.ctx
            .queue
            .write_buffer(&self.static_buffer, 0, bytemuck::bytes_of(params));
        self.statics_set = true;
    }

    fn set_frame_params(&mut self, params: &FrameParams) {
        self.ctx
            .queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(params));
        self.frame_set = true;
    }

    fn dispatch(&mut self, groups: [u32; 2], tile_size: u32) -> TracerResult<()> {
        self.check_errors()?;
        let max = self.max_workgroup_invocations();
        if tile_size == 0 || tile_size.saturating_mul(tile_size) > max {
            return Err(TracerError::dispatch(format!(
                "tile size {} exceeds {} invocations per work-group",
                tile_size, max
            )));
        }
        if !self.statics_set || !self.frame_set {
            return Err(TracerError::dispatch("kernel parameters were never set"));
        }
        if self.bind_group.is_none() {
            self.bind_group = Some(self.build_bind_group()?);
        }

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Trace Encoder"),
            });
        let pipeline = self.trace.pipeline(&self.ctx.device, tile_size);
        if let Some(bind_group) = &self.bind_group {
            TracePass::execute(&mut encoder, pipeline, bind_group, groups);
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        self.check_errors()
    }

    fn accumulate(
        &mut self,
        current: &WgpuImage,
        history: &WgpuImage,
        weight: f32,
    ) -> TracerResult<()> {
        if (current.width, current.height) != (history.width, history.height) {
            return Err(TracerError::dispatch(format!(
                "accumulating {}x{} into {}x{}",
                current.width, current.height, history.width, history.height
            )));
        }
        if !self.live.contains(&current.id) || !self.live.contains(&history.id) {
            return Err(TracerError::dispatch("accumulation input was released"));
        }

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Accumulate Encoder"),
            });
        self.accumulate.execute(
            &self.ctx.device,
            &self.ctx.queue,
            &mut encoder,
            &current.view,
            &history.view,
            (history.width, history.height),
            weight,
        );
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        self.check_errors()
    }
}
