//! CPU backend. Runs an injected kernel per pixel with rayon and records every resource
//! event, so lifecycle and accumulation behaviour can be checked without a GPU.

use super::{Backend, BufferSlot, FrameParams, ImageSlot, StaticParams};
use crate::accumulate::blend_pixels;
use crate::error::{TracerError, TracerResult};
use crate::scene::records::{MeshRecord, SphereRecord};
use rayon::prelude::*;
use std::collections::HashMap;

/// Everything bound to the kernel for one dispatch.
pub struct KernelInputs<'a> {
    pub statics: &'a StaticParams,
    pub frame: &'a FrameParams,
    pub spheres: &'a [SphereRecord],
    pub meshes: &'a [MeshRecord],
    pub vertices: &'a [[f32; 3]],
    pub indices: &'a [u32],
    pub skybox: Option<ImageView<'a>>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [[f32; 4]],
}

impl ImageView<'_> {
    pub fn load(&self, x: u32, y: u32) -> [f32; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Per-pixel program run by [`HostBackend::dispatch`].
pub trait HostKernel: Send + Sync {
    fn trace(&self, inputs: &KernelInputs<'_>, x: u32, y: u32) -> [f32; 4];
}

impl<F> HostKernel for F
where
    F: Fn(&KernelInputs<'_>, u32, u32) -> [f32; 4] + Send + Sync,
{
    fn trace(&self, inputs: &KernelInputs<'_>, x: u32, y: u32) -> [f32; 4] {
        self(inputs, x, y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostBuffer {
    id: u64,
    slot: BufferSlot,
    len: usize,
}

impl HostBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn byte_len(&self) -> usize {
        self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostImage {
    id: u64,
    width: u32,
    height: u32,
}

impl HostImage {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceEvent {
    BufferCreated { id: u64, slot: BufferSlot, bytes: usize },
    BufferReleased { id: u64, slot: BufferSlot },
    ImageCreated { id: u64, width: u32, height: u32 },
    ImageReleased { id: u64 },
    StaticParamsSet,
    Dispatched { groups: [u32; 2], tile_size: u32 },
    Accumulated { weight: f32 },
}

struct ImageData {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

pub struct HostBackend {
    kernel: Box<dyn HostKernel>,
    next_id: u64,
    buffers: HashMap<u64, Vec<u8>>,
    images: HashMap<u64, ImageData>,
    bound_buffers: [Option<u64>; 4],
    bound_images: HashMap<ImageSlot, u64>,
    statics: Option<StaticParams>,
    frame: Option<FrameParams>,
    events: Vec<ResourceEvent>,
    max_invocations: u32,
    max_image_pixels: u64,
    pending_fault: Option<String>,
}

impl HostBackend {
    pub fn new(kernel: impl HostKernel + 'static) -> Self {
        Self {
            kernel: Box::new(kernel),
            next_id: 1,
            buffers: HashMap::new(),
            images: HashMap::new(),
            bound_buffers: [None; 4],
            bound_images: HashMap::new(),
            statics: None,
            frame: None,
            events: Vec::new(),
            max_invocations: 1024,
            max_image_pixels: 16384 * 16384,
            pending_fault: None,
        }
    }

    /// A backend whose kernel writes one flat colour everywhere.
    pub fn solid(color: [f32; 4]) -> Self {
        Self::new(move |_: &KernelInputs<'_>, _: u32, _: u32| color)
    }

    pub fn with_max_invocations(mut self, max: u32) -> Self {
        self.max_invocations = max;
        self
    }

    /// Image allocations above this many pixels fail.
    pub fn with_max_image_pixels(mut self, max: u64) -> Self {
        self.max_image_pixels = max;
        self
    }

    /// The next dispatch fails with `message`.
    pub fn inject_dispatch_fault(&mut self, message: impl Into<String>) {
        self.pending_fault = Some(message.into());
    }

    pub fn events(&self) -> &[ResourceEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn count_events(&self, pred: impl Fn(&ResourceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn read_buffer(&self, buffer: &HostBuffer) -> Option<&[u8]> {
        self.buffers.get(&buffer.id).map(Vec::as_slice)
    }

    pub fn read_image(&self, image: &HostImage) -> Option<&[[f32; 4]]> {
        self.images.get(&image.id).map(|d| d.pixels.as_slice())
    }

    pub fn static_params(&self) -> Option<&StaticParams> {
        self.statics.as_ref()
    }

    pub fn frame_params(&self) -> Option<&FrameParams> {
        self.frame.as_ref()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bound_records<T: bytemuck::Pod>(&self, slot: BufferSlot) -> TracerResult<Vec<T>> {
        let id = self.bound_buffers[slot.index()].ok_or_else(|| {
            TracerError::dispatch(format!("no buffer bound to '{}'", slot.name()))
        })?;
        let bytes = self.buffers.get(&id).ok_or_else(|| {
            TracerError::dispatch(format!("buffer bound to '{}' was released", slot.name()))
        })?;
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }
}

impl Backend for HostBackend {
    type Buffer = HostBuffer;
    type Image = HostImage;

    fn max_workgroup_invocations(&self) -> u32 {
        self.max_invocations
    }

    fn create_buffer(&mut self, slot: BufferSlot, contents: &[u8]) -> TracerResult<HostBuffer> {
        if contents.len() % slot.stride() != 0 {
            return Err(TracerError::allocation(format!(
                "'{}' contents of {} bytes are not a multiple of the {}-byte stride",
                slot.name(),
                contents.len(),
                slot.stride()
            )));
        }
        let id = self.alloc_id();
        self.buffers.insert(id, contents.to_vec());
        self.events.push(ResourceEvent::BufferCreated {
            id,
            slot,
            bytes: contents.len(),
        });
        Ok(HostBuffer {
            id,
            slot,
            len: contents.len(),
        })
    }

    fn release_buffer(&mut self, buffer: HostBuffer) {
        if self.buffers.remove(&buffer.id).is_some() {
            self.events.push(ResourceEvent::BufferReleased {
                id: buffer.id,
                slot: buffer.slot,
            });
        }
    }

    fn create_image(&mut self, label: &str, width: u32, height: u32) -> TracerResult<HostImage> {
        let pixels = width as u64 * height as u64;
        if pixels == 0 || pixels > self.max_image_pixels {
            return Err(TracerError::allocation(format!(
                "cannot allocate {} of {}x{}",
                label, width, height
            )));
        }
        let id = self.alloc_id();
        self.images.insert(
            id,
            ImageData {
                width,
                height,
                pixels: vec![[0.0; 4]; pixels as usize],
            },
        );
        self.events.push(ResourceEvent::ImageCreated { id, width, height });
        Ok(HostImage { id, width, height })
    }

    fn upload_image(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[[f32; 4]],
    ) -> TracerResult<HostImage> {
        if pixels.len() as u64 != width as u64 * height as u64 {
            return Err(TracerError::allocation(format!(
                "{} has {} pixels, expected {}x{}",
                label,
                pixels.len(),
                width,
                height
            )));
        }
        let image = self.create_image(label, width, height)?;
        if let Some(data) = self.images.get_mut(&image.id) {
            data.pixels.copy_from_slice(pixels);
        }
        Ok(image)
    }

    fn release_image(&mut self, image: HostImage) {
        if self.images.remove(&image.id).is_some() {
            self.events.push(ResourceEvent::ImageReleased { id: image.id });
        }
    }

    fn image_extent(&self, image: &HostImage) -> (u32, u32) {
        (image.width, image.height)
    }

    fn bind_buffer(&mut self, slot: BufferSlot, buffer: &HostBuffer) {
        self.bound_buffers[slot.index()] = Some(buffer.id);
    }

    fn bind_image(&mut self, slot: ImageSlot, image: &HostImage) {
        self.bound_images.insert(slot, image.id);
    }

    fn set_static_params(&mut self, params: &StaticParams) {
        self.statics = Some(*params);
        self.events.push(ResourceEvent::StaticParamsSet);
    }

    fn set_frame_params(&mut self, params: &FrameParams) {
        self.frame = Some(*params);
    }

    fn dispatch(&mut self, groups: [u32; 2], tile_size: u32) -> TracerResult<()> {
        if let Some(message) = self.pending_fault.take() {
            return Err(TracerError::dispatch(message));
        }
        if tile_size == 0 || tile_size.saturating_mul(tile_size) > self.max_invocations {
            return Err(TracerError::dispatch(format!(
                "tile size {} is not launchable",
                tile_size
            )));
        }
        let statics = self
            .statics
            .ok_or_else(|| TracerError::dispatch("static parameters were never set"))?;
        let frame = self
            .frame
            .ok_or_else(|| TracerError::dispatch("frame parameters were never set"))?;

        let spheres: Vec<SphereRecord> = self.bound_records(BufferSlot::Spheres)?;
        let meshes: Vec<MeshRecord> = self.bound_records(BufferSlot::Meshes)?;
        let vertices: Vec<[f32; 3]> = self.bound_records(BufferSlot::Vertices)?;
        let indices: Vec<u32> = self.bound_records(BufferSlot::Indices)?;

        let result_id = *self
            .bound_images
            .get(&ImageSlot::Result)
            .ok_or_else(|| TracerError::dispatch("no image bound to 'Result'"))?;
        let mut target = self
            .images
            .remove(&result_id)
            .ok_or_else(|| TracerError::dispatch("image bound to 'Result' was released"))?;

        let skybox = self
            .bound_images
            .get(&ImageSlot::Skybox)
            .and_then(|id| self.images.get(id))
            .map(|d| ImageView {
                width: d.width,
                height: d.height,
                pixels: &d.pixels,
            });

        let inputs = KernelInputs {
            statics: &statics,
            frame: &frame,
            spheres: &spheres,
            meshes: &meshes,
            vertices: &vertices,
            indices: &indices,
            skybox,
            width: target.width,
            height: target.height,
        };

        // Invocations outside the image are discarded, like the kernel's bounds check.
        let covered_w = (groups[0] * tile_size).min(target.width) as usize;
        let covered_h = (groups[1] * tile_size).min(target.height) as usize;
        let kernel = self.kernel.as_ref();
        target
            .pixels
            .par_chunks_mut(target.width as usize)
            .take(covered_h)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, pixel) in row.iter_mut().take(covered_w).enumerate() {
                    *pixel = kernel.trace(&inputs, x as u32, y as u32);
                }
            });

        self.images.insert(result_id, target);
        self.events.push(ResourceEvent::Dispatched { groups, tile_size });
        Ok(())
    }

    fn accumulate(&mut self, current: &HostImage, history: &HostImage, weight: f32) -> TracerResult<()> {
        if (current.width, current.height) != (history.width, history.height) {
            return Err(TracerError::dispatch(format!(
                "accumulating {}x{} into {}x{}",
                current.width, current.height, history.width, history.height
            )));
        }
        let mut target = self
            .images
            .remove(&history.id)
            .ok_or_else(|| TracerError::dispatch("accumulation image was released"))?;
        let outcome = match self.images.get(&current.id) {
            Some(source) => {
                blend_pixels(&mut target.pixels, &source.pixels, weight);
                Ok(())
            }
            None => Err(TracerError::dispatch("rendered image was released")),
        };
        self.images.insert(history.id, target);
        outcome?;
        self.events.push(ResourceEvent::Accumulated { weight });
        Ok(())
    }
}
