use crate::backend::{BufferSlot, ImageSlot, FRAME_PARAMS_BINDING, STATIC_PARAMS_BINDING};
use crate::wgpu_utils::*;
use std::collections::HashMap;

/// The tracing kernel. One pipeline is compiled per tile size, through the `TILE` override.
pub struct TracePass {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    pipelines: HashMap<u32, wgpu::ComputePipeline>,
}

/// Resources for one bind group, in binding order.
pub struct TraceBindings<'a> {
    pub result: &'a wgpu::TextureView,
    pub buffers: [&'a wgpu::Buffer; 4],
    pub skybox: &'a wgpu::TextureView,
    pub statics: &'a wgpu::Buffer,
    pub frame: &'a wgpu::Buffer,
}

impl TracePass {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::include_wgsl!("../shaders/raytrace.wgsl"));

        let mut entries = vec![storage_texture_entry(
            ImageSlot::Result.binding(),
            wgpu::StorageTextureAccess::WriteOnly,
        )];
        entries.extend(BufferSlot::ALL.map(|slot| storage_buffer_entry(slot.binding())));
        entries.push(float_texture_entry(
            ImageSlot::Skybox.binding(),
            wgpu::ShaderStages::COMPUTE,
        ));
        entries.push(uniform_entry(STATIC_PARAMS_BINDING, wgpu::ShaderStages::COMPUTE));
        entries.push(uniform_entry(FRAME_PARAMS_BINDING, wgpu::ShaderStages::COMPUTE));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Trace Bind Group Layout"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Trace Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            shader,
            pipelines: HashMap::new(),
        }
    }

    pub fn pipeline(&mut self, device: &wgpu::Device, tile: u32) -> &wgpu::ComputePipeline {
        let Self {
            pipeline_layout,
            shader,
            pipelines,
            ..
        } = self;
        pipelines.entry(tile).or_insert_with(|| {
            log::debug!("compiling trace pipeline for {}x{} tiles", tile, tile);
            let constants = [("TILE", tile as f64)];
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Trace Pipeline"),
                layout: Some(&*pipeline_layout),
                module: &*shader,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    ..Default::default()
                },
                cache: None,
            })
        })
    }

    pub fn bind_group(&self, device: &wgpu::Device, bindings: &TraceBindings<'_>) -> wgpu::BindGroup {
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: ImageSlot::Result.binding(),
            resource: wgpu::BindingResource::TextureView(bindings.result),
        }];
        for slot in BufferSlot::ALL {
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding(),
                resource: bindings.buffers[slot.index()].as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: ImageSlot::Skybox.binding(),
            resource: wgpu::BindingResource::TextureView(bindings.skybox),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: STATIC_PARAMS_BINDING,
            resource: bindings.statics.as_entire_binding(),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: FRAME_PARAMS_BINDING,
            resource: bindings.frame.as_entire_binding(),
        });

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trace Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        })
    }

    pub fn execute(
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        groups: [u32; 2],
    ) {
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Trace Pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, bind_group, &[]);
        cpass.dispatch_workgroups(groups[0], groups[1], 1);
    }
}
