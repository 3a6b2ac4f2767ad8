use crate::error::{TracerError, TracerResult};
use std::sync::Arc;

pub struct WgpuContext {
    pub _instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl WgpuContext {
    pub async fn new(window: Arc<winit::window::Window>) -> TracerResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::from_env_or_default(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| TracerError::allocation(format!("cannot create surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                ..Default::default()
            })
            .await
            .map_err(|e| TracerError::allocation(format!("no suitable adapter: {}", e)))?;

        let info = adapter.get_info();
        log::info!("Adapter: {} ({:?})", info.name, info.backend);
        log::info!("Driver: {}", info.driver_info);

        // The accumulation pass reads and writes an rgba32float storage texture.
        let format_features = adapter.get_texture_format_features(wgpu::TextureFormat::Rgba32Float);
        if !adapter
            .features()
            .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
            || !format_features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::STORAGE_READ_WRITE)
        {
            return Err(TracerError::configuration(
                "adapter cannot read-write rgba32float storage textures",
            ));
        }

        // Tile sizes above the default 256 invocations need the adapter's real limits.
        let limits = adapter.limits();
        log::info!(
            "Compute limits: {} invocations, {}x{} work-group",
            limits.max_compute_invocations_per_workgroup,
            limits.max_compute_workgroup_size_x,
            limits.max_compute_workgroup_size_y
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Tracer Device"),
                required_features: wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES,
                required_limits: limits,
                ..Default::default()
            })
            .await
            .map_err(|e| TracerError::allocation(format!("cannot open device: {}", e)))?;

        let size = window.inner_size();
        let mut config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or_else(|| TracerError::configuration("surface is incompatible with adapter"))?;
        config.format = config.format.remove_srgb_suffix();
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
            surface,
            config,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }
}
