use anyhow::Context;
use clap::Parser;
use compute_tracer::backend::{HostBackend, ReferenceKernel, WgpuBackend};
use compute_tracer::scene::scenes;
use compute_tracer::screenshot::{self, ScreenshotTask};
use compute_tracer::wgpu_ctx::WgpuContext;
use compute_tracer::{CameraController, SceneDescription, TracerConfig, TracingPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(name = "compute-tracer", version, about = "Progressive compute-shader ray tracer")]
struct Args {
    /// Tracer configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scene description (JSON). The built-in demo scene is used when omitted.
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Render on the CPU without a window and write a PNG (default: output/screenshot_<time>.png)
    #[arg(long, value_name = "PNG", num_args = 0..=1)]
    headless: Option<Option<PathBuf>>,

    /// Accumulated frames to render in headless mode
    #[arg(long, default_value_t = 64)]
    frames: u32,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,
}

struct Viewer {
    window: Arc<Window>,
    backend: WgpuBackend,
    pipeline: TracingPipeline<WgpuBackend>,
    camera: CameraController,
    last_frame: Instant,
}

struct App {
    config: TracerConfig,
    scene: SceneDescription,
    size: PhysicalSize<u32>,
    viewer: Option<Viewer>,
}

impl App {
    fn open(&self, el: &ActiveEventLoop) -> anyhow::Result<Viewer> {
        let attributes = Window::default_attributes()
            .with_title("compute-tracer")
            .with_inner_size(self.size);
        let window = Arc::new(el.create_window(attributes)?);
        let ctx = pollster::block_on(WgpuContext::new(window.clone()))?;
        let mut backend = WgpuBackend::new(ctx);
        let (width, height) = backend.surface_size();

        let mut pipeline = TracingPipeline::new(self.config.clone());
        pipeline
            .init(&mut backend, &self.scene, width, height)
            .context("initialising tracing pipeline")?;

        Ok(Viewer {
            window,
            backend,
            pipeline,
            camera: CameraController::default(),
            last_frame: Instant::now(),
        })
    }
}

impl Viewer {
    fn redraw(&mut self) {
        let now = Instant::now();
        self.camera.update_camera(now - self.last_frame);
        self.last_frame = now;

        if self.pipeline.is_faulted() {
            return;
        }
        let (width, height) = self.backend.surface_size();
        let frame = self.camera.frame(width as f32 / height.max(1) as f32);
        let presented = self
            .pipeline
            .render_frame(&mut self.backend, &frame, width, height)
            .and_then(|image| self.backend.present(image));
        if let Err(e) = presented {
            log::error!("frame failed: {}", e);
            if e.is_fatal() {
                log::warn!("press R to revalidate the pipeline");
            }
        }
    }

    fn handle_key(&mut self, code: KeyCode, scene: &SceneDescription) {
        match code {
            KeyCode::KeyR => self.pipeline.revalidate(),
            KeyCode::F5 => {
                if let Err(e) = self.pipeline.rescan(&mut self.backend, scene) {
                    log::error!("rescan failed, keeping previous geometry: {}", e);
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, el: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        match self.open(el) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(e) => {
                log::error!("{:#}", e);
                el.exit();
            }
        }
    }

    fn window_event(&mut self, el: &ActiveEventLoop, _: WindowId, ev: WindowEvent) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };
        if viewer.camera.process_events(&ev) {
            return;
        }
        match ev {
            WindowEvent::CloseRequested => {
                viewer.pipeline.shutdown(&mut viewer.backend);
                el.exit();
            }
            WindowEvent::Resized(size) => viewer.backend.resize(size.width, size.height),
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    viewer.handle_key(code, &self.scene);
                }
            }
            WindowEvent::RedrawRequested => {
                viewer.redraw();
                viewer.window.request_redraw();
            }
            _ => (),
        }
    }

    fn device_event(&mut self, _: &ActiveEventLoop, _: DeviceId, event: DeviceEvent) {
        if let (Some(viewer), DeviceEvent::MouseMotion { delta }) = (&mut self.viewer, event) {
            viewer.camera.process_mouse_motion(delta.0, delta.1);
        }
    }
}

fn run_headless(
    args: &Args,
    config: TracerConfig,
    scene: &SceneDescription,
    path: PathBuf,
) -> anyhow::Result<()> {
    let mut backend = HostBackend::new(ReferenceKernel);
    let mut pipeline = TracingPipeline::new(config);
    pipeline
        .init(&mut backend, scene, args.width, args.height)
        .context("initialising tracing pipeline")?;

    let mut camera = CameraController::default();
    let aspect = args.width as f32 / args.height as f32;
    let mut presented = None;
    for _ in 0..args.frames.max(1) {
        let frame = camera.frame(aspect);
        presented = Some(*pipeline.render_frame(&mut backend, &frame, args.width, args.height)?);
    }
    let image = presented.context("no frame rendered")?;
    let pixels = backend
        .read_image(&image)
        .context("rendered image was released")?
        .to_vec();
    pipeline.shutdown(&mut backend);

    screenshot::save_image(
        &ScreenshotTask {
            width: args.width,
            height: args.height,
            pixels,
        },
        &path,
    )?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TracerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TracerConfig::default(),
    };
    let scene = match &args.scene {
        Some(path) => SceneDescription::from_json_file(path)
            .with_context(|| format!("loading scene {}", path.display()))?,
        None => scenes::demo_scene(),
    };

    if let Some(path) = &args.headless {
        let path = path.clone().unwrap_or_else(screenshot::default_path);
        return run_headless(&args, config, &scene, path);
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App {
        config,
        scene,
        size: PhysicalSize::new(args.width, args.height),
        viewer: None,
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}
