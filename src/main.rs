use std::path::{Path, PathBuf};

use anyhow::Context;
use progressive_tracer_lib::{
    application::{AppState, Application, Layer, Screen, WindowSettings},
    compute::{ComputeKernel, PathTraceCompute},
    config::ViewerConfig,
    controls::{ControlPanel, UiLayer},
    frame::FrameOrchestrator,
    input::InputState,
    renderer::{GpuFrame, PresentPass},
    snapshot,
};
use tracing_subscriber::EnvFilter;
use winit::{dpi::PhysicalSize, event::Event};

const WINDOW_TITLE: &str = "Ray Tracer";
/// Seconds between window title refreshes.
const TITLE_INTERVAL: f32 = 0.25;

struct PathTracer {
    config: ViewerConfig,
    frames: FrameOrchestrator<ComputeKernel>,
    compute: PathTraceCompute,
    present: PresentPass,
    input: InputState,
    panel: ControlPanel,
    pending_commands: Option<wgpu::CommandBuffer>,
    last_step: u32,
    snapshot_requested: bool,
    title_timer: f32,
}

impl PathTracer {
    fn refresh_title(&mut self, app: &AppState, screen: &Screen) {
        self.title_timer += app.elapsed_time;
        if self.title_timer < TITLE_INTERVAL {
            return;
        }
        self.title_timer = 0.0;

        let title = if self.panel.visible() {
            format!(
                "{WINDOW_TITLE} | FPS {} | STEPS {} | {}",
                app.fps(),
                self.last_step,
                self.panel.status(self.frames.shading())
            )
        } else {
            WINDOW_TITLE.to_owned()
        };
        screen.window().set_title(&title);
    }

    fn save_snapshot(&self, screen: &Screen) {
        let accumulation = self.compute.accumulation();
        let (width, height) = accumulation.size();
        let path = PathBuf::from(format!("snapshot-{}.png", self.last_step));
        let saved = snapshot::read_back(&screen.device, &screen.queue, accumulation)
            .and_then(|pixels| snapshot::save(&snapshot::to_image(&pixels, width, height), &path));
        if let Err(err) = saved {
            tracing::error!(error = %err, "snapshot failed");
        }
    }
}

impl Layer for PathTracer {
    type Config = ViewerConfig;
    type LayerErr = anyhow::Error;

    fn start(config: &ViewerConfig, screen: &mut Screen, _app: &AppState) -> anyhow::Result<Self> {
        let size = screen.window().inner_size();
        let (width, height) = config.render_target_size(size.width, size.height);
        let mut compute = PathTraceCompute::new(&screen.device, &config.kernel, width, height);

        let mut frame = GpuFrame::new(&screen.device, &screen.queue, &mut compute);
        let frames = FrameOrchestrator::new(config, (width, height), &mut frame)
            .with_context(|| format!("failed to start with kernel {}", config.kernel_path.display()))?;
        screen.queue.submit(std::iter::once(frame.finish()));

        let present = PresentPass::new(&screen.device, screen.config.format, &compute);
        tracing::info!(width, height, spheres = frames.scene().len(), "renderer ready");

        Ok(Self {
            config: config.clone(),
            frames,
            compute,
            present,
            input: InputState::new(),
            panel: ControlPanel::new(),
            pending_commands: None,
            last_step: 1,
            snapshot_requested: false,
            title_timer: TITLE_INTERVAL,
        })
    }

    fn process_event(&mut self, event: &Event<()>, screen: &mut Screen) {
        if let Event::WindowEvent { window_id, event } = event {
            if *window_id == screen.window().id() {
                self.input.process_event(event);
            }
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>, _app: &AppState, screen: &mut Screen) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let (width, height) = self.config.render_target_size(new_size.width, new_size.height);
        self.compute.resize(&screen.device, width, height);
        self.present.rebind(&screen.device, &self.compute);

        let mut frame = GpuFrame::new(&screen.device, &screen.queue, &mut self.compute);
        self.frames.resize((width, height), &mut frame);
        screen.queue.submit(std::iter::once(frame.finish()));
    }

    fn update(&mut self, app: &AppState, screen: &mut Screen) {
        let input = self.input.take_frame();

        let mut frame = GpuFrame::new(&screen.device, &screen.queue, &mut self.compute);
        let report = self.frames.run_frame(&input, &mut self.panel, &mut frame);
        self.pending_commands = Some(frame.finish());

        self.last_step = report.step;
        self.snapshot_requested |= report.snapshot_requested;
        self.refresh_title(app, screen);
    }

    fn render(&mut self, _app: &AppState, screen: &mut Screen) -> Result<(), wgpu::SurfaceError> {
        let compute_commands = self.pending_commands.take();
        let output = match screen.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                // Keep accumulating even when there is nothing to present to.
                screen.queue.submit(compute_commands);
                return Err(err);
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = screen
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        self.present.draw(&mut encoder, &view);

        screen
            .queue
            .submit(compute_commands.into_iter().chain(std::iter::once(encoder.finish())));
        output.present();

        if std::mem::take(&mut self.snapshot_requested) {
            self.save_snapshot(screen);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.frames.is_running()
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> anyhow::Result<()> {
        tracing::info!(steps = self.last_step, "exiting");
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args_os().nth(1) {
        Some(path) => ViewerConfig::load(Path::new(&path))?,
        None => ViewerConfig::default(),
    };
    config.validate()?;

    let window = WindowSettings {
        title: WINDOW_TITLE.to_owned(),
        width: config.window_width,
        height: config.window_height,
    };
    pollster::block_on(Application::<PathTracer>::init(config, window))?;
    Ok(())
}
