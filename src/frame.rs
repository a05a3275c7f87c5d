//! Per-frame composition of camera, accumulation, scene and kernel state.

use bytemuck::{Pod, Zeroable};
use rand::{rngs::StdRng, SeedableRng};
use thiserror::Error;

use crate::{
    accumulation::{AccumulationController, AccumulationTarget, ResetReason},
    camera::{CameraController, CameraRig},
    config::ViewerConfig,
    controls::{ShadingParams, UiLayer},
    hot_reload::{KernelHotReloader, ReloadOutcome},
    input::{FrameInput, KeyAction},
    kernel::{KernelCompiler, KernelError},
    scene::{Scene, SceneBuffer, SceneError, SceneGenerator},
};

/// Per-frame payload of the kernel, field order matches the WGSL struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RenderConfig {
    pub camera_pos: [f32; 3],
    pub step: u32,

    pub target_width: u32,
    pub target_height: u32,
    pub ambient_light_intensity: f32,
    pub sphere_lights_intensity: f32,

    pub metal_roughness: f32,
    pub refractive_index: f32,
    pub dof_radius: f32,
    pub dof_focal_plane: f32,
}

impl RenderConfig {
    fn apply_shading(&mut self, shading: &ShadingParams) {
        self.ambient_light_intensity = shading.ambient_light_intensity;
        self.sphere_lights_intensity = shading.sphere_lights_intensity;
        self.metal_roughness = shading.metal_roughness;
        self.refractive_index = shading.refractive_index;
        self.dof_radius = shading.dof_radius;
        self.dof_focal_plane = shading.dof_focal_plane;
    }
}

/// GPU side of a frame. Everything here is fire-and-forget from the
/// orchestrator's point of view.
pub trait RenderBackend: AccumulationTarget + KernelCompiler {
    fn upload_scene(&mut self, scene: &SceneBuffer);
    fn dispatch(&mut self, kernel: &Self::Kernel, config: &RenderConfig, workgroups: [u32; 3]);
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Scene generation failed: {0}")]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

#[derive(Debug)]
pub struct FrameReport {
    /// Step the frame was rendered with, 1 on any frame that reset.
    pub step: u32,
    pub reset: bool,
    pub reload: ReloadOutcome,
    pub snapshot_requested: bool,
    pub running: bool,
}

pub struct FrameOrchestrator<K> {
    camera: CameraRig,
    controller: CameraController,
    accumulation: AccumulationController,
    generator: SceneGenerator,
    rng: StdRng,
    scene: Scene,
    shading: ShadingParams,
    config: RenderConfig,
    reloader: KernelHotReloader<K>,
    running: bool,
}

impl<K> FrameOrchestrator<K> {
    /// Generate the first scene and compile the first kernel. Any error here
    /// must stop the process before the loop starts.
    pub fn new<B>(
        viewer: &ViewerConfig,
        target_size: (u32, u32),
        backend: &mut B,
    ) -> Result<Self, StartupError>
    where
        B: RenderBackend<Kernel = K>,
    {
        let generator = SceneGenerator::new(viewer.kernel.spheres_count as usize, viewer.scene.clone())?;
        let mut rng = match viewer.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let scene = generator.generate(&mut rng)?;
        backend.upload_scene(&SceneBuffer::new(&scene));

        let reloader = KernelHotReloader::new(&viewer.kernel_path, viewer.kernel, &*backend)?
            .with_compile_budget(std::time::Duration::from_millis(viewer.compile_budget_ms));

        let shading = viewer.shading.clamped();
        let mut config = RenderConfig::zeroed();
        config.target_width = target_size.0;
        config.target_height = target_size.1;
        config.apply_shading(&shading);

        let mut accumulation = AccumulationController::new();
        accumulation.reset(backend, ResetReason::Startup);
        accumulation.begin_frame();

        Ok(Self {
            camera: viewer.camera.rig(),
            controller: viewer.camera,
            accumulation,
            generator,
            rng,
            scene,
            shading,
            config,
            reloader,
            running: true,
        })
    }

    pub fn step(&self) -> u32 {
        self.accumulation.step()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn shading(&self) -> &ShadingParams {
        &self.shading
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn kernel(&self) -> &K {
        self.reloader.kernel()
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.config.target_width, self.config.target_height)
    }

    /// The backend must already hold a target of the new size.
    pub fn resize<B>(&mut self, target_size: (u32, u32), backend: &mut B)
    where
        B: RenderBackend<Kernel = K>,
    {
        if self.target_size() == target_size {
            return;
        }
        self.config.target_width = target_size.0;
        self.config.target_height = target_size.1;
        self.accumulation.reset(backend, ResetReason::Resized);
    }

    /// Run one frame up to and including the dispatch, then advance the step.
    /// Presentation is left to the caller.
    pub fn run_frame<B, U>(&mut self, input: &FrameInput, ui: &mut U, backend: &mut B) -> FrameReport
    where
        B: RenderBackend<Kernel = K>,
        U: UiLayer + ?Sized,
    {
        let _span = tracing::trace_span!("frame", step = self.accumulation.step()).entered();

        if input.close_requested {
            self.running = false;
        }

        if ui.apply(input, &mut self.shading) {
            self.accumulation.reset(backend, ResetReason::ParametersEdited);
        }

        let mut snapshot_requested = false;
        if !ui.is_capturing_input() {
            for action in input.actions() {
                match action {
                    KeyAction::Quit => self.running = false,
                    KeyAction::ToggleUi => ui.toggle_visible(),
                    KeyAction::RegenerateScene => self.regenerate(backend),
                    KeyAction::SaveSnapshot => snapshot_requested = true,
                }
            }

            let zoomed = self.controller.zoom(&mut self.camera, input.scroll_delta);
            let orbited = self.controller.drag(&mut self.camera, input.drag_delta);
            if zoomed || orbited {
                self.accumulation.reset(backend, ResetReason::CameraMoved);
            }
        }

        self.config.camera_pos = self.camera.eye_position().to_array();

        let reload = self.reloader.poll(&*backend);
        if reload.is_reloaded() {
            self.accumulation.reset(backend, ResetReason::KernelReloaded);
        }

        self.config.step = self.accumulation.step();
        self.config.apply_shading(&self.shading);
        let workgroups = self
            .reloader
            .defines()
            .workgroups(self.config.target_width, self.config.target_height);
        backend.dispatch(self.reloader.kernel(), &self.config, workgroups);

        let report = FrameReport {
            step: self.config.step,
            reset: self.accumulation.was_reset(),
            reload,
            snapshot_requested,
            running: self.running,
        };
        self.accumulation.tick();
        report
    }

    fn regenerate<B>(&mut self, backend: &mut B)
    where
        B: RenderBackend<Kernel = K>,
    {
        match self.generator.generate(&mut self.rng) {
            Ok(scene) => {
                backend.upload_scene(&SceneBuffer::new(&scene));
                self.scene = scene;
                self.accumulation.reset(backend, ResetReason::SceneRegenerated);
            }
            Err(err) => tracing::error!(error = %err, "scene regeneration failed, keeping current scene"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        time::{Duration, SystemTime},
    };

    use winit::event::VirtualKeyCode;

    use super::*;
    use crate::{
        accumulation::tests::CpuImage,
        controls::ControlPanel,
        hot_reload::tests::{FakeCompiler, FakeKernel},
        kernel::KernelDefines,
    };

    struct FakeBackend {
        compiler: FakeCompiler,
        image: CpuImage,
        uploads: Vec<SceneBuffer>,
        dispatches: Vec<(u32, RenderConfig, [u32; 3])>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                compiler: FakeCompiler::default(),
                image: CpuImage::filled(8, 1.0),
                uploads: Vec::new(),
                dispatches: Vec::new(),
            }
        }

        /// Pretend the kernel added a sample so clears are observable.
        fn splat(&mut self) {
            self.image.pixels.iter_mut().for_each(|p| p[0] += 1.0);
        }
    }

    impl AccumulationTarget for FakeBackend {
        fn clear(&mut self) {
            self.image.clear();
        }
    }

    impl KernelCompiler for FakeBackend {
        type Kernel = FakeKernel;

        fn compile(&self, source: &str, defines: &KernelDefines) -> Result<FakeKernel, KernelError> {
            self.compiler.compile(source, defines)
        }
    }

    impl RenderBackend for FakeBackend {
        fn upload_scene(&mut self, scene: &SceneBuffer) {
            self.uploads.push(scene.clone());
        }

        fn dispatch(&mut self, kernel: &FakeKernel, config: &RenderConfig, workgroups: [u32; 3]) {
            self.dispatches.push((kernel.id, *config, workgroups));
            self.splat();
        }
    }

    fn write_kernel(path: &Path, content: &str, seconds: u64) {
        std::fs::write(path, content).unwrap();
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(seconds))
            .unwrap();
    }

    struct Harness {
        _dir: tempfile::TempDir,
        kernel_path: PathBuf,
        backend: FakeBackend,
        panel: ControlPanel,
        frames: FrameOrchestrator<FakeKernel>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let kernel_path = dir.path().join("ray_trace.wgsl");
        write_kernel(&kernel_path, "fn main() {}", 1_000);

        let viewer = ViewerConfig {
            kernel_path: kernel_path.clone(),
            kernel: KernelDefines {
                spheres_count: 10,
                group_size_x: 8,
                group_size_y: 8,
            },
            seed: Some(11),
            ..Default::default()
        };
        let mut backend = FakeBackend::new();
        let frames = FrameOrchestrator::new(&viewer, (100, 60), &mut backend).unwrap();
        Harness {
            _dir: dir,
            kernel_path,
            backend,
            panel: ControlPanel::new(),
            frames,
        }
    }

    impl Harness {
        fn frame(&mut self, input: FrameInput) -> FrameReport {
            self.frames.run_frame(&input, &mut self.panel, &mut self.backend)
        }
    }

    fn keys(pressed: &[VirtualKeyCode]) -> FrameInput {
        FrameInput {
            pressed: pressed.to_vec(),
            held: pressed.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn drag(x: f32, y: f32) -> FrameInput {
        FrameInput {
            drag_delta: glam::Vec2::new(x, y),
            ..Default::default()
        }
    }

    #[test]
    fn startup_uploads_scene_and_clears() {
        let h = harness();
        assert_eq!(h.backend.uploads.len(), 1);
        assert_eq!(h.backend.uploads[0].capacity(), 10);
        assert_eq!(h.backend.image.clears, 1);
        assert_eq!(h.frames.step(), 1);
        assert!(h.frames.scene().is_overlap_free());
    }

    #[test]
    fn idle_frames_advance_step() {
        let mut h = harness();
        for expected in 1..=20 {
            let report = h.frame(FrameInput::default());
            assert_eq!(report.step, expected);
            assert!(!report.reset);
        }
        assert_eq!(h.frames.step(), 21);
        assert_eq!(h.backend.image.clears, 1);
    }

    #[test]
    fn dispatch_covers_target_with_current_config() {
        let mut h = harness();
        h.frame(FrameInput::default());
        let (kernel, config, workgroups) = h.backend.dispatches[0];
        assert_eq!(kernel, 1);
        assert_eq!(workgroups, [13, 8, 1]);
        assert_eq!((config.target_width, config.target_height), (100, 60));
        assert_eq!(config.camera_pos, h.frames.camera().eye_position().to_array());
        assert_eq!(config.refractive_index, 1.5);
    }

    #[test]
    fn camera_input_resets_before_dispatch() {
        let mut h = harness();
        for _ in 0..5 {
            h.frame(FrameInput::default());
        }
        let before = *h.frames.camera();

        let report = h.frame(drag(30.0, -10.0));
        assert!(report.reset);
        assert_eq!(report.step, 1);
        assert_ne!(*h.frames.camera(), before);
        let (_, config, _) = h.backend.dispatches.last().unwrap();
        assert_eq!(config.step, 1);
        // Cleared then one sample from this frame's dispatch.
        assert!(h.backend.image.pixels.iter().all(|p| p[0] == 1.0));
        assert_eq!(h.frames.step(), 2);

        let zoom = FrameInput {
            scroll_delta: 2.0,
            ..Default::default()
        };
        let report = h.frame(zoom);
        assert_eq!(report.step, 1);
        assert!((h.frames.camera().radius - 9.8).abs() < 1e-5);
    }

    #[test]
    fn capturing_ui_blocks_camera_and_keys() {
        let mut h = harness();
        let mut input = keys(&[VirtualKeyCode::Right, VirtualKeyCode::Escape]);
        input.drag_delta = glam::Vec2::new(50.0, 0.0);
        let before = *h.frames.camera();

        let report = h.frame(input);
        assert!(report.reset, "the slider edit itself resets");
        assert!(report.running);
        assert_eq!(*h.frames.camera(), before);
        assert!((h.frames.shading().ambient_light_intensity - 15.2).abs() < 1e-5);
    }

    #[test]
    fn quit_and_close_stop_the_loop() {
        let mut h = harness();
        assert!(!h.frame(keys(&[VirtualKeyCode::Escape])).running);

        let mut h = harness();
        let close = FrameInput {
            close_requested: true,
            ..Default::default()
        };
        assert!(!h.frame(close).running);
        assert!(!h.frames.is_running());
    }

    #[test]
    fn regenerate_uploads_new_scene() {
        let mut h = harness();
        h.frame(FrameInput::default());
        let previous = h.frames.scene().clone();

        let report = h.frame(keys(&[VirtualKeyCode::F2]));
        assert_eq!(report.step, 1);
        assert_eq!(h.backend.uploads.len(), 2);
        assert_ne!(h.frames.scene(), &previous);
        assert!(h.frames.scene().is_overlap_free());
    }

    #[test]
    fn toggle_ui_and_snapshot_do_not_reset() {
        let mut h = harness();
        h.frame(FrameInput::default());
        let report = h.frame(keys(&[VirtualKeyCode::F1, VirtualKeyCode::F12]));
        assert!(!report.reset);
        assert!(report.snapshot_requested);
        assert!(!h.panel.visible());
        assert_eq!(report.step, 2);
    }

    #[test]
    fn broken_kernel_edit_keeps_kernel_and_samples() {
        let mut h = harness();
        h.frame(FrameInput::default());
        h.frame(FrameInput::default());

        write_kernel(&h.kernel_path, "syntax error", 2_000);
        let report = h.frame(FrameInput::default());
        assert!(matches!(report.reload, ReloadOutcome::Failed(_)));
        assert!(!report.reset);
        assert_eq!(report.step, 3);
        assert_eq!(h.frames.kernel().id, 1);
        assert_eq!(h.backend.dispatches.last().unwrap().0, 1);
        assert_eq!(h.backend.image.clears, 1);
    }

    #[test]
    fn good_kernel_edit_swaps_and_resets() {
        let mut h = harness();
        h.frame(FrameInput::default());

        write_kernel(&h.kernel_path, "fn main() { /* v2 */ }", 2_000);
        let report = h.frame(FrameInput::default());
        assert!(report.reload.is_reloaded());
        assert_eq!(report.step, 1);
        assert_eq!(h.backend.dispatches.last().unwrap().0, 2);
    }

    #[test]
    fn resize_resets_and_regrids() {
        let mut h = harness();
        h.frame(FrameInput::default());
        h.frames.resize((64, 64), &mut h.backend);
        let report = h.frame(FrameInput::default());
        assert_eq!(report.step, 1);
        assert_eq!(h.backend.dispatches.last().unwrap().2, [8, 8, 1]);
    }
}
