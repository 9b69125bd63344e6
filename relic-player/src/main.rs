//! # RELIC
//!
//! Multi-backend emulator frontend shell. Wires the relic-core driver layer
//! (video, input, camera) around a synthetic frame source standing in for an
//! emulator core, with a winit event loop owning the window and GPU context.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

use relic_core::camera::{self, CameraCaps, CameraFrame, CameraRegistry, CameraSink, CameraSystem};
use relic_core::config::Settings;
use relic_core::input::{self, DeviceClass, InputRegistry, InputSystem, LogicalInput};
use relic_core::video::{self, VideoRegistry, VideoSystem};

/// Native size of the synthetic source, in pixels.
const SOURCE_WIDTH: u32 = 256;
const SOURCE_HEIGHT: u32 = 224;
/// Extra bytes per source row, so video backends must honor the declared
/// pitch instead of deriving it from the width.
const SOURCE_ROW_PAD: u32 = 64;

/// Source frames advanced per displayed frame while fast-forwarding.
const FAST_FORWARD_STEPS: u32 = 4;

const HEADLESS_FRAMES: u64 = 600;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Default)]
struct AppOptions {
    config: Option<PathBuf>,
    headless: bool,
}

impl AppOptions {
    fn from_args(args: &[String]) -> Self {
        let mut options = Self::default();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--config" => options.config = iter.next().map(PathBuf::from),
                _ => {}
            }
        }
        options
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = AppOptions::from_args(&args);

    if options.headless {
        tracing_subscriber::fmt()
            .with_env_filter("relic_core=info,relic_player=info,wgpu=warn")
            .init();
        return run_headless(&options);
    }

    tracing_subscriber::fmt()
        .with_env_filter("relic_core=debug,relic_player=debug,wgpu=warn,winit=warn")
        .init();

    tracing::info!("RELIC v{}", relic_core::VERSION);

    let settings = Settings::load_or_default(options.config.as_deref());
    let (video, camera, input) = build_systems(&settings)?;
    let mut app = RelicApp::new(settings, video, camera, input);

    let event_loop =
        EventLoop::new().map_err(|e| anyhow::anyhow!("event loop creation failed: {}", e))?;
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow::anyhow!("event loop error: {}", e))?;

    Ok(())
}

/// Build one registry per category from the drivers compiled into this
/// frontend. An empty category aborts startup; there is no degraded mode
/// without a null driver.
fn build_systems(settings: &Settings) -> Result<(VideoSystem, CameraSystem, InputSystem)> {
    let video_registry = VideoRegistry::new("video", video::builtin_drivers())?;
    tracing::info!("Video drivers: {}", video_registry.joined_idents());

    let camera_registry = CameraRegistry::new("camera", camera::builtin_drivers())?;
    tracing::info!("Camera drivers: {}", camera_registry.joined_idents());

    let input_registry = InputRegistry::new("input", input::builtin_drivers())?;
    tracing::info!("Input drivers: {}", input_registry.joined_idents());

    Ok((
        VideoSystem::new(video_registry, settings.video.clone()),
        CameraSystem::new(camera_registry, settings.camera.clone()),
        InputSystem::new(input_registry, settings.input.clone()),
    ))
}

// ============================================================================
// Synthetic Frame Source
// ============================================================================

/// Moving-color RGBA frames standing in for an emulator core's framebuffer.
/// Rows carry padding so the pitch-aware upload path is always exercised.
struct FrameSource {
    width: u32,
    height: u32,
    pitch: u32,
    buffer: Vec<u8>,
    counter: u64,
    scroll_x: i64,
    scroll_y: i64,
}

impl FrameSource {
    fn new(width: u32, height: u32) -> Self {
        let pitch = width * 4 + SOURCE_ROW_PAD;
        Self {
            width,
            height,
            pitch,
            buffer: vec![0u8; (pitch * height) as usize],
            counter: 0,
            scroll_x: 0,
            scroll_y: 0,
        }
    }

    fn shift(&mut self, dx: i64, dy: i64) {
        self.scroll_x += dx;
        self.scroll_y += dy;
    }

    /// Advance one frame of the pattern.
    fn advance(&mut self) {
        self.counter += 1;
        let t = self.counter as i64;
        for y in 0..self.height as i64 {
            let row = y as usize * self.pitch as usize;
            for x in 0..self.width as i64 {
                let px = row + x as usize * 4;
                let c = ((x + self.scroll_x + t) & 0xFF) as u8;
                let r = ((y + self.scroll_y) & 0xFF) as u8;
                self.buffer[px] = c;
                self.buffer[px + 1] = 255 - c;
                self.buffer[px + 2] = r;
                self.buffer[px + 3] = 255;
            }
        }
    }

    fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

/// Counts delivered camera frames; the frontend has no consumer for them yet
/// beyond diagnostics.
#[derive(Default)]
struct LogSink {
    frames: u64,
}

impl CameraSink for LogSink {
    fn raw_frame(&mut self, frame: &CameraFrame) {
        self.frames += 1;
        if self.frames == 1 {
            tracing::info!("camera delivering {}x{} frames", frame.width, frame.height);
        }
    }
}

// ============================================================================
// Application
// ============================================================================

struct RelicApp {
    settings: Settings,
    video: VideoSystem,
    camera: CameraSystem,
    input: InputSystem,
    source: FrameSource,
    camera_sink: LogSink,
    window: Option<Arc<Window>>,
    fast_forward: bool,
}

impl RelicApp {
    fn new(
        settings: Settings,
        video: VideoSystem,
        mut camera: CameraSystem,
        input: InputSystem,
    ) -> Self {
        camera
            .hooks_mut()
            .set_on_initialized(|| tracing::info!("camera session ready"));
        camera
            .hooks_mut()
            .set_on_deinitialized(|| tracing::info!("camera session closed"));

        Self {
            settings,
            video,
            camera,
            input,
            source: FrameSource::new(SOURCE_WIDTH, SOURCE_HEIGHT),
            camera_sink: LogSink::default(),
            window: None,
            fast_forward: false,
        }
    }

    /// One frontend tick: input, fast-forward, source frame(s), present,
    /// camera pump. Everything here is a direct blocking call on the thread
    /// owning the window and GPU context.
    fn tick(&mut self) {
        self.input.poll();

        let dx = self.input.state(0, DeviceClass::Joypad, 0, LogicalInput::Right)
            - self.input.state(0, DeviceClass::Joypad, 0, LogicalInput::Left);
        let dy = self.input.state(0, DeviceClass::Joypad, 0, LogicalInput::Down)
            - self.input.state(0, DeviceClass::Joypad, 0, LogicalInput::Up);
        self.source.shift(dx as i64, dy as i64);

        let fast_forward = self.input.fast_forward();
        if fast_forward != self.fast_forward {
            self.fast_forward = fast_forward;
            self.video.set_nonblock(fast_forward);
            tracing::debug!("fast forward: {}", fast_forward);
        }

        let steps = if self.fast_forward {
            FAST_FORWARD_STEPS
        } else {
            1
        };
        for _ in 0..steps {
            self.source.advance();
        }

        self.video.frame(
            self.source.buffer(),
            self.source.width,
            self.source.height,
            self.source.pitch,
        );

        self.camera.poll(&mut self.camera_sink);
    }

    fn shutdown(&mut self) {
        self.camera.stop();
        self.camera.free();
        self.input.free();
        self.video.free();
    }
}

impl ApplicationHandler for RelicApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("RELIC")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.settings.video.width,
                self.settings.video.height,
            ));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("window creation failed: {}", e);
                event_loop.exit();
                return;
            }
        };

        self.video.init_once(Some(window.clone()));
        if !self.video.is_active() {
            tracing::error!("no usable video driver; exiting");
            event_loop.exit();
            return;
        }

        self.input.init_once();
        self.camera.init_once(
            None,
            CameraCaps {
                raw_framebuffer: true,
                gpu_texture: false,
            },
            SOURCE_WIDTH,
            SOURCE_HEIGHT,
        );
        if self.camera.start() {
            tracing::info!("camera capture started");
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.video.resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.input.key_event(code, event.state.is_pressed());
                }
            }
            WindowEvent::RedrawRequested => {
                self.tick();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

// ============================================================================
// Headless Mode
// ============================================================================

/// Run the whole driver lifecycle without a window or GPU: null video,
/// pattern camera, fixed frame count.
fn run_headless(options: &AppOptions) -> Result<()> {
    tracing::info!("RELIC v{} (headless)", relic_core::VERSION);

    let mut settings = Settings::load_or_default(options.config.as_deref());
    settings.video.driver = "null".to_string();
    settings.camera.driver = "pattern".to_string();
    settings.camera.allow = true;

    let (mut video, mut camera, mut input) = build_systems(&settings)?;

    video.init_once(None);
    input.init_once();
    camera.init_once(
        None,
        CameraCaps {
            raw_framebuffer: true,
            gpu_texture: false,
        },
        SOURCE_WIDTH,
        SOURCE_HEIGHT,
    );
    camera.start();

    let mut source = FrameSource::new(SOURCE_WIDTH, SOURCE_HEIGHT);
    let mut sink = LogSink::default();

    for _ in 0..HEADLESS_FRAMES {
        input.poll();
        source.advance();
        video.frame(source.buffer(), source.width, source.height, source.pitch);
        camera.poll(&mut sink);
    }

    tracing::info!(
        "headless run complete: {} frames, {} camera frames",
        HEADLESS_FRAMES,
        sink.frames
    );

    camera.stop();
    camera.free();
    input.free();
    video.free();

    Ok(())
}
