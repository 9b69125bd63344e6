//! Video driver category
//!
//! Frame presentation behind the driver registry, plus the policy pieces
//! every video backend shares: the 4:3 aspect viewport and the window-title
//! FPS counter.

use crate::config::VideoSettings;
use crate::driver::{DriverIdent, DriverRegistry, LifecycleHooks};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use winit::window::Window;

/// Video errors
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("no window supplied for video init")]
    WindowUnavailable,

    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),

    #[error("no suitable GPU adapter")]
    AdapterUnavailable,

    #[error("device request failed: {0}")]
    DeviceRequest(String),
}

pub type VideoResult<T> = Result<T, VideoError>;

// ============================================================================
// Contract
// ============================================================================

/// Init-time request assembled from user settings plus the render target.
#[derive(Clone)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub vsync: bool,
    pub force_aspect: bool,
    pub smooth: bool,
    pub window: Option<Arc<Window>>,
}

impl VideoConfig {
    pub fn from_settings(settings: &VideoSettings, window: Option<Arc<Window>>) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            fullscreen: settings.fullscreen,
            vsync: settings.vsync,
            force_aspect: settings.force_aspect,
            smooth: settings.smooth,
            window,
        }
    }
}

/// Static descriptor of a compiled-in video backend.
pub trait VideoDriver {
    fn ident(&self) -> &'static str;
    fn init(&self, config: &VideoConfig) -> VideoResult<Box<dyn VideoSession>>;
}

impl DriverIdent for Box<dyn VideoDriver> {
    fn ident(&self) -> &'static str {
        self.as_ref().ident()
    }
}

/// One live render session. `frame` is the only mandatory operation; the
/// rest default to "unsupported", a silent no-op.
pub trait VideoSession {
    /// Upload and present one frame. `pitch` is the source row stride in
    /// bytes and may exceed `width * 4` to skip padding; backends must pass
    /// it through to the upload call, never derive it from `width`.
    fn frame(&mut self, buffer: &[u8], width: u32, height: u32, pitch: u32) -> bool;

    fn resize(&mut self, _width: u32, _height: u32) {}

    /// Nonblocking buffer swap for fast-forward. Only meaningful when vsync
    /// was requested at init.
    fn set_nonblock(&mut self, _nonblock: bool) {}
}

pub type VideoRegistry = DriverRegistry<Box<dyn VideoDriver>>;

/// Video backends compiled into this frontend, in priority order.
pub fn builtin_drivers() -> Vec<Box<dyn VideoDriver>> {
    vec![
        Box::new(crate::render::WgpuVideoDriver),
        Box::new(NullVideoDriver),
    ]
}

// ============================================================================
// Aspect Policy
// ============================================================================

pub const DESIRED_ASPECT: f32 = 4.0 / 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Visible region for a render target of `width` x `height`.
///
/// With aspect lock on, a target wider than 4:3 is pillarboxed (horizontal
/// extent narrowed, centered) and a narrower one letterboxed (vertical extent
/// narrowed, centered). Aspects are compared at 3-decimal precision so
/// floating-point jitter cannot flip the decision between frames.
pub fn compute_viewport(width: u32, height: u32, keep_aspect: bool) -> Viewport {
    let full = Viewport {
        x: 0,
        y: 0,
        width,
        height,
    };
    if !keep_aspect || height == 0 {
        return full;
    }

    let device_aspect = width as f32 / height as f32;
    let device_m = (device_aspect * 1000.0) as i32;
    let desired_m = (DESIRED_ASPECT * 1000.0) as i32;

    if device_m > desired_m {
        let delta = (DESIRED_ASPECT / device_aspect - 1.0) / 2.0 + 0.5;
        Viewport {
            x: (width as f32 * (0.5 - delta)) as u32,
            y: 0,
            width: (2.0 * width as f32 * delta) as u32,
            height,
        }
    } else if device_m < desired_m {
        let delta = (device_aspect / DESIRED_ASPECT - 1.0) / 2.0 + 0.5;
        Viewport {
            x: 0,
            y: (height as f32 * (0.5 - delta)) as u32,
            width,
            height: (2.0 * height as f32 * delta) as u32,
        }
    } else {
        full
    }
}

// ============================================================================
// Frame Pacing
// ============================================================================

/// Frames between FPS samples shown in the window title.
pub const FPS_SAMPLE_INTERVAL: u64 = 180;

/// Per-frame phases of a video backend's presentation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Upload,
    Draw,
    Present,
}

/// Wall-clock FPS over a sliding window of `FPS_SAMPLE_INTERVAL` frames.
pub struct FpsCounter {
    frames: u64,
    window_start: Option<Instant>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            frames: 0,
            window_start: None,
        }
    }

    /// Count one frame; yields a sample every `FPS_SAMPLE_INTERVAL` frames.
    pub fn tick(&mut self) -> Option<f32> {
        self.tick_at(Instant::now())
    }

    /// Same as `tick` with the clock injected, for deterministic tests.
    pub fn tick_at(&mut self, now: Instant) -> Option<f32> {
        if self.frames == 0 {
            self.window_start = Some(now);
        }

        let mut sample = None;
        if self.frames > 0 && self.frames % FPS_SAMPLE_INTERVAL == 0 {
            if let Some(start) = self.window_start {
                let elapsed = now.duration_since(start).as_secs_f32();
                if elapsed > 0.0 {
                    sample = Some(FPS_SAMPLE_INTERVAL as f32 / elapsed);
                }
            }
            self.window_start = Some(now);
        }

        self.frames += 1;
        sample
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Video System
// ============================================================================

/// Owns the single live render session and the lifecycle around it.
pub struct VideoSystem {
    registry: VideoRegistry,
    settings: VideoSettings,
    session: Option<Box<dyn VideoSession>>,
    active: bool,
    hooks: LifecycleHooks,
}

impl VideoSystem {
    pub fn new(registry: VideoRegistry, settings: VideoSettings) -> Self {
        Self {
            registry,
            settings,
            session: None,
            active: false,
            hooks: LifecycleHooks::new(),
        }
    }

    pub fn hooks_mut(&mut self) -> &mut LifecycleHooks {
        &mut self.hooks
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Resolve the configured driver and bring up a render session against
    /// `window`. A second call while a session is live is a guarded no-op.
    pub fn init_once(&mut self, window: Option<Arc<Window>>) {
        if self.session.is_some() {
            tracing::debug!("video already initialized, ignoring");
            return;
        }

        let index = self.registry.resolve(&self.settings.driver);
        let driver = self.registry.get(index);
        let config = VideoConfig::from_settings(&self.settings, window);

        match driver.init(&config) {
            Ok(session) => {
                tracing::info!("Video driver \"{}\" initialized", driver.ident());
                self.session = Some(session);
                self.active = true;
                self.hooks.fire_initialized();
            }
            Err(e) => {
                tracing::error!("Failed to initialize video driver: {}", e);
                self.active = false;
            }
        }
    }

    /// Present one frame. False when no session is live or the backend
    /// rejected the frame.
    pub fn frame(&mut self, buffer: &[u8], width: u32, height: u32, pitch: u32) -> bool {
        match self.session.as_mut() {
            Some(session) => session.frame(buffer, width, height, pitch),
            None => false,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(session) = self.session.as_mut() {
            session.resize(width, height);
        }
    }

    pub fn set_nonblock(&mut self, nonblock: bool) {
        if let Some(session) = self.session.as_mut() {
            session.set_nonblock(nonblock);
        }
    }

    /// Tear down the session. Fires `on_deinitialized` before the backend is
    /// dropped; always leaves the handle cleared. Idempotent.
    pub fn free(&mut self) {
        if self.session.is_some() {
            self.hooks.fire_deinitialized();
        }
        self.session = None;
        self.active = false;
    }
}

// ============================================================================
// Null Backend
// ============================================================================

/// Accepts every frame and renders nothing. Keeps the frontend loop alive on
/// machines with no GPU and in headless runs.
pub struct NullVideoDriver;

impl VideoDriver for NullVideoDriver {
    fn ident(&self) -> &'static str {
        "null"
    }

    fn init(&self, _config: &VideoConfig) -> VideoResult<Box<dyn VideoSession>> {
        Ok(Box::new(NullVideoSession { frames: 0 }))
    }
}

struct NullVideoSession {
    frames: u64,
}

impl VideoSession for NullVideoSession {
    fn frame(&mut self, _buffer: &[u8], _width: u32, _height: u32, _pitch: u32) -> bool {
        self.frames += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn test_viewport_exact_aspect_uses_full_target() {
        let vp = compute_viewport(1024, 768, true);
        assert_eq!(
            vp,
            Viewport {
                x: 0,
                y: 0,
                width: 1024,
                height: 768
            }
        );
    }

    #[test]
    fn test_viewport_wide_target_pillarboxes() {
        let vp = compute_viewport(1920, 1080, true);
        // Vertical extent untouched
        assert_eq!(vp.y, 0);
        assert_eq!(vp.height, 1080);
        // Horizontal extent narrowed to 4:3 and centered
        assert_eq!(vp.width, 1440);
        assert_eq!(vp.x, 240);
        assert_eq!(vp.x * 2 + vp.width, 1920);
    }

    #[test]
    fn test_viewport_narrow_target_letterboxes() {
        let vp = compute_viewport(1024, 1024, true);
        assert_eq!(vp.x, 0);
        assert_eq!(vp.width, 1024);
        assert_eq!(vp.height, 768);
        assert_eq!(vp.y, 128);
        assert_eq!(vp.y * 2 + vp.height, 1024);
    }

    #[test]
    fn test_viewport_aspect_lock_disabled() {
        let vp = compute_viewport(1920, 1080, false);
        assert_eq!(
            vp,
            Viewport {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn test_fps_sample_after_interval() {
        let t0 = Instant::now();
        let mut fps = FpsCounter::new();

        assert_eq!(fps.tick_at(t0), None);
        for _ in 1..FPS_SAMPLE_INTERVAL {
            assert_eq!(fps.tick_at(t0 + Duration::from_millis(1)), None);
        }

        // 180 frames over exactly 3 seconds
        let sample = fps.tick_at(t0 + Duration::from_secs(3));
        assert_eq!(sample, Some(60.0));
    }

    #[test]
    fn test_fps_window_restarts_after_sample() {
        let t0 = Instant::now();
        let mut fps = FpsCounter::new();

        fps.tick_at(t0);
        for _ in 1..FPS_SAMPLE_INTERVAL {
            fps.tick_at(t0);
        }
        assert_eq!(fps.tick_at(t0 + Duration::from_secs(3)), Some(60.0));

        // Next window is measured from the previous sample point
        for _ in 1..FPS_SAMPLE_INTERVAL {
            fps.tick_at(t0 + Duration::from_secs(3));
        }
        let sample = fps.tick_at(t0 + Duration::from_secs(3) + Duration::from_secs(2));
        assert_eq!(sample, Some(90.0));
    }

    struct MockVideoDriver {
        inits: Rc<Cell<u32>>,
    }

    impl VideoDriver for MockVideoDriver {
        fn ident(&self) -> &'static str {
            "mock"
        }

        fn init(&self, _config: &VideoConfig) -> VideoResult<Box<dyn VideoSession>> {
            self.inits.set(self.inits.get() + 1);
            Ok(Box::new(NullVideoSession { frames: 0 }))
        }
    }

    fn mock_system(inits: Rc<Cell<u32>>) -> VideoSystem {
        let registry = VideoRegistry::new(
            "video",
            vec![Box::new(MockVideoDriver { inits }) as Box<dyn VideoDriver>],
        )
        .unwrap();
        let settings = VideoSettings {
            driver: "mock".to_string(),
            ..VideoSettings::default()
        };
        VideoSystem::new(registry, settings)
    }

    #[test]
    fn test_video_init_once_guard() {
        let inits = Rc::new(Cell::new(0));
        let mut sys = mock_system(inits.clone());

        sys.init_once(None);
        sys.init_once(None);
        assert_eq!(inits.get(), 1);
        assert!(sys.is_active());
    }

    #[test]
    fn test_video_frame_without_session() {
        let inits = Rc::new(Cell::new(0));
        let mut sys = mock_system(inits);
        assert!(!sys.frame(&[0u8; 16], 2, 2, 8));
    }

    #[test]
    fn test_video_free_then_reinit() {
        let inits = Rc::new(Cell::new(0));
        let mut sys = mock_system(inits.clone());

        sys.init_once(None);
        sys.free();
        assert!(!sys.is_active());

        // free released the guard: a fresh init is allowed
        sys.init_once(None);
        assert_eq!(inits.get(), 2);
        assert!(sys.is_active());
    }

    #[test]
    fn test_null_session_accepts_frames() {
        let driver = NullVideoDriver;
        let mut session = driver
            .init(&VideoConfig {
                width: 0,
                height: 0,
                fullscreen: false,
                vsync: false,
                force_aspect: false,
                smooth: false,
                window: None,
            })
            .unwrap();
        assert!(session.frame(&[0u8; 16], 2, 2, 8));
        // Unsupported operations are silent no-ops
        session.resize(100, 100);
        session.set_nonblock(true);
    }
}
