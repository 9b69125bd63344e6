//! Camera driver category
//!
//! Pluggable camera capture behind the driver registry. The frontend talks to
//! `CameraSystem` only; the concrete backend (network camera, synthetic
//! pattern, null) is chosen by name from the compiled-in list.

use crate::config::CameraSettings;
use crate::driver::{DriverIdent, DriverRegistry, LifecycleHooks};
use thiserror::Error;

/// Camera errors
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera init failed: {0}")]
    Init(String),

    #[error("camera request failed: {0}")]
    Fetch(String),

    #[error("failed to decode camera frame: {0}")]
    Decode(String),
}

pub type CameraResult<T> = Result<T, CameraError>;

// ============================================================================
// Contract
// ============================================================================

/// Frame delivery formats the consumer can accept, forwarded to every poll.
///
/// A backend that cannot produce a requested format simply does not service
/// it; that is not an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraCaps {
    pub raw_framebuffer: bool,
    pub gpu_texture: bool,
}

/// One captured frame, tightly packed RGB24 unless `pitch` says otherwise.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes.
    pub pitch: usize,
}

/// Receives frames from `CameraSystem::poll`. Default bodies drop the frame.
pub trait CameraSink {
    fn raw_frame(&mut self, _frame: &CameraFrame) {}
    fn gpu_texture(&mut self, _texture_id: u64) {}
}

/// Init-time request assembled by `CameraSystem` from settings and the
/// consumer's preferred capture size.
#[derive(Debug, Clone)]
pub struct CameraInitConfig {
    pub device: Option<String>,
    pub caps: CameraCaps,
    pub width: u32,
    pub height: u32,
}

/// Static descriptor of a compiled-in camera backend.
pub trait CameraDriver {
    fn ident(&self) -> &'static str;
    fn init(&self, config: &CameraInitConfig) -> CameraResult<Box<dyn CameraSession>>;
}

impl DriverIdent for Box<dyn CameraDriver> {
    fn ident(&self) -> &'static str {
        self.as_ref().ident()
    }
}

/// One live capture session. Default method bodies mean "operation
/// unsupported by this backend" and are silent no-ops, never errors.
pub trait CameraSession {
    fn start(&mut self) -> bool {
        false
    }
    fn stop(&mut self) {}
    fn poll(&mut self, _caps: CameraCaps, _sink: &mut dyn CameraSink) {}
}

pub type CameraRegistry = DriverRegistry<Box<dyn CameraDriver>>;

/// Camera backends compiled into this frontend, in priority order.
pub fn builtin_drivers() -> Vec<Box<dyn CameraDriver>> {
    vec![
        Box::new(NetcamDriver),
        Box::new(PatternDriver),
        Box::new(NullCameraDriver),
    ]
}

// ============================================================================
// Camera System
// ============================================================================

/// Owns the single live camera session and the lifecycle around it.
pub struct CameraSystem {
    registry: CameraRegistry,
    settings: CameraSettings,
    session: Option<Box<dyn CameraSession>>,
    caps: CameraCaps,
    active: bool,
    hooks: LifecycleHooks,
}

impl CameraSystem {
    pub fn new(registry: CameraRegistry, settings: CameraSettings) -> Self {
        Self {
            registry,
            settings,
            session: None,
            caps: CameraCaps::default(),
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

    /// Resolve the configured driver and bring up a capture session.
    ///
    /// A second call while a session is live is a guarded no-op; tearing the
    /// old session down implicitly here would leak the backend's resources.
    /// The capture size comes from user settings when set, otherwise from the
    /// consumer's preferred `fallback_width`/`fallback_height`. On backend
    /// failure the camera is marked inactive and the frontend continues
    /// without it; there is no retry and no fallback to another backend.
    pub fn init_once(
        &mut self,
        device: Option<&str>,
        caps: CameraCaps,
        fallback_width: u32,
        fallback_height: u32,
    ) {
        if self.session.is_some() {
            tracing::debug!("camera already initialized, ignoring");
            return;
        }

        let index = self.registry.resolve(&self.settings.driver);
        let driver = self.registry.get(index);

        let device = if !self.settings.device.is_empty() {
            Some(self.settings.device.clone())
        } else {
            device.map(str::to_owned)
        };
        let width = if self.settings.width != 0 {
            self.settings.width
        } else {
            fallback_width
        };
        let height = if self.settings.height != 0 {
            self.settings.height
        } else {
            fallback_height
        };

        let config = CameraInitConfig {
            device,
            caps,
            width,
            height,
        };

        match driver.init(&config) {
            Ok(session) => {
                tracing::info!("Camera driver \"{}\" initialized", driver.ident());
                self.session = Some(session);
                self.caps = caps;
                self.active = true;
                self.hooks.fire_initialized();
            }
            Err(e) => {
                tracing::error!(
                    "Failed to initialize camera driver: {}. Will continue without camera.",
                    e
                );
                self.active = false;
            }
        }
    }

    /// Begin capture. False when no session is live, when the user has not
    /// allowed camera use, or when the backend does not support starting.
    pub fn start(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !self.settings.allow {
            tracing::warn!("Camera is explicitly disabled.");
            return false;
        }
        session.start()
    }

    /// Halt capture. Absence of a live session is not an error, just a
    /// skipped action.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
    }

    /// Pump the backend once, forwarding the consumer's sink capabilities.
    pub fn poll(&mut self, sink: &mut dyn CameraSink) {
        if let Some(session) = self.session.as_mut() {
            session.poll(self.caps, sink);
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
// Netcam Backend
// ============================================================================

/// MJPEG/JPEG over HTTP. The configured device string is the camera URL.
pub struct NetcamDriver;

impl CameraDriver for NetcamDriver {
    fn ident(&self) -> &'static str {
        "netcam"
    }

    fn init(&self, config: &CameraInitConfig) -> CameraResult<Box<dyn CameraSession>> {
        let url = config
            .device
            .clone()
            .ok_or_else(|| CameraError::Init("netcam needs a device URL".to_string()))?;
        tracing::info!("netcam: capturing from {}", url);
        Ok(Box::new(NetcamSession {
            url,
            running: false,
        }))
    }
}

struct NetcamSession {
    url: String,
    running: bool,
}

impl CameraSession for NetcamSession {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn poll(&mut self, caps: CameraCaps, sink: &mut dyn CameraSink) {
        if !self.running || !caps.raw_framebuffer {
            return;
        }
        match fetch_frame(&self.url) {
            Ok(frame) => sink.raw_frame(&frame),
            Err(e) => tracing::warn!("netcam: dropped frame: {}", e),
        }
    }
}

fn fetch_frame(url: &str) -> CameraResult<CameraFrame> {
    let response = reqwest::blocking::get(url).map_err(|e| CameraError::Fetch(e.to_string()))?;
    let bytes = response
        .bytes()
        .map_err(|e| CameraError::Fetch(e.to_string()))?;

    let jpeg = if is_jpeg(&bytes) {
        bytes.to_vec()
    } else {
        last_mjpeg_frame(&bytes)
            .ok_or_else(|| CameraError::Decode("stream did not contain a JPEG frame".to_string()))?
    };

    let image =
        image::load_from_memory(&jpeg).map_err(|e| CameraError::Decode(e.to_string()))?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    Ok(CameraFrame {
        pitch: width as usize * 3,
        data: rgb.into_raw(),
        width,
        height,
    })
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xD8
}

/// Last complete SOI..EOI frame in an MJPEG chunk, if any.
fn last_mjpeg_frame(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut last = None;
    let mut start = None;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (0xFF, 0xD8) => {
                start = Some(i);
                i += 2;
            }
            (0xFF, 0xD9) => {
                if let Some(s) = start.take() {
                    last = Some(bytes[s..i + 2].to_vec());
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    last
}

// ============================================================================
// Pattern Backend
// ============================================================================

/// Synthetic moving-color frames. No hardware needed; used headless and by
/// consumers that want a capture source before real plumbing exists.
pub struct PatternDriver;

impl CameraDriver for PatternDriver {
    fn ident(&self) -> &'static str {
        "pattern"
    }

    fn init(&self, config: &CameraInitConfig) -> CameraResult<Box<dyn CameraSession>> {
        Ok(Box::new(PatternSession {
            width: config.width.max(1),
            height: config.height.max(1),
            counter: 0,
            running: false,
        }))
    }
}

struct PatternSession {
    width: u32,
    height: u32,
    counter: u64,
    running: bool,
}

impl CameraSession for PatternSession {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn poll(&mut self, caps: CameraCaps, sink: &mut dyn CameraSink) {
        if !self.running || !caps.raw_framebuffer {
            return;
        }
        self.counter += 1;
        let color = (self.counter % 255) as u8;
        let mut data = vec![0u8; self.width as usize * self.height as usize * 3];
        for pixel in data.chunks_exact_mut(3) {
            pixel[0] = color;
            pixel[1] = 255 - color;
            pixel[2] = color / 2;
        }
        sink.raw_frame(&CameraFrame {
            pitch: self.width as usize * 3,
            data,
            width: self.width,
            height: self.height,
        });
    }
}

// ============================================================================
// Null Backend
// ============================================================================

/// Fallback backend: every operation is unsupported.
pub struct NullCameraDriver;

impl CameraDriver for NullCameraDriver {
    fn ident(&self) -> &'static str {
        "null"
    }

    fn init(&self, _config: &CameraInitConfig) -> CameraResult<Box<dyn CameraSession>> {
        Ok(Box::new(NullCameraSession))
    }
}

struct NullCameraSession;

impl CameraSession for NullCameraSession {}
