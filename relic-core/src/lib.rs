//! # RELIC Core
//!
//! Driver registry and backend lifecycle for the RELIC emulator frontend.
//!
//! Every hardware-facing capability (camera, video, input) is a *category*
//! with its own ordered list of compiled-in drivers. A driver is selected by
//! name at startup, falls back to the highest-priority entry when the name is
//! unknown, and is operated through a uniform init -> start/poll -> free
//! lifecycle so the rest of the frontend never sees a concrete backend.

#![allow(dead_code)]

// ============================================================================
// Driver Registry
// ============================================================================
pub mod driver;

// ============================================================================
// Driver Categories
// ============================================================================
pub mod camera;
pub mod input;
pub mod video;

// ============================================================================
// Backends
// ============================================================================
pub mod render;

// ============================================================================
// Configuration
// ============================================================================
pub mod config;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
