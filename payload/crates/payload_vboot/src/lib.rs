//! Verified boot stage sequencing.
//!
//! The three read-only stages run strictly in order on a single
//! [`Vboot`] context:
//!
//! 1. [`Vboot::init`] gathers the platform flags and initializes the
//!    engine.
//! 2. [`Vboot::select_firmware`] feeds both verification blocks to the
//!    engine and jumps to the selected RW firmware, if any.
//! 3. [`Vboot::select_and_load_kernel`] has the engine load a kernel and
//!    hands control to it.
//!
//! Any engine failure escalates to a reboot or power-off primitive of the
//! [`Platform`]. Those never return when they work, so every error that
//! reaches the caller is final.

#![no_std]
extern crate alloc;

pub use callbacks::*;
pub use commandline::*;
pub use config::*;
pub use ec::*;
pub use engine::*;
pub use error::*;
pub use flags::*;
pub use handoff::*;
pub use keyboard::*;
pub use module::*;
pub use platform::*;
pub use stages::*;

mod callbacks;
mod commandline;
mod config;
mod ec;
mod engine;
mod error;
mod flags;
mod handoff;
mod keyboard;
mod module;
mod platform;
mod stages;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
