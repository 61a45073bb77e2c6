#![no_std]
extern crate alloc;

pub use board::*;
pub use error::*;
pub use layout::*;
pub use module::*;
pub use readonly::*;

mod board;
mod error;
mod layout;
pub mod logger;
mod module;
mod readonly;

#[cfg(target_os = "none")]
pub mod heap;
