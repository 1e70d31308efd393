//! # void_core - Void Engine Core
//!
//! Zero-dependency primitives shared by the managed scripting runtime:
//! - **Handles**: generational handles that detect use-after-release
//! - **Entity identifiers**: the stable key an entity keeps across reloads
//! - **Versions**: module API compatibility checks
//!
//! Everything here is plain data; the runtime crates layer ownership and
//! logging on top.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub mod handle;
pub mod version;
pub mod error;
pub mod id;

pub use handle::*;
pub use version::*;
pub use error::*;
pub use id::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::handle::{Handle, HandleAllocator, HandleMap};
    pub use crate::version::Version;
    pub use crate::error::{Error, HandleError, Result};
    pub use crate::id::EntityId;
}
