//! Platform descriptors, the registry that serves them, and descriptor-driven helpers.

pub mod catalog;
pub mod classify;
pub mod descriptor;
pub mod identity;
pub mod registry;

pub use classify::*;
pub use descriptor::*;
pub use identity::*;
pub use registry::*;
