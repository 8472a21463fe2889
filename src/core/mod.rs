//! The core module holds the device-facing pieces every other module builds on.

pub mod device;
pub mod error;
pub mod image;
pub mod stream;
pub mod vulkan;
