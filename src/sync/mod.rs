//! The sync module provides RAII wrappers around the Vulkan synchronization primitives used by the graph
//! and the renderers.
//!
//! - The [`fence`] module wraps `VkFence` objects, used for CPU-GPU sync.
//! - The [`semaphore`] module wraps `VkSemaphore` objects, used for GPU-GPU sync.
//! - The [`event`] module wraps `VkEvent` objects, used for intra-queue sync of singly buffered resources.

pub mod event;
pub mod fence;
pub mod semaphore;
