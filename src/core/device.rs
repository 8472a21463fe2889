//! The device collaborator the graph and renderers run against.
//!
//! Everything deimos asks of the GPU goes through the [`Device`] trait: allocating command streams,
//! submitting them to the graphics queue, idle waits and the handful of synchronization objects used for
//! frame pacing. [`VulkanDevice`](crate::core::vulkan::VulkanDevice) implements it on top of an existing
//! `ash` device.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::stream::CommandStream;

/// Shared handle to a device. Graph settings, renderers and synchronization wrappers all hold one.
pub type SharedDevice = Arc<dyn Device>;

/// GPU device and its graphics queue.
pub trait Device {
    /// Allocate a new primary command stream for the graphics queue.
    fn allocate_command_stream(&self) -> Result<Box<dyn CommandStream>>;
    /// Submit a recorded stream. Submission waits on `wait` at the color attachment output stage, signals
    /// `signal` and `fence` once the stream completes.
    fn submit(
        &self,
        stream: &dyn CommandStream,
        wait: &[vk::Semaphore],
        signal: &[vk::Semaphore],
        fence: Option<vk::Fence>,
    ) -> Result<()>;
    /// The queue used for submission and presentation.
    fn graphics_queue(&self) -> vk::Queue;
    /// Block until the graphics queue has no more work.
    fn wait_queue_idle(&self) -> Result<()>;
    /// Block until the whole device is idle.
    fn wait_idle(&self) -> Result<()>;

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    /// Wait for a fence to become signaled. `timeout` is in nanoseconds.
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;
    fn destroy_fence(&self, fence: vk::Fence);

    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_event(&self) -> Result<vk::Event>;
    fn destroy_event(&self, event: vk::Event);

    /// Attach a debug name to an object. Does nothing if the device has no debug utils.
    fn set_object_name(&self, _object_type: vk::ObjectType, _handle: u64, _name: &str) -> Result<()> {
        Ok(())
    }
}
