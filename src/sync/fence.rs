use anyhow::Result;
use ash::vk;

use crate::core::device::SharedDevice;

/// Wrapper around a [`VkFence`](vk::Fence) object. Fences are used for CPU-GPU sync.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Fence {
    #[derivative(Debug = "ignore")]
    device: SharedDevice,
    handle: vk::Fence,
}

impl Fence {
    /// Create a new fence, possibly in the signaled status.
    pub fn new(device: SharedDevice, signaled: bool) -> Result<Self> {
        let handle = device.create_fence(signaled)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkFence {handle:p} (signaled = {signaled})");
        Ok(Fence {
            device,
            handle,
        })
    }

    /// Create a new fence and give it a debug name.
    pub fn named(device: SharedDevice, signaled: bool, name: &str) -> Result<Self> {
        use ash::vk::Handle;
        let fence = Self::new(device, signaled)?;
        fence
            .device
            .set_object_name(vk::ObjectType::FENCE, fence.handle.as_raw(), name)?;
        Ok(fence)
    }

    /// Waits for the fence to be signaled with no timeout. Note that this is a blocking call.
    pub fn wait(&self) -> Result<()> {
        self.device.wait_for_fence(self.handle, u64::MAX)
    }

    /// Resets a fence to the unsignaled status.
    pub fn reset(&self) -> Result<()> {
        self.device.reset_fence(self.handle)
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkFence {:p}", self.handle);
        self.device.destroy_fence(self.handle);
    }
}
