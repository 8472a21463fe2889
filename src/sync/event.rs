use anyhow::Result;
use ash::vk;

use crate::core::device::SharedDevice;

/// Wrapper around a device-only [`VkEvent`](vk::Event). Events order commands within one queue without
/// a full pipeline barrier.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Event {
    #[derivative(Debug = "ignore")]
    device: SharedDevice,
    handle: vk::Event,
}

impl Event {
    pub fn new(device: SharedDevice) -> Result<Self> {
        let handle = device.create_event()?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkEvent {handle:p}");
        Ok(Event {
            device,
            handle,
        })
    }

    pub fn handle(&self) -> vk::Event {
        self.handle
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkEvent {:p}", self.handle);
        self.device.destroy_event(self.handle);
    }
}
