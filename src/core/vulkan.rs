//! [`Device`] and [`CommandStream`] implementations on top of an existing `ash` device.
//!
//! Instance, physical device and logical device creation stay with the caller. Deimos only needs the
//! logical device, one queue that supports graphics, and optionally the debug utils loader for labels
//! and object names.

use std::ffi::CString;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::extensions::ext::DebugUtils;
use ash::vk;

use crate::core::device::Device;
use crate::core::stream::{CommandStream, PipelineBarrier};
use crate::Error;

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    #[derivative(Debug = "ignore")]
    debug_utils: Option<DebugUtils>,
    queue: Mutex<vk::Queue>,
    pool: vk::CommandPool,
}

/// Graphics queue and command pool of an `ash` device.
#[derive(Debug, Clone)]
pub struct VulkanDevice {
    inner: Arc<DeviceInner>,
}

impl VulkanDevice {
    /// Wrap an existing device. The device must have the `synchronization2` feature enabled and must
    /// outlive every object created through this wrapper.
    pub fn new(device: ash::Device, queue_family: u32, queue_index: u32, debug_utils: Option<DebugUtils>) -> Result<Arc<Self>> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: queue_family,
        };
        let pool = unsafe { device.create_command_pool(&info, None)? };
        let queue = unsafe { device.get_device_queue(queue_family, queue_index) };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkCommandPool {pool:p} for queue family {queue_family}");

        Ok(Arc::new(VulkanDevice {
            inner: Arc::new(DeviceInner {
                handle: device,
                debug_utils,
                queue: Mutex::new(queue),
                pool,
            }),
        }))
    }

    /// Get unsafe access to the underlying `ash` device.
    /// # Safety
    /// Objects created through this handle are not tracked by deimos.
    pub unsafe fn handle(&self) -> &ash::Device {
        &self.inner.handle
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkCommandPool {:p}", self.pool);
        unsafe {
            self.handle.destroy_command_pool(self.pool, None);
        }
    }
}

impl Device for VulkanDevice {
    fn allocate_command_stream(&self) -> Result<Box<dyn CommandStream>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            p_next: std::ptr::null(),
            command_pool: self.inner.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
        };
        let _queue = self.inner.queue.lock().map_err(Error::from)?;
        let handle = unsafe { self.inner.handle.allocate_command_buffers(&info)? }
            .into_iter()
            .next()
            .ok_or(Error::Uncategorized("Command buffer allocation failed."))?;
        Ok(Box::new(VulkanCommandStream {
            device: self.inner.clone(),
            handle,
        }))
    }

    fn submit(&self, stream: &dyn CommandStream, wait: &[vk::Semaphore], signal: &[vk::Semaphore], fence: Option<vk::Fence>) -> Result<()> {
        let wait_infos = wait
            .iter()
            .map(|semaphore| vk::SemaphoreSubmitInfo {
                s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
                p_next: std::ptr::null(),
                semaphore: *semaphore,
                value: 0,
                stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                device_index: 0,
            })
            .collect::<Vec<_>>();
        let signal_infos = signal
            .iter()
            .map(|semaphore| vk::SemaphoreSubmitInfo {
                s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
                p_next: std::ptr::null(),
                semaphore: *semaphore,
                value: 0,
                stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
                device_index: 0,
            })
            .collect::<Vec<_>>();
        let cmd_info = vk::CommandBufferSubmitInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_SUBMIT_INFO,
            p_next: std::ptr::null(),
            command_buffer: unsafe { stream.handle() },
            device_mask: 0,
        };
        let submit = vk::SubmitInfo2::builder()
            .wait_semaphore_infos(&wait_infos)
            .command_buffer_infos(std::slice::from_ref(&cmd_info))
            .signal_semaphore_infos(&signal_infos)
            .build();
        let queue = self.inner.queue.lock().map_err(Error::from)?;
        unsafe {
            self.inner
                .handle
                .queue_submit2(*queue, std::slice::from_ref(&submit), fence.unwrap_or_default())?;
        }
        Ok(())
    }

    fn graphics_queue(&self) -> vk::Queue {
        self.inner
            .queue
            .lock()
            .map(|queue| *queue)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    fn wait_queue_idle(&self) -> Result<()> {
        let queue = self.inner.queue.lock().map_err(Error::from)?;
        unsafe { self.inner.handle.queue_wait_idle(*queue)? };
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.inner.handle.device_wait_idle()? };
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
        };
        Ok(unsafe { self.inner.handle.create_fence(&info, None)? })
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> Result<()> {
        unsafe {
            self.inner
                .handle
                .wait_for_fences(std::slice::from_ref(&fence), true, timeout)?
        };
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.inner.handle.reset_fences(std::slice::from_ref(&fence))? };
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.inner.handle.destroy_fence(fence, None) }
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: Default::default(),
        };
        Ok(unsafe { self.inner.handle.create_semaphore(&info, None)? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.inner.handle.destroy_semaphore(semaphore, None) }
    }

    fn create_event(&self) -> Result<vk::Event> {
        let info = vk::EventCreateInfo {
            s_type: vk::StructureType::EVENT_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::EventCreateFlags::DEVICE_ONLY,
        };
        Ok(unsafe { self.inner.handle.create_event(&info, None)? })
    }

    fn destroy_event(&self, event: vk::Event) {
        unsafe { self.inner.handle.destroy_event(event, None) }
    }

    fn set_object_name(&self, object_type: vk::ObjectType, handle: u64, name: &str) -> Result<()> {
        let Some(debug_utils) = &self.inner.debug_utils else {
            return Ok(());
        };
        let name = CString::new(name).map_err(|_| Error::Uncategorized("Object name contains a nul byte."))?;
        let info = vk::DebugUtilsObjectNameInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_OBJECT_NAME_INFO_EXT,
            p_next: std::ptr::null(),
            object_type,
            object_handle: handle,
            p_object_name: name.as_ptr(),
        };
        unsafe { debug_utils.set_debug_utils_object_name(self.inner.handle.handle(), &info)? };
        Ok(())
    }
}

/// A primary command buffer allocated from the device's command pool.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanCommandStream {
    #[derivative(Debug = "ignore")]
    device: Arc<DeviceInner>,
    handle: vk::CommandBuffer,
}

impl VulkanCommandStream {
    fn record_barrier(&self, barrier: &PipelineBarrier, f: impl FnOnce(&vk::DependencyInfo)) {
        let memory = barrier.memory_barrier();
        let images = barrier.images.iter().map(|image| image.to_vk()).collect::<Vec<_>>();
        let dependency = vk::DependencyInfo {
            s_type: vk::StructureType::DEPENDENCY_INFO,
            p_next: std::ptr::null(),
            dependency_flags: vk::DependencyFlags::empty(),
            memory_barrier_count: 1,
            p_memory_barriers: &memory,
            buffer_memory_barrier_count: 0,
            p_buffer_memory_barriers: std::ptr::null(),
            image_memory_barrier_count: images.len() as u32,
            p_image_memory_barriers: images.as_ptr(),
        };
        f(&dependency)
    }
}

impl CommandStream for VulkanCommandStream {
    fn begin(&mut self) -> Result<()> {
        unsafe {
            self.device
                .handle
                .reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty())?;
            let info = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                p_next: std::ptr::null(),
                flags: vk::CommandBufferUsageFlags::empty(),
                p_inheritance_info: std::ptr::null(),
            };
            self.device.handle.begin_command_buffer(self.handle, &info)?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        unsafe { self.device.handle.end_command_buffer(self.handle)? };
        Ok(())
    }

    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier) {
        self.record_barrier(barrier, |dependency| unsafe {
            self.device.handle.cmd_pipeline_barrier2(self.handle, dependency);
        });
    }

    fn set_event(&mut self, event: vk::Event, dependency: &PipelineBarrier) {
        self.record_barrier(dependency, |dependency| unsafe {
            self.device.handle.cmd_set_event2(self.handle, event, dependency);
        });
    }

    fn reset_event(&mut self, event: vk::Event, stage: vk::PipelineStageFlags2) {
        unsafe { self.device.handle.cmd_reset_event2(self.handle, event, stage) };
    }

    fn wait_event(&mut self, event: vk::Event, dependency: &PipelineBarrier) {
        self.record_barrier(dependency, |dependency| unsafe {
            self.device
                .handle
                .cmd_wait_events2(self.handle, std::slice::from_ref(&event), std::slice::from_ref(dependency));
        });
    }

    #[cfg(feature = "debug-markers")]
    fn begin_label(&mut self, name: &str) {
        let (Some(debug_utils), Ok(name)) = (&self.device.debug_utils, CString::new(name)) else {
            return;
        };
        let label = vk::DebugUtilsLabelEXT::builder()
            .label_name(&name)
            .color([1.0, 1.0, 1.0, 1.0])
            .build();
        unsafe { debug_utils.cmd_begin_debug_utils_label(self.handle, &label) };
    }

    #[cfg(feature = "debug-markers")]
    fn end_label(&mut self) {
        if let Some(debug_utils) = &self.device.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.handle) };
        }
    }

    unsafe fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

impl Drop for VulkanCommandStream {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle
                .free_command_buffers(self.device.pool, std::slice::from_ref(&self.handle));
        }
    }
}
