//! Linear command streams and the barriers recorded into them.
//!
//! A [`CommandStream`] is the only thing the graph records into. The Vulkan implementation lives in
//! [`core::vulkan`](crate::core::vulkan), but anything that can accept barriers and event commands can be
//! used, which is how the graph is tested without a GPU.

use anyhow::Result;
use ash::vk;

use crate::core::image::PhysicalImage;

/// A layout transition of one image, recorded as part of a [`PipelineBarrier`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageTransition {
    pub image: PhysicalImage,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl ImageTransition {
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2 {
        vk::ImageMemoryBarrier2 {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
            p_next: std::ptr::null(),
            src_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
            src_access_mask: vk::AccessFlags2::MEMORY_WRITE,
            dst_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
            dst_access_mask: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            old_layout: self.old_layout,
            new_layout: self.new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: self.image.handle,
            subresource_range: self.image.subresource_range(),
        }
    }
}

/// A full execution and memory dependency: all prior commands must retire and make their writes visible
/// before any later command starts. Image transitions ride along with the same dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineBarrier {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub images: Vec<ImageTransition>,
}

impl PipelineBarrier {
    /// Barrier waiting on every prior memory write, transitioning the given images.
    pub fn full(images: Vec<ImageTransition>) -> Self {
        Self {
            src_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
            src_access: vk::AccessFlags2::MEMORY_WRITE,
            dst_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
            dst_access: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            images,
        }
    }

    pub fn memory_barrier(&self) -> vk::MemoryBarrier2 {
        vk::MemoryBarrier2 {
            s_type: vk::StructureType::MEMORY_BARRIER_2,
            p_next: std::ptr::null(),
            src_stage_mask: self.src_stage,
            src_access_mask: self.src_access,
            dst_stage_mask: self.dst_stage,
            dst_access_mask: self.dst_access,
        }
    }
}

/// Recording interface of a single linear command buffer.
pub trait CommandStream {
    /// Start recording. Any previously recorded commands are discarded.
    fn begin(&mut self) -> Result<()>;
    /// Finish recording. The stream may be submitted afterwards.
    fn end(&mut self) -> Result<()>;
    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier);
    /// Signal `event` once the source scope of `dependency` has executed.
    fn set_event(&mut self, event: vk::Event, dependency: &PipelineBarrier);
    fn reset_event(&mut self, event: vk::Event, stage: vk::PipelineStageFlags2);
    /// Wait on `event`. `dependency` must equal the one the event was set with.
    fn wait_event(&mut self, event: vk::Event, dependency: &PipelineBarrier);
    /// Open a debug label region. Streams without debug utils ignore it.
    fn begin_label(&mut self, _name: &str) {}
    fn end_label(&mut self) {}
    /// Get unsafe access to the underlying `VkCommandBuffer`.
    /// # Safety
    /// The caller must not free or re-record the command buffer.
    unsafe fn handle(&self) -> vk::CommandBuffer;
}
