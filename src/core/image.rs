//! Non-owning views of physical images as the graph sees them.

use ash::vk;

/// A physical [`VkImage`](vk::Image) used by a graph resource. The graph never owns the image, it only
/// tracks its layout and records barriers against the subresource range described here.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalImage {
    pub handle: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub layer_count: u32,
}

impl PhysicalImage {
    /// Describe a single-mip, single-layer color image.
    pub fn color(handle: vk::Image, format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            handle,
            aspect: vk::ImageAspectFlags::COLOR,
            extent,
            format,
            mip_levels: 1,
            layer_count: 1,
        }
    }

    pub fn with_layers(mut self, layer_count: u32) -> Self {
        self.layer_count = layer_count;
        self
    }

    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    /// The full subresource range of this image.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.layer_count,
        }
    }
}
