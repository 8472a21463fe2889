//! The output surface collaborator: something with a small pool of images that can be acquired and
//! presented, usually a swapchain.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::core::image::PhysicalImage;
use crate::Error;

#[derive(Debug, Default)]
struct SurfaceImagesInner {
    images: Vec<PhysicalImage>,
    format: vk::Format,
    extent: vk::Extent2D,
}

/// Shared, updatable list of the images of an output surface. A surface publishes its images here every
/// time it is (re)created, resources referencing the surface read them back when the graph compiles.
#[derive(Debug, Clone, Default)]
pub struct SurfaceImages {
    inner: Arc<Mutex<SurfaceImagesInner>>,
}

impl SurfaceImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, images: Vec<PhysicalImage>, format: vk::Format, extent: vk::Extent2D) -> Result<()> {
        let mut inner = self.inner.lock().map_err(Error::from)?;
        inner.images = images;
        inner.format = format;
        inner.extent = extent;
        Ok(())
    }

    pub fn images(&self) -> Result<Vec<PhysicalImage>> {
        Ok(self.inner.lock().map_err(Error::from)?.images.clone())
    }

    pub fn format(&self) -> Result<vk::Format> {
        Ok(self.inner.lock().map_err(Error::from)?.format)
    }

    pub fn extent(&self) -> Result<vk::Extent2D> {
        Ok(self.inner.lock().map_err(Error::from)?.extent)
    }
}

/// Surface images are acquired and presented through this trait.
pub trait OutputSurface {
    fn image_count(&self) -> u32;

    /// Start acquiring the next image. `semaphore` and `fence` are signaled when the image is ready, either
    /// may be null.
    /// # Errors
    /// - [`Error::SwapchainOutOfDate`] if the surface must be recreated first.
    fn acquire_next_image(&mut self, semaphore: vk::Semaphore, fence: vk::Fence) -> Result<u32>;

    /// Queue an image for presentation after `wait` is signaled.
    /// # Errors
    /// - [`Error::SwapchainOutOfDate`] if the surface must be recreated.
    fn present(&self, queue: vk::Queue, image_index: u32, wait: &[vk::Semaphore]) -> Result<()>;

    /// Headless surfaces cannot present, renderers skip presentation for them.
    fn supports_presenting(&self) -> bool {
        true
    }

    /// Rebuild the surface, for example after the window was resized.
    fn recreate(&mut self) -> Result<()>;

    fn surface_images(&self) -> SurfaceImages;
}

static_assertions::assert_obj_safe!(OutputSurface);
