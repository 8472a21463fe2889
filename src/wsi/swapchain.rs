use anyhow::Result;
use ash::extensions::khr;
use ash::vk;

use crate::core::image::PhysicalImage;
use crate::wsi::surface::{OutputSurface, SurfaceImages};
use crate::Error;

/// Options used every time a [`VulkanSwapchain`] is (re)created.
#[derive(Debug, Copy, Clone)]
pub struct SwapchainSettings {
    /// The window surface. Owned by the caller.
    pub surface: vk::SurfaceKHR,
    pub surface_format: Option<vk::SurfaceFormatKHR>,
    pub present_mode: Option<vk::PresentModeKHR>,
    /// Used when the surface does not report its own extent.
    pub fallback_extent: vk::Extent2D,
}

#[derive(Debug, Copy, Clone)]
struct SwapchainInfo {
    handle: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    image_count: u32,
}

/// A swapchain is an abstraction of a presentation system. It handles buffering, VSync, and acquiring images
/// to render and present frames to.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanSwapchain {
    info: SwapchainInfo,
    settings: SwapchainSettings,
    images: SurfaceImages,
    physical_device: vk::PhysicalDevice,
    supports_presenting: bool,
    #[derivative(Debug = "ignore")]
    surface_functions: khr::Surface,
    /// Vulkan extension functions operating on the swapchain.
    #[derivative(Debug = "ignore")]
    functions: khr::Swapchain,
}

impl VulkanSwapchain {
    /// Create a new swapchain for a surface. `queue_family` is the family of the queue used to present.
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        settings: SwapchainSettings,
    ) -> Result<Self> {
        let surface_functions = khr::Surface::new(entry, instance);
        let functions = khr::Swapchain::new(instance, device);
        let supports_presenting = unsafe {
            surface_functions.get_physical_device_surface_support(physical_device, queue_family, settings.surface)?
        };
        if !supports_presenting {
            warn!("Queue family {queue_family} cannot present to this surface, presentation is disabled");
        }

        let mut swapchain = VulkanSwapchain {
            info: SwapchainInfo {
                handle: vk::SwapchainKHR::null(),
                format: vk::SurfaceFormatKHR::default(),
                present_mode: vk::PresentModeKHR::FIFO,
                extent: settings.fallback_extent,
                image_count: 0,
            },
            settings,
            images: SurfaceImages::new(),
            physical_device,
            supports_presenting,
            surface_functions,
            functions,
        };
        swapchain.info = swapchain.create(vk::SwapchainKHR::null())?;
        swapchain.publish_images()?;
        Ok(swapchain)
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.info.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.info.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.info.extent
    }

    /// Unsafe access to the underlying vulkan handle.
    pub unsafe fn handle(&self) -> vk::SwapchainKHR {
        self.info.handle
    }

    fn create(&self, old_swapchain: vk::SwapchainKHR) -> Result<SwapchainInfo> {
        let surface = self.settings.surface;
        let (capabilities, formats, present_modes) = unsafe {
            (
                self.surface_functions
                    .get_physical_device_surface_capabilities(self.physical_device, surface)?,
                self.surface_functions
                    .get_physical_device_surface_formats(self.physical_device, surface)?,
                self.surface_functions
                    .get_physical_device_surface_present_modes(self.physical_device, surface)?,
            )
        };

        let format = choose_surface_format(&self.settings, &formats)?;
        let present_mode = choose_present_mode(&self.settings, &present_modes);
        let extent = choose_swapchain_extent(&self.settings, &capabilities);
        let min_image_count = {
            let mut count = capabilities.min_image_count + 1;
            // If a maximum is set, clamp to it
            if capabilities.max_image_count != 0 {
                count = count.min(capabilities.max_image_count);
            }
            count
        };

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .present_mode(present_mode)
            .min_image_count(min_image_count)
            .clipped(true)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .old_swapchain(old_swapchain)
            .build();
        let handle = unsafe { self.functions.create_swapchain(&info, None)? };
        let image_count = unsafe { self.functions.get_swapchain_images(handle)? }.len() as u32;
        info!(
            "Created swapchain with {image_count} images of {}x{} ({:?}, {:?})",
            extent.width, extent.height, format.format, present_mode
        );

        Ok(SwapchainInfo {
            handle,
            format,
            present_mode,
            extent,
            image_count,
        })
    }

    fn publish_images(&self) -> Result<()> {
        let images = unsafe { self.functions.get_swapchain_images(self.info.handle)? }
            .into_iter()
            .map(|image| PhysicalImage::color(image, self.info.format.format, self.info.extent))
            .collect();
        self.images
            .update(images, self.info.format.format, self.info.extent)
    }
}

impl OutputSurface for VulkanSwapchain {
    fn image_count(&self) -> u32 {
        self.info.image_count
    }

    fn acquire_next_image(&mut self, semaphore: vk::Semaphore, fence: vk::Fence) -> Result<u32> {
        let result = unsafe {
            self.functions
                .acquire_next_image(self.info.handle, u64::MAX, semaphore, fence)
        };
        match result {
            // We ignore the flag for suboptimal swapchain images for now
            Ok((index, _)) => Ok(index),
            Err(err) => Err(Error::from(err).into()),
        }
    }

    fn present(&self, queue: vk::Queue, image_index: u32, wait: &[vk::Semaphore]) -> Result<()> {
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait)
            .swapchains(std::slice::from_ref(&self.info.handle))
            .image_indices(std::slice::from_ref(&image_index))
            .build();
        match unsafe { self.functions.queue_present(queue, &info) } {
            Ok(_) => Ok(()),
            Err(err) => Err(Error::from(err).into()),
        }
    }

    fn supports_presenting(&self) -> bool {
        self.supports_presenting
    }

    fn recreate(&mut self) -> Result<()> {
        let old = self.info.handle;
        let info = self.create(old)?;
        unsafe { self.functions.destroy_swapchain(old, None) };
        self.info = info;
        self.publish_images()
    }

    fn surface_images(&self) -> SurfaceImages {
        self.images.clone()
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            self.functions.destroy_swapchain(self.info.handle, None);
        }
    }
}

fn choose_surface_format(settings: &SwapchainSettings, formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    // In case requested format isn't found, try this. If that one isn't found we fall back to the first available format.
    const FALLBACK_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    if let Some(preferred_format) = settings.surface_format {
        if formats.contains(&preferred_format) {
            return Ok(preferred_format);
        }
    }
    if formats.contains(&FALLBACK_FORMAT) {
        return Ok(FALLBACK_FORMAT);
    }

    formats
        .first()
        .copied()
        .ok_or(Error::Uncategorized("No supported surface formats found."))
        .map_err(anyhow::Error::from)
}

fn choose_present_mode(settings: &SwapchainSettings, modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if let Some(mode) = settings.present_mode {
        if modes.contains(&mode) {
            return mode;
        }
    }
    // VSync, guaranteed to be supported
    vk::PresentModeKHR::FIFO
}

fn choose_swapchain_extent(settings: &SwapchainSettings, capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: settings
            .fallback_extent
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: settings
            .fallback_extent
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}
