//! Frame graph middleware for Vulkan renderers.
//!
//! Deimos takes a graph of GPU operations and the resources they read and write, and turns it into
//! pre-recorded command streams with every barrier and image layout transition in place. It then drives
//! those streams frame after frame, keeping several frames in flight without the CPU ever overwriting work
//! the GPU is still executing.
//!
//! To get started, the easiest way is to simply
//! ```
//! // Import all important types and traits
//! use deimos::prelude::*;
//! // Or import them under a namespace.
//! use deimos::prelude as dm;
//! ```
//!
//! # Example
//!
//! Deimos does not create Vulkan instances or devices. Wrap an existing device and queue in a
//! [`VulkanDevice`](crate::core::vulkan::VulkanDevice), and a surface in a
//! [`VulkanSwapchain`](crate::wsi::swapchain::VulkanSwapchain).
//! ```ignore
//! use deimos::prelude::*;
//!
//! let device: SharedDevice = VulkanDevice::new(ash_device, queue_family, 0, Some(debug_utils))?;
//! let swapchain = VulkanSwapchain::new(&entry, &instance, &ash_device, physical_device, queue_family, SwapchainSettings {
//!     surface,
//!     surface_format: None,
//!     present_mode: Some(vk::PresentModeKHR::MAILBOX),
//!     fallback_extent: vk::Extent2D { width: 1280, height: 720 },
//! })?;
//! ```
//! Next, build a graph. See the [`graph`] module for the details.
//! ```ignore
//! let mut connections = ConnectionSet::new();
//! let target = connections.add_resource("swapchain", SwapchainImageResource::new(swapchain.surface_images()));
//! let clear = connections.add_operation("clear", OperationBuilder::new()
//!     .swapchain_layouts(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
//!     .execute(clear_image)
//!     .build());
//! connections.write(clear, target)?;
//! ```
//! Finally, compile the graph and render.
//! ```ignore
//! let mut renderer = SynchronizedRenderer::new(device.clone(), Box::new(swapchain), 2)?;
//! let mut graph = RenderGraph::new();
//! graph.compile(GraphSettings::new(device.clone(), 2, connections))?;
//! loop {
//!     match renderer.render_next_frame(&graph, &mut NoFrameDisplayObserver) {
//!         Err(err) if matches!(err.downcast_ref::<Error>(), Some(Error::SwapchainOutOfDate)) => {
//!             renderer.recreate(&mut graph)?;
//!         }
//!         result => { result?; }
//!     }
//! }
//! ```
//! For further example code, check out the following modules
//! - [`graph`] for building and compiling render graphs.
//! - [`wsi`] for driving a graph every frame and presenting.
//! - [`sync`] for the synchronization primitives used along the way.
//! - [`reflection`] for binding shader reflection data to graph resources.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod core;
pub mod graph;
pub mod reflection;
pub mod sync;
pub mod wsi;
