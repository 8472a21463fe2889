//! The wsi module provides utilities for presenting the output of a render graph.
//!
//! An [`OutputSurface`](surface::OutputSurface) hands out images to render to, usually backed by a
//! [`VulkanSwapchain`](swapchain::VulkanSwapchain). A [`Renderer`](renderer::Renderer) drives a compiled
//! graph frame after frame: it acquires an image, submits the stream of the matching frame in flight and
//! presents the result.
//!
//! Two renderers are provided. The [`BlockingRenderer`](renderer::BlockingRenderer) waits for the device
//! after every frame. The [`SynchronizedRenderer`](renderer::SynchronizedRenderer) keeps several frames
//! in flight and only blocks when the CPU would overwrite a frame the GPU is still using.

pub mod renderer;
pub mod surface;
pub mod swapchain;
