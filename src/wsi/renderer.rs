//! Frame pacing: repeatedly acquire an output image, submit the compiled graph and present.
//!
//! Two renderers are provided.
//! - [`BlockingRenderer`] waits for the device to go idle after every submission and presentation. Frame
//!   index and image index are the same, so the graph must be compiled with one frame per surface image.
//! - [`SynchronizedRenderer`] keeps up to N frames in flight against M <= N surface images. Every frame
//!   slot has its own semaphores and completion fence, and an image-to-slot table makes sure an image is
//!   never rendered to again before the slot that last used it has finished.
//!
//! # Example
//! ```ignore
//! use deimos::prelude::*;
//!
//! let mut renderer = SynchronizedRenderer::new(device.clone(), Box::new(swapchain), 3)?;
//! let mut draw = renderer.infinite_draw_callback(&graph);
//! let mut stop = false;
//! while !stop {
//!     draw(&mut stop)?;
//! }
//! ```
//!
//! The only error a renderer expects the caller to handle is [`Error::SwapchainOutOfDate`], after which
//! [`Renderer::recreate`] rebuilds the surface and recompiles the graph.

use std::time::{Duration, Instant};

use anyhow::Result;
use ash::vk;

use crate::core::device::SharedDevice;
use crate::graph::render_graph::RenderGraph;
use crate::sync::fence::Fence;
use crate::sync::semaphore::Semaphore;
use crate::wsi::surface::OutputSurface;
use crate::Error;

/// Called right before a frame is submitted, with the frame slot and the time since the previous frame was
/// submitted (or since the renderer was created, for the first frame).
/// This is the place to update per-frame resource contents.
pub type PreSubmitCallback = Box<dyn FnMut(&RenderGraph, usize, Duration)>;

/// One iteration of an event loop. The argument is set to `true` once the loop should stop.
pub type DrawCallback<'a> = Box<dyn FnMut(&mut bool) -> Result<()> + 'a>;

/// Receives notifications about the steps of a frame. All methods default to doing nothing.
pub trait FrameDisplayObserver {
    fn on_image_fence_wait_started(&mut self, _frame: usize) {}
    fn on_image_fence_wait_ended(&mut self, _frame: usize) {}
    fn on_image_acquisition_started(&mut self) {}
    fn on_image_acquisition_returned(&mut self, _image: u32) {}
    fn on_image_acquisition_fence_signaled(&mut self, _image: u32) {}
    fn on_image_acquisition_ended(&mut self, _image: u32) {}
    fn on_render_started(&mut self, _frame: usize) {}
    fn on_present_started(&mut self, _image: u32) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoFrameDisplayObserver;

impl FrameDisplayObserver for NoFrameDisplayObserver {}

#[derive(Derivative)]
#[derivative(Debug)]
struct PreSubmitEvent {
    #[derivative(Debug = "ignore")]
    callbacks: Vec<PreSubmitCallback>,
    last_draw: Instant,
}

impl PreSubmitEvent {
    fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            last_draw: Instant::now(),
        }
    }

    fn notify(&mut self, graph: &RenderGraph, frame: usize) {
        let now = Instant::now();
        let delta = now.duration_since(self.last_draw);
        self.last_draw = now;
        for callback in &mut self.callbacks {
            callback(graph, frame, delta);
        }
    }
}

/// The graph must be compiled with exactly one stream per frame slot of the renderer.
fn check_graph(graph: &RenderGraph, frames_in_flight: usize) -> Result<()> {
    if !graph.is_compiled() {
        return Err(Error::GraphNotCompiled.into());
    }
    if graph.frames_in_flight() != frames_in_flight {
        return Err(Error::FrameCountMismatch {
            graph: graph.frames_in_flight(),
            renderer: frames_in_flight,
        }
        .into());
    }
    Ok(())
}

pub trait Renderer {
    /// Render one frame, returning the index of the surface image that was rendered to.
    fn render_next_frame(&mut self, graph: &RenderGraph, observer: &mut dyn FrameDisplayObserver) -> Result<u32>;

    /// Frame slot the next call to [`Renderer::render_next_frame`] will use.
    fn next_render_resource_index(&self) -> usize;

    fn on_pre_submit(&mut self, callback: PreSubmitCallback);

    /// Wait until no frame is executing.
    fn wait(&self) -> Result<()>;

    /// Rebuild the output surface and recompile the graph with the settings it was compiled with.
    fn recreate(&mut self, graph: &mut RenderGraph) -> Result<()>;

    /// Draw callback that renders a frame on every call and never asks the loop to stop.
    fn infinite_draw_callback<'a>(&'a mut self, graph: &'a RenderGraph) -> DrawCallback<'a>
    where
        Self: Sized,
    {
        Box::new(move |stop: &mut bool| {
            *stop = false;
            self.render_next_frame(graph, &mut NoFrameDisplayObserver)?;
            Ok(())
        })
    }

    /// Draw callback that stops the loop as soon as `should_stop` returns `true`, without rendering that iteration.
    fn conditional_draw_callback<'a>(&'a mut self, graph: &'a RenderGraph, mut should_stop: impl FnMut() -> bool + 'a) -> DrawCallback<'a>
    where
        Self: Sized,
    {
        Box::new(move |stop: &mut bool| {
            *stop = should_stop();
            if !*stop {
                self.render_next_frame(graph, &mut NoFrameDisplayObserver)?;
            }
            Ok(())
        })
    }

    /// Draw callback that renders `limit` frames in total and sets the stop flag on the last one. Once the
    /// limit is reached, further calls render nothing and keep the flag set.
    fn count_limited_draw_callback<'a>(&'a mut self, graph: &'a RenderGraph, limit: usize) -> DrawCallback<'a>
    where
        Self: Sized,
    {
        let mut drawn = 0;
        Box::new(move |stop: &mut bool| {
            if drawn < limit {
                self.render_next_frame(graph, &mut NoFrameDisplayObserver)?;
                drawn += 1;
            }
            *stop = drawn >= limit;
            Ok(())
        })
    }
}

/// Renders one frame at a time, blocking on device idle after submission and after presentation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BlockingRenderer {
    #[derivative(Debug = "ignore")]
    device: SharedDevice,
    #[derivative(Debug = "ignore")]
    surface: Box<dyn OutputSurface>,
    image_available: Semaphore,
    pre_submit: PreSubmitEvent,
    next_image: usize,
}

impl BlockingRenderer {
    pub fn new(device: SharedDevice, surface: Box<dyn OutputSurface>) -> Result<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            device,
            surface,
            pre_submit: PreSubmitEvent::new(),
            next_image: 0,
        })
    }

    pub fn surface(&self) -> &dyn OutputSurface {
        self.surface.as_ref()
    }

    fn wait_for_device(&self) -> Result<()> {
        self.device.wait_queue_idle()?;
        self.device.wait_idle()
    }
}

impl Renderer for BlockingRenderer {
    fn render_next_frame(&mut self, graph: &RenderGraph, observer: &mut dyn FrameDisplayObserver) -> Result<u32> {
        check_graph(graph, self.surface.image_count() as usize)?;
        observer.on_image_acquisition_started();
        let image = self
            .surface
            .acquire_next_image(self.image_available.handle(), vk::Fence::null())?;
        observer.on_image_acquisition_returned(image);
        observer.on_image_acquisition_ended(image);

        let frame = image as usize;
        self.pre_submit.notify(graph, frame);
        observer.on_render_started(frame);
        graph.submit(frame, &[self.image_available.handle()], &[], None)?;
        self.wait_for_device()?;

        if self.surface.supports_presenting() {
            observer.on_present_started(image);
            graph.present(image, self.surface.as_ref(), &[])?;
            self.wait_for_device()?;
        }

        self.next_image = (frame + 1) % (self.surface.image_count().max(1) as usize);
        Ok(image)
    }

    fn next_render_resource_index(&self) -> usize {
        self.next_image
    }

    fn on_pre_submit(&mut self, callback: PreSubmitCallback) {
        self.pre_submit.callbacks.push(callback);
    }

    fn wait(&self) -> Result<()> {
        self.wait_for_device()
    }

    fn recreate(&mut self, graph: &mut RenderGraph) -> Result<()> {
        let mut settings = graph.take_settings()?;
        self.wait_for_device()?;
        self.surface.recreate()?;
        settings.frames_in_flight = self.surface.image_count() as usize;
        self.next_image = 0;
        graph.compile(settings)
    }
}

/// Keeps several frames in flight, see the [module documentation](self).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SynchronizedRenderer {
    #[derivative(Debug = "ignore")]
    device: SharedDevice,
    #[derivative(Debug = "ignore")]
    surface: Box<dyn OutputSurface>,
    frames_in_flight: usize,
    /// Signaled by the presentation engine, waited on by submission.
    image_available: Vec<Semaphore>,
    /// Signaled by submission, waited on by presentation.
    render_finished: Vec<Semaphore>,
    /// Signaled when a slot's submission completes.
    in_flight: Vec<Fence>,
    /// Signaled when an acquired image is actually available.
    acquisition_fence: Fence,
    /// Slot that last rendered to each surface image.
    image_to_frame: Vec<Option<usize>>,
    current_frame: usize,
    pre_submit: PreSubmitEvent,
    mismatch_reported: bool,
}

impl SynchronizedRenderer {
    /// Create a renderer with `frames_in_flight` slots. The graph must be compiled with the same count.
    /// # Errors
    /// - [`Error::TooFewFramesInFlight`] if the surface has more images than there are slots.
    pub fn new(device: SharedDevice, surface: Box<dyn OutputSurface>, frames_in_flight: usize) -> Result<Self> {
        let image_count = surface.image_count();
        if frames_in_flight == 0 || image_count as usize > frames_in_flight {
            return Err(Error::TooFewFramesInFlight {
                images: image_count,
                frames: frames_in_flight as u32,
            }
            .into());
        }

        let mut image_available = Vec::with_capacity(frames_in_flight);
        let mut render_finished = Vec::with_capacity(frames_in_flight);
        let mut in_flight = Vec::with_capacity(frames_in_flight);
        for slot in 0..frames_in_flight {
            image_available.push(Semaphore::new(device.clone())?);
            render_finished.push(Semaphore::new(device.clone())?);
            in_flight.push(Fence::named(device.clone(), true, &format!("in flight fence {slot}"))?);
        }
        let acquisition_fence = Fence::named(device.clone(), false, "acquisition fence")?;
        debug!("Created renderer with {frames_in_flight} frames in flight for {image_count} surface images");

        Ok(Self {
            device,
            surface,
            frames_in_flight,
            image_available,
            render_finished,
            in_flight,
            acquisition_fence,
            image_to_frame: vec![None; image_count as usize],
            current_frame: 0,
            pre_submit: PreSubmitEvent::new(),
            mismatch_reported: false,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Completion fence of a frame slot.
    pub fn frame_fence(&self, frame: usize) -> Option<&Fence> {
        self.in_flight.get(frame)
    }

    pub fn acquisition_fence(&self) -> &Fence {
        &self.acquisition_fence
    }

    pub fn surface(&self) -> &dyn OutputSurface {
        self.surface.as_ref()
    }

    /// Wait for the slot that last rendered to `image`, then make `frame` its owner.
    fn claim_image(&mut self, image: u32, frame: usize) -> Result<()> {
        let owner = self
            .image_to_frame
            .get_mut(image as usize)
            .ok_or(Error::Uncategorized("Acquired image index out of range."))?;
        if let Some(previous) = owner.replace(frame) {
            if previous != frame {
                self.in_flight[previous].wait()?;
            }
        }

        let image_count = self.image_to_frame.len();
        if !self.mismatch_reported && frame % image_count != image as usize {
            warn!("Frame slot {frame} acquired image {image}, streams referencing surface images may target another image");
            self.mismatch_reported = true;
        }
        Ok(())
    }
}

impl Renderer for SynchronizedRenderer {
    fn render_next_frame(&mut self, graph: &RenderGraph, observer: &mut dyn FrameDisplayObserver) -> Result<u32> {
        // Checked before any fence is touched, a failed submit would leave the slot fence unsignaled.
        check_graph(graph, self.frames_in_flight)?;
        let frame = self.current_frame;

        observer.on_image_fence_wait_started(frame);
        self.in_flight[frame].wait()?;
        observer.on_image_fence_wait_ended(frame);

        observer.on_image_acquisition_started();
        let image = self
            .surface
            .acquire_next_image(self.image_available[frame].handle(), self.acquisition_fence.handle())?;
        observer.on_image_acquisition_returned(image);
        self.acquisition_fence.wait()?;
        self.acquisition_fence.reset()?;
        observer.on_image_acquisition_fence_signaled(image);

        self.claim_image(image, frame)?;
        observer.on_image_acquisition_ended(image);

        self.in_flight[frame].reset()?;
        self.pre_submit.notify(graph, frame);
        observer.on_render_started(frame);

        let presenting = self.surface.supports_presenting();
        let render_finished = self.render_finished[frame].handle();
        let signal: &[vk::Semaphore] = if presenting {
            std::slice::from_ref(&render_finished)
        } else {
            &[]
        };
        graph.submit(frame, &[self.image_available[frame].handle()], signal, Some(&self.in_flight[frame]))?;

        if presenting {
            observer.on_present_started(image);
            graph.present(image, self.surface.as_ref(), &[render_finished])?;
        }

        self.current_frame = (frame + 1) % self.frames_in_flight;
        Ok(image)
    }

    fn next_render_resource_index(&self) -> usize {
        self.current_frame
    }

    fn on_pre_submit(&mut self, callback: PreSubmitCallback) {
        self.pre_submit.callbacks.push(callback);
    }

    fn wait(&self) -> Result<()> {
        for fence in &self.in_flight {
            fence.wait()?;
        }
        Ok(())
    }

    fn recreate(&mut self, graph: &mut RenderGraph) -> Result<()> {
        let mut settings = graph.take_settings()?;
        self.wait()?;
        self.surface.recreate()?;

        let image_count = self.surface.image_count();
        if image_count as usize > self.frames_in_flight {
            return Err(Error::TooFewFramesInFlight {
                images: image_count,
                frames: self.frames_in_flight as u32,
            }
            .into());
        }
        self.image_to_frame = vec![None; image_count as usize];
        self.current_frame = 0;
        self.mismatch_reported = false;
        settings.frames_in_flight = self.frames_in_flight;
        graph.compile(settings)
    }
}

impl Drop for SynchronizedRenderer {
    fn drop(&mut self) {
        // Semaphores may still be in use by the presentation engine.
        if let Err(err) = self.device.wait_idle() {
            error!("Failed to wait for device idle while destroying renderer: {err}");
        }
    }
}
