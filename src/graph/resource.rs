//! Built-in [`Resource`] implementations.
//!
//! Most graphs only need these: per-frame images produced by a provider closure, a single image shared by
//! every frame in flight, the images of an output surface and per-frame buffers. [`OnceCompiled`] wraps any
//! resource whose backing objects should survive recompilation.

use anyhow::Result;
use ash::vk;

use crate::core::image::PhysicalImage;
use crate::core::stream::{CommandStream, PipelineBarrier};
use crate::graph::node::{CompileContext, Resource, ResourceKind};
use crate::sync::event::Event;
use crate::wsi::surface::SurfaceImages;
use crate::Error;

/// Creates the image of one frame in flight.
pub type ImageProvider = Box<dyn FnMut(&CompileContext, usize) -> Result<PhysicalImage>>;

/// Creates the buffer of one frame in flight.
pub type BufferProvider = Box<dyn FnMut(&CompileContext, usize) -> Result<vk::Buffer>>;

/// One image per frame in flight, created by a provider every time the graph compiles.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ImageResource {
    #[derivative(Debug = "ignore")]
    provider: ImageProvider,
    images: Vec<PhysicalImage>,
    initial_layout: vk::ImageLayout,
    final_layout: vk::ImageLayout,
}

impl ImageResource {
    /// Images start out `UNDEFINED` and end every frame as `SHADER_READ_ONLY_OPTIMAL`.
    pub fn new<F>(provider: F) -> Self
    where
        F: FnMut(&CompileContext, usize) -> Result<PhysicalImage> + 'static,
    {
        Self {
            provider: Box::new(provider),
            images: Vec::new(),
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Set the layouts. `initial` must be `UNDEFINED` or equal to `final_layout`, otherwise compiling the
    /// graph fails with [`Error::NonIdempotentLayout`].
    pub fn with_layouts(mut self, initial: vk::ImageLayout, final_layout: vk::ImageLayout) -> Self {
        self.initial_layout = initial;
        self.final_layout = final_layout;
        self
    }
}

impl Resource for ImageResource {
    fn compile(&mut self, ctx: &CompileContext) -> Result<()> {
        self.images = (0..ctx.frames_in_flight)
            .map(|frame| (self.provider)(ctx, frame))
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    fn images(&self, frame: usize) -> Vec<PhysicalImage> {
        self.images.get(frame).copied().into_iter().collect()
    }

    fn initial_layout(&self) -> vk::ImageLayout {
        self.initial_layout
    }

    fn final_layout(&self) -> vk::ImageLayout {
        self.final_layout
    }
}

/// Dependency recorded with every set and wait of a [`SingleImageResource`] event. Both sides must match.
fn event_dependency() -> PipelineBarrier {
    PipelineBarrier::full(Vec::new())
}

/// A single image shared by every frame in flight.
///
/// Since frames may overlap on the GPU, writes and reads of the image are ordered with an event: writing
/// resets it, finishing a write sets it again and every read waits for it.
#[derive(Debug)]
pub struct SingleImageResource {
    image: PhysicalImage,
    event: Option<Event>,
    initial_layout: vk::ImageLayout,
    final_layout: vk::ImageLayout,
}

impl SingleImageResource {
    pub fn new(image: PhysicalImage) -> Self {
        Self {
            image,
            event: None,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub fn with_layouts(mut self, initial: vk::ImageLayout, final_layout: vk::ImageLayout) -> Self {
        self.initial_layout = initial;
        self.final_layout = final_layout;
        self
    }

    /// The event guarding the image, once compiled.
    pub fn event(&self) -> Option<vk::Event> {
        self.event.as_ref().map(Event::handle)
    }
}

impl Resource for SingleImageResource {
    fn compile(&mut self, ctx: &CompileContext) -> Result<()> {
        if self.event.is_none() {
            self.event = Some(Event::new(ctx.device.clone())?);
        }
        Ok(())
    }

    fn images(&self, _frame: usize) -> Vec<PhysicalImage> {
        vec![self.image]
    }

    fn initial_layout(&self) -> vk::ImageLayout {
        self.initial_layout
    }

    fn final_layout(&self) -> vk::ImageLayout {
        self.final_layout
    }

    // Reads that happen before any write in this frame must not block.
    fn on_graph_execution_started(&self, _frame: usize, stream: &mut dyn CommandStream) {
        if let Some(event) = self.event() {
            stream.set_event(event, &event_dependency());
        }
    }

    fn on_pre_read(&self, _frame: usize, stream: &mut dyn CommandStream) {
        if let Some(event) = self.event() {
            stream.wait_event(event, &event_dependency());
        }
    }

    fn on_pre_write(&self, _frame: usize, stream: &mut dyn CommandStream) {
        if let Some(event) = self.event() {
            stream.reset_event(event, vk::PipelineStageFlags2::ALL_COMMANDS);
        }
    }

    fn on_post_write(&self, _frame: usize, stream: &mut dyn CommandStream) {
        if let Some(event) = self.event() {
            stream.set_event(event, &event_dependency());
        }
    }
}

/// The images of an output surface. Frame `i` renders to surface image `i % image_count`.
#[derive(Debug, Clone)]
pub struct SwapchainImageResource {
    surface: SurfaceImages,
    images: Vec<PhysicalImage>,
}

impl SwapchainImageResource {
    pub fn new(surface: SurfaceImages) -> Self {
        Self {
            surface,
            images: Vec::new(),
        }
    }
}

impl Resource for SwapchainImageResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SwapchainImage
    }

    fn compile(&mut self, _ctx: &CompileContext) -> Result<()> {
        let images = self.surface.images()?;
        if images.is_empty() {
            return Err(Error::Uncategorized("Output surface has no images.").into());
        }
        self.images = images;
        Ok(())
    }

    fn images(&self, frame: usize) -> Vec<PhysicalImage> {
        if self.images.is_empty() {
            return Vec::new();
        }
        vec![self.images[frame % self.images.len()]]
    }

    fn final_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::PRESENT_SRC_KHR
    }
}

/// One buffer per frame in flight. Buffers have no layouts and are not tracked.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BufferResource {
    #[derivative(Debug = "ignore")]
    provider: BufferProvider,
    buffers: Vec<vk::Buffer>,
}

impl BufferResource {
    pub fn new<F>(provider: F) -> Self
    where
        F: FnMut(&CompileContext, usize) -> Result<vk::Buffer> + 'static,
    {
        Self {
            provider: Box::new(provider),
            buffers: Vec::new(),
        }
    }
}

impl Resource for BufferResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Buffer
    }

    fn compile(&mut self, ctx: &CompileContext) -> Result<()> {
        self.buffers = (0..ctx.frames_in_flight)
            .map(|frame| (self.provider)(ctx, frame))
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    fn buffer(&self, frame: usize) -> Option<vk::Buffer> {
        self.buffers.get(frame).copied()
    }

    fn extent(&self) -> Option<vk::Extent2D> {
        None
    }
}

/// Compiles the wrapped resource only once per frames-in-flight count. Recompiling the graph with the
/// same count keeps the existing backing objects.
#[derive(Debug)]
pub struct OnceCompiled<R: Resource> {
    inner: R,
    compiled_for: Option<usize>,
}

impl<R: Resource> OnceCompiled<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            compiled_for: None,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: Resource> Resource for OnceCompiled<R> {
    fn kind(&self) -> ResourceKind {
        self.inner.kind()
    }

    fn compile(&mut self, ctx: &CompileContext) -> Result<()> {
        if self.compiled_for == Some(ctx.frames_in_flight) {
            return Ok(());
        }
        self.inner.compile(ctx)?;
        self.compiled_for = Some(ctx.frames_in_flight);
        Ok(())
    }

    fn images(&self, frame: usize) -> Vec<PhysicalImage> {
        self.inner.images(frame)
    }

    fn buffer(&self, frame: usize) -> Option<vk::Buffer> {
        self.inner.buffer(frame)
    }

    fn initial_layout(&self) -> vk::ImageLayout {
        self.inner.initial_layout()
    }

    fn final_layout(&self) -> vk::ImageLayout {
        self.inner.final_layout()
    }

    fn extent(&self) -> Option<vk::Extent2D> {
        self.inner.extent()
    }

    fn on_graph_execution_started(&self, frame: usize, stream: &mut dyn CommandStream) {
        self.inner.on_graph_execution_started(frame, stream)
    }

    fn on_pre_read(&self, frame: usize, stream: &mut dyn CommandStream) {
        self.inner.on_pre_read(frame, stream)
    }

    fn on_pre_write(&self, frame: usize, stream: &mut dyn CommandStream) {
        self.inner.on_pre_write(frame, stream)
    }

    fn on_post_write(&self, frame: usize, stream: &mut dyn CommandStream) {
        self.inner.on_post_write(frame, stream)
    }

    fn on_graph_execution_ended(&self, frame: usize, stream: &mut dyn CommandStream) {
        self.inner.on_graph_execution_ended(frame, stream)
    }
}
