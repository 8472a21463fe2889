//! This module mainly exposes the [`OperationBuilder`] struct, used to define operations from closures
//! instead of implementing [`Operation`] by hand.
//!
//! An operation built this way declares the layouts its inputs and outputs must be in, an optional shader
//! reflection with a table binding reflected names to resources, and two closures: one called when the graph
//! compiles and one called to record commands for every frame in flight.
//!
//! # Example
//! ```ignore
//! use deimos::prelude::*;
//!
//! let blit = OperationBuilder::new()
//!     .input_layouts(vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
//!     .output_layouts(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
//!     .execute(|ctx, compiled, stream| {
//!         // Record the blit for ctx.frame_index into the stream.
//!         Ok(())
//!     })
//!     .build();
//! let id = connections.add_operation("blit", blit);
//! ```

use anyhow::Result;
use ash::vk;

use crate::core::stream::CommandStream;
use crate::graph::node::{Operation, OperationCompileContext, RecordContext, Resource, ResourceId, ResourceKind};
use crate::reflection::{BindingTable, ResolvedBinding, ShaderReflection};

/// Layout an image must be in when an operation starts, and the layout the operation leaves it in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LayoutPair {
    pub start: vk::ImageLayout,
    pub end: vk::ImageLayout,
}

impl LayoutPair {
    pub fn new(start: vk::ImageLayout, end: vk::ImageLayout) -> Self {
        Self {
            start,
            end,
        }
    }

    /// Start and end in the same layout.
    pub fn same(layout: vk::ImageLayout) -> Self {
        Self::new(layout, layout)
    }
}

/// State of a [`FnOperation`] after the graph compiled it.
#[derive(Debug, Clone, Default)]
pub struct CompiledOperation {
    pub extent: vk::Extent2D,
    pub frames_in_flight: usize,
    /// Every reflected binding with the resource providing it, in reflection order.
    pub bindings: Vec<ResolvedBinding>,
}

/// Called once per compilation, after the bindings were resolved.
pub type CompileFn = Box<dyn FnMut(&OperationCompileContext, &CompiledOperation) -> Result<()>>;

/// Records the commands of one frame in flight.
pub type RecordFn = Box<dyn Fn(&RecordContext, &CompiledOperation, &mut dyn CommandStream) -> Result<()>>;

/// An [`Operation`] defined by closures. Obtain one through an [`OperationBuilder`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FnOperation {
    input_layouts: LayoutPair,
    output_layouts: LayoutPair,
    /// Output layouts used instead of `output_layouts` for swapchain images.
    swapchain_layouts: Option<LayoutPair>,
    reflection: Option<ShaderReflection>,
    bindings: BindingTable,
    compiled: CompiledOperation,
    #[derivative(Debug = "ignore")]
    on_compile: Option<CompileFn>,
    #[derivative(Debug = "ignore")]
    execute: Option<RecordFn>,
}

impl FnOperation {
    pub fn compiled(&self) -> &CompiledOperation {
        &self.compiled
    }

    pub fn reflection(&self) -> Option<&ShaderReflection> {
        self.reflection.as_ref()
    }

    fn output_pair(&self, resource: &dyn Resource) -> LayoutPair {
        match (resource.kind(), self.swapchain_layouts) {
            (ResourceKind::SwapchainImage, Some(pair)) => pair,
            _ => self.output_layouts,
        }
    }
}

impl Operation for FnOperation {
    fn compile(&mut self, ctx: &OperationCompileContext) -> Result<()> {
        let bindings = match &self.reflection {
            Some(reflection) => self.bindings.resolve(reflection, &ctx.graph)?,
            None => Vec::new(),
        };
        self.compiled = CompiledOperation {
            extent: ctx.extent,
            frames_in_flight: ctx.frames_in_flight,
            bindings,
        };
        if let Some(on_compile) = &mut self.on_compile {
            on_compile(ctx, &self.compiled)?;
        }
        Ok(())
    }

    fn record(&self, ctx: &RecordContext, stream: &mut dyn CommandStream) -> Result<()> {
        match &self.execute {
            Some(execute) => execute(ctx, &self.compiled, stream),
            None => Ok(()),
        }
    }

    fn input_layout_at_start(&self, _resource: &dyn Resource) -> vk::ImageLayout {
        self.input_layouts.start
    }

    fn input_layout_at_end(&self, _resource: &dyn Resource) -> vk::ImageLayout {
        self.input_layouts.end
    }

    fn output_layout_at_start(&self, resource: &dyn Resource) -> vk::ImageLayout {
        self.output_pair(resource).start
    }

    fn output_layout_at_end(&self, resource: &dyn Resource) -> vk::ImageLayout {
        self.output_pair(resource).end
    }
}

/// Used to create [`FnOperation`] nodes.
pub struct OperationBuilder {
    inner: FnOperation,
}

impl Default for OperationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationBuilder {
    /// Inputs default to `SHADER_READ_ONLY_OPTIMAL`, outputs to `COLOR_ATTACHMENT_OPTIMAL`.
    pub fn new() -> Self {
        Self {
            inner: FnOperation {
                input_layouts: LayoutPair::same(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                output_layouts: LayoutPair::same(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                swapchain_layouts: None,
                reflection: None,
                bindings: BindingTable::new(),
                compiled: CompiledOperation::default(),
                on_compile: None,
                execute: None,
            },
        }
    }

    pub fn input_layouts(mut self, start: vk::ImageLayout, end: vk::ImageLayout) -> Self {
        self.inner.input_layouts = LayoutPair::new(start, end);
        self
    }

    pub fn output_layouts(mut self, start: vk::ImageLayout, end: vk::ImageLayout) -> Self {
        self.inner.output_layouts = LayoutPair::new(start, end);
        self
    }

    /// Override the output layouts for swapchain images, for example to leave them in `PRESENT_SRC_KHR`.
    pub fn swapchain_layouts(mut self, start: vk::ImageLayout, end: vk::ImageLayout) -> Self {
        self.inner.swapchain_layouts = Some(LayoutPair::new(start, end));
        self
    }

    /// Every reflected binding must be bound with [`OperationBuilder::bind`] before the graph compiles.
    pub fn reflection(mut self, reflection: ShaderReflection) -> Self {
        self.inner.reflection = Some(reflection);
        self
    }

    pub fn bind(mut self, name: impl Into<String>, resource: ResourceId) -> Self {
        self.inner.bindings.bind(name, resource);
        self
    }

    pub fn on_compile<F>(mut self, f: F) -> Self
    where
        F: FnMut(&OperationCompileContext, &CompiledOperation) -> Result<()> + 'static,
    {
        self.inner.on_compile = Some(Box::new(f));
        self
    }

    /// Set the function called to record this operation. Without one the operation records nothing.
    pub fn execute<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordContext, &CompiledOperation, &mut dyn CommandStream) -> Result<()> + 'static,
    {
        self.inner.execute = Some(Box::new(f));
        self
    }

    pub fn build(self) -> FnOperation {
        self.inner
    }
}
