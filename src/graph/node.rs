//! Node identities and the capability tables of the two node kinds.
//!
//! A graph has two kinds of nodes. An [`Operation`] records GPU commands, a [`Resource`] is a backing store
//! that may be replicated once per frame in flight. Both live in a [`ConnectionSet`](crate::graph::connection::ConnectionSet)
//! arena and are addressed by [`OperationId`] and [`ResourceId`] handles. The graph never asks a node what
//! concrete type it is. Everything the compiler needs is part of these two traits.

use std::fmt::{Display, Formatter};

use anyhow::Result;
use ash::vk;
use uuid::Uuid;

use crate::core::device::SharedDevice;
use crate::core::image::PhysicalImage;
use crate::core::stream::CommandStream;
use crate::graph::connection::GraphView;

/// Handle to an operation inside a connection set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub(crate) usize);

/// Handle to a resource inside a connection set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) usize);

/// Handle to any node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    Operation(OperationId),
    Resource(ResourceId),
}

impl From<OperationId> for NodeId {
    fn from(value: OperationId) -> Self {
        NodeId::Operation(value)
    }
}

impl From<ResourceId> for NodeId {
    fn from(value: ResourceId) -> Self {
        NodeId::Resource(value)
    }
}

impl OperationId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl ResourceId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeId::Operation(id) => write!(f, "operation #{}", id.0),
            NodeId::Resource(id) => write!(f, "resource #{}", id.0),
        }
    }
}

/// Immutable identity of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    uuid: Uuid,
    name: String,
    description: String,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Debug string shown in graph dumps.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// The kind of backing store a resource represents. Operations may use it to pick layouts, for example
/// to leave presentable images in a presentable layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    SwapchainImage,
    Buffer,
}

/// Graph-wide settings passed to [`Resource::compile`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CompileContext<'a> {
    #[derivative(Debug = "ignore")]
    pub device: &'a SharedDevice,
    pub frames_in_flight: usize,
}

/// Settings passed to [`Operation::compile`]. `extent` is the common extent of every image written by the
/// operation's pass, or the configured fallback if the pass writes no images.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct OperationCompileContext<'a> {
    #[derivative(Debug = "ignore")]
    pub device: &'a SharedDevice,
    pub frames_in_flight: usize,
    pub extent: vk::Extent2D,
    pub id: OperationId,
    #[derivative(Debug = "ignore")]
    pub graph: GraphView<'a>,
}

/// Passed to [`Operation::record`] once per frame in flight.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RecordContext<'a> {
    pub frame_index: usize,
    pub id: OperationId,
    #[derivative(Debug = "ignore")]
    pub graph: GraphView<'a>,
}

/// A backing store in the graph.
///
/// After compilation the graph owns the resource and only calls the methods below. The hooks are the
/// points where a resource may record its own synchronization, they are called in this order for every
/// frame in flight:
/// `on_graph_execution_started`, then for every operation touching it `on_pre_read` or `on_pre_write`
/// before the operation records and `on_post_write` after, and finally `on_graph_execution_ended`.
pub trait Resource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Image
    }

    /// (Re)create per-frame backing objects.
    fn compile(&mut self, ctx: &CompileContext) -> Result<()>;

    /// Images backing this resource for one frame in flight. Resources without images return nothing and
    /// never take part in layout tracking.
    fn images(&self, _frame: usize) -> Vec<PhysicalImage> {
        Vec::new()
    }

    fn buffer(&self, _frame: usize) -> Option<vk::Buffer> {
        None
    }

    /// Layout the images are in when a frame starts. `UNDEFINED` means the contents need not be preserved.
    fn initial_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::UNDEFINED
    }

    /// Steady-state layout every image is restored to at the end of a frame.
    fn final_layout(&self) -> vk::ImageLayout {
        self.initial_layout()
    }

    fn extent(&self) -> Option<vk::Extent2D> {
        self.images(0).first().map(|image| image.extent)
    }

    fn on_graph_execution_started(&self, _frame: usize, _stream: &mut dyn CommandStream) {}
    fn on_pre_read(&self, _frame: usize, _stream: &mut dyn CommandStream) {}
    fn on_pre_write(&self, _frame: usize, _stream: &mut dyn CommandStream) {}
    fn on_post_write(&self, _frame: usize, _stream: &mut dyn CommandStream) {}
    fn on_graph_execution_ended(&self, _frame: usize, _stream: &mut dyn CommandStream) {}
}

/// A node that records GPU commands.
pub trait Operation {
    fn compile(&mut self, ctx: &OperationCompileContext) -> Result<()>;

    fn record(&self, ctx: &RecordContext, stream: &mut dyn CommandStream) -> Result<()>;

    /// Layout an input image must be in when this operation starts recording.
    fn input_layout_at_start(&self, _resource: &dyn Resource) -> vk::ImageLayout {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }

    /// Layout this operation leaves an input image in.
    fn input_layout_at_end(&self, resource: &dyn Resource) -> vk::ImageLayout {
        self.input_layout_at_start(resource)
    }

    fn output_layout_at_start(&self, _resource: &dyn Resource) -> vk::ImageLayout {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    }

    fn output_layout_at_end(&self, resource: &dyn Resource) -> vk::ImageLayout {
        self.output_layout_at_start(resource)
    }
}

static_assertions::assert_obj_safe!(Resource, Operation);
