//! Re-exports of the most commonly used types and traits.

pub use ash::vk;

pub use crate::core::device::{Device, SharedDevice};
pub use crate::core::error::Error;
pub use crate::core::image::PhysicalImage;
pub use crate::core::stream::{CommandStream, ImageTransition, PipelineBarrier};
pub use crate::core::vulkan::{VulkanCommandStream, VulkanDevice};

pub use crate::sync::event::Event;
pub use crate::sync::fence::Fence;
pub use crate::sync::semaphore::Semaphore;

pub use crate::graph::connection::{AttachmentBinding, Binding, Connection, ConnectionSet, GraphView};
pub use crate::graph::layout::{LayoutHistory, LayoutTracker};
pub use crate::graph::node::{
    CompileContext, NodeId, NodeInfo, Operation, OperationCompileContext, OperationId, RecordContext, Resource, ResourceId, ResourceKind,
};
pub use crate::graph::operation::{CompiledOperation, FnOperation, LayoutPair, OperationBuilder};
pub use crate::graph::partition::partition;
pub use crate::graph::pass::{OperationIo, Pass};
pub use crate::graph::render_graph::{GraphViz, RenderGraph};
pub use crate::graph::resource::{BufferResource, ImageResource, OnceCompiled, SingleImageResource, SwapchainImageResource};
pub use crate::graph::settings::{GraphSettings, GraphSettingsBuilder};

pub use crate::reflection::{BindingKind, BindingTable, ReflectedBinding, ResolvedBinding, ShaderReflection};

pub use crate::wsi::renderer::{BlockingRenderer, FrameDisplayObserver, NoFrameDisplayObserver, Renderer, SynchronizedRenderer};
pub use crate::wsi::surface::{OutputSurface, SurfaceImages};
pub use crate::wsi::swapchain::{SwapchainSettings, VulkanSwapchain};
