//! Exposes the deimos error type

use std::sync::PoisonError;

use ash;
use thiserror::Error;

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// The output surface no longer matches the window and must be recreated.
    /// This is the only error a renderer expects the caller to recover from.
    #[error("Output surface is out of date and must be recreated.")]
    SwapchainOutOfDate,
    /// No queue was found that supports presentation.
    #[error("No queue found that supports presentation. Only headless mode is supported.")]
    NoPresentQueue,
    /// Graph contains a dependency cycle between operations and cannot be ordered.
    #[error("Render graph contains cycle.")]
    GraphHasCycle,
    /// Hazard separation kept moving operations without reaching a stable partition.
    #[error("Pass partitioning did not converge after {0} moves.")]
    PartitionDiverged(usize),
    /// Node handle does not belong to this connection set.
    #[error("Node not found in connection set.")]
    NodeNotFound,
    /// Connections must go from an operation to a resource or from a resource to an operation.
    #[error("Illegal connection from `{0}` to `{1}`. Edges must join an operation and a resource.")]
    IllegalConnection(String, String),
    /// Operations grouped in one pass write images of different sizes.
    #[error("Inconsistent output image extents in pass {pass}: {first:?} and {second:?}")]
    InconsistentExtent {
        pass: usize,
        first: ash::vk::Extent2D,
        second: ash::vk::Extent2D,
    },
    /// A resource declares an initial layout that the final restore barrier cannot reproduce.
    #[error("Resource `{0}` has an initial layout that differs from its final layout.")]
    NonIdempotentLayout(String),
    /// No resource was bound to a reflected shader binding
    #[error("No resource bound to shader binding `{0}`")]
    NoResourceBound(String),
    /// Tried to submit or present before the graph was compiled.
    #[error("Render graph was not compiled.")]
    GraphNotCompiled,
    /// Frame index does not name a compiled command stream.
    #[error("Frame index {index} out of range, graph was compiled for {count} frames in flight.")]
    FrameIndexOutOfRange { index: usize, count: usize },
    /// A renderer was handed a graph compiled for a different number of frames in flight.
    #[error("Render graph was compiled for {graph} frames in flight, renderer uses {renderer}.")]
    FrameCountMismatch { graph: usize, renderer: usize },
    /// Pipelined rendering needs at least one frame slot per output image.
    #[error("Output surface has {images} images but only {frames} frames in flight.")]
    TooFewFramesInFlight { images: u32, frames: u32 },
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        match value {
            ash::vk::Result::ERROR_OUT_OF_DATE_KHR => Error::SwapchainOutOfDate,
            value => Error::VkError(value),
        }
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
