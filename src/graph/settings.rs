//! Settings consumed by [`RenderGraph::compile`](crate::graph::render_graph::RenderGraph::compile).
//!
//! # Example
//! ```ignore
//! use deimos::prelude::*;
//!
//! let settings = GraphSettingsBuilder::new(device.clone(), connections)
//!     .frames_in_flight(3)
//!     .print_graph(true)
//!     .build();
//! graph.compile(settings)?;
//! ```

use ash::vk;

use crate::core::device::SharedDevice;
use crate::graph::connection::ConnectionSet;

/// Extent given to operations in passes that write no images.
pub const DEFAULT_FALLBACK_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 500,
    height: 500,
};

/// Everything a graph is compiled from. Compilation takes ownership, the caller gets the settings back only
/// through [`RenderGraph::take_settings`](crate::graph::render_graph::RenderGraph::take_settings).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GraphSettings {
    #[derivative(Debug = "ignore")]
    pub device: SharedDevice,
    pub frames_in_flight: usize,
    pub connections: ConnectionSet,
    /// Log the pass listing at `info` level instead of `debug`.
    pub print_graph: bool,
    pub fallback_extent: vk::Extent2D,
}

impl GraphSettings {
    pub fn new(device: SharedDevice, frames_in_flight: usize, connections: ConnectionSet) -> Self {
        Self {
            device,
            frames_in_flight,
            connections,
            print_graph: false,
            fallback_extent: DEFAULT_FALLBACK_EXTENT,
        }
    }
}

/// Builder for [`GraphSettings`]. Defaults to a single frame in flight.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GraphSettingsBuilder {
    inner: GraphSettings,
}

impl GraphSettingsBuilder {
    pub fn new(device: SharedDevice, connections: ConnectionSet) -> Self {
        Self {
            inner: GraphSettings::new(device, 1, connections),
        }
    }

    pub fn frames_in_flight(mut self, count: usize) -> Self {
        self.inner.frames_in_flight = count;
        self
    }

    pub fn print_graph(mut self, print: bool) -> Self {
        self.inner.print_graph = print;
        self
    }

    pub fn fallback_extent(mut self, extent: vk::Extent2D) -> Self {
        self.inner.fallback_extent = extent;
        self
    }

    pub fn build(self) -> GraphSettings {
        self.inner
    }
}
