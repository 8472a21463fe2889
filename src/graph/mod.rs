//! The render graph turns a set of operations and resources into one pre-recorded command stream per
//! frame in flight.
//!
//! Nodes are added to a [`ConnectionSet`](connection::ConnectionSet) and connected with edges: an edge
//! from a resource to an operation is a read, an edge from an operation to a resource is a write. When the
//! graph compiles, the [`partition`] module groups the operations into passes so that every operation runs
//! after the operations producing its inputs, and no two operations in one pass write the same resource.
//! Then every pass is recorded with the barriers and image layout transitions it needs. Recording happens
//! once, at compile time. Every frame after that only submits a finished stream.
//!
//! Through the [`GraphViz`](render_graph::GraphViz) trait, it's possible to export a graphviz-compatible
//! dot file to display the graph.
//!
//! # Example
//!
//! ```ignore
//! use deimos::prelude::*;
//!
//! let mut connections = ConnectionSet::new();
//! let offscreen = connections.add_resource("offscreen", ImageResource::new(create_offscreen_image));
//! let swapchain = connections.add_resource("swapchain", SwapchainImageResource::new(surface.surface_images()));
//! let draw = connections.add_operation("draw", OperationBuilder::new().execute(draw_scene).build());
//! let blit = connections.add_operation(
//!     "blit",
//!     OperationBuilder::new()
//!         .swapchain_layouts(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
//!         .execute(draw_fullscreen_quad)
//!         .build(),
//! );
//! connections.write(draw, offscreen)?;
//! connections.read(offscreen, blit)?;
//! connections.write(blit, swapchain)?;
//!
//! let mut graph = RenderGraph::new();
//! graph.compile(GraphSettings::new(device.clone(), 2, connections))?;
//! ```
//!
//! For driving the graph every frame, see the [`wsi`](crate::wsi) module.

pub mod connection;
pub mod layout;
pub mod node;
pub mod operation;
pub mod partition;
pub mod pass;
mod record;
pub mod render_graph;
pub mod resource;
pub mod settings;
