//! The compiled render graph.
//!
//! Compiling partitions the connection set, compiles every node and records one command stream per frame
//! in flight. After that the graph is only submitted and presented. Nothing is recorded per frame, any
//! structural change requires a full recompile.
//!
//! # Example
//! ```ignore
//! use deimos::prelude::*;
//!
//! let mut graph = RenderGraph::new();
//! graph.compile(GraphSettings::new(device.clone(), 2, connections))?;
//! graph.submit(0, &[], &[], Some(&fence))?;
//! ```

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Write};

use anyhow::Result;
use ash::vk;
use petgraph::dot::Dot;
use petgraph::graph::{EdgeReference, NodeIndex};
use petgraph::Graph;

use crate::core::device::SharedDevice;
use crate::core::stream::CommandStream;
use crate::graph::connection::ConnectionSet;
use crate::graph::layout::{LayoutHistory, LayoutTracker};
use crate::graph::node::{CompileContext, NodeId, OperationCompileContext, OperationId, Resource, ResourceId};
use crate::graph::partition::partition;
use crate::graph::pass::Pass;
use crate::graph::record::record_frame;
use crate::graph::settings::GraphSettings;
use crate::sync::fence::Fence;
use crate::wsi::surface::OutputSurface;
use crate::Error;

/// Export a graph in GraphViz `dot` format.
pub trait GraphViz {
    /// Get the string representation of this graph in `dot` format.
    fn dot(&self) -> Result<String>;
}

#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct RenderGraph {
    settings: Option<GraphSettings>,
    schedule: Vec<Vec<OperationId>>,
    #[derivative(Debug = "ignore")]
    streams: Vec<Box<dyn CommandStream>>,
    #[derivative(Debug = "ignore")]
    layouts: Vec<LayoutTracker>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the graph, replacing any previous compilation.
    /// # Errors
    /// - Fails if the connection set cannot be partitioned, see [`partition`].
    /// - [`Error::NonIdempotentLayout`] if a resource's initial layout is neither `UNDEFINED` nor its final layout.
    /// - [`Error::InconsistentExtent`] if two images written in the same pass differ in size.
    /// - Any error returned by compiling a resource or operation, for example [`Error::NoResourceBound`].
    pub fn compile(&mut self, mut settings: GraphSettings) -> Result<()> {
        if settings.frames_in_flight == 0 {
            return Err(Error::Uncategorized("A render graph needs at least one frame in flight.").into());
        }

        // Streams of the previous compilation may still be executing.
        settings.device.wait_queue_idle()?;
        settings.device.wait_idle()?;
        self.settings = None;
        self.schedule.clear();
        self.streams.clear();
        self.layouts.clear();

        let passes = partition(&settings.connections)?;
        log_passes(&settings, &passes);

        compile_resources(&mut settings)?;
        validate_layouts(&settings.connections)?;
        compile_operations(&mut settings, &passes)?;

        for frame in 0..settings.frames_in_flight {
            let mut stream = settings.device.allocate_command_stream()?;
            let tracker = record_frame(frame, &passes, &settings.connections, stream.as_mut())?;
            self.streams.push(stream);
            self.layouts.push(tracker);
        }

        info!(
            "Compiled render graph: {} operations in {} passes, {} frames in flight",
            passes.iter().map(Pass::len).sum::<usize>(),
            passes.len(),
            settings.frames_in_flight
        );
        self.schedule = passes.iter().map(Pass::operation_ids).collect();
        self.settings = Some(settings);
        Ok(())
    }

    /// Submit the stream of one frame in flight.
    pub fn submit(&self, frame_index: usize, wait: &[vk::Semaphore], signal: &[vk::Semaphore], fence: Option<&Fence>) -> Result<()> {
        let settings = self.settings.as_ref().ok_or(Error::GraphNotCompiled)?;
        let stream = self.streams.get(frame_index).ok_or(Error::FrameIndexOutOfRange {
            index: frame_index,
            count: self.streams.len(),
        })?;
        settings
            .device
            .submit(stream.as_ref(), wait, signal, fence.map(Fence::handle))
    }

    /// Present a physical image of the output surface.
    pub fn present(&self, image_index: u32, surface: &dyn OutputSurface, wait: &[vk::Semaphore]) -> Result<()> {
        let settings = self.settings.as_ref().ok_or(Error::GraphNotCompiled)?;
        if !surface.supports_presenting() {
            return Err(Error::NoPresentQueue.into());
        }
        surface.present(settings.device.graphics_queue(), image_index, wait)
    }

    pub fn is_compiled(&self) -> bool {
        self.settings.is_some()
    }

    /// Number of compiled command streams, zero before compilation.
    pub fn frames_in_flight(&self) -> usize {
        self.streams.len()
    }

    pub fn pass_count(&self) -> usize {
        self.schedule.len()
    }

    /// Operations of every pass, in recording order.
    pub fn schedule(&self) -> &[Vec<OperationId>] {
        &self.schedule
    }

    pub fn device(&self) -> Option<&SharedDevice> {
        self.settings.as_ref().map(|settings| &settings.device)
    }

    pub fn connections(&self) -> Option<&ConnectionSet> {
        self.settings.as_ref().map(|settings| &settings.connections)
    }

    pub fn resource(&self, id: ResourceId) -> Result<&dyn Resource> {
        self.connections().ok_or(Error::GraphNotCompiled)?.resource(id)
    }

    /// Layouts an image went through while recording the stream of `frame`.
    pub fn layout_history(&self, frame: usize, image: vk::Image) -> Option<&LayoutHistory> {
        self.layouts.get(frame).and_then(|tracker| tracker.history(image))
    }

    /// Give back the settings for a recompilation. The graph is left uncompiled.
    pub fn take_settings(&mut self) -> Result<GraphSettings> {
        let settings = self.settings.take().ok_or(Error::GraphNotCompiled)?;
        settings.device.wait_idle()?;
        self.schedule.clear();
        self.streams.clear();
        self.layouts.clear();
        Ok(settings)
    }
}

fn log_passes(settings: &GraphSettings, passes: &[Pass]) {
    let connections = &settings.connections;
    let name_of = |node: NodeId| {
        connections
            .info(node)
            .map(|info| info.name().to_owned())
            .unwrap_or_else(|_| node.to_string())
    };

    let mut listing = String::new();
    for (index, pass) in passes.iter().enumerate() {
        let _ = writeln!(listing, "pass {index}:");
        for io in pass.operations() {
            let inputs = io.inputs.iter().map(|id| name_of((*id).into())).collect::<Vec<_>>();
            let outputs = io.outputs.iter().map(|id| name_of((*id).into())).collect::<Vec<_>>();
            let _ = writeln!(
                listing,
                "    {} reads {:?} writes {:?}",
                name_of(io.operation.into()),
                inputs,
                outputs
            );
        }
    }

    if settings.print_graph {
        info!("Render graph passes:\n{listing}");
    } else {
        debug!("Render graph passes:\n{listing}");
    }
}

fn compile_resources(settings: &mut GraphSettings) -> Result<()> {
    let ctx = CompileContext {
        device: &settings.device,
        frames_in_flight: settings.frames_in_flight,
    };
    for (info, resource) in settings.connections.resources_mut() {
        trace!("Compiling resource `{}`", info.name());
        resource.compile(&ctx)?;
    }
    Ok(())
}

fn validate_layouts(connections: &ConnectionSet) -> Result<()> {
    for id in connections.view().resources() {
        let resource = connections.resource(id)?;
        let initial = resource.initial_layout();
        if initial != vk::ImageLayout::UNDEFINED && initial != resource.final_layout() {
            return Err(Error::NonIdempotentLayout(connections.info(id)?.name().to_owned()).into());
        }
    }
    Ok(())
}

/// Common extent of every image written in a pass.
fn pass_extent(index: usize, pass: &Pass, connections: &ConnectionSet) -> Result<Option<vk::Extent2D>> {
    let mut extent: Option<vk::Extent2D> = None;
    for io in pass.operations() {
        for output in &io.outputs {
            let Some(other) = connections.resource(*output)?.extent() else {
                continue;
            };
            match extent {
                Some(first) if first != other => {
                    return Err(Error::InconsistentExtent {
                        pass: index,
                        first,
                        second: other,
                    }
                    .into());
                }
                _ => extent = Some(other),
            }
        }
    }
    Ok(extent)
}

fn compile_operations(settings: &mut GraphSettings, passes: &[Pass]) -> Result<()> {
    for (index, pass) in passes.iter().enumerate() {
        let extent = match pass_extent(index, pass, &settings.connections)? {
            Some(extent) => extent,
            None => {
                warn!(
                    "Pass {index} writes no images, compiling with fallback extent {}x{}",
                    settings.fallback_extent.width, settings.fallback_extent.height
                );
                settings.fallback_extent
            }
        };

        for io in pass.operations() {
            let (operation, graph) = settings.connections.split_operation_mut(io.operation)?;
            let ctx = OperationCompileContext {
                device: &settings.device,
                frames_in_flight: settings.frames_in_flight,
                extent,
                id: io.operation,
                graph,
            };
            operation.compile(&ctx)?;
        }
    }
    Ok(())
}

enum DotNode {
    Operation { name: String, pass: Option<usize> },
    Resource { name: String },
}

impl Display for DotNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DotNode::Operation { name, pass: Some(pass) } => write!(f, "{name} (pass {pass})"),
            DotNode::Operation { name, pass: None } => write!(f, "{name} (skipped)"),
            DotNode::Resource { name } => f.write_str(name),
        }
    }
}

fn edge_attributes(_: &Graph<DotNode, &'static str>, _: EdgeReference<&'static str>) -> String {
    String::new()
}

fn node_attributes(_: &Graph<DotNode, &'static str>, node: (NodeIndex, &DotNode)) -> String {
    match node.1 {
        DotNode::Operation { .. } => String::from("shape=box style=filled fillcolor=lightblue"),
        DotNode::Resource { .. } => String::from("shape=ellipse"),
    }
}

impl GraphViz for RenderGraph {
    fn dot(&self) -> Result<String> {
        let connections = self.connections().ok_or(Error::GraphNotCompiled)?;
        let view = connections.view();
        let mut graph = Graph::<DotNode, &'static str>::new();
        let mut indices = HashMap::new();
        for operation in view.operations() {
            let pass = self.schedule.iter().position(|pass| pass.contains(&operation));
            let node = DotNode::Operation {
                name: view.info(operation)?.name().to_owned(),
                pass,
            };
            indices.insert(NodeId::from(operation), graph.add_node(node));
        }
        for resource in view.resources() {
            let node = DotNode::Resource {
                name: view.info(resource)?.name().to_owned(),
            };
            indices.insert(NodeId::from(resource), graph.add_node(node));
        }
        for connection in view.connections() {
            let (Some(from), Some(to)) = (indices.get(&connection.from), indices.get(&connection.to)) else {
                continue;
            };
            let label = match connection.from {
                NodeId::Operation(_) => "write",
                NodeId::Resource(_) => "read",
            };
            graph.add_edge(*from, *to, label);
        }

        Ok(format!(
            "{}",
            Dot::with_attr_getters(&graph, &[], &edge_attributes, &node_attributes)
        ))
    }
}
