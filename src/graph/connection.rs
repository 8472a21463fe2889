//! The connection set: an arena of operations and resources plus the ordered list of edges between them.
//!
//! # Example
//! ```ignore
//! use deimos::prelude::*;
//!
//! let mut connections = ConnectionSet::new();
//! let scene = connections.add_resource("scene color", scene_color);
//! let draw = connections.add_operation("draw scene", draw_scene);
//! let post = connections.add_operation("postprocess", postprocess);
//! connections.write(draw, scene)?;
//! connections.read(scene, post)?;
//! ```
//!
//! Edge insertion order is preserved. The partitioner uses it to break ties, so building the same set twice
//! in the same order always compiles to the same passes.

use std::collections::HashSet;

use anyhow::Result;
use ash::vk;
use uuid::Uuid;

use crate::graph::node::{NodeId, NodeInfo, Operation, OperationId, Resource, ResourceId};
use crate::Error;

/// Render pass attachment described by an operation -> resource edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttachmentBinding {
    pub binding: u32,
    pub format: vk::Format,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    pub layer_count: u32,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

impl AttachmentBinding {
    /// Color attachment that is cleared on load, stored, and left in `final_layout`.
    pub fn color(binding: u32, format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        Self {
            binding,
            format,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout,
            layer_count: 1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
        }
    }

    pub fn with_layers(mut self, layer_count: u32) -> Self {
        self.layer_count = layer_count;
        self
    }

    pub fn with_load_op(mut self, load_op: vk::AttachmentLoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    pub fn with_store_op(mut self, store_op: vk::AttachmentStoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    /// One description per layer, each layer is bound as its own attachment.
    pub fn attachment_descriptions(&self) -> Vec<vk::AttachmentDescription> {
        let description = vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: self.format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: self.load_op,
            store_op: self.store_op,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: self.initial_layout,
            final_layout: self.final_layout,
        };
        vec![description; self.layer_count as usize]
    }

    pub fn attachment_references(&self) -> Vec<vk::AttachmentReference> {
        (self.binding..self.binding + self.layer_count)
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect()
    }
}

/// Edge-local metadata: what slot of the operation an edge represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Binding {
    #[default]
    None,
    /// Descriptor binding index.
    Slot(u32),
    Attachment(AttachmentBinding),
}

/// A directed edge. Operation -> resource edges are writes, resource -> operation edges are reads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    pub binding: Binding,
}

/// Owns every node of a graph and the edges between them.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct ConnectionSet {
    operation_infos: Vec<NodeInfo>,
    #[derivative(Debug = "ignore")]
    operations: Vec<Box<dyn Operation>>,
    resource_infos: Vec<NodeInfo>,
    #[derivative(Debug = "ignore")]
    resources: Vec<Box<dyn Resource>>,
    connections: Vec<Connection>,
    insertion_order: Vec<NodeId>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operation(&mut self, name: impl Into<String>, operation: impl Operation + 'static) -> OperationId {
        self.add_operation_with_info(NodeInfo::new(name), operation)
    }

    pub fn add_operation_with_info(&mut self, info: NodeInfo, operation: impl Operation + 'static) -> OperationId {
        self.operation_infos.push(info);
        self.operations.push(Box::new(operation));
        OperationId(self.operations.len() - 1)
    }

    pub fn add_resource(&mut self, name: impl Into<String>, resource: impl Resource + 'static) -> ResourceId {
        self.add_resource_with_info(NodeInfo::new(name), resource)
    }

    pub fn add_resource_with_info(&mut self, info: NodeInfo, resource: impl Resource + 'static) -> ResourceId {
        self.resource_infos.push(info);
        self.resources.push(Box::new(resource));
        ResourceId(self.resources.len() - 1)
    }

    /// Add an edge. Exactly one endpoint must be an operation.
    pub fn connect(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>, binding: Binding) -> Result<()> {
        let from = from.into();
        let to = to.into();
        let view = self.view();
        let from_name = view.info(from)?.name().to_owned();
        let to_name = view.info(to)?.name().to_owned();
        match (from, to) {
            (NodeId::Operation(_), NodeId::Resource(_)) | (NodeId::Resource(_), NodeId::Operation(_)) => {}
            _ => return Err(Error::IllegalConnection(from_name, to_name).into()),
        }

        for node in [from, to] {
            if !self.insertion_order.contains(&node) {
                self.insertion_order.push(node);
            }
        }
        self.connections.push(Connection {
            from,
            to,
            binding,
        });
        Ok(())
    }

    /// `operation` reads `resource`.
    pub fn read(&mut self, resource: ResourceId, operation: OperationId) -> Result<()> {
        self.connect(resource, operation, Binding::None)
    }

    /// `operation` writes `resource`.
    pub fn write(&mut self, operation: OperationId, resource: ResourceId) -> Result<()> {
        self.connect(operation, resource, Binding::None)
    }

    pub fn view(&self) -> GraphView<'_> {
        GraphView {
            operation_infos: &self.operation_infos,
            resource_infos: &self.resource_infos,
            resources: &self.resources,
            connections: &self.connections,
            insertion_order: &self.insertion_order,
        }
    }

    pub fn operation(&self, id: OperationId) -> Result<&dyn Operation> {
        self.operations
            .get(id.0)
            .map(|operation| operation.as_ref())
            .ok_or_else(|| Error::NodeNotFound.into())
    }

    pub fn resource(&self, id: ResourceId) -> Result<&dyn Resource> {
        self.view().resource(id)
    }

    pub fn info(&self, node: impl Into<NodeId>) -> Result<&NodeInfo> {
        self.view().info(node)
    }

    pub fn find(&self, uuid: Uuid) -> Option<NodeId> {
        self.view().find(uuid)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn inputs_of(&self, operation: OperationId) -> Vec<ResourceId> {
        self.view().inputs_of(operation)
    }

    pub fn outputs_of(&self, operation: OperationId) -> Vec<ResourceId> {
        self.view().outputs_of(operation)
    }

    pub fn producers_of(&self, resource: ResourceId) -> Vec<OperationId> {
        self.view().producers_of(resource)
    }

    pub fn consumers_of(&self, resource: ResourceId) -> Vec<OperationId> {
        self.view().consumers_of(resource)
    }

    /// Mutable access to every resource, with its identity.
    pub(crate) fn resources_mut(&mut self) -> impl Iterator<Item = (&NodeInfo, &mut Box<dyn Resource>)> {
        self.resource_infos.iter().zip(self.resources.iter_mut())
    }

    /// Mutable access to one operation alongside a read-only view of everything else.
    pub(crate) fn split_operation_mut(&mut self, id: OperationId) -> Result<(&mut dyn Operation, GraphView<'_>)> {
        let operation = self.operations.get_mut(id.0).ok_or(Error::NodeNotFound)?;
        let view = GraphView {
            operation_infos: &self.operation_infos,
            resource_infos: &self.resource_infos,
            resources: &self.resources,
            connections: &self.connections,
            insertion_order: &self.insertion_order,
        };
        Ok((operation.as_mut(), view))
    }
}

/// Read-only view over the nodes and edges of a [`ConnectionSet`].
#[derive(Copy, Clone)]
pub struct GraphView<'a> {
    operation_infos: &'a [NodeInfo],
    resource_infos: &'a [NodeInfo],
    resources: &'a [Box<dyn Resource>],
    connections: &'a [Connection],
    insertion_order: &'a [NodeId],
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) {
    if !list.contains(&value) {
        list.push(value);
    }
}

impl<'a> GraphView<'a> {
    pub fn resource(&self, id: ResourceId) -> Result<&'a dyn Resource> {
        self.resources
            .get(id.0)
            .map(|resource| resource.as_ref())
            .ok_or_else(|| Error::NodeNotFound.into())
    }

    pub fn info(&self, node: impl Into<NodeId>) -> Result<&'a NodeInfo> {
        let info = match node.into() {
            NodeId::Operation(id) => self.operation_infos.get(id.0),
            NodeId::Resource(id) => self.resource_infos.get(id.0),
        };
        info.ok_or_else(|| Error::NodeNotFound.into())
    }

    pub fn find(&self, uuid: Uuid) -> Option<NodeId> {
        let operation = self
            .operation_infos
            .iter()
            .position(|info| info.uuid() == uuid)
            .map(|index| NodeId::Operation(OperationId(index)));
        operation.or_else(|| {
            self.resource_infos
                .iter()
                .position(|info| info.uuid() == uuid)
                .map(|index| NodeId::Resource(ResourceId(index)))
        })
    }

    pub fn connections(&self) -> &'a [Connection] {
        self.connections
    }

    pub fn operation_count(&self) -> usize {
        self.operation_infos.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resource_infos.len()
    }

    /// Every operation, connected operations first in the order they first appeared in an edge, then
    /// unconnected ones in the order they were added.
    pub fn operations(&self) -> Vec<OperationId> {
        let mut result = self
            .insertion_order
            .iter()
            .filter_map(|node| match node {
                NodeId::Operation(id) => Some(*id),
                NodeId::Resource(_) => None,
            })
            .collect::<Vec<_>>();
        let connected = result.iter().copied().collect::<HashSet<_>>();
        result.extend((0..self.operation_infos.len()).map(OperationId).filter(|id| !connected.contains(id)));
        result
    }

    /// Every resource, ordered the same way as [`GraphView::operations`].
    pub fn resources(&self) -> Vec<ResourceId> {
        let mut result = self
            .insertion_order
            .iter()
            .filter_map(|node| match node {
                NodeId::Resource(id) => Some(*id),
                NodeId::Operation(_) => None,
            })
            .collect::<Vec<_>>();
        let connected = result.iter().copied().collect::<HashSet<_>>();
        result.extend((0..self.resource_infos.len()).map(ResourceId).filter(|id| !connected.contains(id)));
        result
    }

    /// Edges pointing into a node, in insertion order.
    pub fn pointing_here(&self, node: impl Into<NodeId>) -> impl Iterator<Item = &'a Connection> {
        let node = node.into();
        self.connections.iter().filter(move |connection| connection.to == node)
    }

    /// Edges leaving a node, in insertion order.
    pub fn pointing_to(&self, node: impl Into<NodeId>) -> impl Iterator<Item = &'a Connection> {
        let node = node.into();
        self.connections.iter().filter(move |connection| connection.from == node)
    }

    pub fn inputs_of(&self, operation: OperationId) -> Vec<ResourceId> {
        let mut result = Vec::new();
        for connection in self.pointing_here(operation) {
            if let NodeId::Resource(id) = connection.from {
                push_unique(&mut result, id);
            }
        }
        result
    }

    pub fn outputs_of(&self, operation: OperationId) -> Vec<ResourceId> {
        let mut result = Vec::new();
        for connection in self.pointing_to(operation) {
            if let NodeId::Resource(id) = connection.to {
                push_unique(&mut result, id);
            }
        }
        result
    }

    pub fn producers_of(&self, resource: ResourceId) -> Vec<OperationId> {
        let mut result = Vec::new();
        for connection in self.pointing_here(resource) {
            if let NodeId::Operation(id) = connection.from {
                push_unique(&mut result, id);
            }
        }
        result
    }

    pub fn consumers_of(&self, resource: ResourceId) -> Vec<OperationId> {
        let mut result = Vec::new();
        for connection in self.pointing_to(resource) {
            if let NodeId::Operation(id) = connection.to {
                push_unique(&mut result, id);
            }
        }
        result
    }

    /// Position of a node in edge insertion order. Nodes without edges sort last.
    pub(crate) fn rank(&self, node: impl Into<NodeId>) -> usize {
        let node = node.into();
        self.insertion_order
            .iter()
            .position(|other| *other == node)
            .unwrap_or(self.insertion_order.len())
    }
}
