//! Passes produced by the partitioner.
//!
//! A pass is a group of operations that is recorded without any barrier between passes. For every
//! operation it stores the full list of inputs and outputs, and it keeps a reverse index from each
//! resource to the operations in the pass that read or write it.

use multimap::MultiMap;

use crate::graph::node::{OperationId, ResourceId};

/// Resolved inputs and outputs of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationIo {
    pub operation: OperationId,
    pub inputs: Vec<ResourceId>,
    pub outputs: Vec<ResourceId>,
}

#[derive(Debug, Clone, Default)]
pub struct Pass {
    operations: Vec<OperationIo>,
    readers: MultiMap<ResourceId, OperationId>,
    writers: MultiMap<ResourceId, OperationId>,
}

impl Pass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn contains(&self, operation: OperationId) -> bool {
        self.operations.iter().any(|io| io.operation == operation)
    }

    /// Operations in recording order.
    pub fn operations(&self) -> impl Iterator<Item = &OperationIo> {
        self.operations.iter()
    }

    pub fn operation_ids(&self) -> Vec<OperationId> {
        self.operations.iter().map(|io| io.operation).collect()
    }

    pub fn io(&self, operation: OperationId) -> Option<&OperationIo> {
        self.operations.iter().find(|io| io.operation == operation)
    }

    pub fn readers_of(&self, resource: ResourceId) -> &[OperationId] {
        self.readers.get_vec(&resource).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn writers_of(&self, resource: ResourceId) -> &[OperationId] {
        self.writers.get_vec(&resource).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn insert(&mut self, io: OperationIo) {
        for input in &io.inputs {
            self.readers.insert(*input, io.operation);
        }
        for output in &io.outputs {
            self.writers.insert(*output, io.operation);
        }
        self.operations.push(io);
    }

    /// Remove an operation together with its index entries.
    pub(crate) fn remove(&mut self, operation: OperationId) -> Option<OperationIo> {
        let position = self.operations.iter().position(|io| io.operation == operation)?;
        let io = self.operations.remove(position);
        for input in &io.inputs {
            Self::unindex(&mut self.readers, *input, operation);
        }
        for output in &io.outputs {
            Self::unindex(&mut self.writers, *output, operation);
        }
        Some(io)
    }

    /// Reorder operations with a sort key. The reverse index keeps the same order.
    pub(crate) fn sort_by_key<K: Ord>(&mut self, mut key: impl FnMut(OperationId) -> K) {
        let mut operations = std::mem::take(&mut self.operations);
        operations.sort_by_key(|io| key(io.operation));
        self.readers = MultiMap::new();
        self.writers = MultiMap::new();
        for io in operations {
            self.insert(io);
        }
    }

    fn unindex(index: &mut MultiMap<ResourceId, OperationId>, resource: ResourceId, operation: OperationId) {
        let now_empty = match index.get_vec_mut(&resource) {
            Some(list) => {
                list.retain(|other| *other != operation);
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            index.remove(&resource);
        }
    }
}
