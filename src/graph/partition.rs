//! Splits a connection set into an ordered list of hazard-free passes.
//!
//! # Algorithm
//! - The first pass holds every operation that does not depend on another operation: its inputs are
//!   empty, or no other operation writes them.
//! - Every following pass holds the consumers of the previous pass's outputs whose producers have all
//!   been scheduled already. Generation stops at the first empty pass.
//! - Hazard separation then scans the passes front to back. An operation placed in the same pass as (or
//!   before) one of its producers, or the second writer of a resource written twice in one pass, is moved
//!   to the following pass and the scan restarts.
//!
//! Inside a pass, operations keep the order in which they were first connected.
//! Dependency cycles are rejected before any pass is built. An operation that reads and writes the same
//! resource does not depend on itself.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;

use crate::graph::connection::{ConnectionSet, GraphView};
use crate::graph::node::{OperationId, ResourceId};
use crate::graph::pass::{OperationIo, Pass};
use crate::Error;

/// Partition the operations of a connection set into passes.
/// # Errors
/// - [`Error::GraphHasCycle`] if operations depend on each other through resources in a cycle.
/// - [`Error::PartitionDiverged`] if hazard separation fails to settle.
pub fn partition(connections: &ConnectionSet) -> Result<Vec<Pass>> {
    Partitioner::new(connections.view()).run()
}

struct Partitioner<'a> {
    graph: GraphView<'a>,
    /// Operations that take part in partitioning, in insertion order.
    operations: Vec<OperationId>,
    rank: HashMap<OperationId, usize>,
    dependencies: HashMap<OperationId, Vec<OperationId>>,
}

impl<'a> Partitioner<'a> {
    fn new(graph: GraphView<'a>) -> Self {
        let mut operations = Vec::new();
        let mut rank = HashMap::new();
        let mut dependencies = HashMap::new();
        for (index, operation) in graph.operations().into_iter().enumerate() {
            let inputs = graph.inputs_of(operation);
            if inputs.is_empty() && graph.outputs_of(operation).is_empty() {
                let name = graph.info(operation).map(|info| info.name()).unwrap_or("<unknown>");
                warn!("Operation `{name}` has no inputs or outputs and is skipped");
                continue;
            }

            let mut producers = Vec::new();
            for input in inputs {
                for producer in graph.producers_of(input) {
                    if producer != operation && !producers.contains(&producer) {
                        producers.push(producer);
                    }
                }
            }
            operations.push(operation);
            rank.insert(operation, index);
            dependencies.insert(operation, producers);
        }

        Self {
            graph,
            operations,
            rank,
            dependencies,
        }
    }

    fn run(self) -> Result<Vec<Pass>> {
        self.check_cycles()?;
        let passes = self.layer()?;
        self.separate(passes)
    }

    fn rank_of(&self, operation: OperationId) -> usize {
        self.rank.get(&operation).copied().unwrap_or(usize::MAX)
    }

    fn dependencies_of(&self, operation: OperationId) -> &[OperationId] {
        self.dependencies.get(&operation).map(Vec::as_slice).unwrap_or(&[])
    }

    fn io_of(&self, operation: OperationId) -> OperationIo {
        OperationIo {
            operation,
            inputs: self.graph.inputs_of(operation),
            outputs: self.graph.outputs_of(operation),
        }
    }

    fn check_cycles(&self) -> Result<()> {
        let mut graph = DiGraphMap::<OperationId, ()>::new();
        for operation in &self.operations {
            graph.add_node(*operation);
            for dependency in self.dependencies_of(*operation) {
                graph.add_edge(*dependency, *operation, ());
            }
        }
        if is_cyclic_directed(&graph) {
            return Err(Error::GraphHasCycle.into());
        }
        Ok(())
    }

    fn first_pass(&self) -> Pass {
        let mut pass = Pass::new();
        for operation in &self.operations {
            if self.dependencies_of(*operation).is_empty() {
                pass.insert(self.io_of(*operation));
            }
        }
        pass
    }

    fn next_pass(&self, previous: &Pass, scheduled: &HashSet<OperationId>) -> Pass {
        let mut admitted = Vec::new();
        for io in previous.operations() {
            for output in &io.outputs {
                for consumer in self.graph.consumers_of(*output) {
                    if scheduled.contains(&consumer) || admitted.contains(&consumer) || !self.rank.contains_key(&consumer) {
                        continue;
                    }
                    let ready = self
                        .dependencies_of(consumer)
                        .iter()
                        .all(|dependency| scheduled.contains(dependency));
                    if ready {
                        admitted.push(consumer);
                    }
                }
            }
        }

        admitted.sort_by_key(|operation| self.rank_of(*operation));
        let mut pass = Pass::new();
        for operation in admitted {
            pass.insert(self.io_of(operation));
        }
        pass
    }

    fn layer(&self) -> Result<Vec<Pass>> {
        let mut passes: Vec<Pass> = Vec::new();
        let mut scheduled = HashSet::new();
        let mut current = self.first_pass();
        while !current.is_empty() {
            scheduled.extend(current.operation_ids());
            let next = self.next_pass(&current, &scheduled);
            passes.push(current);
            current = next;
        }

        if scheduled.len() != self.operations.len() {
            return Err(Error::GraphHasCycle.into());
        }
        Ok(passes)
    }

    /// Find the first operation that must move to the next pass, scanning from the front.
    fn find_hazard(&self, passes: &[Pass]) -> Option<(usize, OperationId)> {
        let placement = passes
            .iter()
            .enumerate()
            .flat_map(|(index, pass)| pass.operation_ids().into_iter().map(move |operation| (operation, index)))
            .collect::<HashMap<_, _>>();

        for (index, pass) in passes.iter().enumerate() {
            let mut operations = pass.operation_ids();
            operations.sort_by_key(|operation| self.rank_of(*operation));
            for operation in &operations {
                let misplaced = self
                    .dependencies_of(*operation)
                    .iter()
                    .any(|dependency| placement.get(dependency).map_or(false, |placed| *placed >= index));
                if misplaced {
                    return Some((index, *operation));
                }
            }

            let mut written: Vec<ResourceId> = Vec::new();
            for io in pass.operations() {
                for output in &io.outputs {
                    if !written.contains(output) {
                        written.push(*output);
                    }
                }
            }
            written.sort_by_key(|resource| self.graph.rank(*resource));
            for resource in written {
                let mut writers = pass.writers_of(resource).to_vec();
                if writers.len() > 1 {
                    writers.sort_by_key(|operation| self.rank_of(*operation));
                    return Some((index, writers[1]));
                }
            }
        }
        None
    }

    fn separate(&self, mut passes: Vec<Pass>) -> Result<Vec<Pass>> {
        let count = self.operations.len();
        let limit = 2 * (count + 1) * (count + 1);
        let mut moves = 0;
        while let Some((index, operation)) = self.find_hazard(&passes) {
            if moves >= limit {
                return Err(Error::PartitionDiverged(moves).into());
            }
            let io = passes[index].remove(operation).ok_or(Error::NodeNotFound)?;
            if index + 1 == passes.len() {
                passes.push(Pass::new());
            }
            passes[index + 1].insert(io);
            moves += 1;
            trace!(
                "Moved operation `{}` from pass {index} to pass {}",
                self.graph.info(operation).map(|info| info.name()).unwrap_or("<unknown>"),
                index + 1
            );
        }

        passes.retain(|pass| !pass.is_empty());
        for pass in &mut passes {
            pass.sort_by_key(|operation| (self.rank_of(operation), operation));
        }
        Ok(passes)
    }
}
