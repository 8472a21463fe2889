use anyhow::Result;

use crate::core::stream::{CommandStream, ImageTransition, PipelineBarrier};
use crate::graph::connection::ConnectionSet;
use crate::graph::layout::LayoutTracker;
use crate::graph::node::{Operation, RecordContext, Resource, ResourceId};
use crate::graph::pass::{OperationIo, Pass};

// Recording
// =============
// For every operation, in pass order and then insertion order inside a pass:
// - Call the pre-read and pre-write hooks of its resources.
// - Record one barrier waiting on all earlier writes, carrying the transitions of every input and output
//   image to the layout the operation starts with.
// - Record the operation itself, then the post-write hooks.
// - Advance the tracked layouts to the layouts the operation ends with.
// After the last pass a final barrier brings every image back to its steady-state layout, so the stream
// can be submitted again next frame without recording anything new.

/// Resources used by any pass, in first-use order.
fn used_resources(passes: &[Pass]) -> Vec<ResourceId> {
    let mut result = Vec::new();
    for pass in passes {
        for io in pass.operations() {
            for resource in io.inputs.iter().chain(io.outputs.iter()) {
                if !result.contains(resource) {
                    result.push(*resource);
                }
            }
        }
    }
    result
}

/// Inputs that are not written by the same operation. Layouts of read-write resources follow the output
/// layouts.
fn read_only_inputs(io: &OperationIo) -> impl Iterator<Item = &ResourceId> {
    io.inputs.iter().filter(|input| !io.outputs.contains(input))
}

fn start_transitions(
    frame: usize,
    io: &OperationIo,
    operation: &dyn Operation,
    connections: &ConnectionSet,
    tracker: &mut LayoutTracker,
) -> Result<Vec<ImageTransition>> {
    let mut transitions = Vec::new();
    for input in read_only_inputs(io) {
        let resource = connections.resource(*input)?;
        let layout = operation.input_layout_at_start(resource);
        for image in resource.images(frame) {
            transitions.extend(tracker.transition(image.handle, layout));
        }
    }
    for output in &io.outputs {
        let resource = connections.resource(*output)?;
        let layout = operation.output_layout_at_start(resource);
        for image in resource.images(frame) {
            transitions.extend(tracker.transition(image.handle, layout));
        }
    }
    Ok(transitions)
}

fn advance_layouts(
    frame: usize,
    io: &OperationIo,
    operation: &dyn Operation,
    connections: &ConnectionSet,
    tracker: &mut LayoutTracker,
) -> Result<()> {
    for input in read_only_inputs(io) {
        let resource = connections.resource(*input)?;
        let layout = operation.input_layout_at_end(resource);
        for image in resource.images(frame) {
            tracker.advance(image.handle, layout);
        }
    }
    for output in &io.outputs {
        let resource = connections.resource(*output)?;
        let layout = operation.output_layout_at_end(resource);
        for image in resource.images(frame) {
            tracker.advance(image.handle, layout);
        }
    }
    Ok(())
}

#[cfg(feature = "debug-markers")]
fn annotate_operation(stream: &mut dyn CommandStream, name: &str) {
    stream.begin_label(name);
}

#[cfg(not(feature = "debug-markers"))]
fn annotate_operation(_: &mut dyn CommandStream, _: &str) {}

#[cfg(feature = "debug-markers")]
fn end_annotation(stream: &mut dyn CommandStream) {
    stream.end_label();
}

#[cfg(not(feature = "debug-markers"))]
fn end_annotation(_: &mut dyn CommandStream) {}

fn record_operation(
    frame: usize,
    io: &OperationIo,
    connections: &ConnectionSet,
    stream: &mut dyn CommandStream,
    tracker: &mut LayoutTracker,
) -> Result<()> {
    let operation = connections.operation(io.operation)?;
    let inputs = io
        .inputs
        .iter()
        .map(|id| connections.resource(*id))
        .collect::<Result<Vec<&dyn Resource>>>()?;
    let outputs = io
        .outputs
        .iter()
        .map(|id| connections.resource(*id))
        .collect::<Result<Vec<&dyn Resource>>>()?;

    for resource in &inputs {
        resource.on_pre_read(frame, stream);
    }
    for resource in &outputs {
        resource.on_pre_write(frame, stream);
    }

    let transitions = start_transitions(frame, io, operation, connections, tracker)?;
    stream.pipeline_barrier(&PipelineBarrier::full(transitions));

    annotate_operation(stream, connections.info(io.operation)?.name());
    let ctx = RecordContext {
        frame_index: frame,
        id: io.operation,
        graph: connections.view(),
    };
    operation.record(&ctx, stream)?;
    end_annotation(stream);

    for resource in &outputs {
        resource.on_post_write(frame, stream);
    }
    advance_layouts(frame, io, operation, connections, tracker)
}

/// Record the command stream of one frame in flight. Returns the layout histories built along the way.
pub(crate) fn record_frame(
    frame: usize,
    passes: &[Pass],
    connections: &ConnectionSet,
    stream: &mut dyn CommandStream,
) -> Result<LayoutTracker> {
    let mut tracker = LayoutTracker::new();
    let resources = used_resources(passes);

    stream.begin()?;
    for id in &resources {
        let resource = connections.resource(*id)?;
        for image in resource.images(frame) {
            tracker.track(image, resource.initial_layout(), resource.final_layout());
        }
        resource.on_graph_execution_started(frame, stream);
    }

    for pass in passes {
        for io in pass.operations() {
            record_operation(frame, io, connections, stream, &mut tracker)?;
        }
    }

    let restore = tracker.restore();
    stream.pipeline_barrier(&PipelineBarrier::full(restore));
    for id in &resources {
        connections.resource(*id)?.on_graph_execution_ended(frame, stream);
    }
    stream.end()?;
    Ok(tracker)
}
