#![allow(dead_code)]

//! Headless test framework: a mock device with a single in-order queue, a recording command stream and a
//! round-robin output surface. The mock never blocks. Instead it records every misuse it can detect as a
//! violation, so tests can assert that none happened.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk::Handle;

use deimos::prelude::*;

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

pub const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 128,
    height: 128,
};

/// Physical image with a fake handle.
pub fn image(id: u64) -> PhysicalImage {
    PhysicalImage::color(vk::Image::from_raw(id), vk::Format::R8G8B8A8_UNORM, EXTENT)
}

pub fn sized_image(id: u64, width: u32, height: u32) -> PhysicalImage {
    PhysicalImage::color(
        vk::Image::from_raw(id),
        vk::Format::R8G8B8A8_UNORM,
        vk::Extent2D {
            width,
            height,
        },
    )
}

/// Per-frame image resource. Frame `i` uses image `base + i`.
pub fn image_resource(base: u64) -> ImageResource {
    ImageResource::new(move |_, frame| Ok(image(base + frame as u64)))
}

/// Operation that records nothing and uses the default layouts.
pub fn noop_operation() -> FnOperation {
    OperationBuilder::new().build()
}

pub type RecordLog = Arc<Mutex<Vec<String>>>;

pub fn record_log() -> RecordLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Operation that appends `name@frame` to `log` every time it is recorded.
pub fn logging_operation(name: &str, log: &RecordLog) -> FnOperation {
    let name = name.to_owned();
    let log = log.clone();
    OperationBuilder::new()
        .execute(move |ctx, _, _| {
            log.lock().unwrap().push(format!("{name}@{}", ctx.frame_index));
            Ok(())
        })
        .build()
}

/// Everything recorded into a mock command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Begin,
    End,
    Barrier(PipelineBarrier),
    SetEvent(vk::Event, PipelineBarrier),
    ResetEvent(vk::Event),
    WaitEvent(vk::Event, PipelineBarrier),
    BeginLabel(String),
    EndLabel,
}

/// Everything the mock device and surface observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Submit {
        stream: u64,
        wait: Vec<vk::Semaphore>,
        signal: Vec<vk::Semaphore>,
        fence: Option<vk::Fence>,
    },
    FenceWait(vk::Fence),
    FenceReset(vk::Fence),
    QueueIdle,
    DeviceIdle,
    Acquire(u32),
    Present(u32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FenceState {
    Unsignaled,
    /// Attached to a submission that has not completed yet.
    Pending,
    Signaled,
}

#[derive(Debug)]
struct Submission {
    stream: u64,
    fence: Option<vk::Fence>,
}

type StreamLog = Arc<Mutex<Vec<Recorded>>>;

#[derive(Debug, Default)]
struct DeviceState {
    next_handle: u64,
    fences: HashMap<vk::Fence, FenceState>,
    semaphores: HashSet<vk::Semaphore>,
    events: HashSet<vk::Event>,
    names: HashMap<u64, String>,
    pending: Vec<Submission>,
    log: Vec<DeviceEvent>,
    violations: Vec<String>,
    streams: Vec<(u64, StreamLog)>,
    acquired_image: Option<u32>,
    image_fences: HashMap<u32, vk::Fence>,
    fail_submit: bool,
}

impl DeviceState {
    fn handle(&mut self) -> u64 {
        // Start high so handles never collide with the fake image ids used by tests.
        self.next_handle += 1;
        0x1000_0000 + self.next_handle
    }

    fn fence_state(&self, fence: vk::Fence) -> Option<FenceState> {
        self.fences.get(&fence).copied()
    }

    /// Retire submissions in queue order, up to and including the one signaling `fence`.
    fn complete_until(&mut self, fence: vk::Fence) {
        let Some(position) = self.pending.iter().position(|submission| submission.fence == Some(fence)) else {
            return;
        };
        let completed = self.pending.drain(..=position).collect::<Vec<_>>();
        for submission in completed {
            if let Some(fence) = submission.fence {
                self.fences.insert(fence, FenceState::Signaled);
            }
        }
    }

    fn complete_all(&mut self) {
        let completed = std::mem::take(&mut self.pending);
        for submission in completed {
            if let Some(fence) = submission.fence {
                self.fences.insert(fence, FenceState::Signaled);
            }
        }
    }

    fn is_pending(&self, stream: u64) -> bool {
        self.pending.iter().any(|submission| submission.stream == stream)
    }
}

/// Device with one in-order queue. Submissions complete when a fence attached to them (or to a later
/// submission) is waited on, or when the queue or device is waited idle.
#[derive(Debug, Default)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        init_logging();
        Arc::new(Self::default())
    }

    pub fn shared(self: &Arc<Self>) -> SharedDevice {
        self.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().unwrap().violations.clone()
    }

    pub fn log(&self) -> Vec<DeviceEvent> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    pub fn submits(&self) -> Vec<DeviceEvent> {
        self.log()
            .into_iter()
            .filter(|event| matches!(event, DeviceEvent::Submit { .. }))
            .collect()
    }

    pub fn fence_state(&self, fence: vk::Fence) -> Option<FenceState> {
        self.state.lock().unwrap().fence_state(fence)
    }

    pub fn object_name(&self, handle: u64) -> Option<String> {
        self.state.lock().unwrap().names.get(&handle).cloned()
    }

    /// Ids of every stream allocated so far, in allocation order.
    pub fn stream_ids(&self) -> Vec<u64> {
        self.state.lock().unwrap().streams.iter().map(|(id, _)| *id).collect()
    }

    pub fn recorded(&self, stream: u64) -> Vec<Recorded> {
        let state = self.state.lock().unwrap();
        state
            .streams
            .iter()
            .find(|(id, _)| *id == stream)
            .map(|(_, log)| log.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Recorded commands of the last `count` allocated streams, in allocation order. After compiling a
    /// graph these are the streams of its frames in flight.
    pub fn last_streams(&self, count: usize) -> Vec<Vec<Recorded>> {
        let ids = self.stream_ids();
        ids[ids.len() - count..].iter().map(|id| self.recorded(*id)).collect()
    }

    pub fn live_semaphores(&self) -> usize {
        self.state.lock().unwrap().semaphores.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state.lock().unwrap().fences.len()
    }

    pub fn live_events(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    /// Make every following submission fail like a lost device.
    pub fn fail_submissions(&self) {
        self.state.lock().unwrap().fail_submit = true;
    }

    /// Called by the mock surface. Signals `fence` like the presentation engine would.
    fn acquire(&self, image: u32, fence: vk::Fence) {
        let mut state = self.state.lock().unwrap();
        state.log.push(DeviceEvent::Acquire(image));
        state.acquired_image = Some(image);
        if fence != vk::Fence::null() {
            match state.fence_state(fence) {
                Some(FenceState::Unsignaled) => {
                    state.fences.insert(fence, FenceState::Signaled);
                }
                other => state
                    .violations
                    .push(format!("acquired image {image} with fence {fence:?} in state {other:?}")),
            }
        }
    }

    fn present(&self, image: u32) {
        self.state.lock().unwrap().log.push(DeviceEvent::Present(image));
    }
}

impl Device for MockDevice {
    fn allocate_command_stream(&self) -> Result<Box<dyn CommandStream>> {
        let mut state = self.state.lock().unwrap();
        let id = state.handle();
        let log = StreamLog::default();
        state.streams.push((id, log.clone()));
        Ok(Box::new(MockCommandStream {
            id,
            log,
            device: self.state.clone(),
        }))
    }

    fn submit(&self, stream: &dyn CommandStream, wait: &[vk::Semaphore], signal: &[vk::Semaphore], fence: Option<vk::Fence>) -> Result<()> {
        let id = unsafe { stream.handle() }.as_raw();
        let mut state = self.state.lock().unwrap();
        if state.fail_submit {
            return Err(Error::VkError(vk::Result::ERROR_DEVICE_LOST).into());
        }
        state.log.push(DeviceEvent::Submit {
            stream: id,
            wait: wait.to_vec(),
            signal: signal.to_vec(),
            fence,
        });

        if state.is_pending(id) {
            state.violations.push(format!("stream {id:#x} submitted while still in flight"));
        }
        let recorded = state
            .streams
            .iter()
            .find(|(stream, _)| *stream == id)
            .map(|(_, log)| log.lock().unwrap().clone());
        match recorded {
            Some(commands) if commands.first() == Some(&Recorded::Begin) && commands.last() == Some(&Recorded::End) => {}
            Some(_) => state.violations.push(format!("stream {id:#x} submitted while not fully recorded")),
            None => state.violations.push(format!("unknown stream {id:#x} submitted")),
        }

        let acquired = state.acquired_image.take();
        if let Some(fence) = fence {
            if let Some(image) = acquired {
                if let Some(previous) = state.image_fences.insert(image, fence) {
                    if state.fence_state(previous) == Some(FenceState::Pending) {
                        state
                            .violations
                            .push(format!("image {image} rendered to while the frame using it is still in flight"));
                    }
                }
            }
            match state.fence_state(fence) {
                Some(FenceState::Unsignaled) => {}
                other => state
                    .violations
                    .push(format!("submitted with fence {fence:?} in state {other:?}")),
            }
            state.fences.insert(fence, FenceState::Pending);
        }
        state.pending.push(Submission {
            stream: id,
            fence,
        });
        Ok(())
    }

    fn graphics_queue(&self) -> vk::Queue {
        vk::Queue::from_raw(1)
    }

    fn wait_queue_idle(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(DeviceEvent::QueueIdle);
        state.complete_all();
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(DeviceEvent::DeviceIdle);
        state.complete_all();
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.lock().unwrap();
        let fence = vk::Fence::from_raw(state.handle());
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(fence, initial);
        Ok(fence)
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(DeviceEvent::FenceWait(fence));
        match state.fence_state(fence) {
            Some(FenceState::Pending) => state.complete_until(fence),
            Some(FenceState::Signaled) => {}
            other => state
                .violations
                .push(format!("waited on fence {fence:?} in state {other:?}, this never returns")),
        }
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(DeviceEvent::FenceReset(fence));
        match state.fence_state(fence) {
            Some(FenceState::Pending) => state.violations.push(format!("reset fence {fence:?} while in flight")),
            None => state.violations.push(format!("reset unknown fence {fence:?}")),
            _ => {}
        }
        state.fences.insert(fence, FenceState::Unsignaled);
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock().unwrap();
        if state.fence_state(fence) == Some(FenceState::Pending) {
            state.violations.push(format!("destroyed fence {fence:?} while in flight"));
        }
        state.fences.remove(&fence);
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let mut state = self.state.lock().unwrap();
        let semaphore = vk::Semaphore::from_raw(state.handle());
        state.semaphores.insert(semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.lock().unwrap().semaphores.remove(&semaphore);
    }

    fn create_event(&self) -> Result<vk::Event> {
        let mut state = self.state.lock().unwrap();
        let event = vk::Event::from_raw(state.handle());
        state.events.insert(event);
        Ok(event)
    }

    fn destroy_event(&self, event: vk::Event) {
        self.state.lock().unwrap().events.remove(&event);
    }

    fn set_object_name(&self, _object_type: vk::ObjectType, handle: u64, name: &str) -> Result<()> {
        self.state.lock().unwrap().names.insert(handle, name.to_owned());
        Ok(())
    }
}

/// Command stream that stores everything recorded into it.
#[derive(Debug)]
pub struct MockCommandStream {
    id: u64,
    log: StreamLog,
    device: Arc<Mutex<DeviceState>>,
}

impl MockCommandStream {
    fn push(&self, command: Recorded) {
        self.log.lock().unwrap().push(command);
    }
}

impl CommandStream for MockCommandStream {
    fn begin(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.clear();
        log.push(Recorded::Begin);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.push(Recorded::End);
        Ok(())
    }

    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier) {
        self.push(Recorded::Barrier(barrier.clone()));
    }

    fn set_event(&mut self, event: vk::Event, dependency: &PipelineBarrier) {
        self.push(Recorded::SetEvent(event, dependency.clone()));
    }

    fn reset_event(&mut self, event: vk::Event, _stage: vk::PipelineStageFlags2) {
        self.push(Recorded::ResetEvent(event));
    }

    fn wait_event(&mut self, event: vk::Event, dependency: &PipelineBarrier) {
        let set_with = self.log.lock().unwrap().iter().rev().find_map(|command| match command {
            Recorded::SetEvent(set, set_with) if *set == event => Some(set_with.clone()),
            _ => None,
        });
        if let Some(set_with) = set_with {
            if set_with != *dependency {
                self.device
                    .lock()
                    .unwrap()
                    .violations
                    .push(format!("event {event:?} waited with a different dependency than it was set with"));
            }
        }
        self.push(Recorded::WaitEvent(event, dependency.clone()));
    }

    fn begin_label(&mut self, name: &str) {
        self.push(Recorded::BeginLabel(name.to_owned()));
    }

    fn end_label(&mut self) {
        self.push(Recorded::EndLabel);
    }

    unsafe fn handle(&self) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(self.id)
    }
}

impl Drop for MockCommandStream {
    fn drop(&mut self) {
        let mut state = self.device.lock().unwrap();
        if state.is_pending(self.id) {
            state
                .violations
                .push(format!("stream {:#x} freed while in flight", self.id));
        }
    }
}

/// Fake ids of surface images. Every recreation uses a new range.
pub const SURFACE_IMAGE_BASE: u64 = 0x100;

#[derive(Debug)]
struct SurfaceState {
    image_count: u32,
    next_image_count: u32,
    next: u32,
    out_of_date: bool,
    presenting: bool,
    recreated: usize,
}

/// Output surface handing out its images round-robin.
#[derive(Debug, Clone)]
pub struct MockSurface {
    device: Arc<MockDevice>,
    state: Arc<Mutex<SurfaceState>>,
    images: SurfaceImages,
}

impl MockSurface {
    pub fn new(device: &Arc<MockDevice>, image_count: u32) -> Self {
        let surface = Self {
            device: device.clone(),
            state: Arc::new(Mutex::new(SurfaceState {
                image_count,
                next_image_count: image_count,
                next: 0,
                out_of_date: false,
                presenting: true,
                recreated: 0,
            })),
            images: SurfaceImages::new(),
        };
        surface.publish();
        surface
    }

    /// Surface that cannot present, like an offscreen target.
    pub fn headless(device: &Arc<MockDevice>, image_count: u32) -> Self {
        let surface = Self::new(device, image_count);
        surface.state.lock().unwrap().presenting = false;
        surface
    }

    /// Make acquisition and presentation fail until the surface is recreated.
    pub fn invalidate(&self) {
        self.state.lock().unwrap().out_of_date = true;
    }

    /// Invalidate the surface. After recreation it has `image_count` images.
    pub fn resize(&self, image_count: u32) {
        let mut state = self.state.lock().unwrap();
        state.out_of_date = true;
        state.next_image_count = image_count;
    }

    pub fn recreate_count(&self) -> usize {
        self.state.lock().unwrap().recreated
    }

    pub fn boxed(&self) -> Box<dyn OutputSurface> {
        Box::new(self.clone())
    }

    fn publish(&self) {
        let state = self.state.lock().unwrap();
        let base = SURFACE_IMAGE_BASE * (state.recreated as u64 + 1);
        let images = (0..state.image_count as u64).map(|index| image(base + index)).collect();
        self.images
            .update(images, vk::Format::R8G8B8A8_UNORM, EXTENT)
            .unwrap();
    }
}

impl OutputSurface for MockSurface {
    fn image_count(&self) -> u32 {
        self.state.lock().unwrap().image_count
    }

    fn acquire_next_image(&mut self, _semaphore: vk::Semaphore, fence: vk::Fence) -> Result<u32> {
        let image = {
            let mut state = self.state.lock().unwrap();
            if state.out_of_date {
                return Err(Error::SwapchainOutOfDate.into());
            }
            let image = state.next;
            state.next = (state.next + 1) % state.image_count;
            image
        };
        self.device.acquire(image, fence);
        Ok(image)
    }

    fn present(&self, _queue: vk::Queue, image_index: u32, _wait: &[vk::Semaphore]) -> Result<()> {
        if self.state.lock().unwrap().out_of_date {
            return Err(Error::SwapchainOutOfDate.into());
        }
        self.device.present(image_index);
        Ok(())
    }

    fn supports_presenting(&self) -> bool {
        self.state.lock().unwrap().presenting
    }

    fn recreate(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.out_of_date = false;
            state.image_count = state.next_image_count;
            state.next = 0;
            state.recreated += 1;
        }
        self.publish();
        Ok(())
    }

    fn surface_images(&self) -> SurfaceImages {
        self.images.clone()
    }
}

/// Graph with one operation clearing the surface image and leaving it presentable.
pub fn present_graph(device: &Arc<MockDevice>, surface: &MockSurface, frames_in_flight: usize) -> Result<RenderGraph> {
    let mut connections = ConnectionSet::new();
    let target = connections.add_resource("swapchain", SwapchainImageResource::new(surface.surface_images()));
    let clear = connections.add_operation(
        "clear",
        OperationBuilder::new()
            .swapchain_layouts(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
            .build(),
    );
    connections.write(clear, target)?;

    let mut graph = RenderGraph::new();
    graph.compile(GraphSettings::new(device.shared(), frames_in_flight, connections))?;
    Ok(graph)
}

/// The error behind an `anyhow` error, if it is a deimos error.
pub fn deimos_error(err: &anyhow::Error) -> Option<&Error> {
    err.downcast_ref::<Error>()
}

/// Tiny deterministic generator for building pseudo-random graphs.
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}
