use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use ash::vk::Handle;

use deimos::prelude::*;
use framework::*;

mod framework;

fn acquired(device: &MockDevice) -> Vec<u32> {
    device
        .log()
        .into_iter()
        .filter_map(|event| match event {
            DeviceEvent::Acquire(image) => Some(image),
            _ => None,
        })
        .collect()
}

fn presented(device: &MockDevice) -> Vec<u32> {
    device
        .log()
        .into_iter()
        .filter_map(|event| match event {
            DeviceEvent::Present(image) => Some(image),
            _ => None,
        })
        .collect()
}

fn submitted_streams(device: &MockDevice) -> Vec<u64> {
    device
        .submits()
        .into_iter()
        .filter_map(|event| match event {
            DeviceEvent::Submit {
                stream, ..
            } => Some(stream),
            _ => None,
        })
        .collect()
}

fn render_frames(renderer: &mut dyn Renderer, graph: &RenderGraph, count: usize) -> Result<Vec<u32>> {
    (0..count)
        .map(|_| renderer.render_next_frame(graph, &mut NoFrameDisplayObserver))
        .collect()
}

#[test]
fn three_frames_three_images() -> Result<()> {
    init_logging();
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 3);
    let graph = present_graph(&device, &surface, 3)?;
    device.clear_log();

    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 3)?;
    let images = render_frames(&mut renderer, &graph, 6)?;
    assert_eq!(images, vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(presented(&device), vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(renderer.next_render_resource_index(), 0);

    renderer.wait()?;
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn reused_image_waits_for_previous_frame() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let graph = present_graph(&device, &surface, 4)?;
    device.clear_log();

    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 4)?;
    let images = render_frames(&mut renderer, &graph, 4)?;
    assert_eq!(images, vec![0, 1, 0, 1]);
    assert_eq!(acquired(&device), vec![0, 1, 0, 1]);

    // Frame 2 renders to image 0 again, so frame 0 must have finished before it is submitted.
    let first_fence = renderer.frame_fence(0).unwrap().handle();
    let log = device.log();
    let submits = log
        .iter()
        .enumerate()
        .filter(|(_, event)| matches!(event, DeviceEvent::Submit { .. }))
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    assert_eq!(submits.len(), 4);
    let waited = log[submits[0]..submits[2]]
        .iter()
        .any(|event| *event == DeviceEvent::FenceWait(first_fence));
    assert!(waited, "frame 2 was submitted without waiting for frame 0: {log:?}");

    renderer.wait()?;
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn frame_slots_never_overlap() -> Result<()> {
    for (frames, images) in [(1, 1), (2, 1), (2, 2), (3, 2), (3, 3), (4, 2), (4, 3)] {
        let device = MockDevice::new();
        let surface = MockSurface::new(&device, images);
        let graph = present_graph(&device, &surface, frames)?;
        device.clear_log();

        let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), frames)?;
        render_frames(&mut renderer, &graph, 10)?;
        renderer.wait()?;
        assert!(
            device.violations().is_empty(),
            "{frames} frames over {images} images: {:?}",
            device.violations()
        );

        // Streams are submitted round-robin over the frame slots.
        let streams = submitted_streams(&device);
        assert_eq!(streams.len(), 10);
        for (index, stream) in streams.iter().enumerate() {
            assert_eq!(*stream, streams[index % frames]);
        }
        let distinct = streams[..frames].iter().collect::<std::collections::HashSet<_>>();
        assert_eq!(distinct.len(), frames);
    }
    Ok(())
}

#[test]
fn too_few_frames_in_flight() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 3);
    let err = SynchronizedRenderer::new(device.shared(), surface.boxed(), 2).unwrap_err();
    assert!(matches!(
        deimos_error(&err),
        Some(Error::TooFewFramesInFlight {
            images: 3,
            frames: 2
        })
    ));
    Ok(())
}

#[test]
fn renderer_fences_are_named() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 2)?;
    assert_eq!(renderer.frames_in_flight(), 2);
    let fence = renderer.frame_fence(1).unwrap().handle();
    assert_eq!(device.object_name(fence.as_raw()).as_deref(), Some("in flight fence 1"));
    assert_eq!(
        device.object_name(renderer.acquisition_fence().handle().as_raw()).as_deref(),
        Some("acquisition fence")
    );
    assert!(renderer.frame_fence(2).is_none());
    assert_eq!(device.live_fences(), 3);
    assert_eq!(device.live_semaphores(), 4);

    drop(renderer);
    assert_eq!(device.live_fences(), 0);
    assert_eq!(device.live_semaphores(), 0);
    Ok(())
}

#[test]
fn blocking_renderer_waits_for_idle() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let graph = present_graph(&device, &surface, 2)?;
    device.clear_log();

    let mut renderer = BlockingRenderer::new(device.shared(), surface.boxed())?;
    let images = render_frames(&mut renderer, &graph, 4)?;
    assert_eq!(images, vec![0, 1, 0, 1]);
    assert_eq!(renderer.next_render_resource_index(), 0);

    // Every submission is followed by an idle wait before the image is presented.
    let log = device.log();
    for (index, event) in log.iter().enumerate() {
        if let DeviceEvent::Present(_) = event {
            let submit = log[..index]
                .iter()
                .rposition(|event| matches!(event, DeviceEvent::Submit { .. }))
                .unwrap();
            assert!(log[submit..index].contains(&DeviceEvent::DeviceIdle));
        }
    }
    assert_eq!(presented(&device), vec![0, 1, 0, 1]);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn out_of_date_surface_is_recreated() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let mut graph = present_graph(&device, &surface, 3)?;
    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 3)?;
    render_frames(&mut renderer, &graph, 2)?;

    surface.invalidate();
    let err = renderer.render_next_frame(&graph, &mut NoFrameDisplayObserver).unwrap_err();
    assert!(matches!(deimos_error(&err), Some(Error::SwapchainOutOfDate)));

    renderer.recreate(&mut graph)?;
    assert_eq!(surface.recreate_count(), 1);
    assert!(graph.is_compiled());
    assert_eq!(graph.frames_in_flight(), 3);
    assert_eq!(renderer.next_render_resource_index(), 0);

    // The recompiled graph renders to the new surface images.
    let recreated = image(SURFACE_IMAGE_BASE * 2).handle;
    assert!(graph.layout_history(0, recreated).is_some());
    assert!(graph.layout_history(0, image(SURFACE_IMAGE_BASE).handle).is_none());

    device.clear_log();
    let images = render_frames(&mut renderer, &graph, 3)?;
    assert_eq!(images, vec![0, 1, 0]);
    renderer.wait()?;
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn recreate_with_more_images() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let mut graph = present_graph(&device, &surface, 3)?;
    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 3)?;
    render_frames(&mut renderer, &graph, 4)?;

    surface.resize(3);
    surface.invalidate();
    assert!(renderer.render_next_frame(&graph, &mut NoFrameDisplayObserver).is_err());
    renderer.recreate(&mut graph)?;
    assert_eq!(renderer.surface().image_count(), 3);
    assert_eq!(render_frames(&mut renderer, &graph, 4)?, vec![0, 1, 2, 0]);
    renderer.wait()?;
    assert!(device.violations().is_empty(), "{:?}", device.violations());

    surface.resize(4);
    surface.invalidate();
    assert!(renderer.render_next_frame(&graph, &mut NoFrameDisplayObserver).is_err());
    let err = renderer.recreate(&mut graph).unwrap_err();
    assert!(matches!(
        deimos_error(&err),
        Some(Error::TooFewFramesInFlight {
            images: 4,
            frames: 3
        })
    ));
    Ok(())
}

#[test]
fn blocking_renderer_follows_image_count() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let mut graph = present_graph(&device, &surface, 2)?;
    let mut renderer = BlockingRenderer::new(device.shared(), surface.boxed())?;
    render_frames(&mut renderer, &graph, 1)?;

    surface.resize(3);
    surface.invalidate();
    renderer.recreate(&mut graph)?;
    assert_eq!(graph.frames_in_flight(), 3);
    assert_eq!(renderer.next_render_resource_index(), 0);
    assert_eq!(render_frames(&mut renderer, &graph, 3)?, vec![0, 1, 2]);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn conditional_draw_callback_stops() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let graph = present_graph(&device, &surface, 2)?;
    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 2)?;
    device.clear_log();

    let mut iterations = 0;
    {
        let mut calls = 0;
        let mut draw = renderer.conditional_draw_callback(&graph, move || {
            calls += 1;
            calls > 3
        });
        let mut stop = false;
        while !stop {
            draw(&mut stop)?;
            iterations += 1;
        }
    }
    assert_eq!(iterations, 4);
    assert_eq!(presented(&device).len(), 3);

    {
        let mut draw = renderer.infinite_draw_callback(&graph);
        let mut stop = true;
        for _ in 0..5 {
            draw(&mut stop)?;
            assert!(!stop);
        }
    }
    assert_eq!(presented(&device).len(), 8);
    renderer.wait()?;
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[derive(Default)]
struct RecordingObserver {
    events: Vec<String>,
}

impl FrameDisplayObserver for RecordingObserver {
    fn on_image_fence_wait_started(&mut self, frame: usize) {
        self.events.push(format!("fence wait started {frame}"));
    }

    fn on_image_fence_wait_ended(&mut self, frame: usize) {
        self.events.push(format!("fence wait ended {frame}"));
    }

    fn on_image_acquisition_started(&mut self) {
        self.events.push(String::from("acquisition started"));
    }

    fn on_image_acquisition_returned(&mut self, image: u32) {
        self.events.push(format!("acquisition returned {image}"));
    }

    fn on_image_acquisition_fence_signaled(&mut self, image: u32) {
        self.events.push(format!("acquisition fence signaled {image}"));
    }

    fn on_image_acquisition_ended(&mut self, image: u32) {
        self.events.push(format!("acquisition ended {image}"));
    }

    fn on_render_started(&mut self, frame: usize) {
        self.events.push(format!("render started {frame}"));
    }

    fn on_present_started(&mut self, image: u32) {
        self.events.push(format!("present started {image}"));
    }
}

#[test]
fn observer_sees_every_step() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let graph = present_graph(&device, &surface, 2)?;

    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 2)?;
    let mut observer = RecordingObserver::default();
    renderer.render_next_frame(&graph, &mut observer)?;
    renderer.render_next_frame(&graph, &mut observer)?;
    assert_eq!(
        observer.events[8..],
        [
            "fence wait started 1",
            "fence wait ended 1",
            "acquisition started",
            "acquisition returned 1",
            "acquisition fence signaled 1",
            "acquisition ended 1",
            "render started 1",
            "present started 1",
        ]
    );
    renderer.wait()?;

    let mut blocking = BlockingRenderer::new(device.shared(), surface.boxed())?;
    let mut observer = RecordingObserver::default();
    blocking.render_next_frame(&graph, &mut observer)?;
    assert_eq!(
        observer.events,
        [
            "acquisition started",
            "acquisition returned 0",
            "acquisition ended 0",
            "render started 0",
            "present started 0",
        ]
    );
    Ok(())
}

#[test]
fn pre_submit_callbacks_see_frame_slots() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 3);
    let graph = present_graph(&device, &surface, 3)?;
    let started = Instant::now();
    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 3)?;

    let frames = Arc::new(Mutex::new(Vec::new()));
    let deltas = Arc::new(Mutex::new(Vec::new()));
    renderer.on_pre_submit(Box::new({
        let frames = frames.clone();
        let deltas = deltas.clone();
        move |graph: &RenderGraph, frame: usize, delta: Duration| {
            assert!(graph.is_compiled());
            frames.lock().unwrap().push(frame);
            deltas.lock().unwrap().push(delta);
        }
    }));
    let submits_seen = Arc::new(Mutex::new(Vec::new()));
    renderer.on_pre_submit(Box::new({
        let submits_seen = submits_seen.clone();
        let device = device.clone();
        move |_: &RenderGraph, _: usize, _: Duration| {
            submits_seen.lock().unwrap().push(device.submits().len());
        }
    }));

    let pause = Duration::from_millis(30);
    for _ in 0..4 {
        std::thread::sleep(pause);
        renderer.render_next_frame(&graph, &mut NoFrameDisplayObserver)?;
    }
    let total = started.elapsed();

    assert_eq!(*frames.lock().unwrap(), vec![0, 1, 2, 0]);
    // Callbacks run before the frame is submitted.
    assert_eq!(*submits_seen.lock().unwrap(), vec![0, 1, 2, 3]);

    // Each callback gets the time since the previous frame, not the time since the renderer started.
    let deltas = deltas.lock().unwrap();
    assert_eq!(deltas.len(), 4);
    assert!(deltas.iter().all(|delta| *delta >= pause), "{deltas:?}");
    assert!(deltas.iter().sum::<Duration>() <= total, "{deltas:?} exceed {total:?}");
    renderer.wait()?;
    Ok(())
}

#[test]
fn count_limited_draw_callback_stops_on_last_frame() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let graph = present_graph(&device, &surface, 2)?;
    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 2)?;
    device.clear_log();

    {
        let mut draw = renderer.count_limited_draw_callback(&graph, 3);
        let mut stop = false;
        let mut flags = Vec::new();
        while !stop {
            draw(&mut stop)?;
            flags.push(stop);
            assert_eq!(device.submits().len(), flags.len());
        }
        assert_eq!(flags, vec![false, false, true]);

        // Past the limit nothing more is drawn.
        draw(&mut stop)?;
        assert!(stop);
    }
    assert_eq!(device.submits().len(), 3);
    assert_eq!(presented(&device), vec![0, 1, 0]);

    {
        let mut draw = renderer.count_limited_draw_callback(&graph, 0);
        let mut stop = false;
        draw(&mut stop)?;
        assert!(stop);
    }
    assert_eq!(device.submits().len(), 3);
    renderer.wait()?;
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn graph_with_other_frame_count_is_rejected() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let graph = present_graph(&device, &surface, 2)?;
    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 4)?;
    device.clear_log();

    let err = renderer.render_next_frame(&graph, &mut NoFrameDisplayObserver).unwrap_err();
    assert!(matches!(
        deimos_error(&err),
        Some(Error::FrameCountMismatch {
            graph: 2,
            renderer: 4
        })
    ));
    assert!(device.submits().is_empty());

    // No slot fence was reset, so waiting on the renderer cannot hang.
    for frame in 0..4 {
        let fence = renderer.frame_fence(frame).unwrap().handle();
        assert_eq!(device.fence_state(fence), Some(FenceState::Signaled));
    }
    renderer.wait()?;
    assert!(device.violations().is_empty(), "{:?}", device.violations());

    let mut blocking = BlockingRenderer::new(device.shared(), MockSurface::new(&device, 3).boxed())?;
    let err = blocking.render_next_frame(&graph, &mut NoFrameDisplayObserver).unwrap_err();
    assert!(matches!(
        deimos_error(&err),
        Some(Error::FrameCountMismatch {
            graph: 2,
            renderer: 3
        })
    ));
    Ok(())
}

#[test]
fn headless_surface_skips_presentation() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::headless(&device, 2);
    let graph = present_graph(&device, &surface, 2)?;
    device.clear_log();

    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 2)?;
    assert_eq!(render_frames(&mut renderer, &graph, 3)?, vec![0, 1, 0]);
    assert!(presented(&device).is_empty());
    for event in device.submits() {
        if let DeviceEvent::Submit {
            signal, ..
        } = event
        {
            assert!(signal.is_empty());
        }
    }

    let err = graph.present(0, &surface, &[]).unwrap_err();
    assert!(matches!(deimos_error(&err), Some(Error::NoPresentQueue)));
    renderer.wait()?;
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn device_failure_propagates() -> Result<()> {
    let device = MockDevice::new();
    let surface = MockSurface::new(&device, 2);
    let graph = present_graph(&device, &surface, 2)?;
    let mut renderer = SynchronizedRenderer::new(device.shared(), surface.boxed(), 2)?;
    render_frames(&mut renderer, &graph, 1)?;

    device.fail_submissions();
    let err = renderer.render_next_frame(&graph, &mut NoFrameDisplayObserver).unwrap_err();
    assert!(matches!(deimos_error(&err), Some(Error::VkError(vk::Result::ERROR_DEVICE_LOST))));
    assert_eq!(presented(&device).len(), 1);
    Ok(())
}
