//! Compile-time image layout tracking.
//!
//! While recording a frame, the graph remembers every layout each physical image passes through. The
//! history is append-only and the last entry is the layout the image is in at the current point of the
//! stream, which is all the barrier builder needs to know.

use std::collections::HashMap;

use ash::vk;

use crate::core::image::PhysicalImage;
use crate::core::stream::ImageTransition;

/// Ordered list of layouts an image goes through in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutHistory {
    layouts: Vec<vk::ImageLayout>,
}

impl LayoutHistory {
    pub fn new(initial: vk::ImageLayout) -> Self {
        Self {
            layouts: vec![initial],
        }
    }

    pub fn push(&mut self, layout: vk::ImageLayout) {
        self.layouts.push(layout);
    }

    /// The currently tracked layout.
    pub fn last(&self) -> vk::ImageLayout {
        // Never empty, `new` pushes the initial layout.
        self.layouts[self.layouts.len() - 1]
    }

    pub fn as_slice(&self) -> &[vk::ImageLayout] {
        &self.layouts
    }
}

#[derive(Debug, Clone)]
struct TrackedImage {
    image: PhysicalImage,
    history: LayoutHistory,
    steady_state: vk::ImageLayout,
}

/// Layout histories of every image touched while recording one frame.
#[derive(Debug, Clone, Default)]
pub struct LayoutTracker {
    images: HashMap<vk::Image, TrackedImage>,
    order: Vec<vk::Image>,
}

impl LayoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an image. Images already tracked are left untouched.
    pub fn track(&mut self, image: PhysicalImage, initial: vk::ImageLayout, steady_state: vk::ImageLayout) {
        if self.images.contains_key(&image.handle) {
            return;
        }
        self.order.push(image.handle);
        self.images.insert(
            image.handle,
            TrackedImage {
                image,
                history: LayoutHistory::new(initial),
                steady_state,
            },
        );
    }

    pub fn current(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.images.get(&image).map(|tracked| tracked.history.last())
    }

    pub fn history(&self, image: vk::Image) -> Option<&LayoutHistory> {
        self.images.get(&image).map(|tracked| &tracked.history)
    }

    /// Move an image to `layout`, returning the transition to record if the layout changes.
    pub fn transition(&mut self, image: vk::Image, layout: vk::ImageLayout) -> Option<ImageTransition> {
        let tracked = self.images.get_mut(&image)?;
        let old_layout = tracked.history.last();
        if old_layout == layout {
            return None;
        }
        tracked.history.push(layout);
        Some(ImageTransition {
            image: tracked.image,
            old_layout,
            new_layout: layout,
        })
    }

    /// Record that commands left an image in `layout` without an explicit barrier.
    pub fn advance(&mut self, image: vk::Image, layout: vk::ImageLayout) {
        if let Some(tracked) = self.images.get_mut(&image) {
            if tracked.history.last() != layout {
                tracked.history.push(layout);
            }
        }
    }

    /// Transitions returning every tracked image to its steady-state layout, in tracking order.
    pub fn restore(&mut self) -> Vec<ImageTransition> {
        let mut transitions = Vec::new();
        for handle in &self.order {
            let Some(tracked) = self.images.get_mut(handle) else {
                continue;
            };
            let old_layout = tracked.history.last();
            if old_layout != tracked.steady_state {
                tracked.history.push(tracked.steady_state);
                transitions.push(ImageTransition {
                    image: tracked.image,
                    old_layout,
                    new_layout: tracked.steady_state,
                });
            }
        }
        transitions
    }
}
