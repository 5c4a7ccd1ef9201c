//! Pixel geometry for containers and their parents

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width and height in host pixels. Zero means "not known yet".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Size { width, height }
    }

    /// True if either dimension is zero
    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Debug for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rectangle in the parent's coordinate space
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[inline]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering `size`
    #[inline]
    pub fn from_size(size: Size) -> Self {
        Rect::new(0, 0, size.width, size.height)
    }

    #[inline]
    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size().is_empty()
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Layout a container should have for one frame
///
/// Recomputed every frame from the control channel's target size and the
/// parent's current bounds; never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTarget {
    /// Exact size to measure to (skipped when empty)
    pub measure: Size,
    /// Frame to lay out at: the parent's full bounds, origin at its top-left
    pub frame: Rect,
}

impl LayoutTarget {
    /// Derive the target from the requested size and the parent bounds
    pub fn derive(requested: Size, parent: Rect) -> Self {
        LayoutTarget {
            measure: requested,
            frame: Rect::from_size(parent.size()),
        }
    }

    /// Should the container be remeasured?
    #[inline]
    pub fn should_measure(&self) -> bool {
        !self.measure.is_empty()
    }

    /// Should the container be forced onto the parent's bounds?
    #[inline]
    pub fn should_fill(&self) -> bool {
        !self.frame.is_empty()
    }
}
