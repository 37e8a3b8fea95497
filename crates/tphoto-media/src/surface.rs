//! Shared draw target between the decoder and the renderer.

use std::sync::{Arc, Mutex};

use image::RgbaImage;

#[derive(Debug, Default)]
struct SurfaceState {
    frame: Option<Arc<RgbaImage>>,
    seq: u64,
}

/// Latest decoded frame, shared by handle.
///
/// The decoder presents frames; the renderer reads the most recent one.
/// Clones refer to the same surface.
#[derive(Debug, Clone, Default)]
pub struct FrameSurface {
    inner: Arc<Mutex<SurfaceState>>,
}

impl FrameSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame. Returns its sequence number (1-based).
    pub fn present(&self, frame: RgbaImage) -> u64 {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.seq += 1;
        state.frame = Some(Arc::new(frame));
        state.seq
    }

    /// Most recent frame and its sequence number.
    pub fn latest(&self) -> Option<(u64, Arc<RgbaImage>)> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.frame.as_ref().map(|f| (state.seq, Arc::clone(f)))
    }

    /// Frames presented so far.
    pub fn frames_presented(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).seq
    }

    /// Drop the current frame; the sequence counter keeps counting.
    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).frame = None;
    }
}
