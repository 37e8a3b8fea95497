//! Lip-region renderer.

use image::RgbaImage;
use tracing::debug;

use tphoto_media::FrameSurface;
use tphoto_models::{LipCoordinates, PixelRect};

use crate::compositor::{clamp_feather_radius, Compositor, SoftwareCompositor};
use crate::coordinator::RenderTransform;
use crate::error::{RenderError, RenderResult};

/// What a call to [`LipRegionRenderer::render`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A frame was blended into the poster.
    Composited { frame_seq: u64, pixels: u64 },
    /// The decoder has not produced a frame yet.
    NoFrame,
    /// The poster is off screen or behind the camera.
    Hidden,
}

/// Draws decoded video into the lip rectangle of a poster image.
///
/// The renderer owns the [`FrameSurface`] the decoder writes to. The
/// normalized lip rectangle is the source of truth; its pixel projection
/// is recomputed whenever the coordinates or the poster size change.
pub struct LipRegionRenderer {
    lip: LipCoordinates,
    poster_width: u32,
    poster_height: u32,
    pixel_rect: PixelRect,
    feather_radius_px: f32,
    transform: Option<RenderTransform>,
    surface: FrameSurface,
    compositor: Box<dyn Compositor>,
}

impl LipRegionRenderer {
    pub fn new(
        lip: LipCoordinates,
        poster_width: u32,
        poster_height: u32,
        feather_radius_px: f32,
    ) -> RenderResult<Self> {
        Self::with_compositor(
            lip,
            poster_width,
            poster_height,
            feather_radius_px,
            Box::new(SoftwareCompositor),
        )
    }

    pub fn with_compositor(
        lip: LipCoordinates,
        poster_width: u32,
        poster_height: u32,
        feather_radius_px: f32,
        compositor: Box<dyn Compositor>,
    ) -> RenderResult<Self> {
        let pixel_rect = project(&lip, poster_width, poster_height)?;
        Ok(Self {
            lip,
            poster_width,
            poster_height,
            pixel_rect,
            feather_radius_px: clamp_feather_radius(feather_radius_px),
            transform: None,
            surface: FrameSurface::new(),
            compositor,
        })
    }

    pub fn lip_coordinates(&self) -> &LipCoordinates {
        &self.lip
    }

    pub fn set_lip_coordinates(&mut self, lip: LipCoordinates) -> RenderResult<()> {
        self.pixel_rect = project(&lip, self.poster_width, self.poster_height)?;
        self.lip = lip;
        Ok(())
    }

    pub fn poster_dimensions(&self) -> (u32, u32) {
        (self.poster_width, self.poster_height)
    }

    pub fn set_poster_dimensions(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.pixel_rect = project(&self.lip, width, height)?;
        self.poster_width = width;
        self.poster_height = height;
        debug!(width, height, "Poster dimensions changed");
        Ok(())
    }

    /// Lip rectangle in poster pixels.
    pub fn pixel_rect(&self) -> PixelRect {
        self.pixel_rect
    }

    pub fn feather_radius_px(&self) -> f32 {
        self.feather_radius_px
    }

    pub fn set_feather_radius(&mut self, px: f32) {
        self.feather_radius_px = clamp_feather_radius(px);
    }

    /// Feather radius relative to the shorter poster side.
    pub fn feather_radius_normalized(&self) -> f64 {
        self.feather_radius_px as f64 / self.poster_width.min(self.poster_height) as f64
    }

    pub fn set_transform(&mut self, transform: RenderTransform) {
        self.transform = Some(transform);
    }

    pub fn transform(&self) -> Option<&RenderTransform> {
        self.transform.as_ref()
    }

    /// Draw target for the decoder.
    pub fn surface(&self) -> FrameSurface {
        self.surface.clone()
    }

    /// Composite the latest decoded frame over `poster`.
    ///
    /// A poster image whose size differs from the configured one updates
    /// the configured dimensions first.
    pub fn render(&mut self, poster: &mut RgbaImage) -> RenderResult<RenderOutcome> {
        if let Some(transform) = &self.transform {
            if !transform.is_visible {
                return Ok(RenderOutcome::Hidden);
            }
        }

        let (width, height) = poster.dimensions();
        if (width, height) != (self.poster_width, self.poster_height) {
            self.set_poster_dimensions(width, height)?;
        }

        let Some((frame_seq, frame)) = self.surface.latest() else {
            return Ok(RenderOutcome::NoFrame);
        };

        let pixels = self.compositor.composite(
            poster,
            &frame,
            &self.lip,
            self.feather_radius_normalized(),
        )?;
        Ok(RenderOutcome::Composited { frame_seq, pixels })
    }

    /// Drop the transform and any presented frame.
    pub fn reset(&mut self) {
        self.transform = None;
        self.surface.clear();
    }
}

fn project(lip: &LipCoordinates, width: u32, height: u32) -> RenderResult<PixelRect> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidDimensions { width, height });
    }
    Ok(lip.to_pixels(width as f64, height as f64)?)
}
