//! Feathered lip-region blending.

use image::{Rgba, RgbaImage};
use tphoto_models::{LipCoordinates, ModelResult};

/// Smallest accepted feather radius in pixels.
pub const MIN_FEATHER_PX: f32 = 5.0;

/// Largest accepted feather radius in pixels.
pub const MAX_FEATHER_PX: f32 = 10.0;

/// Clamp a feather radius into `[5, 10]` pixels. NaN maps to the minimum.
pub fn clamp_feather_radius(px: f32) -> f32 {
    if px.is_nan() {
        MIN_FEATHER_PX
    } else {
        px.clamp(MIN_FEATHER_PX, MAX_FEATHER_PX)
    }
}

/// Hermite smoothstep of `x` between `edge0` and `edge1`.
pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Blends a decoded video frame into the lip rectangle of a poster image.
///
/// For each poster pixel `p` the signed distance `d` to the nearest lip
/// edge is taken in normalized space, positive inside. The result is
/// `lerp(poster, video, smoothstep(0, feather, d) * video_alpha)`.
/// Pixels outside the lip rectangle are never written.
pub trait Compositor: Send + Sync {
    /// Returns the number of poster pixels that were blended.
    fn composite(
        &self,
        poster: &mut RgbaImage,
        video: &RgbaImage,
        lip: &LipCoordinates,
        feather_radius_norm: f64,
    ) -> ModelResult<u64>;
}

/// CPU implementation with nearest-neighbour video sampling.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCompositor;

impl Compositor for SoftwareCompositor {
    fn composite(
        &self,
        poster: &mut RgbaImage,
        video: &RgbaImage,
        lip: &LipCoordinates,
        feather_radius_norm: f64,
    ) -> ModelResult<u64> {
        let (pw, ph) = poster.dimensions();
        let (vw, vh) = video.dimensions();
        let rect = lip.to_pixels(pw as f64, ph as f64)?;
        if vw == 0 || vh == 0 || lip.width <= 0.0 || lip.height <= 0.0 {
            return Ok(0);
        }

        let (x0, y0, x1, y1) = rect.clamped_bounds(pw, ph);
        let mut blended = 0u64;

        for py in y0..y1 {
            let ny = (py as f64 + 0.5) / ph as f64;
            for px in x0..x1 {
                let nx = (px as f64 + 0.5) / pw as f64;
                let distance = lip.signed_edge_distance(nx, ny);
                let edge_alpha = smoothstep(0.0, feather_radius_norm, distance);
                if edge_alpha <= 0.0 {
                    continue;
                }

                let u = ((nx - lip.x) / lip.width).clamp(0.0, 1.0);
                let v = ((ny - lip.y) / lip.height).clamp(0.0, 1.0);
                let vx = ((u * vw as f64) as u32).min(vw - 1);
                let vy = ((v * vh as f64) as u32).min(vh - 1);
                let src = video.get_pixel(vx, vy);

                let alpha = edge_alpha * (src[3] as f64 / 255.0);
                if alpha <= 0.0 {
                    continue;
                }
                let dst = poster.get_pixel_mut(px, py);
                *dst = blend(dst, src, alpha);
                blended += 1;
            }
        }

        Ok(blended)
    }
}

fn blend(dst: &Rgba<u8>, src: &Rgba<u8>, alpha: f64) -> Rgba<u8> {
    let lerp = |a: u8, b: u8| -> u8 {
        let v = a as f64 + (b as f64 - a as f64) * alpha;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        lerp(dst[0], src[0]),
        lerp(dst[1], src[1]),
        lerp(dst[2], src[2]),
        dst[3],
    ])
}
