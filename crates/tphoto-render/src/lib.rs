//! Lip-region overlay rendering.
//!
//! - [`Compositor`] blends a video frame into the lip rectangle of a poster
//!   image with a smoothstep edge feather
//! - [`LipRegionRenderer`] owns the lip geometry, the decoder surface and the
//!   current screen transform
//! - [`RenderCoordinator`] projects the poster anchor through the camera

pub mod compositor;
pub mod coordinator;
pub mod error;
pub mod renderer;

pub use compositor::{clamp_feather_radius, smoothstep, Compositor, SoftwareCompositor};
pub use coordinator::{CameraPose, RenderCoordinator, RenderTransform, Viewport};
pub use error::{RenderError, RenderResult};
pub use renderer::{LipRegionRenderer, RenderOutcome};
