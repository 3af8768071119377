//! GPU stages for turning a stream of LDR exposures into HDR fusion input.
//!
//! The crate provides two chained render passes plus the bounded frame
//! window that connects them:
//!
//! * [`ExposureLinearizer`] converts one gamma-encoded frame, tagged with
//!   its capture exposure value, into linear light at higher precision
//!   ([`LINEAR_OUTPUT_FORMAT`]).
//! * [`FrameWindow`] keeps the most recent `W` linearized frames in
//!   arrival order without copying texture memory.
//! * [`ExposureStackCompositor`] renders a window snapshot into one tall
//!   texture, stacking the frames vertically so a downstream fusion pass
//!   can read all exposures from a single binding.
//!
//! Stage instances are single-owner: every render entry point takes
//! `&mut self` and the caller must not invoke the same instance
//! concurrently. Each render blocks until the GPU has finished, so the
//! returned texture is always complete.

mod compose;
mod error;
mod gpu;
mod linearize;
mod types;
mod window;

pub use compose::ExposureStackCompositor;
pub use error::StageError;
pub use gpu::context::GpuContext;
pub use gpu::texture::{rgba16f_to_f32, FrameHandle, GpuTexture, LINEAR_OUTPUT_FORMAT};
pub use linearize::ExposureLinearizer;
pub use types::{
    CompositorOptions, LinearizerOptions, DEFAULT_GAMMA, DEFAULT_WINDOW_SIZE, MAX_WINDOW_SLOTS,
};
pub use window::FrameWindow;
