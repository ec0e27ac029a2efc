//! Renderer-agnostic spatial core: a reference-linked node hierarchy, a
//! graph with camera, frustum culling, picking and screen-space gestures,
//! keyframe pose interpolation, and the matrix contract a renderer
//! implements to draw it all.
//!
//! The crate never talks to a window, GPU or clock. The host feeds pointer
//! pixels and frame deltas in, then drives [`Graph::render`] with its own
//! [`MatrixHandler`] (or the bundled [`MatrixStack`]).

pub mod arena;
pub mod constraint;
pub mod error;
pub mod graph;
pub mod ids;
pub mod interpolator;
pub mod matrix_handler;
pub mod node;
pub mod timing;

pub use arena::*;
pub use constraint::*;
pub use error::*;
pub use graph::*;
pub use ids::*;
pub use interpolator::*;
pub use matrix_handler::*;
pub use node::*;
pub use timing::*;
