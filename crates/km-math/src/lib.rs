//! Kiln monitor math utilities.
//!
//! Everything here works on plain `&[f64]` series. Time axes are expected to
//! be non-decreasing; resampled grids are strictly increasing.

pub mod error;
pub mod math;

pub use error::{MathError, Result};
pub use math::calculus::*;
pub use math::grid::*;
pub use math::smooth::*;
pub use math::window::*;
