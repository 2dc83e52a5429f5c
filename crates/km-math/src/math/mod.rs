//! Core math modules.

pub mod calculus;
pub mod grid;
pub mod smooth;
pub mod window;
