//! Rendering of research reports for humans and other tools.

pub mod generator;

pub use generator::*;
