//! Partner portal API surface.

pub mod api;
