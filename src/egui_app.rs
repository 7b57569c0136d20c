//! egui presenter: state, controller and rendering.

pub mod controller;
pub mod state;
pub mod ui;
