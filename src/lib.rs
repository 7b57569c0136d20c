//! Library exports for reuse in the binary and tests.
/// Application directory helpers.
pub mod app_dirs;
/// Loopback feed for passively captured portal traffic.
pub mod capture_feed;
/// egui presenter modules.
pub mod egui_app;
pub(crate) mod http_client;
/// Logging setup.
pub mod logging;
/// Passive traffic observer.
pub mod observer;
/// Partner portal API surface.
pub mod portal;
/// The request loop controller.
pub mod runner;
/// Session credential resolution.
pub mod session;
/// Persisted key-value settings.
pub mod settings;
