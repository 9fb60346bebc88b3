mod routes;

pub mod app;
pub mod camera;
pub mod config;
pub mod engine;
pub mod frame;
pub mod gate;
pub mod history;
pub mod model;
pub mod ranking;
pub mod scan;
pub mod server;
pub mod telemetry;

pub use app::start_app;
