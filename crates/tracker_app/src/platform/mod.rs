mod app;
mod config;
mod logging;
mod render;

pub use app::run;
