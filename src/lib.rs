pub mod accumulation;
pub mod application;
pub mod camera;
pub mod compute;
pub mod config;
pub mod controls;
pub mod frame;
pub mod hot_reload;
pub mod input;
pub mod kernel;
pub mod renderer;
pub mod scene;
pub mod snapshot;
pub mod util;
