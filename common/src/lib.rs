pub mod config;
pub mod event;
pub mod frame;
pub mod motion;
pub mod zone;
