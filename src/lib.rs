#[macro_use]
extern crate log;

pub mod app;
pub mod artifacts;
pub mod common;
pub mod desktop;
pub mod fs;
pub mod gateway;
pub mod lifecycle;
pub mod setup;
