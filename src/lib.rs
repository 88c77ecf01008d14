//! Slide-to-unlock control driven by a touchscreen or pointer via evdev.

pub mod actions;
pub mod cli;
pub mod config;
pub mod control;
pub mod frame;
pub mod gesture;
pub mod input;
pub mod ipc;
pub mod logging;
pub mod observer;
pub mod slider;
pub mod track;
