//! Math aliases, frame timing and logging setup shared by the renderer

pub mod logging;
pub mod math;
pub mod time;
