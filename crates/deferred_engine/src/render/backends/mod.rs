//! Concrete `GpuDevice` implementations

pub mod headless;

pub use headless::HeadlessDevice;
