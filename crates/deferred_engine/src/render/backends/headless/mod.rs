//! Headless device
//!
//! A complete [`GpuDevice`](crate::render::api::GpuDevice) that keeps all
//! state on the CPU. It tracks every resource, records every command,
//! executes the cluster compute kernels in software and reports storage
//! buffer accesses that are not ordered by a memory barrier. Used by the
//! test suite and by the demo when no window is available.

mod compute;
mod device;

pub use device::{Command, HeadlessDevice, LifecycleEvent, StorageHazard};
