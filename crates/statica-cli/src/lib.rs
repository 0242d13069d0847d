//! statica CLI library - shared functionality for testing and binary.

pub mod bench;
pub mod inspect;
pub mod run;
pub mod synth;

use anyhow::{Context, Result};
use statica_runtime::{Accelerator, GpuAccelerator, HostAccelerator};
use std::sync::Arc;

/// Accelerator to run plans on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Device {
    /// Simulated device on the CPU
    Host,
    /// First available GPU through wgpu
    Gpu,
}

impl Device {
    /// Initialize the accelerator.
    pub fn open(self) -> Result<Arc<dyn Accelerator>> {
        Ok(match self {
            Device::Host => Arc::new(HostAccelerator::new()),
            Device::Gpu => {
                Arc::new(GpuAccelerator::new_blocking().context("Failed to initialize GPU")?)
            }
        })
    }
}
