//! Execution queues
//!
//! The operator never runs work itself: it submits named kernel launches to a
//! host-provided queue. Launches on one queue run in submission order, which
//! is the only ordering guarantee the operator relies on (pre-scale before the
//! GEMM within one enqueue).

use crate::error::Result;

/// Ordered submission channel for kernel launches.
pub trait ExecutionQueue {
    /// Submit one launch. `launch` runs after everything submitted before it.
    fn submit(&mut self, kernel: &'static str, launch: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Host queue: runs each launch at submission and keeps a log of kernel names.
#[derive(Debug, Default)]
pub struct CpuQueue {
    launches: Vec<&'static str>,
}

impl CpuQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kernel names in the order they were submitted.
    pub fn launches(&self) -> &[&'static str] {
        &self.launches
    }

    /// Drain the launch log.
    pub fn take_launches(&mut self) -> Vec<&'static str> {
        std::mem::take(&mut self.launches)
    }
}

impl ExecutionQueue for CpuQueue {
    fn submit(&mut self, kernel: &'static str, launch: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        log::trace!("cpu queue: launching {kernel}");
        launch()?;
        self.launches.push(kernel);
        Ok(())
    }
}
