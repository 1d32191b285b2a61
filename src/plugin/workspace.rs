//! Workspace sizing and the scratch arena carved out of it
//!
//! The host allocates one workspace buffer per configured operator, sized for
//! the largest problem it will ever see. Every enqueue splits that buffer into
//! the same two named regions:
//!
//! ```text
//! offset 0                 M*K*elem                       M*K*elem + gemm
//! | pre_scaled_activations | gemm_scratch                 |
//! ```
//!
//! [`ScratchPlan`] is the single source of those sizes, used both when sizing
//! (max shapes) and when carving (actual shapes), so the two cannot drift.

use crate::error::{Error, Result};
use crate::kernels::GroupwiseGemm;

/// Region holding activations after per-channel pre-scaling.
pub const PRE_SCALED_REGION: &str = "pre_scaled_activations";
/// Region handed to the GEMM kernel as private scratch.
pub const GEMM_SCRATCH_REGION: &str = "gemm_scratch";

/// Byte sizes of the workspace regions for one problem shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchPlan {
    pub pre_scaled_bytes: usize,
    pub gemm_scratch_bytes: usize,
}

impl ScratchPlan {
    /// Plan for an `[M, K] x [K, N]` problem with `elem`-byte activations.
    ///
    /// The pre-scaled region is always reserved, whether or not the operator
    /// pre-scales, so the GEMM scratch offset depends on the shape only.
    pub fn new(m: usize, n: usize, k: usize, elem: usize, gemm: &dyn GroupwiseGemm) -> Self {
        Self {
            pre_scaled_bytes: m * k * elem,
            gemm_scratch_bytes: gemm.workspace_size(m, n, k),
        }
    }

    /// Byte offset of the GEMM scratch region.
    pub fn gemm_scratch_offset(&self) -> usize {
        self.pre_scaled_bytes
    }

    /// Workspace bytes the whole plan needs.
    pub fn total_bytes(&self) -> usize {
        self.pre_scaled_bytes + self.gemm_scratch_bytes
    }
}

/// A named, exclusively borrowed slice of the workspace.
#[derive(Debug)]
pub struct ScratchRegion<'a> {
    pub name: &'static str,
    pub offset: usize,
    pub bytes: &'a mut [u8],
}

impl ScratchRegion<'_> {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Bump allocator over a caller-owned workspace.
///
/// Regions are split off the front in order, so two regions can never
/// overlap, and a region that does not fit is an error instead of a
/// silent overrun.
#[derive(Debug)]
pub struct ScratchArena<'a> {
    rest: &'a mut [u8],
    offset: usize,
    capacity: usize,
}

impl<'a> ScratchArena<'a> {
    /// Arena over the whole of `workspace`, nothing handed out yet.
    pub fn new(workspace: &'a mut [u8]) -> Self {
        let capacity = workspace.len();
        Self {
            rest: workspace,
            offset: 0,
            capacity,
        }
    }

    /// Size of the underlying workspace.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes already handed out.
    pub fn used(&self) -> usize {
        self.offset
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Take the next `len` bytes as region `name`.
    pub fn take(&mut self, name: &'static str, len: usize) -> Result<ScratchRegion<'a>> {
        if len > self.rest.len() {
            return Err(Error::Workspace {
                reason: format!(
                    "region '{name}' needs {len} bytes at offset {}, workspace holds {}",
                    self.offset, self.capacity
                ),
            });
        }
        let (head, tail) = std::mem::take(&mut self.rest).split_at_mut(len);
        self.rest = tail;
        let region = ScratchRegion {
            name,
            offset: self.offset,
            bytes: head,
        };
        self.offset += len;
        Ok(region)
    }

    /// Carve both regions of `plan`, checking the whole plan fits first.
    pub fn carve(mut self, plan: &ScratchPlan) -> Result<(ScratchRegion<'a>, ScratchRegion<'a>)> {
        if plan.total_bytes() > self.remaining() {
            return Err(Error::Workspace {
                reason: format!(
                    "workspace holds {} bytes, problem needs {} ({PRE_SCALED_REGION}={}, {GEMM_SCRATCH_REGION}={})",
                    self.capacity,
                    plan.total_bytes(),
                    plan.pre_scaled_bytes,
                    plan.gemm_scratch_bytes
                ),
            });
        }
        let pre_scaled = self.take(PRE_SCALED_REGION, plan.pre_scaled_bytes)?;
        let gemm_scratch = self.take(GEMM_SCRATCH_REGION, plan.gemm_scratch_bytes)?;
        Ok((pre_scaled, gemm_scratch))
    }
}
