//! Group-wise INT4 GEMM kernels
//!
//! Two implementations share one contract, [`GroupwiseGemm`]:
//!
//! - [`DirectGemv`]: dequantizes each weight word on the fly while
//!   accumulating, no scratch. Suited to memory-bound small batches.
//! - [`TiledGemm`]: dequantizes a K×N panel once into scratch and reuses it
//!   for every row of the batch. Suited to compute-bound large batches.
//!
//! Both compute, for every output element,
//!
//! ```text
//! out[m, n] = sum_k act[m, k] * (q[k, n] * scale[k / g, n] + zero[k / g, n]) + bias[n]
//! ```
//!
//! where `zero` is 0 when no zero-points are given and `bias` is 0 when no
//! bias is given. Which one runs is decided by the caller.

pub mod direct;
pub mod element;
pub mod pre_scale;
pub mod tiled;

pub use direct::DirectGemv;
pub use element::Element;
pub use pre_scale::apply_per_channel_scale;
pub use tiled::TiledGemm;

use crate::error::{Error, Result};
use crate::quant::PACK_FACTOR;
use numr::dtype::DType;

/// Arguments of one GEMM launch. All buffers are row-major and untyped.
#[derive(Debug, Clone, Copy)]
pub struct GemmArgs<'a> {
    /// Storage type of activations, scales, zeros, bias and output
    pub dtype: DType,
    /// `[M, K]`
    pub activations: &'a [u8],
    /// `[K, N/8]` packed INT4 words
    pub qweight: &'a [u8],
    /// `[K/group_size, N]`
    pub scales: &'a [u8],
    /// `[K/group_size, N]`, `None` means all-zero
    pub zeros: Option<&'a [u8]>,
    /// `[N]`, one value per output channel; `None` means no bias
    pub bias: Option<&'a [u8]>,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub group_size: usize,
}

impl GemmArgs<'_> {
    /// Bytes the output buffer must hold.
    pub fn output_bytes(&self) -> usize {
        self.m * self.n * self.dtype.size_in_bytes()
    }

    /// Check every buffer against the problem shape.
    pub fn validate(&self) -> Result<()> {
        if !element::is_element_dtype(self.dtype) {
            return Err(Error::InvalidArgument {
                arg: "dtype",
                reason: format!(
                    "{:?} is not a kernel element type (supported: {:?})",
                    self.dtype,
                    element::ELEMENT_DTYPES
                ),
            });
        }
        let elem = self.dtype.size_in_bytes();
        if self.group_size == 0 || self.k % self.group_size != 0 {
            return Err(Error::InvalidArgument {
                arg: "group_size",
                reason: format!("{} does not divide K={}", self.group_size, self.k),
            });
        }
        if self.n % PACK_FACTOR != 0 {
            return Err(Error::InvalidArgument {
                arg: "n",
                reason: format!("N={} is not a multiple of {PACK_FACTOR}", self.n),
            });
        }
        let groups = self.k / self.group_size;

        check_len("activations", self.activations.len(), self.m * self.k * elem)?;
        check_len("qweight", self.qweight.len(), self.k * (self.n / PACK_FACTOR) * 4)?;
        check_len("scales", self.scales.len(), groups * self.n * elem)?;
        if let Some(zeros) = self.zeros {
            check_len("zeros", zeros.len(), groups * self.n * elem)?;
        }
        if let Some(bias) = self.bias {
            check_len("bias", bias.len(), self.n * elem)?;
        }
        Ok(())
    }
}

pub(crate) fn check_len(arg: &'static str, got: usize, expected: usize) -> Result<()> {
    if got < expected {
        return Err(Error::InvalidArgument {
            arg,
            reason: format!("buffer holds {got} bytes, need {expected}"),
        });
    }
    Ok(())
}

/// A group-wise INT4 GEMM strategy.
pub trait GroupwiseGemm: Send + Sync {
    /// Kernel name, as recorded on the execution queue.
    fn name(&self) -> &'static str;

    /// Scratch bytes this kernel needs for an `[M, K] x [K, N]` problem.
    fn workspace_size(&self, m: usize, n: usize, k: usize) -> usize;

    /// Compute the product into `output` (`[M, N]` elements of `args.dtype`).
    ///
    /// `scratch` must hold at least `workspace_size(m, n, k)` bytes; its
    /// previous contents are ignored.
    fn run(&self, args: &GemmArgs<'_>, output: &mut [u8], scratch: &mut [u8]) -> Result<()>;
}

/// Decoded f32 copies of the per-group tensors shared by both kernels.
pub(crate) struct GroupParams {
    pub scales: Vec<f32>,
    pub zeros: Option<Vec<f32>>,
    pub bias: Option<Vec<f32>>,
}

impl GroupParams {
    pub fn decode(args: &GemmArgs<'_>) -> Self {
        let groups = args.k / args.group_size;
        let elem = args.dtype.size_in_bytes();
        let param_bytes = groups * args.n * elem;
        Self {
            scales: element::decode_elements(args.dtype, &args.scales[..param_bytes]),
            zeros: args
                .zeros
                .map(|z| element::decode_elements(args.dtype, &z[..param_bytes])),
            bias: args
                .bias
                .map(|b| element::decode_elements(args.dtype, &b[..args.n * elem])),
        }
    }

    /// Dequantized weight for column `col` in group `group`.
    #[inline(always)]
    pub fn dequant(&self, q: i8, group: usize, n: usize, col: usize) -> f32 {
        let idx = group * n + col;
        let zero = match &self.zeros {
            Some(z) => z[idx],
            None => 0.0,
        };
        q as f32 * self.scales[idx] + zero
    }

    #[inline(always)]
    pub fn add_bias(&self, row: &mut [f32], col_offset: usize) {
        if let Some(bias) = &self.bias {
            for (v, b) in row.iter_mut().zip(&bias[col_offset..]) {
                *v += b;
            }
        }
    }
}
