//! Tensor-level entry point to the group-wise quantized matmul
//!
//! [`GroupwiseMatmulOps`] is implemented on numr clients so callers that
//! already hold tensors can run the operator without touching descriptors,
//! workspaces or queues.

mod cpu;

use crate::error::Result;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Optional tensors of a group-wise quantized matmul.
pub struct GroupwiseOptionals<'a, R: Runtime> {
    /// `[K]`, multiplied into activations before the matmul
    pub pre_quant_scale: Option<&'a Tensor<R>>,
    /// `[K/group_size, N]`
    pub zeros: Option<&'a Tensor<R>>,
    /// `[N]`
    pub bias: Option<&'a Tensor<R>>,
}

impl<R: Runtime> Default for GroupwiseOptionals<'_, R> {
    fn default() -> Self {
        Self {
            pre_quant_scale: None,
            zeros: None,
            bias: None,
        }
    }
}

impl<R: Runtime> Clone for GroupwiseOptionals<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: Runtime> Copy for GroupwiseOptionals<'_, R> {}

/// Weight-only group-wise INT4 matmul on tensors.
///
/// # Contract
///
/// - `input` shape: `[..., K]`, dtype F32
/// - `qweight` shape: `[K, N/8]`, packed signed INT4 (8 per u32, nibble `i` is column `8j + i`)
/// - `scales` shape: `[K/group_size, N]` F32
/// - Output shape: `[..., N]` F32
///
/// Dequant formula: `w = q * scale + zero`, then `out = (input * pre_quant_scale) @ w + bias`
pub trait GroupwiseMatmulOps<R: Runtime> {
    fn groupwise_quant_matmul(
        &self,
        input: &Tensor<R>,
        qweight: &Tensor<R>,
        scales: &Tensor<R>,
        optionals: &GroupwiseOptionals<'_, R>,
        group_size: usize,
    ) -> Result<Tensor<R>>;
}
