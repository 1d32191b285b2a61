//! Per-channel activation scaling applied before the quantized multiply

use rayon::prelude::*;

use super::check_len;
use super::element::{decode_elements, encode_elements};
use crate::error::Result;
use numr::dtype::DType;

/// Kernel name, as recorded on the execution queue.
pub const PRE_SCALE_KERNEL: &str = "apply_per_channel_scale";

/// `out[m, k] = act[m, k] * scale[k]`, rounded to `dtype`.
///
/// `act` and `out` are `[M, K]`, `scale` is `[K]`.
pub fn apply_per_channel_scale(
    dtype: DType,
    act: &[u8],
    scale: &[u8],
    out: &mut [u8],
    m: usize,
    k: usize,
) -> Result<()> {
    let elem = dtype.size_in_bytes();
    let row_bytes = k * elem;
    check_len("activations", act.len(), m * row_bytes)?;
    check_len("pre_quant_scale", scale.len(), row_bytes)?;
    check_len("pre_scaled_activations", out.len(), m * row_bytes)?;
    if row_bytes == 0 {
        return Ok(());
    }

    let scale = decode_elements(dtype, &scale[..row_bytes]);
    out[..m * row_bytes]
        .par_chunks_mut(row_bytes)
        .zip(act[..m * row_bytes].par_chunks(row_bytes))
        .for_each(|(out_row, act_row)| {
            let mut row = decode_elements(dtype, act_row);
            for (v, s) in row.iter_mut().zip(&scale) {
                *v *= s;
            }
            encode_elements(dtype, &row, out_row);
        });
    Ok(())
}
