//! Large-batch kernel: panel dequantization + tiled multiply
//!
//! For each tile of `TILE_N` output columns the full `[K, TILE_N]` weight
//! panel is dequantized once into scratch (f32), then every `TILE_M` block of
//! activation rows is multiplied against it in parallel. Dequantization cost
//! is paid once per panel instead of once per row.

use rayon::prelude::*;

use super::element::{decode_elements, decode_words, encode_elements, load_f32, store_f32};
use super::{GemmArgs, GroupParams, GroupwiseGemm};
use crate::error::{Error, Result};
use crate::quant::PACK_FACTOR;
use crate::quant::packing::unpack_word;

/// Output columns per dequantized panel (multiple of the pack factor).
pub const TILE_N: usize = 64;
/// Activation rows per parallel work item.
pub const TILE_M: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct TiledGemm;

impl TiledGemm {
    fn panel_width(n: usize) -> usize {
        TILE_N.min(n)
    }
}

impl GroupwiseGemm for TiledGemm {
    fn name(&self) -> &'static str {
        "groupwise_gemm_tiled"
    }

    fn workspace_size(&self, _m: usize, n: usize, k: usize) -> usize {
        k * Self::panel_width(n) * std::mem::size_of::<f32>()
    }

    fn run(&self, args: &GemmArgs<'_>, output: &mut [u8], scratch: &mut [u8]) -> Result<()> {
        args.validate()?;
        super::check_len("output", output.len(), args.output_bytes())?;

        let (m, n, k) = (args.m, args.n, args.k);
        let required = self.workspace_size(m, n, k);
        if scratch.len() < required {
            return Err(Error::Workspace {
                reason: format!(
                    "{} needs {required} scratch bytes, got {}",
                    self.name(),
                    scratch.len()
                ),
            });
        }

        let elem = args.dtype.size_in_bytes();
        let n_packed = n / PACK_FACTOR;
        let row_bytes = n * elem;

        let act = decode_elements(args.dtype, &args.activations[..m * k * elem]);
        let words = decode_words(&args.qweight[..k * n_packed * 4]);
        let params = GroupParams::decode(args);
        let output = &mut output[..m * row_bytes];
        let panel = &mut scratch[..required];

        for n0 in (0..n).step_by(TILE_N) {
            let tn = TILE_N.min(n - n0);

            // dequantize [K, tn] panel
            let mut q = [0i8; PACK_FACTOR];
            for ki in 0..k {
                let group = ki / args.group_size;
                for pj in 0..tn / PACK_FACTOR {
                    unpack_word(words[ki * n_packed + n0 / PACK_FACTOR + pj], &mut q);
                    for sub in 0..PACK_FACTOR {
                        let c = pj * PACK_FACTOR + sub;
                        let w = params.dequant(q[sub], group, n, n0 + c);
                        store_f32(panel, ki * tn + c, w);
                    }
                }
            }

            let panel_ro: &[u8] = &*panel;
            output
                .par_chunks_mut(TILE_M * row_bytes)
                .enumerate()
                .for_each(|(tile_m, out_tile)| {
                    let mut acc = vec![0.0f32; tn];
                    for (r, out_row) in out_tile.chunks_exact_mut(row_bytes).enumerate() {
                        let row = tile_m * TILE_M + r;
                        let a = &act[row * k..][..k];
                        acc.fill(0.0);
                        for (ki, &x) in a.iter().enumerate() {
                            for (c, v) in acc.iter_mut().enumerate() {
                                *v += x * load_f32(panel_ro, ki * tn + c);
                            }
                        }
                        params.add_bias(&mut acc, n0);
                        encode_elements(args.dtype, &acc, &mut out_row[n0 * elem..][..tn * elem]);
                    }
                });
        }
        Ok(())
    }
}
