//! Small-batch kernel: dequantize on the fly, one pass over the weights
//!
//! Each packed word is unpacked exactly once per activation row and used
//! immediately, so no scratch is needed. Columns are split across threads in
//! units of one packed word (8 output columns).

use rayon::prelude::*;

use super::element::{decode_elements, decode_words, encode_elements};
use super::{GemmArgs, GroupParams, GroupwiseGemm};
use crate::error::Result;
use crate::quant::PACK_FACTOR;
use crate::quant::packing::unpack_word;

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectGemv;

impl GroupwiseGemm for DirectGemv {
    fn name(&self) -> &'static str {
        "groupwise_gemv_direct"
    }

    fn workspace_size(&self, _m: usize, _n: usize, _k: usize) -> usize {
        0
    }

    fn run(&self, args: &GemmArgs<'_>, output: &mut [u8], _scratch: &mut [u8]) -> Result<()> {
        args.validate()?;
        super::check_len("output", output.len(), args.output_bytes())?;

        let (m, n, k) = (args.m, args.n, args.k);
        let elem = args.dtype.size_in_bytes();
        let n_packed = n / PACK_FACTOR;

        let act = decode_elements(args.dtype, &args.activations[..m * k * elem]);
        let words = decode_words(&args.qweight[..k * n_packed * 4]);
        let params = GroupParams::decode(args);

        for row in 0..m {
            let a = &act[row * k..][..k];

            let acc: Vec<[f32; PACK_FACTOR]> = (0..n_packed)
                .into_par_iter()
                .map(|pack_j| {
                    let mut acc = [0.0f32; PACK_FACTOR];
                    let mut q = [0i8; PACK_FACTOR];
                    let base_col = pack_j * PACK_FACTOR;
                    for (ki, &x) in a.iter().enumerate() {
                        let group = ki / args.group_size;
                        unpack_word(words[ki * n_packed + pack_j], &mut q);
                        for sub in 0..PACK_FACTOR {
                            acc[sub] += x * params.dequant(q[sub], group, n, base_col + sub);
                        }
                    }
                    acc
                })
                .collect();

            let mut out_row: Vec<f32> = acc.into_iter().flatten().collect();
            params.add_bias(&mut out_row, 0);
            encode_elements(args.dtype, &out_row, &mut output[row * n * elem..][..n * elem]);
        }
        Ok(())
    }
}
