//! Signed INT4 packing: eight 4-bit values per 32-bit word
//!
//! Weight layout is `[K, N/8]`. Nibble `i` of word `[k][j]` (bits `4i..4i+4`)
//! holds the two's-complement value for output column `8j + i`.

/// INT4 values per packed word.
pub const PACK_FACTOR: usize = 8;

/// Smallest representable INT4 value.
pub const INT4_MIN: i8 = -8;
/// Largest representable INT4 value.
pub const INT4_MAX: i8 = 7;

/// Extract the `idx`-th signed INT4 value from a packed word.
#[inline(always)]
pub fn unpack_int4(packed: u32, idx: usize) -> i8 {
    let nibble = ((packed >> (idx * 4)) & 0xF) as u8;
    // sign-extend bit 3
    ((nibble << 4) as i8) >> 4
}

/// Unpack all eight values of a word into `out`.
#[inline(always)]
pub fn unpack_word(packed: u32, out: &mut [i8; PACK_FACTOR]) {
    for (idx, v) in out.iter_mut().enumerate() {
        *v = unpack_int4(packed, idx);
    }
}

/// Pack eight signed values in `[-8, 7]` into one word.
pub fn pack_word(values: &[i8; PACK_FACTOR]) -> u32 {
    values.iter().enumerate().fold(0u32, |acc, (idx, &v)| {
        debug_assert!((INT4_MIN..=INT4_MAX).contains(&v), "int4 out of range: {v}");
        acc | (((v as u8) & 0xF) as u32) << (idx * 4)
    })
}

/// Pack a row-major `[K, N]` matrix of INT4 values into `[K, N/8]` words.
///
/// `n` must be a multiple of [`PACK_FACTOR`].
pub fn pack_matrix(values: &[i8], k: usize, n: usize) -> Vec<u32> {
    assert_eq!(n % PACK_FACTOR, 0, "n={n} is not a multiple of {PACK_FACTOR}");
    assert_eq!(values.len(), k * n);

    values
        .chunks_exact(PACK_FACTOR)
        .map(|chunk| {
            let mut word = [0i8; PACK_FACTOR];
            word.copy_from_slice(chunk);
            pack_word(&word)
        })
        .collect()
}
