//! Element conversions between raw buffers and f32 compute values
//!
//! Buffers arrive as untyped bytes (host pointers, workspace sub-regions at
//! arbitrary byte offsets), so reads go through unaligned loads. All kernels
//! accumulate in f32 and round to the storage type on write.

use bytemuck::Pod;
use half::{bf16, f16};
use numr::dtype::DType;

/// Storage element a kernel can read and write.
pub trait Element: Pod + Send + Sync {
    /// numr dtype of buffers holding this element
    const DTYPE: DType;

    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::BF16;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        bf16::from_f32(v)
    }
}

/// Dtypes with an [`Element`] implementation, the only ones kernels accept.
pub const ELEMENT_DTYPES: [DType; 3] = [
    <f16 as Element>::DTYPE,
    <bf16 as Element>::DTYPE,
    <f32 as Element>::DTYPE,
];

/// Whether kernels can read and write `dtype` buffers.
pub fn is_element_dtype(dtype: DType) -> bool {
    ELEMENT_DTYPES.contains(&dtype)
}

fn decode<T: Element>(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(|chunk| bytemuck::pod_read_unaligned::<T>(chunk).to_f32())
        .collect()
}

fn encode<T: Element>(values: &[f32], out: &mut [u8]) {
    for (chunk, &v) in out
        .chunks_exact_mut(std::mem::size_of::<T>())
        .zip(values.iter())
    {
        chunk.copy_from_slice(bytemuck::bytes_of(&T::from_f32(v)));
    }
}

/// Decode a buffer of `dtype` elements into f32.
///
/// Panics on a dtype no kernel supports; operator construction rejects those
/// long before a buffer reaches this point.
pub fn decode_elements(dtype: DType, bytes: &[u8]) -> Vec<f32> {
    match dtype {
        DType::F32 => decode::<f32>(bytes),
        DType::F16 => decode::<f16>(bytes),
        DType::BF16 => decode::<bf16>(bytes),
        other => unreachable!("no kernel element type for {other:?}"),
    }
}

/// Round `values` to `dtype` and write them to the front of `out`.
pub fn encode_elements(dtype: DType, values: &[f32], out: &mut [u8]) {
    debug_assert!(out.len() >= values.len() * dtype.size_in_bytes());
    match dtype {
        DType::F32 => encode::<f32>(values, out),
        DType::F16 => encode::<f16>(values, out),
        DType::BF16 => encode::<bf16>(values, out),
        other => unreachable!("no kernel element type for {other:?}"),
    }
}

/// Decode packed 32-bit weight words.
pub fn decode_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<u32>)
        .collect()
}

/// Read the `idx`-th f32 from an untyped scratch buffer.
#[inline(always)]
pub(crate) fn load_f32(bytes: &[u8], idx: usize) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[idx * 4..idx * 4 + 4])
}

/// Write the `idx`-th f32 into an untyped scratch buffer.
#[inline(always)]
pub(crate) fn store_f32(bytes: &mut [u8], idx: usize, v: f32) {
    bytes[idx * 4..idx * 4 + 4].copy_from_slice(&v.to_ne_bytes());
}
