//! Quantization mode and the input layout it implies
//!
//! The operator's optional tensors are described by a capability set. The host
//! encodes the same set as a 3-bit integer (`quant_algo`):
//!
//! ```text
//! quant_algo = pre_quant_scale * 4 + zeros * 2 + bias
//! ```
//!
//! Inputs are positional and optional tensors leave no gap, so the capability
//! set fully determines where each tensor sits:
//!
//! ```text
//!   0  activations       [M, K]
//!   .  pre-quant scale   [K]                 (pre_quant_scale)
//!   .  weights           [K, N/8]
//!   .  scales            [K/group_size, N]
//!   .  zeros             [K/group_size, N]   (zeros)
//!   .  bias              [N]                 (bias)
//! ```

use crate::error::{Error, Result};
use std::fmt;

/// Which optional tensors the operator consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QuantMode {
    /// Per-input-channel scale applied to activations before the matmul
    pub pre_quant_scale: bool,
    /// Per-group zero-points added after scaling
    pub zeros: bool,
    /// Per-output-channel bias
    pub bias: bool,
}

impl QuantMode {
    const BIAS_BIT: u32 = 1;
    const ZEROS_BIT: u32 = 2;
    const PRE_QUANT_SCALE_BIT: u32 = 4;

    /// Number of distinct modes (every combination of the three capabilities).
    pub const COUNT: u32 = 8;

    /// All eight modes, ordered by their `quant_algo` encoding.
    pub const ALL: [QuantMode; 8] = [
        Self::from_bits_truncate(0),
        Self::from_bits_truncate(1),
        Self::from_bits_truncate(2),
        Self::from_bits_truncate(3),
        Self::from_bits_truncate(4),
        Self::from_bits_truncate(5),
        Self::from_bits_truncate(6),
        Self::from_bits_truncate(7),
    ];

    pub const fn new(pre_quant_scale: bool, zeros: bool, bias: bool) -> Self {
        Self {
            pre_quant_scale,
            zeros,
            bias,
        }
    }

    const fn from_bits_truncate(bits: u32) -> Self {
        Self {
            pre_quant_scale: bits & Self::PRE_QUANT_SCALE_BIT != 0,
            zeros: bits & Self::ZEROS_BIT != 0,
            bias: bits & Self::BIAS_BIT != 0,
        }
    }

    /// Decode the host's `quant_algo` integer.
    ///
    /// Values outside `[0, 8)` carry bits this operator does not understand and
    /// are rejected rather than masked.
    pub fn from_bits(bits: i64) -> Result<Self> {
        if !(0..Self::COUNT as i64).contains(&bits) {
            return Err(Error::config(format!(
                "quant_algo must be in [0, {}), got {bits}",
                Self::COUNT
            )));
        }
        Ok(Self::from_bits_truncate(bits as u32))
    }

    /// Encode back to the host's `quant_algo` integer.
    pub const fn bits(self) -> u32 {
        (self.pre_quant_scale as u32) * Self::PRE_QUANT_SCALE_BIT
            + (self.zeros as u32) * Self::ZEROS_BIT
            + (self.bias as u32) * Self::BIAS_BIT
    }

    /// Number of optional tensors present.
    pub const fn optional_count(self) -> usize {
        self.pre_quant_scale as usize + self.zeros as usize + self.bias as usize
    }

    /// Positional layout of the operator's inputs under this mode.
    pub const fn layout(self) -> InputLayout {
        InputLayout::derive(self)
    }
}

impl fmt::Display for QuantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if self.pre_quant_scale {
            parts.push("pre_quant_scale");
        }
        if self.zeros {
            parts.push("zeros");
        }
        if self.bias {
            parts.push("bias");
        }
        if parts.is_empty() {
            write!(f, "scale_only")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

/// Input positions derived from a [`QuantMode`].
///
/// An absent optional tensor's index collapses onto the previous index, so the
/// indices of present tensors are strictly increasing and `bias + 1` is always
/// the number of inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputLayout {
    pub activations: usize,
    pub pre_quant_scale: usize,
    pub weight: usize,
    pub scales: usize,
    pub zeros: usize,
    pub bias: usize,
}

impl InputLayout {
    pub const fn derive(mode: QuantMode) -> Self {
        let pre_quant_scale = if mode.pre_quant_scale { 1 } else { 0 };
        let weight = pre_quant_scale + 1;
        let scales = weight + 1;
        let zeros = if mode.zeros { scales + 1 } else { scales };
        let bias = if mode.bias { zeros + 1 } else { zeros };
        Self {
            activations: 0,
            pre_quant_scale,
            weight,
            scales,
            zeros,
            bias,
        }
    }

    /// Number of inputs the operator expects.
    pub const fn input_count(&self) -> usize {
        self.bias + 1
    }

    /// Index of the single output within a combined inputs-then-outputs list.
    pub const fn output_position(&self) -> usize {
        self.input_count()
    }
}
