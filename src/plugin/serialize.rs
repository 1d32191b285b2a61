//! Binary persistence of the operator configuration
//!
//! Layout (little-endian, fixed size):
//!
//! ```text
//! [0..4)   i32  data type code
//! [4..8)   i32  quant_algo bits
//! [8..12)  i32  group_size
//! ```
//!
//! Only the three configuration scalars are stored; everything derived from
//! them is recomputed on load.

use super::config::{OperatorAttributes, OperatorConfig};
use crate::error::{Error, Result};

/// Serialized size in bytes, the same for every configuration.
pub const SERIALIZED_SIZE: usize = 3 * std::mem::size_of::<i32>();

/// Write `config` into the front of `buf`.
pub fn write_config(config: &OperatorConfig, buf: &mut [u8]) -> Result<()> {
    if buf.len() < SERIALIZED_SIZE {
        return Err(Error::Serialization {
            reason: format!(
                "buffer holds {} bytes, need {SERIALIZED_SIZE}",
                buf.len()
            ),
        });
    }
    let attrs = OperatorAttributes::from_config(config).map_err(|e| Error::Serialization {
        reason: format!("cannot encode operator: {e}"),
    })?;

    let mut cursor = 0;
    for field in [attrs.type_id, attrs.quant_algo, attrs.group_size] {
        buf[cursor..cursor + 4].copy_from_slice(&field.to_le_bytes());
        cursor += 4;
    }
    debug_assert_eq!(cursor, SERIALIZED_SIZE);
    Ok(())
}

/// Read and validate a serialized configuration.
///
/// `bytes` must be exactly [`SERIALIZED_SIZE`] long.
pub fn read_config(bytes: &[u8]) -> Result<OperatorConfig> {
    if bytes.len() != SERIALIZED_SIZE {
        return Err(Error::Serialization {
            reason: format!(
                "expected {SERIALIZED_SIZE} bytes, got {}",
                bytes.len()
            ),
        });
    }
    let type_id = read_i32(bytes, 0);
    let quant_algo = read_i32(bytes, 4);
    let group_size = read_i32(bytes, 8);

    OperatorConfig::from_raw(type_id, quant_algo, group_size).map_err(|e| Error::Serialization {
        reason: format!("invalid serialized operator: {e}"),
    })
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(buf)
}
