//! Operator configuration and attribute-based construction

use crate::error::{Error, Result};
use crate::kernels::element::ELEMENT_DTYPES;
use crate::quant::QuantMode;
use numr::dtype::DType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Numeric types the operator computes in.
pub const SUPPORTED_DTYPES: [DType; 3] = ELEMENT_DTYPES;

/// Host engine data-type code for `dtype`, if the engine has one.
///
/// Codes follow the engine's data-type enumeration and are what `type_id`
/// attributes and serialized operators carry.
pub fn dtype_code(dtype: DType) -> Option<i32> {
    let code = match dtype {
        DType::F32 => 0,
        DType::F16 => 1,
        DType::I8 => 2,
        DType::I32 => 3,
        DType::Bool => 4,
        DType::U8 => 5,
        DType::FP8E4M3 => 6,
        DType::BF16 => 7,
        DType::I64 => 8,
        _ => return None,
    };
    Some(code)
}

/// Inverse of [`dtype_code`].
pub fn dtype_from_code(code: i32) -> Result<DType> {
    let dtype = match code {
        0 => DType::F32,
        1 => DType::F16,
        2 => DType::I8,
        3 => DType::I32,
        4 => DType::Bool,
        5 => DType::U8,
        6 => DType::FP8E4M3,
        7 => DType::BF16,
        8 => DType::I64,
        other => return Err(Error::config(format!("unknown data type code {other}"))),
    };
    Ok(dtype)
}

/// Immutable operator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatorConfig {
    pub dtype: DType,
    pub mode: QuantMode,
    pub group_size: usize,
}

impl OperatorConfig {
    /// Validated configuration; `dtype` must be one of [`SUPPORTED_DTYPES`].
    pub fn new(dtype: DType, mode: QuantMode, group_size: usize) -> Result<Self> {
        if !SUPPORTED_DTYPES.contains(&dtype) {
            return Err(Error::config(format!(
                "unsupported numeric type {dtype:?} (supported: {SUPPORTED_DTYPES:?})"
            )));
        }
        if group_size == 0 {
            return Err(Error::config("group_size must be > 0"));
        }
        Ok(Self {
            dtype,
            mode,
            group_size,
        })
    }

    /// Build from the host's raw integer fields.
    pub fn from_raw(type_id: i32, quant_algo: i32, group_size: i32) -> Result<Self> {
        let dtype = dtype_from_code(type_id)?;
        let mode = QuantMode::from_bits(quant_algo as i64)?;
        if group_size <= 0 {
            return Err(Error::config(format!(
                "group_size must be > 0, got {group_size}"
            )));
        }
        Self::new(dtype, mode, group_size as usize)
    }

    /// Bytes per activation/scale/output element.
    pub fn element_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }
}

/// Construction attributes as found in a graph manifest.
///
/// Unknown keys are ignored; all three known keys are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAttributes {
    pub type_id: i32,
    pub quant_algo: i32,
    pub group_size: i32,
}

impl OperatorAttributes {
    /// Attributes that rebuild `config`.
    ///
    /// Fails when a field has no `i32` representation.
    pub fn from_config(config: &OperatorConfig) -> Result<Self> {
        let type_id = dtype_code(config.dtype).ok_or_else(|| Error::Attribute {
            reason: format!("{:?} has no data type code", config.dtype),
        })?;
        let group_size = i32::try_from(config.group_size).map_err(|_| Error::Attribute {
            reason: format!("group_size {} does not fit in i32", config.group_size),
        })?;
        Ok(Self {
            type_id,
            quant_algo: config.mode.bits() as i32,
            group_size,
        })
    }

    /// Validate and convert into an operator configuration.
    pub fn to_config(&self) -> Result<OperatorConfig> {
        OperatorConfig::from_raw(self.type_id, self.quant_algo, self.group_size)
    }

    /// Parse attributes from a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Attribute {
            reason: format!("YAML parse error: {e}"),
        })
    }

    /// Parse attributes from a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Attribute {
            reason: format!("JSON parse error: {e}"),
        })
    }

    /// Load attributes from a YAML manifest file.
    pub fn load_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml_str(&read_manifest(path.as_ref())?)
    }

    /// Load attributes from a JSON manifest file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&read_manifest(path.as_ref())?)
    }
}

fn read_manifest(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::Attribute {
        reason: format!("IO error reading {}: {e}", path.display()),
    })
}
