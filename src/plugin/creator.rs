//! Factory building operators from host attribute fields or serialized bytes

use super::config::{OperatorAttributes, OperatorConfig};
use super::operator::{GroupwiseQuantMatmul, PLUGIN_NAME, PLUGIN_VERSION};
use crate::error::{Error, Result};

/// Payload of one attribute field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Bytes(Vec<u8>),
}

impl FieldData {
    /// Element type of the payload.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Int32(_) => FieldKind::Int32,
            Self::Float32(_) => FieldKind::Float32,
            Self::Bytes(_) => FieldKind::Bytes,
        }
    }
}

/// Element type of a [`FieldData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int32,
    Float32,
    Bytes,
}

/// A named attribute as the host passes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginField {
    pub name: String,
    pub data: FieldData,
}

impl PluginField {
    pub fn new(name: impl Into<String>, data: FieldData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Single-valued int32 field.
    pub fn int32(name: impl Into<String>, value: i32) -> Self {
        Self::new(name, FieldData::Int32(vec![value]))
    }
}

/// Metadata for one attribute the creator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub length: usize,
}

const FIELD_NAMES: [FieldSpec; 3] = [
    FieldSpec {
        name: "type_id",
        kind: FieldKind::Int32,
        length: 1,
    },
    FieldSpec {
        name: "quant_algo",
        kind: FieldKind::Int32,
        length: 1,
    },
    FieldSpec {
        name: "group_size",
        kind: FieldKind::Int32,
        length: 1,
    },
];

/// Creates [`GroupwiseQuantMatmul`] instances for the host's plugin registry.
#[derive(Debug, Clone, Default)]
pub struct GroupwiseQuantMatmulCreator {
    namespace: String,
}

impl GroupwiseQuantMatmulCreator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin type name operators are registered under.
    pub fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    pub fn plugin_version(&self) -> &'static str {
        PLUGIN_VERSION
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Namespace given to every operator created afterwards.
    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    /// Attributes [`create`](Self::create) reads.
    pub fn field_names(&self) -> &'static [FieldSpec] {
        &FIELD_NAMES
    }

    /// Build an operator from attribute fields.
    ///
    /// Unknown field names are skipped. Each known field must carry an int32
    /// payload, and all of them must be present.
    pub fn create(&self, name: &str, fields: &[PluginField]) -> Result<GroupwiseQuantMatmul> {
        let mut type_id = None;
        let mut quant_algo = None;
        let mut group_size = None;

        for field in fields {
            let slot = match field.name.as_str() {
                "type_id" => &mut type_id,
                "quant_algo" => &mut quant_algo,
                "group_size" => &mut group_size,
                _ => continue,
            };
            *slot = Some(first_int32(field)?);
        }

        let attrs = OperatorAttributes {
            type_id: required(type_id, "type_id")?,
            quant_algo: required(quant_algo, "quant_algo")?,
            group_size: required(group_size, "group_size")?,
        };
        let op = self.build(attrs.to_config()?);
        log::debug!(
            "{PLUGIN_NAME}: created '{name}' ({:?}, mode={}, group_size={})",
            op.config().dtype,
            op.config().mode,
            op.config().group_size
        );
        Ok(op)
    }

    /// Build an operator from manifest attributes.
    pub fn create_from_attributes(&self, attrs: &OperatorAttributes) -> Result<GroupwiseQuantMatmul> {
        Ok(self.build(attrs.to_config()?))
    }

    /// Rebuild a serialized operator.
    pub fn deserialize(&self, name: &str, bytes: &[u8]) -> Result<GroupwiseQuantMatmul> {
        let mut op = GroupwiseQuantMatmul::deserialize(bytes)?;
        op.set_namespace(self.namespace.clone());
        log::debug!("{PLUGIN_NAME}: deserialized '{name}'");
        Ok(op)
    }

    fn build(&self, config: OperatorConfig) -> GroupwiseQuantMatmul {
        let mut op = GroupwiseQuantMatmul::from_config(config);
        op.set_namespace(self.namespace.clone());
        op
    }
}

fn first_int32(field: &PluginField) -> Result<i32> {
    match &field.data {
        FieldData::Int32(values) => values.first().copied().ok_or_else(|| Error::Attribute {
            reason: format!("field '{}' is empty", field.name),
        }),
        other => Err(Error::Attribute {
            reason: format!(
                "field '{}' must be {:?}, got {:?}",
                field.name,
                FieldKind::Int32,
                other.kind()
            ),
        }),
    }
}

fn required(value: Option<i32>, name: &str) -> Result<i32> {
    value.ok_or_else(|| Error::Attribute {
        reason: format!("missing required field '{name}'"),
    })
}
