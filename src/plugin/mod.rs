//! Host-facing operator: configuration, shape inference, workspace planning,
//! dispatch and persistence

pub mod config;
pub mod creator;
pub mod operator;
pub mod serialize;
pub mod shape;
pub mod workspace;

pub use config::{OperatorAttributes, OperatorConfig, SUPPORTED_DTYPES, dtype_code, dtype_from_code};
pub use creator::{FieldData, FieldKind, FieldSpec, GroupwiseQuantMatmulCreator, PluginField};
pub use operator::{
    GroupwiseQuantMatmul, KernelChoice, PLUGIN_NAME, PLUGIN_VERSION, SMALL_M_THRESHOLD,
    select_kernel,
};
pub use serialize::SERIALIZED_SIZE;
pub use shape::{DimExpr, DimsExprs, DynamicTensorDesc, TensorDesc, TensorFormat};
pub use workspace::{ScratchArena, ScratchPlan, ScratchRegion};
