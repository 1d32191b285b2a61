//! # woq-matmul
//!
//! **Weight-only group-wise INT4 quantized matmul operator for graph executors.**
//!
//! Activations stay in floating point (F16, BF16 or F32). Weights are packed
//! signed 4-bit integers, eight per 32-bit word, with one scale (and optionally
//! one zero-point) per `group_size` rows of K. An optional per-channel
//! pre-quant scale is applied to activations first, and an optional bias is
//! added per output channel.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ ops      GroupwiseMatmulOps on numr clients (tensors)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ plugin   operator: shapes, workspace, dispatch, serde   │
//! ├──────────────────────────┬──────────────────────────────┤
//! │ kernels  DirectGemv,     │ queue  ExecutionQueue,       │
//! │          TiledGemm       │        CpuQueue              │
//! ├──────────────────────────┴──────────────────────────────┤
//! │ quant    QuantMode, InputLayout, int4 packing           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design
//!
//! - **Capability set**: which optional tensors exist is a [`QuantMode`]; the
//!   positional input layout is derived from it once and never re-computed
//! - **Kernel strategy**: kernels implement [`GroupwiseGemm`]; the operator
//!   picks one by batch size and only ever submits it to an [`ExecutionQueue`]
//! - **Workspace arena**: the host's workspace is carved into named regions by
//!   one plan shared between sizing and dispatch

pub mod error;
pub mod kernels;
pub mod ops;
pub mod plugin;
pub mod quant;
pub mod queue;

pub use error::{Error, Result};
pub use kernels::{DirectGemv, GroupwiseGemm, TiledGemm};
pub use ops::{GroupwiseMatmulOps, GroupwiseOptionals};
pub use plugin::{GroupwiseQuantMatmul, GroupwiseQuantMatmulCreator, OperatorConfig};
pub use quant::{InputLayout, QuantMode};
pub use queue::{CpuQueue, ExecutionQueue};

// Re-export numr types that users will commonly need
pub use numr::dtype::DType;
pub use numr::tensor::Tensor;
