//! The group-wise quantized matmul operator
//!
//! [`GroupwiseQuantMatmul`] is what a graph executor holds on to: it answers
//! build-time questions (shapes, formats, workspace) and at run time carves
//! the workspace, optionally pre-scales the activations and submits one GEMM
//! kernel chosen by batch size.

use super::config::OperatorConfig;
use super::serialize::{SERIALIZED_SIZE, read_config, write_config};
use super::shape::{
    DimsExprs, DynamicTensorDesc, TensorDesc, TensorFormat, infer_output_dims, problem_size,
};
use super::workspace::{ScratchArena, ScratchPlan};
use crate::error::{Error, Result};
use crate::kernels::pre_scale::PRE_SCALE_KERNEL;
use crate::kernels::{
    DirectGemv, GemmArgs, GroupwiseGemm, TiledGemm, apply_per_channel_scale, check_len,
};
use crate::quant::{InputLayout, QuantMode};
use crate::queue::ExecutionQueue;
use numr::dtype::DType;

/// Plugin type name registered with the host.
pub const PLUGIN_NAME: &str = "WeightOnlyGroupwiseQuantMatmul";
/// Plugin version registered with the host.
pub const PLUGIN_VERSION: &str = "1";

/// Batches with fewer rows than this use [`DirectGemv`].
pub const SMALL_M_THRESHOLD: usize = 5;

/// Which GEMM kernel an enqueue runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelChoice {
    /// Memory-bound path for tiny batches
    Direct,
    /// Compute-bound path
    Tiled,
}

impl KernelChoice {
    /// The kernel implementing this choice.
    pub fn kernel(self) -> &'static dyn GroupwiseGemm {
        match self {
            Self::Direct => &DirectGemv,
            Self::Tiled => &TiledGemm,
        }
    }
}

/// Pick the kernel for a batch of `m` rows.
pub fn select_kernel(m: usize) -> KernelChoice {
    if m < SMALL_M_THRESHOLD {
        KernelChoice::Direct
    } else {
        KernelChoice::Tiled
    }
}

/// Weight-only group-wise INT4 matmul.
///
/// Construction fixes the configuration and derives the input layout once;
/// both are immutable afterwards. The only state that changes is the
/// workspace size cached by [`configure`](Self::configure).
#[derive(Debug, Clone)]
pub struct GroupwiseQuantMatmul {
    config: OperatorConfig,
    layout: InputLayout,
    workspace_max_size: usize,
    namespace: String,
}

impl GroupwiseQuantMatmul {
    /// Validate the configuration and derive the input layout.
    pub fn new(dtype: DType, mode: QuantMode, group_size: usize) -> Result<Self> {
        Ok(Self::from_config(OperatorConfig::new(dtype, mode, group_size)?))
    }

    /// Build from an already validated configuration.
    pub fn from_config(config: OperatorConfig) -> Self {
        Self {
            layout: config.mode.layout(),
            config,
            workspace_max_size: 0,
            namespace: String::new(),
        }
    }

    /// Immutable configuration the operator was built with.
    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Input positions implied by the quantization mode.
    pub fn layout(&self) -> &InputLayout {
        &self.layout
    }

    /// Registered plugin type name, [`PLUGIN_NAME`].
    pub fn plugin_type(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// Registered plugin version, [`PLUGIN_VERSION`].
    pub fn plugin_version(&self) -> &'static str {
        PLUGIN_VERSION
    }

    /// Host namespace, empty unless set.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Set the host namespace; clones keep it.
    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    /// Number of outputs, always 1.
    pub fn nb_outputs(&self) -> usize {
        1
    }

    /// The output has the configured numeric type whatever the inputs are.
    pub fn output_dtype(&self, index: usize, _input_dtypes: &[DType]) -> Result<DType> {
        if index != 0 {
            return Err(Error::config(format!(
                "output index {index} out of range, operator has 1 output"
            )));
        }
        Ok(self.config.dtype)
    }

    /// Symbolic output shape: the activation's leading dims followed by N.
    ///
    /// Only output 0 exists.
    pub fn infer_output_shape(&self, output_index: usize, inputs: &[DimsExprs]) -> Result<DimsExprs> {
        if output_index != 0 {
            return Err(Error::config(format!(
                "output index {output_index} out of range, operator has 1 output"
            )));
        }
        infer_output_dims(&self.layout, inputs)
    }

    /// Whether the tensor at `pos` of the combined inputs-then-output list is
    /// acceptable as described.
    pub fn supports_format(&self, pos: usize, descs: &[TensorDesc]) -> bool {
        let Some(desc) = descs.get(pos) else {
            return false;
        };
        if desc.format != TensorFormat::Linear {
            return false;
        }
        if pos == self.layout.weight {
            matches!(desc.dtype, DType::I32 | DType::U32)
        } else if pos <= self.layout.output_position() {
            desc.dtype == self.config.dtype
        } else {
            false
        }
    }

    /// Size the workspace for the largest shapes the host will enqueue.
    pub fn configure(
        &mut self,
        inputs: &[DynamicTensorDesc],
        outputs: &[DynamicTensorDesc],
    ) -> Result<()> {
        if inputs.len() != self.layout.input_count() {
            return Err(Error::config(format!(
                "expected {} inputs, got {}",
                self.layout.input_count(),
                inputs.len()
            )));
        }
        if outputs.len() != 1 {
            return Err(Error::config(format!("expected 1 output, got {}", outputs.len())));
        }

        let act = inputs[self.layout.activations].max_desc();
        let weight = inputs[self.layout.weight].max_desc();
        let (max_m, max_n, max_k) = problem_size(&act, &weight)?;
        let plan = ScratchPlan::new(max_m, max_n, max_k, self.config.element_size(), &TiledGemm);
        self.workspace_max_size = plan.total_bytes();

        log::debug!(
            "{PLUGIN_NAME}: configured {:?} mode={} group_size={} max (M={max_m}, N={max_n}, K={max_k}) workspace={} bytes",
            self.config.dtype,
            self.config.mode,
            self.config.group_size,
            self.workspace_max_size
        );
        Ok(())
    }

    /// Workspace bytes cached by the last [`configure`](Self::configure), 0 before it.
    pub fn workspace_size(&self) -> usize {
        self.workspace_max_size
    }

    /// Run the operator on concrete buffers.
    ///
    /// `inputs` follow [`InputLayout`] order and must match `input_descs`.
    /// Work is submitted to `queue`; the pre-scale launch, when present, is
    /// always submitted before the GEMM launch.
    pub fn enqueue(
        &self,
        input_descs: &[TensorDesc],
        output_descs: &[TensorDesc],
        inputs: &[&[u8]],
        output: &mut [u8],
        workspace: &mut [u8],
        queue: &mut dyn ExecutionQueue,
    ) -> Result<()> {
        let layout = &self.layout;
        let mode = self.config.mode;
        let dtype = self.config.dtype;
        match dtype {
            DType::F16 | DType::BF16 | DType::F32 => {}
            other => unreachable!("operator constructed with unsupported dtype {other:?}"),
        }

        if input_descs.len() != layout.input_count() || inputs.len() != layout.input_count() {
            return Err(Error::InvalidArgument {
                arg: "inputs",
                reason: format!(
                    "expected {} inputs, got {} descriptors and {} buffers",
                    layout.input_count(),
                    input_descs.len(),
                    inputs.len()
                ),
            });
        }
        if output_descs.len() != 1 {
            return Err(Error::InvalidArgument {
                arg: "outputs",
                reason: format!("expected 1 output, got {}", output_descs.len()),
            });
        }

        let (m, n, k) = problem_size(
            &input_descs[layout.activations],
            &input_descs[layout.weight],
        )?;
        let act_dims = &input_descs[layout.activations].dims;
        let mut expected_out = act_dims[..act_dims.len() - 1].to_vec();
        expected_out.push(n);
        if output_descs[0].dims != expected_out {
            return Err(Error::InvalidArgument {
                arg: "outputs",
                reason: format!(
                    "output shape {:?} does not match {:?} derived from the inputs",
                    output_descs[0].dims, expected_out
                ),
            });
        }

        let mut args = GemmArgs {
            dtype,
            activations: inputs[layout.activations],
            qweight: inputs[layout.weight],
            scales: inputs[layout.scales],
            zeros: mode.zeros.then(|| inputs[layout.zeros]),
            bias: mode.bias.then(|| inputs[layout.bias]),
            m,
            n,
            k,
            group_size: self.config.group_size,
        };
        args.validate()?;
        check_len("output", output.len(), args.output_bytes())?;

        let choice = select_kernel(m);
        let gemm = choice.kernel();
        let plan = ScratchPlan::new(m, n, k, self.config.element_size(), gemm);
        let (pre_scaled, gemm_scratch) = ScratchArena::new(workspace).carve(&plan)?;

        if mode.pre_quant_scale {
            let act = inputs[layout.activations];
            let scale = inputs[layout.pre_quant_scale];
            let dst = pre_scaled.bytes;
            queue.submit(PRE_SCALE_KERNEL, &mut || {
                apply_per_channel_scale(dtype, act, scale, &mut *dst, m, k)
            })?;
            args.activations = dst;
        }

        log::trace!(
            "{PLUGIN_NAME}: M={m} N={n} K={k} -> {choice:?} ({})",
            gemm.name()
        );
        let scratch = gemm_scratch.bytes;
        queue.submit(gemm.name(), &mut || gemm.run(&args, &mut *output, &mut *scratch))
    }

    /// Bytes written by [`serialize_into`](Self::serialize_into).
    pub fn serialized_size(&self) -> usize {
        SERIALIZED_SIZE
    }

    /// Write the configuration into the front of `buf`.
    pub fn serialize_into(&self, buf: &mut [u8]) -> Result<()> {
        write_config(&self.config, buf)
    }

    /// Serialized configuration as an owned buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; SERIALIZED_SIZE];
        self.serialize_into(&mut buf)?;
        Ok(buf)
    }

    /// Rebuild an operator from [`to_bytes`](Self::to_bytes) output.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_config(read_config(bytes)?))
    }
}
