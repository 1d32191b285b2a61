//! CPU implementation of GroupwiseMatmulOps

use super::{GroupwiseMatmulOps, GroupwiseOptionals};
use crate::error::{Error, Result};
use crate::plugin::{DynamicTensorDesc, GroupwiseQuantMatmul, TensorDesc};
use crate::quant::{PACK_FACTOR, QuantMode};
use crate::queue::CpuQueue;
use numr::dtype::DType;
use numr::runtime::cpu::{CpuClient, CpuRuntime};
use numr::tensor::Tensor;

fn require_f32(arg: &'static str, t: &Tensor<CpuRuntime>) -> Result<()> {
    if t.dtype() != DType::F32 {
        return Err(Error::InvalidArgument {
            arg,
            reason: format!("must be F32, got {:?}", t.dtype()),
        });
    }
    Ok(())
}

/// Host copy of `t`, materializing strided views first.
fn host_data(t: &Tensor<CpuRuntime>) -> Vec<f32> {
    t.contiguous().to_vec::<f32>()
}

fn output_shape(input_shape: &[usize], n: usize) -> Vec<usize> {
    let mut s = input_shape[..input_shape.len() - 1].to_vec();
    s.push(n);
    s
}

impl GroupwiseMatmulOps<CpuRuntime> for CpuClient {
    fn groupwise_quant_matmul(
        &self,
        input: &Tensor<CpuRuntime>,
        qweight: &Tensor<CpuRuntime>,
        scales: &Tensor<CpuRuntime>,
        optionals: &GroupwiseOptionals<'_, CpuRuntime>,
        group_size: usize,
    ) -> Result<Tensor<CpuRuntime>> {
        require_f32("input", input)?;
        require_f32("scales", scales)?;
        let in_shape = input.shape();
        if in_shape.len() < 2 {
            return Err(Error::InvalidArgument {
                arg: "input",
                reason: format!("must be at least 2D, got {:?}", in_shape),
            });
        }
        let k = in_shape[in_shape.len() - 1];
        let qw_shape = qweight.shape();
        if qw_shape.len() != 2 || qw_shape[0] != k {
            return Err(Error::InvalidArgument {
                arg: "qweight",
                reason: format!("shape {:?} does not match K={}", qw_shape, k),
            });
        }
        let n = qw_shape[1] * PACK_FACTOR;

        let mode = QuantMode::new(
            optionals.pre_quant_scale.is_some(),
            optionals.zeros.is_some(),
            optionals.bias.is_some(),
        );
        let mut op = GroupwiseQuantMatmul::new(DType::F32, mode, group_size)?;

        // Tensors in operator input order, packed weights keep their raw bits
        let mut tensors: Vec<(TensorDesc, Vec<f32>)> = Vec::with_capacity(op.layout().input_count());
        tensors.push((TensorDesc::new(in_shape, DType::F32), host_data(input)));
        if let Some(pre) = optionals.pre_quant_scale {
            require_f32("pre_quant_scale", pre)?;
            tensors.push((TensorDesc::new(pre.shape(), DType::F32), host_data(pre)));
        }
        tensors.push((TensorDesc::new(qw_shape, DType::U32), host_data(qweight)));
        tensors.push((TensorDesc::new(scales.shape(), DType::F32), host_data(scales)));
        if let Some(zeros) = optionals.zeros {
            require_f32("zeros", zeros)?;
            tensors.push((TensorDesc::new(zeros.shape(), DType::F32), host_data(zeros)));
        }
        if let Some(bias) = optionals.bias {
            require_f32("bias", bias)?;
            tensors.push((TensorDesc::new(bias.shape(), DType::F32), host_data(bias)));
        }

        let out_shape = output_shape(in_shape, n);
        let input_descs: Vec<TensorDesc> = tensors.iter().map(|(d, _)| d.clone()).collect();
        let output_descs = [TensorDesc::new(&out_shape, DType::F32)];
        let dynamic_inputs: Vec<_> = input_descs
            .iter()
            .cloned()
            .map(DynamicTensorDesc::fixed)
            .collect();
        op.configure(&dynamic_inputs, &[DynamicTensorDesc::fixed(output_descs[0].clone())])?;

        let buffers: Vec<&[u8]> = tensors
            .iter()
            .map(|(_, data)| bytemuck::cast_slice::<f32, u8>(data))
            .collect();
        let mut workspace = vec![0u8; op.workspace_size()];
        let mut out = vec![0.0f32; out_shape.iter().product()];
        let mut queue = CpuQueue::new();
        op.enqueue(
            &input_descs,
            &output_descs,
            &buffers,
            bytemuck::cast_slice_mut::<f32, u8>(&mut out),
            &mut workspace,
            &mut queue,
        )?;

        Ok(Tensor::<CpuRuntime>::from_slice(
            &out,
            &out_shape,
            input.device(),
        ))
    }
}
