//! Shared helpers for operator integration tests.

use numr::dtype::DType;
use numr::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};
use numr::tensor::Tensor;
use woq_matmul::kernels::element::{decode_elements, encode_elements};
use woq_matmul::plugin::{DynamicTensorDesc, GroupwiseQuantMatmul, TensorDesc};
use woq_matmul::quant::QuantMode;
use woq_matmul::quant::packing::pack_matrix;
use woq_matmul::{CpuQueue, Result};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn setup_cpu() -> (CpuClient, CpuDevice) {
    let device = CpuDevice::new();
    let client = CpuClient::new(device.clone());
    (client, device)
}

/// Deterministic pseudo-random values using sin-based pattern.
pub fn det_values(n: usize) -> Vec<f32> {
    (0..n).map(|i| (i as f32 * 0.1).sin() * 0.5).collect()
}

/// Deterministic pseudo-random tensor using sin-based pattern.
pub fn det_tensor(shape: &[usize], device: &CpuDevice) -> Tensor<CpuRuntime> {
    let n: usize = shape.iter().product();
    Tensor::<CpuRuntime>::from_slice(&det_values(n), shape, device)
}

/// Deterministic INT4 values covering the full `[-8, 7]` range.
pub fn det_int4(n: usize) -> Vec<i8> {
    (0..n).map(|i| ((i * 5 + 3) % 16) as i8 - 8).collect()
}

pub fn to_bytes(dtype: DType, values: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * dtype.size_in_bytes()];
    encode_elements(dtype, values, &mut out);
    out
}

/// `values` as they look after a trip through `dtype` storage.
pub fn rounded(dtype: DType, values: &[f32]) -> Vec<f32> {
    decode_elements(dtype, &to_bytes(dtype, values))
}

pub fn assert_parity_f32_tol(a: &[f32], b: &[f32], op: &str, rtol: f32, atol: f32) {
    assert_eq!(
        a.len(),
        b.len(),
        "parity_f32[{}]: length mismatch: {} vs {}",
        op,
        a.len(),
        b.len()
    );
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        if diff > tol {
            panic!(
                "parity_f32[{}] at index {}: {} vs {} (diff={}, tol={})",
                op, i, x, y, diff, tol
            );
        }
    }
}

/// Tolerance matching the storage precision of `dtype`.
pub fn tolerance(dtype: DType) -> (f32, f32) {
    match dtype {
        DType::F32 => (1e-4, 1e-4),
        _ => (2e-2, 2e-2),
    }
}

/// One complete problem: every tensor the operator may consume, in f32.
pub struct Fixture {
    pub dtype: DType,
    pub mode: QuantMode,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub group_size: usize,
    pub act: Vec<f32>,
    pub pre_quant_scale: Vec<f32>,
    pub q: Vec<i8>,
    pub scales: Vec<f32>,
    pub zeros: Vec<f32>,
    pub bias: Vec<f32>,
}

/// What one enqueue produced.
pub struct Outcome {
    pub output: Vec<f32>,
    pub raw: Vec<u8>,
    pub launches: Vec<&'static str>,
}

impl Fixture {
    pub fn new(dtype: DType, mode: QuantMode, m: usize, n: usize, k: usize, group_size: usize) -> Self {
        let groups = k / group_size;
        Self {
            dtype,
            mode,
            m,
            n,
            k,
            group_size,
            act: det_values(m * k),
            pre_quant_scale: (0..k).map(|i| 0.5 + (i % 4) as f32 * 0.25).collect(),
            q: det_int4(k * n),
            scales: (0..groups * n)
                .map(|i| 0.01 + (i as f32 * 0.001).sin().abs() * 0.1)
                .collect(),
            zeros: (0..groups * n)
                .map(|i| (i as f32 * 0.002).cos() * 0.01)
                .collect(),
            bias: (0..n).map(|i| (i as f32 * 0.3).sin()).collect(),
        }
    }

    /// Same data restricted to the first `m` activation rows.
    pub fn with_rows(&self, m: usize) -> Self {
        Self {
            m,
            act: self.act[..m * self.k].to_vec(),
            pre_quant_scale: self.pre_quant_scale.clone(),
            q: self.q.clone(),
            scales: self.scales.clone(),
            zeros: self.zeros.clone(),
            bias: self.bias.clone(),
            ..*self
        }
    }

    pub fn with_mode(mut self, mode: QuantMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn operator(&self) -> GroupwiseQuantMatmul {
        GroupwiseQuantMatmul::new(self.dtype, self.mode, self.group_size).unwrap()
    }

    /// Descriptors and buffers in operator input order.
    pub fn inputs(&self) -> (Vec<TensorDesc>, Vec<Vec<u8>>) {
        let dtype = self.dtype;
        let groups = self.k / self.group_size;
        let words = pack_matrix(&self.q, self.k, self.n);

        let mut descs = vec![TensorDesc::new(&[self.m, self.k], dtype)];
        let mut bufs = vec![to_bytes(dtype, &self.act)];
        if self.mode.pre_quant_scale {
            descs.push(TensorDesc::new(&[self.k], dtype));
            bufs.push(to_bytes(dtype, &self.pre_quant_scale));
        }
        descs.push(TensorDesc::new(&[self.k, self.n / 8], DType::I32));
        bufs.push(bytemuck::cast_slice::<u32, u8>(&words).to_vec());
        descs.push(TensorDesc::new(&[groups, self.n], dtype));
        bufs.push(to_bytes(dtype, &self.scales));
        if self.mode.zeros {
            descs.push(TensorDesc::new(&[groups, self.n], dtype));
            bufs.push(to_bytes(dtype, &self.zeros));
        }
        if self.mode.bias {
            descs.push(TensorDesc::new(&[self.n], dtype));
            bufs.push(to_bytes(dtype, &self.bias));
        }
        (descs, bufs)
    }

    pub fn output_desc(&self) -> TensorDesc {
        TensorDesc::new(&[self.m, self.n], self.dtype)
    }

    /// Configure a copy of `op` for exactly this problem and return its workspace size.
    pub fn configured_workspace(&self, op: &GroupwiseQuantMatmul) -> usize {
        let (descs, _) = self.inputs();
        let inputs: Vec<_> = descs.into_iter().map(DynamicTensorDesc::fixed).collect();
        let mut op = op.clone();
        op.configure(&inputs, &[DynamicTensorDesc::fixed(self.output_desc())])
            .unwrap();
        op.workspace_size()
    }

    pub fn try_run(&self, op: &GroupwiseQuantMatmul, workspace_bytes: usize) -> Result<Outcome> {
        init_logging();
        let (descs, bufs) = self.inputs();
        let inputs: Vec<&[u8]> = bufs.iter().map(Vec::as_slice).collect();
        let mut raw = vec![0u8; self.m * self.n * self.dtype.size_in_bytes()];
        let mut workspace = vec![0u8; workspace_bytes];
        let mut queue = CpuQueue::new();
        op.enqueue(
            &descs,
            &[self.output_desc()],
            &inputs,
            &mut raw,
            &mut workspace,
            &mut queue,
        )?;
        Ok(Outcome {
            output: decode_elements(self.dtype, &raw),
            raw,
            launches: queue.take_launches(),
        })
    }

    pub fn run(&self, op: &GroupwiseQuantMatmul) -> Outcome {
        self.try_run(op, self.configured_workspace(op)).unwrap()
    }

    /// Straightforward f64 evaluation over the dtype-rounded inputs.
    pub fn reference(&self) -> Vec<f32> {
        let dtype = self.dtype;
        let act = rounded(dtype, &self.act);
        let act = if self.mode.pre_quant_scale {
            let pre = rounded(dtype, &self.pre_quant_scale);
            let scaled: Vec<f32> = act
                .iter()
                .enumerate()
                .map(|(i, a)| a * pre[i % self.k])
                .collect();
            rounded(dtype, &scaled)
        } else {
            act
        };
        let scales = rounded(dtype, &self.scales);
        let zeros = rounded(dtype, &self.zeros);
        let bias = rounded(dtype, &self.bias);

        let mut out = vec![0.0f32; self.m * self.n];
        for row in 0..self.m {
            for col in 0..self.n {
                let mut acc = 0.0f64;
                for kk in 0..self.k {
                    let g = (kk / self.group_size) * self.n + col;
                    let mut w = self.q[kk * self.n + col] as f32 * scales[g];
                    if self.mode.zeros {
                        w += zeros[g];
                    }
                    acc += act[row * self.k + kk] as f64 * w as f64;
                }
                if self.mode.bias {
                    acc += bias[col] as f64;
                }
                out[row * self.n + col] = acc as f32;
            }
        }
        out
    }
}
