//! GroupwiseMatmulOps on CPU tensors

use super::helpers::*;
use numr::dtype::DType;
use numr::runtime::cpu::CpuRuntime;
use numr::tensor::Tensor;
use woq_matmul::quant::QuantMode;
use woq_matmul::quant::packing::pack_matrix;
use woq_matmul::{GroupwiseMatmulOps, GroupwiseOptionals};

#[test]
fn test_tensor_api_matches_operator() {
    let (client, device) = setup_cpu();
    let (m, n, k, g) = (6, 32, 64, 16);
    let fixture = Fixture::new(DType::F32, QuantMode::new(true, true, true), m, n, k, g);

    let input = Tensor::<CpuRuntime>::from_slice(&fixture.act, &[2, 3, k], &device);
    let words = pack_matrix(&fixture.q, k, n);
    let qweight = Tensor::<CpuRuntime>::from_slice(
        bytemuck::cast_slice::<u32, f32>(&words),
        &[k, n / 8],
        &device,
    );
    let scales = Tensor::<CpuRuntime>::from_slice(&fixture.scales, &[k / g, n], &device);
    let zeros = Tensor::<CpuRuntime>::from_slice(&fixture.zeros, &[k / g, n], &device);
    let bias = Tensor::<CpuRuntime>::from_slice(&fixture.bias, &[n], &device);
    let pre = Tensor::<CpuRuntime>::from_slice(&fixture.pre_quant_scale, &[k], &device);

    let optionals = GroupwiseOptionals {
        pre_quant_scale: Some(&pre),
        zeros: Some(&zeros),
        bias: Some(&bias),
    };
    let out = client
        .groupwise_quant_matmul(&input, &qweight, &scales, &optionals, g)
        .unwrap();
    assert_eq!(out.shape(), &[2, 3, n]);
    assert_eq!(out.dtype(), DType::F32);

    let via_operator = fixture.run(&fixture.operator()).output;
    assert_eq!(out.to_vec::<f32>(), via_operator);
}

#[test]
fn test_tensor_api_scale_only() {
    let (client, device) = setup_cpu();
    let (m, n, k, g) = (2, 16, 32, 32);
    let fixture = Fixture::new(DType::F32, QuantMode::default(), m, n, k, g);

    let input = det_tensor(&[m, k], &device);
    let words = pack_matrix(&fixture.q, k, n);
    let qweight = Tensor::<CpuRuntime>::from_slice(
        bytemuck::cast_slice::<u32, f32>(&words),
        &[k, n / 8],
        &device,
    );
    let scales = Tensor::<CpuRuntime>::from_slice(&fixture.scales, &[1, n], &device);

    let out = client
        .groupwise_quant_matmul(&input, &qweight, &scales, &GroupwiseOptionals::default(), g)
        .unwrap();
    let (rtol, atol) = tolerance(DType::F32);
    assert_parity_f32_tol(&out.to_vec::<f32>(), &fixture.reference(), "scale_only", rtol, atol);
}

#[test]
fn test_tensor_api_rejects_non_f32_input() {
    let (client, device) = setup_cpu();
    let input = Tensor::<CpuRuntime>::from_slice(&[1i32; 16], &[2, 8], &device);
    let qweight = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 8], &[8, 1], &device);
    let scales = Tensor::<CpuRuntime>::from_slice(&[1.0f32; 8], &[1, 8], &device);
    assert!(
        client
            .groupwise_quant_matmul(&input, &qweight, &scales, &GroupwiseOptionals::default(), 8)
            .is_err()
    );
}
