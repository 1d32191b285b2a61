//! Serialization round-trips and attribute manifests

use super::helpers::*;
use numr::dtype::DType;
use std::io::Write;
use woq_matmul::plugin::{
    GroupwiseQuantMatmulCreator, OperatorAttributes, SERIALIZED_SIZE, SUPPORTED_DTYPES,
};
use woq_matmul::quant::QuantMode;
use woq_matmul::{Error, GroupwiseQuantMatmul};

#[test]
fn test_roundtrip_every_mode_and_dtype() {
    for dtype in SUPPORTED_DTYPES {
        for mode in QuantMode::ALL {
            for group_size in [32, 64, 128] {
                let op = GroupwiseQuantMatmul::new(dtype, mode, group_size).unwrap();
                let bytes = op.to_bytes().unwrap();
                assert_eq!(bytes.len(), SERIALIZED_SIZE);

                let restored = GroupwiseQuantMatmul::deserialize(&bytes).unwrap();
                assert_eq!(restored.config(), op.config());
                assert_eq!(restored.layout(), op.layout());
                assert_eq!(restored.to_bytes().unwrap(), bytes);
            }
        }
    }
}

#[test]
fn test_restored_operator_computes_the_same() {
    let fixture = Fixture::new(DType::F16, QuantMode::new(true, true, true), 6, 64, 128, 64);
    let op = fixture.operator();
    let restored = GroupwiseQuantMatmulCreator::new()
        .deserialize("woq", &op.to_bytes().unwrap())
        .unwrap();
    assert_eq!(fixture.run(&op).raw, fixture.run(&restored).raw);
}

#[test]
fn test_deserialize_requires_exact_length() {
    let op = GroupwiseQuantMatmul::new(DType::F16, QuantMode::default(), 128).unwrap();
    let mut bytes = op.to_bytes().unwrap();

    bytes.push(0);
    assert!(matches!(
        GroupwiseQuantMatmul::deserialize(&bytes),
        Err(Error::Serialization { .. })
    ));
    assert!(matches!(
        GroupwiseQuantMatmul::deserialize(&bytes[..SERIALIZED_SIZE - 2]),
        Err(Error::Serialization { .. })
    ));
    assert!(GroupwiseQuantMatmul::deserialize(&[]).is_err());
}

#[test]
fn test_serialize_into_larger_buffer() {
    let op = GroupwiseQuantMatmul::new(DType::BF16, QuantMode::new(false, true, false), 64).unwrap();
    let mut buf = vec![0xAAu8; 32];
    op.serialize_into(&mut buf).unwrap();
    assert_eq!(&buf[..SERIALIZED_SIZE], op.to_bytes().unwrap().as_slice());
    assert!(buf[SERIALIZED_SIZE..].iter().all(|&b| b == 0xAA));
    assert!(op.serialize_into(&mut buf[..SERIALIZED_SIZE - 1]).is_err());
}

#[test]
fn test_yaml_manifest() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "# exported by the graph builder\ntype_id: 7\nquant_algo: 3\ngroup_size: 64\nlayer: decoder.0.mlp"
    )
    .unwrap();

    let attrs = OperatorAttributes::load_yaml(file.path()).unwrap();
    let mut creator = GroupwiseQuantMatmulCreator::new();
    creator.set_namespace("models");
    let op = creator.create_from_attributes(&attrs).unwrap();
    assert_eq!(op.config().dtype, DType::BF16);
    assert_eq!(op.config().mode, QuantMode::new(false, true, true));
    assert_eq!(op.config().group_size, 64);
    assert_eq!(op.namespace(), "models");
}

#[test]
fn test_json_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("woq.json");
    let attrs = OperatorAttributes {
        type_id: 0,
        quant_algo: 4,
        group_size: 128,
    };
    std::fs::write(&path, serde_json::to_string(&attrs).unwrap()).unwrap();

    let loaded = OperatorAttributes::load_json(&path).unwrap();
    assert_eq!(loaded, attrs);
    let config = loaded.to_config().unwrap();
    assert_eq!(config.dtype, DType::F32);
    assert!(config.mode.pre_quant_scale);

    assert!(matches!(
        OperatorAttributes::load_json(dir.path().join("missing.json")),
        Err(Error::Attribute { .. })
    ));
}

#[test]
fn test_manifest_with_bad_flags_rejected() {
    let attrs = OperatorAttributes::from_yaml_str("type_id: 1\nquant_algo: 12\ngroup_size: 64\n").unwrap();
    assert!(matches!(attrs.to_config(), Err(Error::Config { .. })));
}
