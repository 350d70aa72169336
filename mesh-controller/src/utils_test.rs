use anyhow::Result;

use crate::grpc::MetricsData;
use crate::utils;

#[test]
fn i64_encoding_preserves_sign_and_magnitude() -> Result<()> {
    for val in [i64::MIN, -1, 0, 1, 42, i64::MAX] {
        let output = utils::decode_i64(&utils::encode_i64(val))?;
        assert_eq!(output, val, "expected decoded i64 to match, got {}, expected {}", output, val);
    }
    let res = utils::decode_i64(b"short");
    assert!(res.is_err(), "expected decoding of a 5 byte buffer as i64 to fail");
    Ok(())
}

#[test]
fn model_encoding_preserves_fields() -> Result<()> {
    let model = MetricsData {
        received_total: 12,
        processed_successfully_total: 10,
        avg_process_latency: 3.5,
        ..Default::default()
    };
    let output: MetricsData = utils::decode_model(&utils::encode_model(&model)?)?;
    assert_eq!(output, model, "expected decoded model to match its source");
    Ok(())
}

#[test]
fn parse_ordinal_requires_owner_prefix() {
    let cases = vec![
        ("fn1-0", Some(0)),
        ("fn1-12", Some(12)),
        ("fn1-", None),
        ("fn1-x", None),
        ("fn1-function-3", None),
        ("other-1", None),
        ("fn10-1", None),
    ];
    for (pod, expected) in cases {
        let output = utils::parse_ordinal("fn1", pod);
        assert_eq!(output, expected, "unexpected ordinal parsed from pod {}, got {:?}, expected {:?}", pod, output, expected);
    }
}

#[test]
fn pod_address_follows_headless_service_dns() {
    let output = utils::pod_address("fn1-0", "fn1", "default", "cluster.local");
    assert_eq!(output, "fn1-0.fn1.default.svc.cluster.local");
}
