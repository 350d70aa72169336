use anyhow::{bail, Context, Result};
use prost::Message;

/// Encode the given i64 as an array of big-endian bytes.
pub fn encode_i64(val: i64) -> [u8; 8] {
    val.to_be_bytes()
}

/// Decode the given bytes as a i64.
pub fn decode_i64(val: &[u8]) -> Result<i64> {
    match val {
        [b0, b1, b2, b3, b4, b5, b6, b7] => Ok(i64::from_be_bytes([*b0, *b1, *b2, *b3, *b4, *b5, *b6, *b7])),
        _ => bail!("invalid byte array given to decode as i64, invalid len {} needed 8", val.len()),
    }
}

/// Encode the given model into a bytes vec.
pub fn encode_model<M: Message>(model: &M) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(model.encoded_len());
    model.encode(&mut buf).context("error serializing data model")?;
    Ok(buf)
}

/// Decode an object from the given buffer.
pub fn decode_model<M: Message + Default>(data: &[u8]) -> Result<M> {
    M::decode(data).context("error decoding object from storage")
}

/// Parse the replica ordinal out of a StatefulSet pod name of the form `{owner}-{ordinal}`.
pub fn parse_ordinal(owner: &str, pod_name: &str) -> Option<u32> {
    pod_name
        .strip_prefix(owner)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|ordinal| ordinal.parse::<u32>().ok())
}

/// Build the stable network address of a StatefulSet pod behind its headless service.
pub fn pod_address(pod_name: &str, subdomain: &str, namespace: &str, cluster_domain: &str) -> String {
    format!("{}.{}.{}.svc.{}", pod_name, subdomain, namespace, cluster_domain)
}
