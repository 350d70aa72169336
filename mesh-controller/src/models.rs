//! Data models persisted by the table store.

/// A versioned value stored under a table key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KvRecord {
    /// The raw bytes of the value.
    #[prost(bytes = "vec", tag = "1")]
    pub value: ::prost::alloc::vec::Vec<u8>,
    /// The version of this record, incremented on every write.
    #[prost(uint64, tag = "2")]
    pub version: u64,
    /// The value is a big-endian i64 counter.
    #[prost(bool, tag = "3")]
    pub is_number: bool,
}
