//! Custom serde helpers for bytes::Bytes using serde_bytes

use bytes::Bytes;
use serde::{Deserializer, Serializer};

/// Serialize Bytes as a CBOR byte string
pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serde_bytes::serialize(bytes.as_ref(), serializer)
}

/// Deserialize Bytes from a CBOR byte string
pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    let vec: Vec<u8> = serde_bytes::deserialize(deserializer)?;
    Ok(Bytes::from(vec))
}

/// Same helpers for optional byte strings
pub mod option {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize Option<Bytes> as an optional CBOR byte string
    #[allow(dead_code)]
    pub fn serialize<S>(bytes: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(b) => serde_bytes::serialize(b.as_ref(), serializer),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize Option<Bytes> from an optional CBOR byte string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Bytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec: Option<Vec<u8>> = Option::<serde_bytes::ByteBuf>::deserialize(deserializer)?
            .map(serde_bytes::ByteBuf::into_vec);
        Ok(vec.map(Bytes::from))
    }
}
