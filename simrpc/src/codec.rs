//! The codec boundary.
//!
//! Arguments and results travel through the network as opaque bytes.
//! The rest of the crate only relies on [`encode`] and [`decode`] round-tripping
//! the declared types, so the wire format can be swapped here.

use crate::Result;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// Encode a value into bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(bincode::serialize(value)?))
}

/// Decode bytes into a value of type `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct PutArgs {
        key: String,
        value: Vec<u8>,
    }

    #[test]
    fn struct_payload() {
        let args = PutArgs {
            key: "k".into(),
            value: vec![1, 2, 3],
        };
        let bytes = encode(&args).unwrap();
        assert_eq!(decode::<PutArgs>(&bytes).unwrap(), args);
    }

    #[test]
    fn truncated_payload() {
        let bytes = encode(&(1u64, 2u64)).unwrap();
        assert!(decode::<(u64, u64)>(&bytes[..4]).is_err());
    }
}
