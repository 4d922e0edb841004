//! JSON operations using sonic-rs.

use crate::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};

/// Deserialize JSON bytes.
///
/// # Errors
/// Returns error if JSON is invalid.
pub fn from_json_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    sonic_rs::from_slice(bytes).map_err(Error::from)
}

/// Deserialize JSON bytes, reporting failures as malformed metadata from `origin`.
///
/// # Errors
/// Returns [`Error::MalformedMetadata`] if the bytes do not decode into `T`.
pub fn from_metadata_slice<T: DeserializeOwned>(origin: &str, bytes: &[u8]) -> Result<T> {
    sonic_rs::from_slice(bytes).map_err(|e| Error::malformed(origin, e))
}

/// Serialize to compact JSON bytes.
///
/// # Errors
/// Returns error if serialization fails.
pub fn to_json_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    sonic_rs::to_vec(value).map_err(Error::from)
}

/// Convert a serializable value into an opaque JSON value.
///
/// # Errors
/// Returns error if serialization fails.
pub fn to_json_value<T: Serialize>(value: &T) -> Result<sonic_rs::Value> {
    from_json_slice(&to_json_vec(value)?)
}

/// Serialize to pretty JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    sonic_rs::to_string_pretty(value).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct List {
        #[serde(rename = "packageNames")]
        package_names: Vec<String>,
    }

    #[test]
    fn roundtrip() {
        let orig = List {
            package_names: vec!["acme/widget".into()],
        };
        let json = to_json_vec(&orig).unwrap();
        let parsed: List = from_json_slice(&json).unwrap();
        assert_eq!(orig, parsed);
    }

    #[test]
    fn metadata_errors_carry_origin() {
        let err = from_metadata_slice::<List>("packages/list.json", b"[1,2]").unwrap_err();
        assert!(matches!(err, Error::MalformedMetadata { ref origin, .. } if origin == "packages/list.json"));
    }
}
