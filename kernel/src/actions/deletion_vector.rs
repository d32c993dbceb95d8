//! Deletion vector descriptors as they appear on add and remove actions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionVectorDescriptor {
    /// A single character to indicate how to access the DV. Legal options are: ['u', 'i', 'p'].
    pub storage_type: String,

    /// Three format options are currently proposed:
    /// - If `storageType = 'u'` then `<random prefix - optional><base85 encoded uuid>`:
    ///   The deletion vector is stored in a file with a path relative to the data
    ///   directory of this Delta table, and the file name can be reconstructed from
    ///   the UUID.
    /// - If `storageType = 'i'` then `<base85 encoded bytes>`: The deletion vector
    ///   is stored inline in the log.
    /// - If `storageType = 'p'` then `<absolute path>`: The DV is stored in a file with an
    ///   absolute path given by this path, which has the same format as the `path` field
    ///   in the `add`/`remove` actions.
    pub path_or_inline_dv: String,

    /// Start of the data for this DV in number of bytes from the beginning of the file it is stored in.
    /// Always None (absent in JSON) when `storageType = 'i'`.
    pub offset: Option<i32>,

    /// Size of the serialized DV in bytes (raw data size, i.e. before base85 encoding, if inline).
    pub size_in_bytes: i32,

    /// Number of rows the given DV logically removes from the file.
    pub cardinality: i64,
}

impl DeletionVectorDescriptor {
    /// A string that uniquely identifies the deletion vector within a table. Together with the
    /// file path it forms the key under which file actions are reconciled.
    pub fn unique_id(&self) -> String {
        Self::unique_id_from_parts(&self.storage_type, &self.path_or_inline_dv, self.offset)
    }

    pub(crate) fn unique_id_from_parts(
        storage_type: &str,
        path_or_inline_dv: &str,
        offset: Option<i32>,
    ) -> String {
        match offset {
            Some(offset) => format!("{storage_type}{path_or_inline_dv}@{offset}"),
            None => format!("{storage_type}{path_or_inline_dv}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dv(storage_type: &str, offset: Option<i32>) -> DeletionVectorDescriptor {
        DeletionVectorDescriptor {
            storage_type: storage_type.to_string(),
            path_or_inline_dv: "vBn[lx{q8@P<9BNH/isA".to_string(),
            offset,
            size_in_bytes: 36,
            cardinality: 2,
        }
    }

    #[test]
    fn test_unique_id() {
        assert_eq!(dv("u", Some(1)).unique_id(), "uvBn[lx{q8@P<9BNH/isA@1");
        assert_eq!(dv("i", None).unique_id(), "ivBn[lx{q8@P<9BNH/isA");
    }

    #[test]
    fn test_deserialize_without_offset() {
        let dv: DeletionVectorDescriptor = serde_json::from_str(
            r#"{"storageType":"i","pathOrInlineDv":"wi5b=000010000siXQKl0rr91000f55c8Xg0@@D72lkbi5=-{L","sizeInBytes":40,"cardinality":6}"#,
        )
        .unwrap();
        assert_eq!(dv.offset, None);
        assert_eq!(dv.cardinality, 6);
    }
}
