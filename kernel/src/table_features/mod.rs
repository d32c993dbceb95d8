//! Protocol level table features, and the check that a table only requires reader features this
//! crate implements.

use std::collections::HashSet;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumString, VariantNames};
use tracing::debug;

use crate::actions::{Metadata, Protocol};
use crate::{DeltaResult, Error};

pub use column_mapping::{column_mapping_mode, ColumnMappingMode, COLUMN_MAPPING_MODE_KEY};
pub(crate) use column_mapping::validate_column_mapping_mode;
mod column_mapping;

/// Reader features communicate capabilities that must be implemented in order to correctly read a
/// given table. That is, readers must implement and respect all features listed in a table's
/// `readerFeatures`. Note that any feature listed as a reader feature must also be listed as a
/// writer feature.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Eq,
    PartialEq,
    EnumString,
    StrumDisplay,
    AsRefStr,
    VariantNames,
    Hash,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum ReaderFeatures {
    /// Mapping of one column to another
    ColumnMapping,
    /// Deletion vectors for merge, update, delete
    DeletionVectors,
    /// timestamps without timezone support
    #[strum(serialize = "timestampNtz")]
    #[serde(rename = "timestampNtz")]
    TimestampWithoutTimezone,
    // Allow columns to change type
    TypeWidening,
    #[strum(serialize = "typeWidening-preview")]
    #[serde(rename = "typeWidening-preview")]
    TypeWideningPreview,
    /// version 2 of checkpointing
    V2Checkpoint,
    /// vacuumProtocolCheck ReaderWriter feature ensures consistent application of reader and writer
    /// protocol checks during VACUUM operations
    VacuumProtocolCheck,
    /// Semi-structured variant columns, preview version
    #[strum(serialize = "variantType-preview")]
    #[serde(rename = "variantType-preview")]
    VariantTypePreview,
}

impl From<ReaderFeatures> for String {
    fn from(feature: ReaderFeatures) -> Self {
        feature.to_string()
    }
}

pub(crate) static SUPPORTED_READER_FEATURES: LazyLock<HashSet<ReaderFeatures>> =
    LazyLock::new(|| {
        HashSet::from([
            ReaderFeatures::ColumnMapping,
            ReaderFeatures::DeletionVectors,
            ReaderFeatures::TimestampWithoutTimezone,
            ReaderFeatures::TypeWidening,
            ReaderFeatures::TypeWideningPreview,
            ReaderFeatures::V2Checkpoint,
            ReaderFeatures::VacuumProtocolCheck,
            ReaderFeatures::VariantTypePreview,
        ])
    });

fn is_supported_reader_feature(name: &str) -> bool {
    name.parse::<ReaderFeatures>()
        .is_ok_and(|feature| SUPPORTED_READER_FEATURES.contains(&feature))
}

/// Check that this reader can read a table with the given protocol and metadata.
///
/// - reader version 1: always readable
/// - reader version 2: the column mapping mode, if set, must be `none`, `id` or `name`
/// - reader version 3: every reader feature must be supported, and if column mapping is among
///   them the mode must be valid too
pub fn validate_read_support(protocol: &Protocol, metadata: &Metadata) -> DeltaResult<()> {
    match protocol.min_reader_version {
        1 => Ok(()),
        2 => validate_column_mapping_mode(metadata),
        3 => {
            let unsupported: Vec<String> = protocol
                .reader_features
                .iter()
                .filter(|name| !is_supported_reader_feature(name))
                .cloned()
                .collect();
            if !unsupported.is_empty() {
                return Err(Error::UnsupportedReaderFeatures(unsupported));
            }
            if protocol.has_reader_feature(&ReaderFeatures::ColumnMapping) {
                validate_column_mapping_mode(metadata)?;
            }
            debug!(features = ?protocol.reader_features, "reader features supported");
            Ok(())
        }
        version => Err(Error::UnsupportedProtocolVersion(version)),
    }
}
