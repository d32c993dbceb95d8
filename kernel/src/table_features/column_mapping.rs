//! Code to handle column mapping modes
use super::ReaderFeatures;
use crate::actions::{Metadata, Protocol};
use crate::table_properties::TableProperties;
use crate::{DeltaResult, Error};

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};

/// Table property that selects the column mapping mode
pub const COLUMN_MAPPING_MODE_KEY: &str = "delta.columnMapping.mode";

/// Modes of column mapping a table can be in
#[derive(
    Debug, EnumString, StrumDisplay, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Default,
)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum ColumnMappingMode {
    /// No column mapping is applied
    #[default]
    None,
    /// Columns are mapped by their field_id in parquet
    Id,
    /// Columns are mapped to a physical name
    Name,
}

/// Determine the column mapping mode for a table based on the [`Protocol`] and [`TableProperties`]
pub fn column_mapping_mode(
    protocol: &Protocol,
    table_properties: &TableProperties,
) -> ColumnMappingMode {
    let mode = table_properties
        .column_mapping_mode
        .as_deref()
        .and_then(|mode| mode.parse().ok());
    match (mode, protocol.min_reader_version) {
        // NOTE: The table property is optional even when the feature is supported, and is allowed
        // (but should be ignored) even when the feature is not supported. For details see
        // https://github.com/delta-io/delta/blob/master/PROTOCOL.md#column-mapping
        (Some(mode), 2) => mode,
        (Some(mode), 3) if protocol.has_reader_feature(&ReaderFeatures::ColumnMapping) => mode,
        _ => ColumnMappingMode::None,
    }
}

/// Fail with [`Error::UnsupportedColumnMapping`] if the table sets a mode that is not one of
/// `none`, `id` or `name` (in any case).
pub(crate) fn validate_column_mapping_mode(metadata: &Metadata) -> DeltaResult<()> {
    match metadata.configuration.get(COLUMN_MAPPING_MODE_KEY) {
        Some(mode) if mode.parse::<ColumnMappingMode>().is_err() => {
            Err(Error::unsupported_column_mapping(mode))
        }
        _ => Ok(()),
    }
}
