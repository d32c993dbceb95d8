//! Delta Table properties. Note this module implements per-table configuration which governs how
//! table-level capabilities/properties are configured (turned on/off etc.). This is orthogonal to
//! protocol-level 'table features' which enable or disable reader/writer features (which then
//! usually must be enabled/configured by table properties).

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

use crate::table_features::COLUMN_MAPPING_MODE_KEY;

mod parse;
use parse::{parse_bool, parse_interval, parse_pos_int};

const APPEND_ONLY_KEY: &str = "delta.appendOnly";
const CHECKPOINT_INTERVAL_KEY: &str = "delta.checkpointInterval";
const ENABLE_DELETION_VECTORS_KEY: &str = "delta.enableDeletionVectors";
const LOG_RETENTION_DURATION_KEY: &str = "delta.logRetentionDuration";
const CHECKPOINT_RETENTION_DURATION_KEY: &str = "delta.checkpointRetentionDuration";

/// Delta table properties. These are parsed from the 'configuration' map in the most recent
/// 'Metadata' action of a table.
///
/// A value that fails to parse is kept in `unknown_properties` instead, so a misconfigured
/// property never makes a table unreadable.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct TableProperties {
    /// true for this Delta table to be append-only. If append-only, existing records cannot be
    /// deleted, and existing values cannot be updated.
    pub append_only: Option<bool>,

    /// Interval (expressed as number of commits) after which a new checkpoint should be created.
    pub checkpoint_interval: Option<u64>,

    /// The raw value of `delta.columnMapping.mode`. It is validated, not parsed, here so that
    /// an unknown mode can be reported with the exact value the table carries.
    pub column_mapping_mode: Option<String>,

    /// true to enable deletion vectors and predictive I/O for updates.
    pub enable_deletion_vectors: Option<bool>,

    /// How long the history for a Delta table is kept.
    pub log_retention_duration: Option<Duration>,

    /// How long checkpoints are kept around once a newer one exists.
    pub checkpoint_retention_duration: Option<Duration>,

    /// any unrecognized properties are passed through and ignored by the parser
    pub unknown_properties: HashMap<String, String>,
}

impl From<&HashMap<String, String>> for TableProperties {
    fn from(configuration: &HashMap<String, String>) -> Self {
        let mut props = TableProperties::default();
        for (key, value) in configuration {
            let parsed = match key.as_str() {
                APPEND_ONLY_KEY => parse_bool(value).map(|v| props.append_only = Some(v)),
                CHECKPOINT_INTERVAL_KEY => {
                    parse_pos_int(value).map(|v| props.checkpoint_interval = Some(v))
                }
                COLUMN_MAPPING_MODE_KEY => {
                    props.column_mapping_mode = Some(value.clone());
                    Ok(())
                }
                ENABLE_DELETION_VECTORS_KEY => {
                    parse_bool(value).map(|v| props.enable_deletion_vectors = Some(v))
                }
                LOG_RETENTION_DURATION_KEY => {
                    parse_interval(value).map(|v| props.log_retention_duration = Some(v))
                }
                CHECKPOINT_RETENTION_DURATION_KEY => {
                    parse_interval(value).map(|v| props.checkpoint_retention_duration = Some(v))
                }
                _ => {
                    props.unknown_properties.insert(key.clone(), value.clone());
                    Ok(())
                }
            };
            if let Err(reason) = parsed {
                warn!("Ignoring table property {key}: {reason}");
                props.unknown_properties.insert(key.clone(), value.clone());
            }
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_table_properties() {
        assert_eq!(
            TableProperties::from(&HashMap::new()),
            TableProperties::default()
        );
    }

    #[test]
    fn test_parse_table_properties() {
        let actual = TableProperties::from(&config(&[
            ("delta.appendOnly", "true"),
            ("delta.checkpointInterval", "101"),
            ("delta.columnMapping.mode", "id"),
            ("delta.enableDeletionVectors", "false"),
            ("delta.logRetentionDuration", "interval 2 seconds"),
            ("delta.checkpointRetentionDuration", "interval 2 days"),
            ("some_random_unknown_key", "test"),
        ]));
        let expected = TableProperties {
            append_only: Some(true),
            checkpoint_interval: Some(101),
            column_mapping_mode: Some("id".to_string()),
            enable_deletion_vectors: Some(false),
            log_retention_duration: Some(Duration::new(2, 0)),
            checkpoint_retention_duration: Some(Duration::from_secs(2 * 86_400)),
            unknown_properties: config(&[("some_random_unknown_key", "test")]),
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_bad_values_are_kept_as_unknown() {
        let actual = TableProperties::from(&config(&[
            ("delta.appendOnly", "wack"),
            ("delta.checkpointInterval", "0"),
        ]));
        assert_eq!(actual.append_only, None);
        assert_eq!(actual.checkpoint_interval, None);
        assert_eq!(actual.unknown_properties.len(), 2);
    }
}
