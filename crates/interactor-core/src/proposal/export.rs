//! Safe Transaction Builder batch files.
//!
//! Owners who sign outside this client can import the JSON produced here into
//! the Safe web app's Transaction Builder.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calls::TransactionBatch;

/// Batch file format version understood by the Transaction Builder.
pub const TX_BUILDER_FORMAT_VERSION: &str = "1.0";

/// Top-level Transaction Builder document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBuilderBatch {
    /// Format version.
    pub version: String,
    /// Chain id, as a decimal string.
    pub chain_id: String,
    /// Creation time in milliseconds since the epoch.
    pub created_at: i64,
    /// Descriptive metadata.
    pub meta: TxBuilderMeta,
    /// The calls.
    pub transactions: Vec<TxBuilderTransaction>,
}

/// Metadata block of a Transaction Builder document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBuilderMeta {
    /// Short batch name.
    pub name: String,
    /// Longer description.
    pub description: String,
    /// Safe the batch was created for, checksummed.
    pub created_from_safe_address: String,
}

/// One call in a Transaction Builder document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBuilderTransaction {
    /// Call target, checksummed.
    pub to: String,
    /// Native value in wei, as a decimal string.
    pub value: String,
    /// `0x`-prefixed call data.
    pub data: String,
}

impl TxBuilderBatch {
    /// Renders `batch` for import into the Safe at `safe`.
    #[must_use]
    pub fn from_batch(
        batch: &TransactionBatch,
        chain_id: u64,
        safe: Address,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        Self {
            version: TX_BUILDER_FORMAT_VERSION.to_string(),
            chain_id: chain_id.to_string(),
            created_at: created_at.timestamp_millis(),
            meta: TxBuilderMeta {
                description: format!("{name} ({} call(s))", batch.len()),
                name,
                created_from_safe_address: safe.to_checksum(None),
            },
            transactions: batch
                .transactions()
                .iter()
                .map(|tx| TxBuilderTransaction {
                    to: tx.to.to_checksum(None),
                    value: tx.value.to_string(),
                    data: tx.data.to_string(),
                })
                .collect(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::proposal::calls::pause;

    #[test]
    fn test_export_shape() {
        let interactor = Address::repeat_byte(0xaa);
        let safe = Address::repeat_byte(0x5a);
        let batch = pause(interactor).batch().unwrap();
        let created_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let export = TxBuilderBatch::from_batch(&batch, 8_453, safe, "Pause", created_at);
        let json: serde_json::Value =
            serde_json::from_str(&export.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["version"], "1.0");
        assert_eq!(json["chainId"], "8453");
        assert_eq!(json["createdAt"], 1_700_000_000_000_i64);
        assert_eq!(json["meta"]["name"], "Pause");
        assert_eq!(
            json["meta"]["createdFromSafeAddress"],
            safe.to_checksum(None)
        );
        assert_eq!(json["transactions"][0]["value"], "0");
        // pause() selector
        assert_eq!(json["transactions"][0]["data"], "0x8456cb59");
    }
}
