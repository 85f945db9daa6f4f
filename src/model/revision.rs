use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ConfigVariant, Id, VariantState};

/// Immutable snapshot of a variant state at one version.
/// Contains gzip-compressed JSON of the `VariantState`, addressed by a SHA-256
/// hash chained to the previous revision of the same variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantRevision {
    pub variant_id: Id,
    pub version: i64,
    /// SHA-256 of the revision content
    pub hash: String,
    /// Hash of the previous revision (None for version 1)
    pub parent_hash: Option<String>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub data: Vec<u8>,
    /// Uncompressed size for monitoring
    pub data_size: i64,
}

impl VariantRevision {
    pub fn new(
        variant_id: Id,
        version: i64,
        parent_hash: Option<String>,
        state: &VariantState,
        author: Option<String>,
    ) -> std::io::Result<Self> {
        let serialized = serde_json::to_string(state)?;
        let data = Self::compress_data(serialized.as_bytes())?;
        let hash = Self::calculate_hash(&variant_id, version, parent_hash.as_deref(), &serialized);

        Ok(Self {
            variant_id,
            version,
            hash,
            parent_hash,
            author,
            created_at: Utc::now(),
            data,
            data_size: serialized.len() as i64,
        })
    }

    /// Revision for a variant's current state
    pub fn of_variant(variant: &ConfigVariant, parent_hash: Option<String>) -> std::io::Result<Self> {
        Self::new(
            variant.id.clone(),
            variant.version,
            parent_hash,
            &variant.state(),
            variant.updated_by.clone(),
        )
    }

    fn calculate_hash(variant_id: &str, version: i64, parent_hash: Option<&str>, data: &str) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(format!("variant:{}\n", variant_id));
        hasher.update(format!("version:{}\n", version));
        if let Some(parent) = parent_hash {
            hasher.update(format!("parent:{}\n", parent));
        }
        hasher.update(format!("data:{}\n", data));

        hex::encode(hasher.finalize())
    }

    fn compress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }

    /// Decompress and deserialize the snapshotted state
    pub fn state(&self) -> anyhow::Result<VariantState> {
        let decompressed = Self::decompress_data(&self.data)?;
        let state = serde_json::from_slice(&decompressed)?;
        Ok(state)
    }
}
