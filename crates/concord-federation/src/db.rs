//! Sled-backed persistence for one cell's federation state.
//!
//! | Tree | Key | Value |
//! |---|---|---|
//! | `link` | `remote_cell` bytes (32) | bincode [`BilateralLink`] |
//! | `federation_tx` | `tx_id` bytes (16) | bincode [`FederationTx`] |
//! | `meta` | constant key `b"meta"` | bincode [`FederationMeta`] |

use std::path::Path;

use concord_core::CellId;

use crate::error::FederationError;
use crate::types::{BilateralLink, FederationMeta, FederationTx, FederationTxId};

const META_KEY: &[u8] = b"meta";

pub struct FederationDb {
    link: sled::Tree,
    federation_tx: sled::Tree,
    meta: sled::Tree,
}

impl FederationDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FederationError> {
        let db = sled::open(path).map_err(|e| FederationError::Storage(e.to_string()))?;
        let link = db
            .open_tree("link")
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        let federation_tx = db
            .open_tree("federation_tx")
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        let meta = db
            .open_tree("meta")
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        Ok(Self {
            link,
            federation_tx,
            meta,
        })
    }

    pub fn get_link(&self, cell: &CellId) -> Result<Option<BilateralLink>, FederationError> {
        let raw = self
            .link
            .get(cell.as_bytes())
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        raw.map(|bytes| {
            bincode::deserialize(&bytes).map_err(|e| FederationError::Serialization(e.to_string()))
        })
        .transpose()
    }

    pub fn put_link(&self, link: &BilateralLink) -> Result<(), FederationError> {
        let bytes =
            bincode::serialize(link).map_err(|e| FederationError::Serialization(e.to_string()))?;
        self.link
            .insert(link.remote_cell.as_bytes(), bytes)
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn iter_links(&self) -> Result<Vec<BilateralLink>, FederationError> {
        let mut out = Vec::new();
        for kv in self.link.iter() {
            let (_, value) = kv.map_err(|e| FederationError::Storage(e.to_string()))?;
            out.push(
                bincode::deserialize(&value)
                    .map_err(|e| FederationError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    pub fn get_tx(&self, id: &FederationTxId) -> Result<Option<FederationTx>, FederationError> {
        let raw = self
            .federation_tx
            .get(id.as_bytes())
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        raw.map(|bytes| {
            bincode::deserialize(&bytes).map_err(|e| FederationError::Serialization(e.to_string()))
        })
        .transpose()
    }

    pub fn put_tx(&self, tx: &FederationTx) -> Result<(), FederationError> {
        let bytes =
            bincode::serialize(tx).map_err(|e| FederationError::Serialization(e.to_string()))?;
        self.federation_tx
            .insert(tx.id.as_bytes(), bytes)
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_meta(&self) -> Result<FederationMeta, FederationError> {
        let raw = self
            .meta
            .get(META_KEY)
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        match raw {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| FederationError::Serialization(e.to_string())),
            None => Ok(FederationMeta::default()),
        }
    }

    pub fn put_meta(&self, meta: &FederationMeta) -> Result<(), FederationError> {
        let bytes =
            bincode::serialize(meta).map_err(|e| FederationError::Serialization(e.to_string()))?;
        self.meta
            .insert(META_KEY, bytes)
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), FederationError> {
        self.link
            .flush()
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        self.federation_tx
            .flush()
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        self.meta
            .flush()
            .map_err(|e| FederationError::Storage(e.to_string()))?;
        Ok(())
    }
}
