// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! Embedded gift database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `gifts`: gift_id → serialized Gift
//! - `token_bindings`: token_id → serialized TokenBinding
//! - `owner_gift_index`: composite key (owner|!created_at|gift_id) → gift_id
//!
//! ## Invariants Enforced Here
//!
//! - A gift and its token binding are inserted in one write transaction;
//!   a binding conflict aborts the whole insert, so an unbound gift can
//!   never persist.
//! - A token binds to at most one gift, forever. Duplicate bindings fail
//!   with [`GiftDbError::TokenAlreadyBound`] and leave the first binding
//!   untouched.
//! - Status moves through [`compare_and_set_status`] only. Concurrent
//!   writers are serialized by redb; the loser sees
//!   [`GiftDbError::StaleWrite`].

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::envelope::SealedBlob;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: gift_id → serialized Gift (JSON bytes).
const GIFTS: TableDefinition<&str, &[u8]> = TableDefinition::new("gifts");

/// Bindings: token_id → serialized TokenBinding (JSON bytes).
const TOKEN_BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("token_bindings");

/// Index: composite key → gift_id.
/// Key format: `owner_subject|!created_at_be|gift_id` for descending-time
/// range scans.
const OWNER_GIFT_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("owner_gift_index");

// =============================================================================
// Records
// =============================================================================

/// Lifecycle status of a gift.
///
/// `Locked` and `Claimed` are the only values ever written to disk;
/// `Ready` is derived from the clock (see `GiftLedger::compute_status`)
/// because claiming is the only irreversible fact worth a durable write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GiftStatus {
    /// Sealed and waiting for the unlock instant.
    Locked,
    /// Unlock instant has passed; claimable with the passphrase.
    Ready,
    /// Private key has been released. Terminal.
    Claimed,
}

impl std::fmt::Display for GiftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GiftStatus::Locked => write!(f, "locked"),
            GiftStatus::Ready => write!(f, "ready"),
            GiftStatus::Claimed => write!(f, "claimed"),
        }
    }
}

/// A stored gift record.
///
/// `sealed_key` and `public_address` are set together at creation and
/// never regenerated; the gift's cryptographic identity is fixed for its
/// lifetime. Only `status` ever changes, and only forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gift {
    /// Unique gift identifier (UUID), assigned at creation.
    pub gift_id: String,
    /// Opaque subject id of the giver.
    pub owner_subject: String,
    /// Public address of the gifted keypair. Safe to expose freely.
    pub public_address: String,
    /// Passphrase-sealed private key.
    pub sealed_key: SealedBlob,
    /// Free-text note from giver to receiver.
    pub message: String,
    /// Optional display name for the intended receiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_label: Option<String>,
    /// When the gift was created.
    pub created_at: DateTime<Utc>,
    /// The instant after which the gift becomes claimable.
    pub unlock_at: DateTime<Utc>,
    /// Stored lifecycle status.
    pub status: GiftStatus,
}

/// Permanent binding of a physical token (NFC card UID) to a gift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBinding {
    /// Identifier of the physical token. Unique across all bindings.
    pub token_id: String,
    /// The gift this token unlocks.
    pub gift_id: String,
    /// Binding timestamp.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GiftDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("gift already exists: {0}")]
    GiftAlreadyExists(String),

    #[error("token already bound: {0}")]
    TokenAlreadyBound(String),

    #[error("stale status write on gift {gift_id}: expected {expected}, found {actual}")]
    StaleWrite {
        gift_id: String,
        expected: GiftStatus,
        actual: GiftStatus,
    },
}

pub type GiftDbResult<T> = Result<T, GiftDbError>;

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the owner_gift_index table.
///
/// Format: `owner_subject | inverted_timestamp_be_bytes | gift_id`
///
/// The inverted timestamp ensures newest-first ordering when scanning forward.
fn make_index_key(owner_subject: &str, timestamp: i64, gift_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner_subject.len() + 1 + 8 + 1 + gift_id.len());
    key.extend_from_slice(owner_subject.as_bytes());
    key.push(b'|');
    // Invert timestamp for descending order (newest first)
    key.extend_from_slice(&(!timestamp as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(gift_id.as_bytes());
    key
}

/// Build a prefix key for range scanning all gifts of an owner.
fn make_prefix(owner_subject: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(owner_subject.len() + 1);
    prefix.extend_from_slice(owner_subject.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a range scan (prefix with all 0xFF bytes appended).
fn make_prefix_end(owner_subject: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(owner_subject.len() + 1 + 20);
    end.extend_from_slice(owner_subject.as_bytes());
    end.push(b'|');
    end.extend_from_slice(&[0xFF; 20]);
    end
}

// =============================================================================
// GiftDatabase
// =============================================================================

/// Embedded ACID gift database.
pub struct GiftDatabase {
    db: Database,
}

impl GiftDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> GiftDbResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(GIFTS)?;
            let _ = write_txn.open_table(TOKEN_BINDINGS)?;
            let _ = write_txn.open_table(OWNER_GIFT_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Insert a gift together with its token binding, atomically.
    ///
    /// The gift row, the binding row, and the owner index entry are
    /// written in a single transaction. If the token is already bound or
    /// the gift id already exists, nothing is persisted.
    pub fn insert_gift_with_binding(
        &self,
        gift: &Gift,
        binding: &TokenBinding,
    ) -> GiftDbResult<()> {
        let gift_json = serde_json::to_vec(gift)?;
        let binding_json = serde_json::to_vec(binding)?;
        let index_key = make_index_key(
            &gift.owner_subject,
            gift.created_at.timestamp(),
            &gift.gift_id,
        );

        let write_txn = self.db.begin_write()?;
        {
            let mut bindings = write_txn.open_table(TOKEN_BINDINGS)?;
            if bindings.get(binding.token_id.as_str())?.is_some() {
                return Err(GiftDbError::TokenAlreadyBound(binding.token_id.clone()));
            }

            let mut gifts = write_txn.open_table(GIFTS)?;
            if gifts.get(gift.gift_id.as_str())?.is_some() {
                return Err(GiftDbError::GiftAlreadyExists(gift.gift_id.clone()));
            }

            gifts.insert(gift.gift_id.as_str(), gift_json.as_slice())?;
            bindings.insert(binding.token_id.as_str(), binding_json.as_slice())?;

            let mut index = write_txn.open_table(OWNER_GIFT_INDEX)?;
            index.insert(index_key.as_slice(), gift.gift_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Look up a single gift by id.
    pub fn get_gift(&self, gift_id: &str) -> GiftDbResult<Option<Gift>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GIFTS)?;
        match table.get(gift_id)? {
            Some(value) => {
                let gift: Gift = serde_json::from_slice(value.value())?;
                Ok(Some(gift))
            }
            None => Ok(None),
        }
    }

    /// Look up the binding for a token.
    pub fn get_token_binding(&self, token_id: &str) -> GiftDbResult<Option<TokenBinding>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TOKEN_BINDINGS)?;
        match table.get(token_id)? {
            Some(value) => {
                let binding: TokenBinding = serde_json::from_slice(value.value())?;
                Ok(Some(binding))
            }
            None => Ok(None),
        }
    }

    /// List all gifts of an owner, newest first.
    pub fn list_gifts_by_owner(&self, owner_subject: &str) -> GiftDbResult<Vec<Gift>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(OWNER_GIFT_INDEX)?;
        let gifts = read_txn.open_table(GIFTS)?;

        let prefix = make_prefix(owner_subject);
        let prefix_end = make_prefix_end(owner_subject);

        let mut results = Vec::new();
        for entry in index.range(prefix.as_slice()..prefix_end.as_slice())? {
            let entry = entry?;
            let gift_id = entry.1.value();
            if let Some(value) = gifts.get(gift_id)? {
                let gift: Gift = serde_json::from_slice(value.value())?;
                results.push(gift);
            }
        }
        Ok(results)
    }

    // =========================================================================
    // Status transition
    // =========================================================================

    /// Conditionally advance a gift's stored status.
    ///
    /// Succeeds only if the stored status equals `expected`; otherwise
    /// returns [`GiftDbError::StaleWrite`] and changes nothing. Write
    /// transactions are serialized by redb, so at most one of N racing
    /// callers wins. Returns the updated gift.
    pub fn compare_and_set_status(
        &self,
        gift_id: &str,
        expected: GiftStatus,
        new_status: GiftStatus,
    ) -> GiftDbResult<Gift> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(GIFTS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = {
                let existing = table
                    .get(gift_id)?
                    .ok_or_else(|| GiftDbError::NotFound(format!("Gift {gift_id}")))?;
                existing.value().to_vec()
            };

            let mut gift: Gift = serde_json::from_slice(&existing_bytes)?;
            if gift.status != expected {
                return Err(GiftDbError::StaleWrite {
                    gift_id: gift_id.to_string(),
                    expected,
                    actual: gift.status,
                });
            }
            gift.status = new_status;

            let json = serde_json::to_vec(&gift)?;
            table.insert(gift_id, json.as_slice())?;
            gift
        };
        write_txn.commit()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::KdfParams;
    use chrono::Duration;

    fn test_db() -> (GiftDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db = GiftDatabase::open(&dir.path().join("gifts.redb")).expect("Failed to open db");
        (db, dir)
    }

    fn dummy_blob() -> SealedBlob {
        SealedBlob {
            alg: "argon2id.xchacha20poly1305.v1".to_string(),
            kdf: KdfParams::default(),
            salt: vec![0u8; 16],
            nonce: vec![0u8; 24],
            ciphertext: vec![1, 2, 3, 4],
        }
    }

    fn sample_gift(gift_id: &str, owner: &str) -> Gift {
        Gift {
            gift_id: gift_id.to_string(),
            owner_subject: owner.to_string(),
            public_address: "0x742d35cc6634c0532925a3b844bc9e7595f4ab12".to_string(),
            sealed_key: dummy_blob(),
            message: "happy birthday".to_string(),
            receiver_label: Some("Ada".to_string()),
            created_at: Utc::now(),
            unlock_at: Utc::now() + Duration::hours(1),
            status: GiftStatus::Locked,
        }
    }

    fn binding_for(gift: &Gift, token_id: &str) -> TokenBinding {
        TokenBinding {
            token_id: token_id.to_string(),
            gift_id: gift.gift_id.clone(),
            created_at: gift.created_at,
        }
    }

    #[test]
    fn insert_and_get_gift() {
        let (db, _dir) = test_db();
        let gift = sample_gift("gift-1", "giver-1");
        let binding = binding_for(&gift, "nfc-aa11");

        db.insert_gift_with_binding(&gift, &binding).unwrap();

        let loaded = db.get_gift("gift-1").unwrap().unwrap();
        assert_eq!(loaded.gift_id, gift.gift_id);
        assert_eq!(loaded.owner_subject, gift.owner_subject);
        assert_eq!(loaded.public_address, gift.public_address);
        assert_eq!(loaded.sealed_key, gift.sealed_key);
        assert_eq!(loaded.status, GiftStatus::Locked);

        let bound = db.get_token_binding("nfc-aa11").unwrap().unwrap();
        assert_eq!(bound.gift_id, "gift-1");
    }

    #[test]
    fn get_missing_returns_none() {
        let (db, _dir) = test_db();
        assert!(db.get_gift("nope").unwrap().is_none());
        assert!(db.get_token_binding("nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_token_aborts_whole_insert() {
        let (db, _dir) = test_db();
        let first = sample_gift("gift-1", "giver-1");
        db.insert_gift_with_binding(&first, &binding_for(&first, "nfc-aa11"))
            .unwrap();

        let second = sample_gift("gift-2", "giver-1");
        let result = db.insert_gift_with_binding(&second, &binding_for(&second, "nfc-aa11"));
        assert!(matches!(result, Err(GiftDbError::TokenAlreadyBound(_))));

        // The first binding is untouched...
        let bound = db.get_token_binding("nfc-aa11").unwrap().unwrap();
        assert_eq!(bound.gift_id, "gift-1");

        // ...and the losing gift was not persisted either (no orphan).
        assert!(db.get_gift("gift-2").unwrap().is_none());
        assert_eq!(db.list_gifts_by_owner("giver-1").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_gift_id_is_rejected() {
        let (db, _dir) = test_db();
        let gift = sample_gift("gift-1", "giver-1");
        db.insert_gift_with_binding(&gift, &binding_for(&gift, "nfc-aa11"))
            .unwrap();

        let result = db.insert_gift_with_binding(&gift, &binding_for(&gift, "nfc-bb22"));
        assert!(matches!(result, Err(GiftDbError::GiftAlreadyExists(_))));
        assert!(db.get_token_binding("nfc-bb22").unwrap().is_none());
    }

    #[test]
    fn compare_and_set_advances_status() {
        let (db, _dir) = test_db();
        let gift = sample_gift("gift-1", "giver-1");
        db.insert_gift_with_binding(&gift, &binding_for(&gift, "nfc-aa11"))
            .unwrap();

        let updated = db
            .compare_and_set_status("gift-1", GiftStatus::Locked, GiftStatus::Claimed)
            .unwrap();
        assert_eq!(updated.status, GiftStatus::Claimed);

        let loaded = db.get_gift("gift-1").unwrap().unwrap();
        assert_eq!(loaded.status, GiftStatus::Claimed);
    }

    #[test]
    fn compare_and_set_rejects_stale_expectation() {
        let (db, _dir) = test_db();
        let gift = sample_gift("gift-1", "giver-1");
        db.insert_gift_with_binding(&gift, &binding_for(&gift, "nfc-aa11"))
            .unwrap();

        db.compare_and_set_status("gift-1", GiftStatus::Locked, GiftStatus::Claimed)
            .unwrap();

        let result = db.compare_and_set_status("gift-1", GiftStatus::Locked, GiftStatus::Claimed);
        assert!(matches!(
            result,
            Err(GiftDbError::StaleWrite {
                actual: GiftStatus::Claimed,
                ..
            })
        ));
    }

    #[test]
    fn compare_and_set_missing_gift() {
        let (db, _dir) = test_db();
        let result = db.compare_and_set_status("nope", GiftStatus::Locked, GiftStatus::Claimed);
        assert!(matches!(result, Err(GiftDbError::NotFound(_))));
    }

    #[test]
    fn list_by_owner_is_newest_first() {
        let (db, _dir) = test_db();
        let base = Utc::now();

        for i in 0..3 {
            let mut gift = sample_gift(&format!("gift-{i}"), "giver-1");
            gift.created_at = base + Duration::seconds(i * 10);
            let binding = binding_for(&gift, &format!("nfc-{i}"));
            db.insert_gift_with_binding(&gift, &binding).unwrap();
        }

        let gifts = db.list_gifts_by_owner("giver-1").unwrap();
        assert_eq!(gifts.len(), 3);
        assert_eq!(gifts[0].gift_id, "gift-2");
        assert_eq!(gifts[1].gift_id, "gift-1");
        assert_eq!(gifts[2].gift_id, "gift-0");
    }

    #[test]
    fn list_by_owner_filters_other_owners() {
        let (db, _dir) = test_db();

        let mine = sample_gift("gift-mine", "giver-1");
        db.insert_gift_with_binding(&mine, &binding_for(&mine, "nfc-1"))
            .unwrap();

        let theirs = sample_gift("gift-theirs", "giver-2");
        db.insert_gift_with_binding(&theirs, &binding_for(&theirs, "nfc-2"))
            .unwrap();

        let gifts = db.list_gifts_by_owner("giver-1").unwrap();
        assert_eq!(gifts.len(), 1);
        assert_eq!(gifts[0].gift_id, "gift-mine");

        assert!(db.list_gifts_by_owner("giver-3").unwrap().is_empty());
    }
}
