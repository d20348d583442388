// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

use std::sync::Arc;

use crate::ledger::GiftLedger;
use crate::storage::AuditRepository;

/// Shared application state.
///
/// The ledger is behind an `Arc` only; its operations take `&self` and
/// the embedded database serializes writes internally, so no lock is
/// needed here.
#[derive(Clone)]
pub struct AppState {
    ledger: Arc<GiftLedger>,
    audit: AuditRepository,
}

impl AppState {
    pub fn new(ledger: GiftLedger, audit: AuditRepository) -> Self {
        Self {
            ledger: Arc::new(ledger),
            audit,
        }
    }

    pub fn ledger(&self) -> &GiftLedger {
        &self.ledger
    }

    pub fn audit(&self) -> &AuditRepository {
        &self.audit
    }
}
