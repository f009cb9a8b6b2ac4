// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod db;
mod sql;

use thiserror::Error;

pub use db::Storage;

#[derive(Debug, Error)]
pub enum StorageOpenError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
}

/// Failures of the write paths that guard at-most-once credit.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("transaction {key} is already in the ledger")]
    AlreadyProcessed { key: String },
    #[error("pending payment {id} does not exist")]
    UnknownPendingPayment { id: i64 },
    #[error("pending payment {id} is already matched")]
    PendingAlreadyMatched { id: i64 },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
