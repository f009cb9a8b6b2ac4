// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Turns a user-submitted transaction id into at most one activated promotion.
//!
//! Flow: detect chain -> fetch + verify -> ledger fast-path -> match intent ->
//! one SQLite transaction (ledger reserve, intent match, activation).
mod activation;
mod engine;
mod error;
mod types;

pub use activation::{Purchase, ledger_record, plan_activation};
pub use engine::{Clock, Reconciler, ReconcilerConfig};
pub use error::ReconcileError;
pub use types::{
    AutoDetectRequest, InstructionRequest, PaymentInstructions, Reconciled, ReconciliationResult,
};
