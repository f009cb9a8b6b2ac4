// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Payment verification and promotion reconciliation service.
//!
//! Flow: API -> reconciler -> chain adapters (read-only) -> SQLite.
//! The processed-transaction ledger is the single authority on whether a
//! transfer has already been credited.
pub mod api;
pub mod chain_adapter;
pub mod config;
pub mod reconciliation;
pub mod storage;
pub mod verifier;
