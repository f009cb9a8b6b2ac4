// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::U256;
use promo_core::chain::ChainId;
use promo_core::money::Money;
use promo_core::promotion::{PromoDuration, PromotionKind, Tier};
use promo_core::records::{
    ActivatedPromotion, NewActivatedPromotion, NewPendingPayment, PendingPayment,
    ProcessedTransaction,
};
use rusqlite::types::Type;
use rusqlite::{Connection, Result, TransactionBehavior};
use rusqlite_migration::{M, Migrations};

use super::sql::{
    ActivatedPromotionRow, InsertActivatedPromotion, InsertPendingPayment,
    InsertProcessedTransaction, PendingPaymentRow, ProcessedTransactionRow,
    sql_insert_activated_promotion, sql_insert_pending_payment, sql_insert_processed_transaction,
    sql_mark_pending_matched, sql_select_active_promotions, sql_select_open_pending_payments,
    sql_select_pending_payment, sql_select_processed_transaction, sql_select_promotions_for_user,
};
use super::{CommitError, StorageOpenError};

const MIGRATION_0001_SCHEMA: &str = include_str!("migrations/0001_schema.sql");

/// Durable store for pending payments, the idempotency ledger and activations.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &str, synchronous: &str) -> std::result::Result<Self, StorageOpenError> {
        let conn = Self::open_connection_with_migrations(path, synchronous)?;
        Ok(Self { conn })
    }

    pub fn open_connection(
        path: &str,
        synchronous: &str,
    ) -> std::result::Result<Connection, StorageOpenError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", synchronous)?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }

    pub fn open_connection_with_migrations(
        path: &str,
        synchronous: &str,
    ) -> std::result::Result<Connection, StorageOpenError> {
        let mut conn = Self::open_connection(path, synchronous)?;
        Self::run_migrations(&mut conn)?;
        Ok(conn)
    }

    pub fn run_migrations(conn: &mut Connection) -> std::result::Result<(), StorageOpenError> {
        Migrations::from_slice(&[M::up(MIGRATION_0001_SCHEMA)]).to_latest(conn)?;
        Ok(())
    }

    pub fn create_pending_payment(&mut self, new: &NewPendingPayment) -> Result<PendingPayment> {
        let id = sql_insert_pending_payment(
            &self.conn,
            &InsertPendingPayment {
                user_id: &new.user_id,
                chain: new.chain.key(),
                target: &new.target,
                kind: new.kind.key(),
                duration_hours: i64::from(new.duration.as_hours()),
                tier: new.tier.key(),
                expected_amount: new.expected_amount.base_units.to_string(),
                created_at_ms: to_unix_ms(new.created_at),
                expires_at_ms: to_unix_ms(new.expires_at),
            },
        )?;
        Ok(PendingPayment {
            id,
            user_id: new.user_id.clone(),
            chain: new.chain,
            target: new.target.clone(),
            kind: new.kind,
            duration: new.duration,
            tier: new.tier,
            expected_amount: new.expected_amount,
            // Round-trip through milliseconds so the value matches what a reload returns.
            created_at: from_unix_ms(to_unix_ms(new.created_at)),
            expires_at: from_unix_ms(to_unix_ms(new.expires_at)),
            matched_tx_id: None,
        })
    }

    pub fn pending_payment(&mut self, id: i64) -> Result<Option<PendingPayment>> {
        sql_select_pending_payment(&self.conn, id)?
            .map(pending_from_row)
            .transpose()
    }

    /// Unmatched intents with `expires_at > now`, oldest first.
    pub fn open_pending_payments(
        &mut self,
        user_id: &str,
        chain: ChainId,
        now: SystemTime,
    ) -> Result<Vec<PendingPayment>> {
        sql_select_open_pending_payments(&self.conn, user_id, chain.key(), to_unix_ms(now))?
            .into_iter()
            .map(pending_from_row)
            .collect()
    }

    /// Oldest open intent whose expected amount is within `tolerance` of `amount`.
    pub fn find_match(
        &mut self,
        user_id: &str,
        chain: ChainId,
        amount: U256,
        tolerance: u64,
        now: SystemTime,
    ) -> Result<Option<PendingPayment>> {
        Ok(self
            .open_pending_payments(user_id, chain, now)?
            .into_iter()
            .find(|pending| pending.expected_amount.within_tolerance(amount, tolerance)))
    }

    /// One-way transition; a second call for the same intent is rejected.
    pub fn mark_matched(&mut self, id: i64, tx_key: &str) -> std::result::Result<(), CommitError> {
        mark_matched_in(&self.conn, id, tx_key)
    }

    pub fn is_processed(&mut self, key: &str) -> Result<bool> {
        Ok(sql_select_processed_transaction(&self.conn, key)?.is_some())
    }

    /// Atomic insert-if-absent on the ledger key.
    pub fn reserve(&mut self, record: &ProcessedTransaction) -> std::result::Result<(), CommitError> {
        reserve_in(&self.conn, record)
    }

    pub fn processed_transaction(&mut self, key: &str) -> Result<Option<ProcessedTransaction>> {
        sql_select_processed_transaction(&self.conn, key)?
            .map(processed_from_row)
            .transpose()
    }

    /// Ledger reservation, intent match and activation in one IMMEDIATE transaction.
    /// The ledger insert runs first; any later failure rolls the reservation back.
    pub fn commit_reconciliation(
        &mut self,
        record: &ProcessedTransaction,
        pending_id: Option<i64>,
        promotion: &NewActivatedPromotion,
    ) -> std::result::Result<ActivatedPromotion, CommitError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        reserve_in(&tx, record)?;
        if let Some(id) = pending_id {
            mark_matched_in(&tx, id, &record.chain_qualified_tx_id)?;
        }
        let id = sql_insert_activated_promotion(
            &tx,
            &InsertActivatedPromotion {
                user_id: &promotion.user_id,
                target: &promotion.target,
                kind: promotion.kind.key(),
                tier: promotion.tier.key(),
                chain: promotion.amount.chain.key(),
                amount: promotion.amount.base_units.to_string(),
                start_time_ms: to_unix_ms(promotion.start_time),
                end_time_ms: to_unix_ms(promotion.end_time),
                source_tx_id: &promotion.source_tx_id,
            },
        )?;

        tx.commit()?;
        Ok(promotion.clone().into_activated(id))
    }

    /// Windows with `start <= now < end` for a target, ordered by start.
    pub fn active_promotions(
        &mut self,
        target: &str,
        kind: Option<PromotionKind>,
        now: SystemTime,
    ) -> Result<Vec<ActivatedPromotion>> {
        sql_select_active_promotions(
            &self.conn,
            target,
            kind.map(PromotionKind::key),
            to_unix_ms(now),
        )?
        .into_iter()
        .map(promotion_from_row)
        .collect()
    }

    pub fn promotions_for_user(&mut self, user_id: &str) -> Result<Vec<ActivatedPromotion>> {
        sql_select_promotions_for_user(&self.conn, user_id)?
            .into_iter()
            .map(promotion_from_row)
            .collect()
    }
}

fn reserve_in(conn: &Connection, record: &ProcessedTransaction) -> std::result::Result<(), CommitError> {
    let inserted = sql_insert_processed_transaction(
        conn,
        &InsertProcessedTransaction {
            chain_qualified_tx_id: &record.chain_qualified_tx_id,
            user_id: &record.user_id,
            chain: record.amount.chain.key(),
            recipient_address: &record.recipient_address,
            sender_address: record.sender_address.as_deref(),
            amount: record.amount.base_units.to_string(),
            chain_reference: u64_to_i64(record.chain_reference),
            purpose: &record.purpose,
            processed_at_ms: to_unix_ms(record.processed_at),
        },
    )?;
    if inserted == 0 {
        return Err(CommitError::AlreadyProcessed {
            key: record.chain_qualified_tx_id.clone(),
        });
    }
    Ok(())
}

fn mark_matched_in(conn: &Connection, id: i64, tx_key: &str) -> std::result::Result<(), CommitError> {
    match sql_mark_pending_matched(conn, id, tx_key)? {
        1 => Ok(()),
        0 => {
            if sql_select_pending_payment(conn, id)?.is_some() {
                Err(CommitError::PendingAlreadyMatched { id })
            } else {
                Err(CommitError::UnknownPendingPayment { id })
            }
        }
        changed => Err(CommitError::Sqlite(rusqlite::Error::StatementChangedRows(
            changed,
        ))),
    }
}

fn pending_from_row(row: PendingPaymentRow) -> Result<PendingPayment> {
    let chain = parse_column::<ChainId>(2, &row.chain)?;
    let duration_hours = u32::try_from(row.duration_hours)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(5, Type::Integer, Box::new(err)))?;
    Ok(PendingPayment {
        id: row.id,
        user_id: row.user_id,
        chain,
        target: row.target,
        kind: parse_column(4, &row.kind)?,
        duration: PromoDuration::hours(duration_hours),
        tier: parse_column::<Tier>(6, &row.tier)?,
        expected_amount: Money::new(chain, parse_amount(7, &row.expected_amount)?),
        created_at: from_unix_ms(row.created_at_ms),
        expires_at: from_unix_ms(row.expires_at_ms),
        matched_tx_id: row.matched_tx_id,
    })
}

fn processed_from_row(row: ProcessedTransactionRow) -> Result<ProcessedTransaction> {
    let chain = parse_column::<ChainId>(2, &row.chain)?;
    Ok(ProcessedTransaction {
        chain_qualified_tx_id: row.chain_qualified_tx_id,
        user_id: row.user_id,
        recipient_address: row.recipient_address,
        sender_address: row.sender_address,
        amount: Money::new(chain, parse_amount(5, &row.amount)?),
        chain_reference: i64_to_u64(row.chain_reference),
        purpose: row.purpose,
        processed_at: from_unix_ms(row.processed_at_ms),
    })
}

fn promotion_from_row(row: ActivatedPromotionRow) -> Result<ActivatedPromotion> {
    let chain = parse_column::<ChainId>(5, &row.chain)?;
    Ok(ActivatedPromotion {
        id: row.id,
        user_id: row.user_id,
        target: row.target,
        kind: parse_column::<PromotionKind>(3, &row.kind)?,
        tier: parse_column::<Tier>(4, &row.tier)?,
        amount: Money::new(chain, parse_amount(6, &row.amount)?),
        start_time: from_unix_ms(row.start_time_ms),
        end_time: from_unix_ms(row.end_time_ms),
        source_tx_id: row.source_tx_id,
    })
}

fn parse_column<T>(index: usize, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

fn parse_amount(index: usize, value: &str) -> Result<U256> {
    U256::from_str_radix(value, 10)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

fn to_unix_ms(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

fn from_unix_ms(ms: i64) -> SystemTime {
    let clamped_ms = ms.max(0) as u64;
    UNIX_EPOCH + Duration::from_millis(clamped_ms)
}

fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn i64_to_u64(value: i64) -> u64 {
    value.max(0) as u64
}
