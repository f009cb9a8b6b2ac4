// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use rusqlite::{Connection, OptionalExtension, Result, Row, params};

const SQL_INSERT_PENDING_PAYMENT: &str = include_str!("queries/insert_pending_payment.sql");
const SQL_SELECT_OPEN_PENDING_PAYMENTS: &str =
    include_str!("queries/select_open_pending_payments.sql");
const SQL_SELECT_PENDING_PAYMENT: &str = "SELECT id, user_id, chain, target, kind, duration_hours, tier, expected_amount, created_at_ms, expires_at_ms, matched_tx_id FROM pending_payments WHERE id = ?1";
const SQL_MARK_PENDING_MATCHED: &str =
    "UPDATE pending_payments SET matched_tx_id = ?2 WHERE id = ?1 AND matched_tx_id IS NULL";
const SQL_INSERT_PROCESSED_TRANSACTION: &str =
    include_str!("queries/insert_processed_transaction.sql");
const SQL_SELECT_PROCESSED_TRANSACTION: &str = "SELECT chain_qualified_tx_id, user_id, chain, recipient_address, sender_address, amount, chain_reference, purpose, processed_at_ms FROM processed_transactions WHERE chain_qualified_tx_id = ?1";
const SQL_INSERT_ACTIVATED_PROMOTION: &str = include_str!("queries/insert_activated_promotion.sql");
const SQL_SELECT_ACTIVE_PROMOTIONS: &str = include_str!("queries/select_active_promotions.sql");
const SQL_SELECT_PROMOTIONS_FOR_USER: &str = "SELECT id, user_id, target, kind, tier, chain, amount, start_time_ms, end_time_ms, source_tx_id FROM activated_promotions WHERE user_id = ?1 ORDER BY start_time_ms ASC, id ASC";

#[derive(Debug, Clone)]
pub(super) struct PendingPaymentRow {
    pub id: i64,
    pub user_id: String,
    pub chain: String,
    pub target: String,
    pub kind: String,
    pub duration_hours: i64,
    pub tier: String,
    pub expected_amount: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub matched_tx_id: Option<String>,
}

#[derive(Debug, Clone)]
pub(super) struct ProcessedTransactionRow {
    pub chain_qualified_tx_id: String,
    pub user_id: String,
    pub chain: String,
    pub recipient_address: String,
    pub sender_address: Option<String>,
    pub amount: String,
    pub chain_reference: i64,
    pub purpose: String,
    pub processed_at_ms: i64,
}

#[derive(Debug, Clone)]
pub(super) struct ActivatedPromotionRow {
    pub id: i64,
    pub user_id: String,
    pub target: String,
    pub kind: String,
    pub tier: String,
    pub chain: String,
    pub amount: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub source_tx_id: String,
}

pub(super) struct InsertPendingPayment<'a> {
    pub user_id: &'a str,
    pub chain: &'a str,
    pub target: &'a str,
    pub kind: &'a str,
    pub duration_hours: i64,
    pub tier: &'a str,
    pub expected_amount: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

pub(super) struct InsertProcessedTransaction<'a> {
    pub chain_qualified_tx_id: &'a str,
    pub user_id: &'a str,
    pub chain: &'a str,
    pub recipient_address: &'a str,
    pub sender_address: Option<&'a str>,
    pub amount: String,
    pub chain_reference: i64,
    pub purpose: &'a str,
    pub processed_at_ms: i64,
}

pub(super) struct InsertActivatedPromotion<'a> {
    pub user_id: &'a str,
    pub target: &'a str,
    pub kind: &'a str,
    pub tier: &'a str,
    pub chain: &'a str,
    pub amount: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub source_tx_id: &'a str,
}

pub(super) fn sql_insert_pending_payment(
    conn: &Connection,
    row: &InsertPendingPayment<'_>,
) -> Result<i64> {
    let mut stmt = conn.prepare_cached(SQL_INSERT_PENDING_PAYMENT)?;
    stmt.execute(params![
        row.user_id,
        row.chain,
        row.target,
        row.kind,
        row.duration_hours,
        row.tier,
        row.expected_amount,
        row.created_at_ms,
        row.expires_at_ms,
    ])?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn sql_select_pending_payment(
    conn: &Connection,
    id: i64,
) -> Result<Option<PendingPaymentRow>> {
    conn.query_row(
        SQL_SELECT_PENDING_PAYMENT,
        params![id],
        convert_row_to_pending_payment_row,
    )
    .optional()
}

pub(super) fn sql_select_open_pending_payments(
    conn: &Connection,
    user_id: &str,
    chain: &str,
    now_ms: i64,
) -> Result<Vec<PendingPaymentRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_OPEN_PENDING_PAYMENTS)?;
    let mapped = stmt.query_map(
        params![user_id, chain, now_ms],
        convert_row_to_pending_payment_row,
    )?;
    mapped.collect()
}

pub(super) fn sql_mark_pending_matched(conn: &Connection, id: i64, tx_id: &str) -> Result<usize> {
    conn.execute(SQL_MARK_PENDING_MATCHED, params![id, tx_id])
}

/// Returns the number of inserted rows; zero means the key was already present.
pub(super) fn sql_insert_processed_transaction(
    conn: &Connection,
    row: &InsertProcessedTransaction<'_>,
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(SQL_INSERT_PROCESSED_TRANSACTION)?;
    stmt.execute(params![
        row.chain_qualified_tx_id,
        row.user_id,
        row.chain,
        row.recipient_address,
        row.sender_address,
        row.amount,
        row.chain_reference,
        row.purpose,
        row.processed_at_ms,
    ])
}

pub(super) fn sql_select_processed_transaction(
    conn: &Connection,
    key: &str,
) -> Result<Option<ProcessedTransactionRow>> {
    conn.query_row(
        SQL_SELECT_PROCESSED_TRANSACTION,
        params![key],
        convert_row_to_processed_transaction_row,
    )
    .optional()
}

pub(super) fn sql_insert_activated_promotion(
    conn: &Connection,
    row: &InsertActivatedPromotion<'_>,
) -> Result<i64> {
    let mut stmt = conn.prepare_cached(SQL_INSERT_ACTIVATED_PROMOTION)?;
    stmt.execute(params![
        row.user_id,
        row.target,
        row.kind,
        row.tier,
        row.chain,
        row.amount,
        row.start_time_ms,
        row.end_time_ms,
        row.source_tx_id,
    ])?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn sql_select_active_promotions(
    conn: &Connection,
    target: &str,
    kind: Option<&str>,
    now_ms: i64,
) -> Result<Vec<ActivatedPromotionRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_ACTIVE_PROMOTIONS)?;
    let mapped = stmt.query_map(
        params![target, kind, now_ms],
        convert_row_to_activated_promotion_row,
    )?;
    mapped.collect()
}

pub(super) fn sql_select_promotions_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<ActivatedPromotionRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_PROMOTIONS_FOR_USER)?;
    let mapped = stmt.query_map(params![user_id], convert_row_to_activated_promotion_row)?;
    mapped.collect()
}

fn convert_row_to_pending_payment_row(row: &Row<'_>) -> Result<PendingPaymentRow> {
    Ok(PendingPaymentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        chain: row.get(2)?,
        target: row.get(3)?,
        kind: row.get(4)?,
        duration_hours: row.get(5)?,
        tier: row.get(6)?,
        expected_amount: row.get(7)?,
        created_at_ms: row.get(8)?,
        expires_at_ms: row.get(9)?,
        matched_tx_id: row.get(10)?,
    })
}

fn convert_row_to_processed_transaction_row(row: &Row<'_>) -> Result<ProcessedTransactionRow> {
    Ok(ProcessedTransactionRow {
        chain_qualified_tx_id: row.get(0)?,
        user_id: row.get(1)?,
        chain: row.get(2)?,
        recipient_address: row.get(3)?,
        sender_address: row.get(4)?,
        amount: row.get(5)?,
        chain_reference: row.get(6)?,
        purpose: row.get(7)?,
        processed_at_ms: row.get(8)?,
    })
}

fn convert_row_to_activated_promotion_row(row: &Row<'_>) -> Result<ActivatedPromotionRow> {
    Ok(ActivatedPromotionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        target: row.get(2)?,
        kind: row.get(3)?,
        tier: row.get(4)?,
        chain: row.get(5)?,
        amount: row.get(6)?,
        start_time_ms: row.get(7)?,
        end_time_ms: row.get(8)?,
        source_tx_id: row.get(9)?,
    })
}
