// ===============================
// src/ledger.rs (running stock balance)
// ===============================
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{MovementKind, MovementRecord};

/// Baris tampilan ledger. Dibuat ulang setiap rekonstruksi, tidak pernah disimpan.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub sequence_id: u32,
    pub kind: MovementKind,
    pub date: NaiveDateTime,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
    pub running_balance: i64,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("numeric overflow at movement #{sequence_id}")]
    Overflow { sequence_id: u32 },
}

/// Build display rows from movements ordered oldest first.
///
/// Balances are accumulated in input order; the returned rows are newest
/// first, so `rows[0].running_balance` is the current stock.
pub fn reconstruct(movements: &[MovementRecord]) -> Result<Vec<LedgerRow>, LedgerError> {
    let mut rows = Vec::with_capacity(movements.len());
    let mut balance: i64 = 0;
    let mut sequence_id: u32 = 1;

    for m in movements {
        let overflow = LedgerError::Overflow { sequence_id };
        let delta = m.kind.sign() * i64::from(m.quantity);
        balance = balance.checked_add(delta).ok_or(overflow.clone())?;
        let line_total = m
            .unit_price
            .checked_mul(Decimal::from(m.quantity))
            .ok_or(overflow.clone())?;

        rows.push(LedgerRow {
            sequence_id,
            kind: m.kind,
            date: m.date,
            unit_price: m.unit_price,
            quantity: m.quantity,
            line_total,
            running_balance: balance,
        });
        sequence_id = sequence_id.checked_add(1).ok_or(overflow)?;
    }

    rows.reverse();
    Ok(rows)
}

/// Stock after the newest movement; 0 for a product with no history.
pub fn current_stock(rows: &[LedgerRow]) -> i64 {
    rows.first().map(|r| r.running_balance).unwrap_or(0)
}
