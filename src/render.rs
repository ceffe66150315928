// ===============================
// src/render.rs (plain text tables)
// ===============================
use std::fmt::Write;

use crate::client::ApiError;
use crate::domain::{movement_date, Product};
use crate::forms::FieldErrors;
use crate::ledger::LedgerRow;

pub const EMPTY_LEDGER: &str = "no stock movements recorded yet";
pub const EMPTY_PRODUCTS: &str = "no products registered yet";

fn table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let line = |out: &mut String, cells: Vec<&str>| {
        let padded: Vec<String> = cells.iter().zip(&widths).map(|(c, w)| format!("{c:<w$}", w = *w)).collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };
    line(&mut out, header.to_vec());
    line(&mut out, widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().iter().map(String::as_str).collect());
    for row in rows {
        line(&mut out, row.iter().map(String::as_str).collect());
    }
    out
}

pub fn products(items: &[Product]) -> String {
    if items.is_empty() {
        return format!("{EMPTY_PRODUCTS}\n");
    }
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|p| vec![p.id.to_string(), p.name.clone(), p.price.to_string(), p.description.clone()])
        .collect();
    table(&["id", "name", "price", "description"], &rows)
}

pub fn product(p: &Product) -> String {
    format!("#{} {}\nprice: {}\n{}\n", p.id, p.name, p.price, p.description)
}

/// Ledger newest first; an empty ledger renders a placeholder, never an empty table.
pub fn ledger(rows: &[LedgerRow]) -> String {
    if rows.is_empty() {
        return format!("{EMPTY_LEDGER}\n");
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.sequence_id.to_string(),
                r.kind.label().to_string(),
                movement_date::format(&r.date),
                r.unit_price.to_string(),
                r.quantity.to_string(),
                r.line_total.to_string(),
                r.running_balance.to_string(),
            ]
        })
        .collect();
    table(&["#", "type", "date", "unit", "qty", "total", "stock"], &cells)
}

pub fn field_errors(errs: &FieldErrors) -> String {
    let mut out = String::new();
    for (field, msgs) in errs.iter() {
        for m in msgs {
            let _ = writeln!(out, "  {field}: {m}");
        }
    }
    out
}

/// User-facing text for a failed call.
pub fn api_error(err: &ApiError) -> String {
    match err {
        ApiError::ValidationFailed(errs) => format!("rejected by server:\n{}", field_errors(errs)),
        ApiError::AuthExpired { .. } => "not authorized, check username and password or log in again\n".to_string(),
        ApiError::RedirectedToLogin { status } => {
            format!("server returned {status}; session closed, run `inventory_client login`\n")
        }
        other => format!("{other}\n"),
    }
}
