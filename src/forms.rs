// ===============================
// src/forms.rs
// ===============================
//
// Aturan input form (login, produk, stok) + dispatch submit stok berbasis intent.
//
use std::collections::BTreeMap;
use std::fmt;

use chrono::Local;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::{Credentials, MovementKind, NewMovement, Product, ProductDraft};
use crate::ledger::{current_stock, LedgerRow};

pub const PASSWORD_MIN_LEN: usize = 8;

/// Field name -> messages. Also the decoded body of a 422 response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn push(&mut self, field: &str, msg: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    fn into_result<T>(self, ok: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(ok) } else { Err(self) }
    }

    /// Decode a validation body. Accepts `{"field": ["msg", ..]}`,
    /// `{"field": "msg"}` and falls back to `non_field_errors`.
    pub fn from_body(body: &Value) -> Self {
        let mut out = FieldErrors::default();
        match body {
            Value::Object(map) => {
                for (field, v) in map {
                    match v {
                        Value::Array(items) => {
                            for item in items {
                                out.push(field, value_text(item));
                            }
                        }
                        other => out.push(field, value_text(other)),
                    }
                }
            }
            Value::Null => out.push("non_field_errors", "validation failed"),
            other => out.push("non_field_errors", value_text(other)),
        }
        out
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, msgs) in &self.0 {
            for m in msgs {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {m}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

// ---- Login ----

pub fn validate_login(username: &str, password: &str) -> Result<Credentials, FieldErrors> {
    let mut errs = FieldErrors::default();
    if username.trim().is_empty() {
        errs.push("username", "this field is required");
    }
    if password.is_empty() {
        errs.push("password", "this field is required");
    } else if password.chars().count() < PASSWORD_MIN_LEN {
        errs.push("password", format!("must be at least {PASSWORD_MIN_LEN} characters"));
    }
    errs.into_result(Credentials { username: username.trim().to_string(), password: password.to_string() })
}

// ---- Produk ----

/// Raw text as typed by the user; `None` keeps the current value on edit.
#[derive(Debug, Clone, Default)]
pub struct ProductInput {
    pub name: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
}

impl ProductInput {
    /// New product: name and price are mandatory.
    pub fn into_draft(self) -> Result<ProductDraft, FieldErrors> {
        let mut errs = FieldErrors::default();
        let name = required_text(&mut errs, "name", self.name.as_deref());
        let price = match self.price.as_deref() {
            Some(raw) => parse_price(&mut errs, raw),
            None => {
                errs.push("price", "this field is required");
                Decimal::ZERO
            }
        };
        errs.into_result(ProductDraft { name, price, description: self.description.unwrap_or_default() })
    }

    /// Edit: overlay only the provided fields on top of `current`.
    pub fn apply_to(self, current: &Product) -> Result<ProductDraft, FieldErrors> {
        let mut errs = FieldErrors::default();
        let mut draft = ProductDraft::from(current);
        if let Some(name) = self.name.as_deref() {
            draft.name = required_text(&mut errs, "name", Some(name));
        }
        if let Some(raw) = self.price.as_deref() {
            draft.price = parse_price(&mut errs, raw);
        }
        if let Some(desc) = self.description {
            draft.description = desc;
        }
        errs.into_result(draft)
    }
}

fn required_text(errs: &mut FieldErrors, field: &str, raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => {
            errs.push(field, "this field is required");
            String::new()
        }
    }
}

fn parse_price(errs: &mut FieldErrors, raw: &str) -> Decimal {
    match raw.trim().parse::<Decimal>() {
        Ok(p) if p.is_sign_negative() && !p.is_zero() => {
            errs.push("price", "must not be negative");
            Decimal::ZERO
        }
        Ok(p) => p,
        Err(_) => {
            errs.push("price", "must be a number");
            Decimal::ZERO
        }
    }
}

// ---- Stok ----

/// Which button submitted the stock form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockIntent {
    Purchase,
    Wholesale,
}

impl StockIntent {
    pub fn kind(&self) -> MovementKind {
        match self {
            StockIntent::Purchase => MovementKind::Purchase,
            StockIntent::Wholesale => MovementKind::Sale,
        }
    }
}

pub fn parse_quantity(raw: &str) -> Result<u32, FieldErrors> {
    let mut errs = FieldErrors::default();
    let raw = raw.trim();
    if raw.is_empty() {
        errs.push("quantity", "enter a quantity");
        return Err(errs);
    }
    match raw.parse::<u32>() {
        Ok(0) => errs.push("quantity", "must be greater than zero"),
        Ok(q) => return Ok(q),
        Err(_) => errs.push("quantity", "must be a whole number"),
    }
    Err(errs)
}

/// Build the purchase/sale payload for `product` at its list price.
/// `ledger` is the current display ledger (newest first).
pub fn build_movement(
    product: &Product,
    ledger: &[LedgerRow],
    intent: StockIntent,
    quantity: u32,
) -> Result<NewMovement, FieldErrors> {
    let kind = intent.kind();
    let mut errs = FieldErrors::default();
    let price = product.price.checked_mul(Decimal::from(quantity)).unwrap_or_else(|| {
        errs.push("quantity", "total price is out of range");
        Decimal::ZERO
    });
    let inventory = current_stock(ledger)
        .checked_add(kind.sign() * i64::from(quantity))
        .unwrap_or_else(|| {
            errs.push("quantity", "stock balance is out of range");
            0
        });
    errs.into_result(NewMovement {
        product_id: product.id,
        kind,
        date: Local::now().naive_local(),
        unit: product.price,
        quantity,
        price,
        inventory,
    })
}
