// ===============================
// src/domain.rs
// ===============================
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Jenis pergerakan stok. Kode backend: 1 = purchase (masuk), selain itu sale (keluar).
/// Dikirim keluar selalu sebagai 1 atau 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub enum MovementKind {
    Purchase,
    Sale,
}

impl MovementKind {
    pub fn sign(&self) -> i64 {
        match self {
            MovementKind::Purchase => 1,
            MovementKind::Sale => -1,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MovementKind::Purchase => 1,
            MovementKind::Sale => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MovementKind::Purchase => "purchase",
            MovementKind::Sale => "sale",
        }
    }
}

impl From<i64> for MovementKind {
    fn from(code: i64) -> Self {
        match code {
            1 => MovementKind::Purchase,
            _ => MovementKind::Sale,
        }
    }
}

impl From<MovementKind> for u8 {
    fn from(kind: MovementKind) -> u8 {
        kind.code()
    }
}

/// One purchase or sale as delivered by `/api/inventory/inventories/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    #[serde(rename = "type")]
    pub kind: MovementKind,
    #[serde(with = "movement_date")]
    pub date: NaiveDateTime,
    #[serde(rename = "unit")]
    pub unit_price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
}

/// Body for product create/update (id lives in the path).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDraft {
    pub name: String,
    pub price: Decimal,
    pub description: String,
}

impl From<&Product> for ProductDraft {
    fn from(p: &Product) -> Self {
        Self { name: p.name.clone(), price: p.price, description: p.description.clone() }
    }
}

/// Payload for `/purchases/` and `/sales/`.
/// `price` = unit * quantity, `inventory` = proyeksi saldo setelah movement ini.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMovement {
    #[serde(rename = "id")]
    pub product_id: i64,
    #[serde(rename = "type")]
    pub kind: MovementKind,
    #[serde(with = "movement_date")]
    pub date: NaiveDateTime,
    pub unit: Decimal,
    pub quantity: u32,
    pub price: Decimal,
    pub inventory: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// `yyyy-MM-dd HH:mm:ss` on the wire; RFC 3339 accepted on read.
pub mod movement_date {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn format(date: &NaiveDateTime) -> String {
        date.format(FORMAT).to_string()
    }

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(raw, FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.naive_local()))
    }

    pub fn serialize<S: Serializer>(date: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("bad movement date: {raw}")))
    }
}
