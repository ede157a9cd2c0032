//! Transactional core: validates and applies one stock movement against an
//! item balance and raises low-stock notifications.
//!
//! The balance check and the balance write run inside a single Postgres
//! transaction with the item row locked `FOR UPDATE`, so two concurrent
//! outgoing movements against the same item cannot both pass the check and
//! jointly overdraw. Movements against different items do not contend.

use chrono::{DateTime, Utc};
use common_money::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

pub const ITEM_COLUMNS: &str = "id, name, sku, barcode, category_id, supplier_id, location_id, \
     current_stock, minimum_stock, maximum_stock, reorder_point, unit_price, cost_price, \
     status, metadata, \
     ARRAY(SELECT url FROM item_images img WHERE img.item_id = items.id ORDER BY img.position) AS images, \
     created_at, updated_at";

pub const MOVEMENT_COLUMNS: &str = "id, item_id, movement_type, quantity, unit_price, \
     total_price, reference, notes, metadata, status, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "movement_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Purchase,
    Sale,
    Adjustment,
    Transfer,
    Return,
    WriteOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    Incoming,
    Outgoing,
}

impl MovementType {
    /// ADJUSTMENT is a single incoming kind here; a corrective entry that
    /// can go either direction would need an explicit direction field
    /// rather than overloading the sign of the quantity.
    pub fn direction(&self) -> StockDirection {
        match self {
            Self::Sale | Self::Transfer | Self::WriteOff => StockDirection::Outgoing,
            Self::Purchase | Self::Return | Self::Adjustment => StockDirection::Incoming,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PURCHASE" => Some(Self::Purchase),
            "SALE" => Some(Self::Sale),
            "ADJUSTMENT" => Some(Self::Adjustment),
            "TRANSFER" => Some(Self::Transfer),
            "RETURN" => Some(Self::Return),
            "WRITE_OFF" => Some(Self::WriteOff),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "PURCHASE",
            Self::Sale => "SALE",
            Self::Adjustment => "ADJUSTMENT",
            Self::Transfer => "TRANSFER",
            Self::Return => "RETURN",
            Self::WriteOff => "WRITE_OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "item_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Active,
    Archived,
}

impl ItemStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACTIVE" => Some(Self::Active),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Archived => "ARCHIVED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "movement_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementStatus {
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub category_id: Uuid,
    pub supplier_id: Uuid,
    pub location_id: Option<Uuid>,
    pub current_stock: i32,
    pub minimum_stock: i32,
    pub maximum_stock: Option<i32>,
    pub reorder_point: Option<i32>,
    pub unit_price: Money,
    pub cost_price: Money,
    pub status: ItemStatus,
    pub metadata: Option<Value>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of one inventory change; never updated or deleted
/// through the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub item_id: Uuid,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i32,
    pub unit_price: Money,
    pub total_price: Money,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub metadata: Option<Value>,
    pub status: MovementStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovement {
    pub item_id: Uuid,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i32,
    pub unit_price: Money,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("item not found")]
    ItemNotFound,
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct MovementOutcome {
    pub movement: StockMovement,
    pub item: Item,
    pub low_stock_alert: bool,
}

/// Apply one movement as a single atomic unit: lock the item row, check the
/// balance for outgoing kinds, persist the movement with its computed total,
/// write the new balance, and record a LOW_STOCK notification when the
/// post-update stock is at or below the threshold. On any failure the
/// transaction rolls back and nothing is visible.
pub async fn apply_movement(db: &PgPool, new: &NewMovement) -> Result<MovementOutcome, LedgerError> {
    let mut tx = db.begin().await?;

    let item = sqlx::query_as::<_, Item>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"
    ))
    .bind(new.item_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(LedgerError::ItemNotFound)?;

    let direction = new.movement_type.direction();
    if direction == StockDirection::Outgoing && item.current_stock < new.quantity {
        return Err(LedgerError::InsufficientStock {
            requested: new.quantity,
            available: item.current_stock,
        });
    }

    let total_price = new.unit_price.line_total(new.quantity);
    let movement = sqlx::query_as::<_, StockMovement>(&format!(
        "INSERT INTO stock_movements (id, item_id, movement_type, quantity, unit_price, total_price, reference, notes, metadata, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'COMPLETED') \
         RETURNING {MOVEMENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.item_id)
    .bind(new.movement_type)
    .bind(new.quantity)
    .bind(&new.unit_price)
    .bind(&total_price)
    .bind(new.reference.as_deref())
    .bind(new.notes.as_deref())
    .bind(new.metadata.as_ref())
    .fetch_one(&mut *tx)
    .await?;

    let delta = match direction {
        StockDirection::Incoming => new.quantity,
        StockDirection::Outgoing => -new.quantity,
    };
    let updated = sqlx::query_as::<_, Item>(&format!(
        "UPDATE items SET current_stock = current_stock + $2, updated_at = NOW() \
         WHERE id = $1 RETURNING {ITEM_COLUMNS}"
    ))
    .bind(new.item_id)
    .bind(delta)
    .fetch_one(&mut *tx)
    .await?;

    let low_stock_alert = updated.current_stock <= updated.minimum_stock;
    if low_stock_alert {
        sqlx::query(
            "INSERT INTO notifications (id, notification_type, title, message, metadata) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind("LOW_STOCK")
        .bind("Low Stock Alert")
        .bind(format!(
            "Item {} ({}) has reached low stock level",
            updated.name, updated.sku
        ))
        .bind(serde_json::json!({
            "itemId": updated.id,
            "currentStock": updated.current_stock,
            "minimumStock": updated.minimum_stock,
        }))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(MovementOutcome { movement, item: updated, low_stock_alert })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn outgoing_kinds_decrease_stock() {
        for kind in [MovementType::Sale, MovementType::Transfer, MovementType::WriteOff] {
            assert_eq!(kind.direction(), StockDirection::Outgoing, "{kind:?}");
        }
    }

    #[test]
    fn incoming_kinds_increase_stock() {
        for kind in [MovementType::Purchase, MovementType::Return, MovementType::Adjustment] {
            assert_eq!(kind.direction(), StockDirection::Incoming, "{kind:?}");
        }
    }

    #[test]
    fn movement_type_wire_names() {
        let parsed: MovementType = serde_json::from_str("\"WRITE_OFF\"").unwrap();
        assert_eq!(parsed, MovementType::WriteOff);
        assert_eq!(serde_json::to_string(&MovementType::WriteOff).unwrap(), "\"WRITE_OFF\"");
        assert_eq!(MovementType::parse("RETURN"), Some(MovementType::Return));
        assert_eq!(MovementType::parse("refund"), None);
    }

    #[test]
    fn item_status_parse_is_strict() {
        assert_eq!(ItemStatus::parse("ACTIVE"), Some(ItemStatus::Active));
        assert_eq!(ItemStatus::parse("archived"), None);
    }

    #[test]
    fn total_price_is_quantity_times_unit_price() {
        let unit = Money::new(BigDecimal::from_str("19.99").unwrap());
        assert_eq!(unit.line_total(3).inner().to_string(), "59.97");
    }

    #[test]
    fn new_movement_accepts_wire_shape() {
        let new: NewMovement = serde_json::from_value(serde_json::json!({
            "itemId": "7f8c8f23-9d3b-4c5f-9a59-8f1e4cf1b0aa",
            "type": "SALE",
            "quantity": 2,
            "unitPrice": 4.5,
            "reference": "order-1189"
        }))
        .unwrap();
        assert_eq!(new.movement_type, MovementType::Sale);
        assert_eq!(new.quantity, 2);
        assert_eq!(new.unit_price.inner().to_string(), "4.50");
        assert!(new.notes.is_none());
    }
}
