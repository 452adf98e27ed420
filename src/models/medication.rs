use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An inventory row. `stock_quantity` only moves through issuance or restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub stock_quantity: i64,
    /// Price per unit in minor currency units.
    pub unit_price_cents: i64,
    /// Every unit ever stocked, including units since issued.
    pub total_stocked: i64,
}

/// Input for registering a medication in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedication {
    pub name: String,
    pub description: Option<String>,
    pub initial_stock: i64,
    pub unit_price_cents: i64,
}

impl NewMedication {
    pub fn new(name: impl Into<String>, initial_stock: i64, unit_price_cents: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            initial_stock,
            unit_price_cents,
        }
    }
}
