use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, WarehouseId};

/// Closed set of warehouse purposes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarehouseCategory {
    Storage,
    Production,
    CustomerFacing,
}

impl WarehouseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseCategory::Storage => "storage",
            WarehouseCategory::Production => "production",
            WarehouseCategory::CustomerFacing => "customer-facing",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "storage" => Ok(WarehouseCategory::Storage),
            "production" => Ok(WarehouseCategory::Production),
            "customer-facing" | "customer_facing" => Ok(WarehouseCategory::CustomerFacing),
            other => Err(DomainError::validation(format!(
                "unknown warehouse category '{other}' (expected storage, production or customer-facing)"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseStatus {
    #[serde(alias = "Active")]
    Active,
    #[serde(alias = "Inactive")]
    Inactive,
}

impl WarehouseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseStatus::Active => "active",
            WarehouseStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(WarehouseStatus::Active),
            "inactive" => Ok(WarehouseStatus::Inactive),
            other => Err(DomainError::validation(format!("unknown warehouse status '{other}'"))),
        }
    }
}

/// Warehouse metadata.
///
/// `totalItems` is not stored here: it is derived from the batch store and
/// reported next to this record by callers that display it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: String,
    pub category: WarehouseCategory,
    pub status: WarehouseStatus,
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: String,
    pub category: WarehouseCategory,
    #[serde(default = "default_status")]
    pub status: WarehouseStatus,
}

fn default_status() -> WarehouseStatus {
    WarehouseStatus::Active
}

impl NewWarehouse {
    pub fn validate(self) -> DomainResult<Warehouse> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("warehouse name cannot be empty"));
        }
        if self.location.trim().is_empty() {
            return Err(DomainError::validation("warehouse location cannot be empty"));
        }
        Ok(Warehouse {
            id: self.id,
            name: self.name.trim().to_string(),
            location: self.location.trim().to_string(),
            category: self.category,
            status: self.status,
        })
    }
}

/// Partial metadata edit. The identifier itself is immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub category: Option<WarehouseCategory>,
    pub status: Option<WarehouseStatus>,
}

impl WarehouseUpdate {
    pub fn apply_to(self, warehouse: &mut Warehouse) -> DomainResult<()> {
        if let Some(name) = self.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("warehouse name cannot be empty"));
            }
            warehouse.name = name.trim().to_string();
        }
        if let Some(location) = self.location {
            if location.trim().is_empty() {
                return Err(DomainError::validation("warehouse location cannot be empty"));
            }
            warehouse.location = location.trim().to_string();
        }
        if let Some(category) = self.category {
            warehouse.category = category;
        }
        if let Some(status) = self.status {
            warehouse.status = status;
        }
        Ok(())
    }
}
