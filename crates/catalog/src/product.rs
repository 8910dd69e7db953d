use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{DomainError, DomainResult, Entity, ProductName};

/// Catalog entry for a product.
///
/// Batches and transactions copy `category` and `unit` at write time, so later
/// edits here never rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub name: ProductName,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub unit: String,
    /// `None` when unset, negative, or stored as something that is not a number.
    #[serde(default, deserialize_with = "lenient_threshold")]
    pub low_stock_threshold: Option<i64>,
}

impl Product {
    /// The configured threshold, or `default` when unset.
    pub fn threshold_or(&self, default: i64) -> i64 {
        self.low_stock_threshold.unwrap_or(default)
    }
}

impl Entity for Product {
    type Id = ProductName;

    fn id(&self) -> &Self::Id {
        &self.name
    }
}

/// Input for creating or replacing a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: ProductName,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default, deserialize_with = "lenient_threshold")]
    pub low_stock_threshold: Option<i64>,
}

impl NewProduct {
    pub fn validate(self) -> DomainResult<Product> {
        if let Some(threshold) = self.low_stock_threshold {
            validate_threshold(threshold)?;
        }
        Ok(Product {
            name: self.name,
            category: self.category.trim().to_string(),
            unit: self.unit.trim().to_string(),
            low_stock_threshold: self.low_stock_threshold,
        })
    }
}

pub(crate) fn validate_threshold(threshold: i64) -> DomainResult<()> {
    if threshold < 0 {
        return Err(DomainError::validation("low-stock threshold cannot be negative"));
    }
    Ok(())
}

/// Accept any JSON value; keep it only if it is a finite, non-negative number.
fn lenient_threshold<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    let threshold = value.and_then(|v| match v {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64)),
        _ => None,
    });
    Ok(threshold.filter(|t| *t >= 0))
}
