use std::fmt;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use polars::prelude::DataFrame;

use crate::frame::FrameError;
use crate::quality::QualityRuleSet;

pub mod customers;
pub mod products;
pub mod sales;

pub use customers::{categorize_customer, transform_customers, CustomersEntity};
pub use products::{transform_products, ProductsEntity, PRICE_TIERS};
pub use sales::{transform_sales, SalesEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Sales,
    Products,
    Customers,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Sales => "sales",
            EntityKind::Products => "products",
            EntityKind::Customers => "customers",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sales" => Some(EntityKind::Sales),
            "products" => Some(EntityKind::Products),
            "customers" => Some(EntityKind::Customers),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-entity behaviour: enrichment, quality rules and the persisted row shape.
pub trait EntityStrategy: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn rules(&self) -> &'static QualityRuleSet;

    /// Column list written to the entity's destination table, in table order.
    fn destination_columns(&self) -> &'static [&'static str];

    fn transform(
        &self,
        raw: &DataFrame,
        transformed_at: NaiveDateTime,
    ) -> Result<DataFrame, FrameError>;

    fn type_issues(&self, _df: &DataFrame) -> Vec<String> {
        Vec::new()
    }

    fn custom_issues(&self, df: &DataFrame, now: NaiveDateTime) -> Vec<String>;
}

static ENTITIES: Lazy<Vec<&'static dyn EntityStrategy>> = Lazy::new(|| {
    vec![
        &SalesEntity as &dyn EntityStrategy,
        &ProductsEntity as &dyn EntityStrategy,
        &CustomersEntity as &dyn EntityStrategy,
    ]
});

pub fn all_entities() -> &'static [&'static dyn EntityStrategy] {
    ENTITIES.as_slice()
}

/// Looks up the strategy for a source or table name.
pub fn entity_for(name: &str) -> Option<&'static dyn EntityStrategy> {
    let kind = EntityKind::from_name(name)?;
    all_entities()
        .iter()
        .find(|entity| entity.kind() == kind)
        .copied()
}
