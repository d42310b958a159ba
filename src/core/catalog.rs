use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::CatalogError;
use super::types::{Asset, StrategyTemplate};

const BUILTIN_CATALOG: &str = include_str!("../../data/catalog.json");
const TEMPLATE_TOTAL_TOLERANCE: f64 = 0.01;

/// Read-only snapshot of the asset catalog and the strategy template store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    assets: Vec<Asset>,
    strategies: Vec<StrategyTemplate>,
}

impl Catalog {
    pub fn new(assets: Vec<Asset>, strategies: Vec<StrategyTemplate>) -> Result<Self, CatalogError> {
        let catalog = Self { assets, strategies };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn strategies(&self) -> &[StrategyTemplate] {
        &self.strategies
    }

    pub fn strategy(&self, id: &str) -> Option<&StrategyTemplate> {
        self.strategies.iter().find(|s| s.id == id)
    }

    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name == name)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut names = HashSet::new();
        for asset in &self.assets {
            if !names.insert(asset.name.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate asset name '{}'",
                    asset.name
                )));
            }
            if !asset.annual_return_percent.is_finite() {
                return Err(CatalogError::Invalid(format!(
                    "asset '{}' has a non-finite annual return",
                    asset.name
                )));
            }
            if !asset.volatility_percent.is_finite() || asset.volatility_percent < 0.0 {
                return Err(CatalogError::Invalid(format!(
                    "asset '{}' must have a volatility >= 0",
                    asset.name
                )));
            }
        }

        let mut ids = HashSet::new();
        for strategy in &self.strategies {
            if !ids.insert(strategy.id.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate strategy id '{}'",
                    strategy.id
                )));
            }

            let mut buckets = HashSet::new();
            for allocation in strategy.composition.iter() {
                if !buckets.insert(allocation.bucket) {
                    return Err(CatalogError::Invalid(format!(
                        "strategy '{}' lists bucket '{}' twice",
                        strategy.id, allocation.bucket
                    )));
                }
                if !allocation.percentage.is_finite() || allocation.percentage < 0.0 {
                    return Err(CatalogError::Invalid(format!(
                        "strategy '{}' has a negative share for '{}'",
                        strategy.id, allocation.bucket
                    )));
                }
            }

            let total = strategy.composition.total();
            if (total - 100.0).abs() > TEMPLATE_TOTAL_TOLERANCE {
                return Err(CatalogError::Invalid(format!(
                    "strategy '{}' composition sums to {total}, expected 100",
                    strategy.id
                )));
            }
        }

        Ok(())
    }
}
