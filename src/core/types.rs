use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::CompositionError;

pub const COMPOSITION_TOTAL: f64 = 100.0;
pub const COMPOSITION_TOLERANCE: f64 = 1e-6;
const DEGENERATE_TOTAL: f64 = 1e-9;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBucket {
    Bonds,
    Low,
    Medium,
    High,
}

impl RiskBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskBucket::Bonds => "bonds",
            RiskBucket::Low => "low",
            RiskBucket::Medium => "medium",
            RiskBucket::High => "high",
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub name: String,
    pub bucket: RiskBucket,
    pub annual_return_percent: f64,
    pub volatility_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub bucket: RiskBucket,
    pub percentage: f64,
}

/// Ordered bucket -> percentage mapping. Order is the order buckets are filled
/// by the assembler and reported back to the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Composition(Vec<Allocation>);

impl Composition {
    pub fn from_pairs(pairs: &[(RiskBucket, f64)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|&(bucket, percentage)| Allocation { bucket, percentage })
                .collect(),
        )
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.0.iter()
    }

    pub fn share(&self, bucket: RiskBucket) -> f64 {
        self.0
            .iter()
            .find(|a| a.bucket == bucket)
            .map(|a| a.percentage)
            .unwrap_or(0.0)
    }

    pub fn set_share(&mut self, bucket: RiskBucket, percentage: f64) {
        match self.0.iter_mut().find(|a| a.bucket == bucket) {
            Some(allocation) => allocation.percentage = percentage,
            None => self.0.push(Allocation { bucket, percentage }),
        }
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|a| a.percentage).sum()
    }

    pub fn is_balanced(&self) -> bool {
        (self.total() - COMPOSITION_TOTAL).abs() <= COMPOSITION_TOLERANCE
    }

    /// Proportionally rescales every share so the total is exactly 100.
    pub fn rescale(&self) -> Result<Composition, CompositionError> {
        let total = self.total();
        if !total.is_finite() || total.abs() <= DEGENERATE_TOTAL {
            return Err(CompositionError::Degenerate { total });
        }

        Ok(Self(
            self.0
                .iter()
                .map(|a| Allocation {
                    bucket: a.bucket,
                    percentage: a.percentage / total * COMPOSITION_TOTAL,
                })
                .collect(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTemplate {
    pub id: String,
    pub name: String,
    pub composition: Composition,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BandWidth {
    /// 15th/85th percentiles.
    Narrow,
    /// 5th/95th percentiles.
    Wide,
}

impl BandWidth {
    pub fn for_profile(risk_profile: &str) -> Self {
        match risk_profile {
            "moderate" | "moderate-conservative" | "moderate-aggressive" => BandWidth::Narrow,
            _ => BandWidth::Wide,
        }
    }

    pub fn percentiles(self) -> (f64, f64) {
        match self {
            BandWidth::Narrow => (15.0, 85.0),
            BandWidth::Wide => (5.0, 95.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub asset: Asset,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Portfolio {
    pub holdings: Vec<Holding>,
    pub unmatched: Vec<RiskBucket>,
}

impl Portfolio {
    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.holdings.iter().map(|h| h.weight).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub labels: Vec<u32>,
    pub avg: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl ForecastSeries {
    pub fn final_min(&self) -> f64 {
        self.min.last().copied().unwrap_or(0.0)
    }

    pub fn final_avg(&self) -> f64 {
        self.avg.last().copied().unwrap_or(0.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Horizon {
    Months(u32),
    Years(u32),
}

impl Horizon {
    /// Horizon in months, or `None` when whole years overflow a month count.
    pub fn checked_months(self) -> Option<u32> {
        match self {
            Horizon::Months(m) => Some(m),
            Horizon::Years(y) => y.checked_mul(12),
        }
    }

    pub fn months(self) -> u32 {
        self.checked_months().unwrap_or(u32::MAX)
    }

    pub fn years(self) -> f64 {
        match self {
            Horizon::Months(m) => (m as f64 / 12.0 * 10.0).round() / 10.0,
            Horizon::Years(y) => y as f64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalculationRequest {
    pub risk_profile: String,
    pub amount: f64,
    pub horizon: Horizon,
    pub monthly_contribution: f64,
    pub selected_funds: Option<Vec<String>>,
    pub target_dream_amount: Option<f64>,
    pub target_passive_income: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionEntry {
    pub fund_name: String,
    pub percentage: f64,
    pub bucket: RiskBucket,
    pub purchase_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalProtection {
    pub bond_share: f64,
    pub worst_case_final: f64,
    pub total_principal: f64,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub initial_amount: f64,
    pub monthly_contribution: f64,
    pub term_years: f64,
    pub term_months: u32,
    pub strategy_name: String,
    pub risk_profile: String,
    pub expected_annual_return: f64,
    pub expected_annual_volatility: f64,
    pub composition: Vec<CompositionEntry>,
    pub unmatched_buckets: Vec<RiskBucket>,
    pub forecast: ForecastSeries,
    pub forecast_without_contribution: Option<ForecastSeries>,
    pub deposit_forecast: Vec<f64>,
    pub goal_dream_amount: Option<f64>,
    pub goal_target_capital: Option<f64>,
    pub passive_income: Option<f64>,
    pub monthly_income_forecast: Vec<f64>,
    pub capital_protection: Option<CapitalProtection>,
}
