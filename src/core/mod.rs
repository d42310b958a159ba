mod assembler;
mod calculator;
mod catalog;
mod engine;
mod error;
mod projection;
mod solver;
mod types;

pub use assembler::{PortfolioMetrics, aggregate_metrics, assemble_portfolio, composition_entries};
pub use calculator::{CONSERVATIVE_PROFILE, EngineConfig, NO_LOSS_TEMPLATE, PortfolioCalculator};
pub use catalog::Catalog;
pub use engine::{ForecastInputs, SimulationSettings, derive_seed, run_forecast};
pub use error::{CatalogError, CompositionError, EngineError};
pub use projection::{deposit_forecast, monthly_income_forecast, target_capital};
pub use solver::{
    BOND_CAP, BOND_STEP, MAX_ITERATIONS, NoLossIteration, NoLossSolveConfig, NoLossSolveResult,
    Termination, solve_no_loss, shift_toward_bonds,
};
pub use types::{
    Allocation, Asset, BandWidth, CalculationRequest, CalculationResult, CapitalProtection,
    Composition, CompositionEntry, ForecastSeries, Holding, Horizon, Portfolio, RiskBucket,
    StrategyTemplate,
};
