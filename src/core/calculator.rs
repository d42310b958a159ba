use std::sync::Arc;

use tracing::{debug, info};

use super::assembler::{aggregate_metrics, assemble_portfolio, composition_entries};
use super::catalog::Catalog;
use super::engine::{ForecastInputs, SimulationSettings, derive_seed, run_forecast};
use super::error::EngineError;
use super::projection::{deposit_forecast, monthly_income_forecast, target_capital};
use super::solver::{NoLossSolveConfig, solve_no_loss};
use super::types::{
    BandWidth, CalculationRequest, CalculationResult, CapitalProtection, Composition, RiskBucket,
};

pub const CONSERVATIVE_PROFILE: &str = "conservative";
pub const NO_LOSS_TEMPLATE: &str = "no-loss";
const PROTECTED_STRATEGY_NAME: &str = "Conservative (capital protected)";

const PRIMARY_SEED_STREAM: u64 = 0;
const NO_CONTRIBUTION_SEED_STREAM: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub simulations: u32,
    /// Fixed base seed. `None` draws a fresh one per calculation.
    pub seed: Option<u64>,
    pub deposit_annual_rate_percent: f64,
    pub passive_income_rate_percent: f64,
    pub no_loss_max_horizon_months: u32,
    /// Longest accepted horizon. Work grows with paths times months.
    pub max_horizon_months: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simulations: 10_000,
            seed: None,
            deposit_annual_rate_percent: 15.3,
            passive_income_rate_percent: 18.0,
            no_loss_max_horizon_months: 12,
            max_horizon_months: 600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortfolioCalculator {
    catalog: Arc<Catalog>,
    config: EngineConfig,
}

struct ResolvedStrategy {
    name: String,
    composition: Composition,
    solver_iterations: Option<u32>,
}

impl PortfolioCalculator {
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn calculate(&self, request: &CalculationRequest) -> Result<CalculationResult, EngineError> {
        self.calculate_with(request, &self.config)
    }

    /// Runs one full calculation with `config` in place of the calculator's own
    /// settings. Used for per-request seed and simulation overrides.
    pub fn calculate_with(
        &self,
        request: &CalculationRequest,
        config: &EngineConfig,
    ) -> Result<CalculationResult, EngineError> {
        validate_request(request, config)?;

        let months = request.horizon.months();
        let base_seed = config.seed.unwrap_or_else(rand::random);
        info!(
            risk_profile = %request.risk_profile,
            amount = request.amount,
            months,
            monthly_contribution = request.monthly_contribution,
            explicit_funds = request.selected_funds.is_some(),
            "calculating forecast"
        );
        debug!(base_seed, simulations = config.simulations, "simulation settings");

        let strategy = self.resolve_strategy(request, config, months, base_seed)?;
        let portfolio = assemble_portfolio(
            &strategy.composition,
            &self.catalog,
            request.selected_funds.as_deref(),
        )?;
        let metrics = aggregate_metrics(&portfolio);

        let inputs = ForecastInputs {
            initial_amount: request.amount,
            months,
            annual_return_percent: metrics.annual_return,
            annual_volatility_percent: metrics.annual_volatility,
            monthly_contribution: request.monthly_contribution,
            band: BandWidth::for_profile(&request.risk_profile),
        };
        let forecast = run_forecast(
            &inputs,
            SimulationSettings {
                simulations: config.simulations,
                seed: derive_seed(base_seed, PRIMARY_SEED_STREAM),
            },
        );
        let forecast_without_contribution = (request.monthly_contribution > 0.0).then(|| {
            run_forecast(
                &ForecastInputs {
                    monthly_contribution: 0.0,
                    ..inputs
                },
                SimulationSettings {
                    simulations: config.simulations,
                    seed: derive_seed(base_seed, NO_CONTRIBUTION_SEED_STREAM),
                },
            )
        });

        let deposit = deposit_forecast(
            request.amount,
            months,
            request.monthly_contribution,
            config.deposit_annual_rate_percent,
        );
        let income = monthly_income_forecast(&forecast.avg, config.passive_income_rate_percent);
        let goal_target_capital = request
            .target_passive_income
            .filter(|income| *income > 0.0)
            .map(|income| target_capital(income, config.passive_income_rate_percent));

        let capital_protection = strategy.solver_iterations.map(|iterations| CapitalProtection {
            bond_share: strategy.composition.share(RiskBucket::Bonds),
            worst_case_final: forecast.final_min(),
            total_principal: request.amount + request.monthly_contribution * months as f64,
            iterations,
        });

        info!(
            strategy = %strategy.name,
            expected_annual_return = metrics.annual_return,
            expected_final = forecast.final_avg(),
            "forecast ready"
        );

        Ok(CalculationResult {
            initial_amount: request.amount,
            monthly_contribution: request.monthly_contribution,
            term_years: request.horizon.years(),
            term_months: months,
            strategy_name: strategy.name,
            risk_profile: request.risk_profile.clone(),
            expected_annual_return: metrics.annual_return,
            expected_annual_volatility: metrics.annual_volatility,
            composition: composition_entries(&portfolio),
            unmatched_buckets: portfolio.unmatched,
            forecast,
            forecast_without_contribution,
            deposit_forecast: deposit,
            goal_dream_amount: request.target_dream_amount,
            goal_target_capital,
            passive_income: request.target_passive_income,
            monthly_income_forecast: income,
            capital_protection,
        })
    }

    fn resolve_strategy(
        &self,
        request: &CalculationRequest,
        config: &EngineConfig,
        months: u32,
        base_seed: u64,
    ) -> Result<ResolvedStrategy, EngineError> {
        if request.risk_profile == CONSERVATIVE_PROFILE && months <= config.no_loss_max_horizon_months {
            let start = self
                .catalog
                .strategy(NO_LOSS_TEMPLATE)
                .or_else(|| self.catalog.strategy(CONSERVATIVE_PROFILE))
                .ok_or_else(|| EngineError::UnknownStrategy(request.risk_profile.clone()))?;
            debug!(template = %start.id, "short conservative horizon, solving for capital protection");

            let solved = solve_no_loss(
                &start.composition,
                &self.catalog,
                NoLossSolveConfig {
                    initial_amount: request.amount,
                    months,
                    monthly_contribution: request.monthly_contribution,
                    simulations: config.simulations,
                    base_seed,
                },
            )?;
            return Ok(ResolvedStrategy {
                name: PROTECTED_STRATEGY_NAME.to_string(),
                composition: solved.composition,
                solver_iterations: Some(solved.iterations.len() as u32),
            });
        }

        let template = self
            .catalog
            .strategy(&request.risk_profile)
            .ok_or_else(|| EngineError::UnknownStrategy(request.risk_profile.clone()))?;
        Ok(ResolvedStrategy {
            name: template.name.clone(),
            composition: template.composition.clone(),
            solver_iterations: None,
        })
    }
}

fn validate_request(request: &CalculationRequest, config: &EngineConfig) -> Result<(), EngineError> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(EngineError::InvalidRequest(
            "amount must be greater than 0".to_string(),
        ));
    }
    match request.horizon.checked_months() {
        Some(0) => {
            return Err(EngineError::InvalidRequest(
                "investment term must be at least one month".to_string(),
            ));
        }
        Some(months) if months <= config.max_horizon_months => {}
        _ => {
            return Err(EngineError::InvalidRequest(format!(
                "investment term must not exceed {} months",
                config.max_horizon_months
            )));
        }
    }
    if !request.monthly_contribution.is_finite() || request.monthly_contribution < 0.0 {
        return Err(EngineError::InvalidRequest(
            "monthlyContribution must be >= 0".to_string(),
        ));
    }
    for (field, value) in [
        ("dreamAmount", request.target_dream_amount),
        ("passiveIncome", request.target_passive_income),
    ] {
        if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
            return Err(EngineError::InvalidRequest(format!("{field} must be >= 0")));
        }
    }
    if config.simulations == 0 {
        return Err(EngineError::InvalidRequest(
            "simulations must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
