use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::core::{CalculationRequest, Catalog, EngineConfig, Horizon, PortfolioCalculator};

#[derive(Parser, Debug)]
#[command(
    name = "portfolio-forecast",
    about = "Fund portfolio assembly and Monte Carlo capital forecasts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the web calculator and JSON API
    Serve(ServeArgs),
    /// Run one calculation and print the result as JSON
    Calculate(CalculateArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct EngineArgs {
    #[arg(long, help = "Catalog JSON file; the built-in catalog is used when omitted")]
    pub catalog: Option<PathBuf>,
    #[arg(long, default_value_t = 10_000)]
    pub simulations: u32,
    #[arg(long, help = "Fixed base seed for reproducible forecasts")]
    pub seed: Option<u64>,
    #[arg(long, default_value_t = 15.3, help = "Bank deposit rate in percent per year")]
    pub deposit_rate: f64,
    #[arg(
        long,
        default_value_t = 18.0,
        help = "Annual withdrawal rate in percent used for passive income"
    )]
    pub passive_income_rate: f64,
}

#[derive(Args, Debug)]
pub struct CalculateArgs {
    #[arg(long)]
    pub risk_profile: String,
    #[arg(long)]
    pub amount: f64,
    #[arg(long, conflicts_with = "years", required_unless_present = "years")]
    pub months: Option<u32>,
    #[arg(long)]
    pub years: Option<u32>,
    #[arg(long, default_value_t = 0.0)]
    pub monthly_contribution: f64,
    #[arg(long = "fund", help = "Explicit fund selection; repeat for several funds")]
    pub funds: Vec<String>,
    #[arg(long)]
    pub dream_amount: Option<f64>,
    #[arg(long)]
    pub passive_income: Option<f64>,
    #[arg(long)]
    pub pretty: bool,
    #[command(flatten)]
    pub engine: EngineArgs,
}

impl EngineArgs {
    pub fn engine_config(&self) -> Result<EngineConfig, String> {
        if self.simulations == 0 {
            return Err("--simulations must be > 0".to_string());
        }
        if !self.deposit_rate.is_finite() || self.deposit_rate < 0.0 {
            return Err("--deposit-rate must be >= 0".to_string());
        }
        if !self.passive_income_rate.is_finite() || self.passive_income_rate < 0.0 {
            return Err("--passive-income-rate must be >= 0".to_string());
        }

        Ok(EngineConfig {
            simulations: self.simulations,
            seed: self.seed,
            deposit_annual_rate_percent: self.deposit_rate,
            passive_income_rate_percent: self.passive_income_rate,
            ..EngineConfig::default()
        })
    }

    pub fn build_calculator(&self) -> Result<PortfolioCalculator, String> {
        let catalog = match &self.catalog {
            Some(path) => Catalog::load(path)
                .map_err(|e| format!("{}: {e}", path.display()))?,
            None => Catalog::builtin().map_err(|e| format!("built-in catalog: {e}"))?,
        };
        Ok(PortfolioCalculator::new(
            Arc::new(catalog),
            self.engine_config()?,
        ))
    }
}

fn request_from_args(args: &CalculateArgs) -> Result<CalculationRequest, String> {
    let horizon = match (args.months, args.years) {
        (Some(months), _) => Horizon::Months(months),
        (None, Some(years)) => Horizon::Years(years),
        (None, None) => return Err("one of --months or --years is required".to_string()),
    };

    Ok(CalculationRequest {
        risk_profile: args.risk_profile.clone(),
        amount: args.amount,
        horizon,
        monthly_contribution: args.monthly_contribution,
        selected_funds: (!args.funds.is_empty()).then(|| args.funds.clone()),
        target_dream_amount: args.dream_amount,
        target_passive_income: args.passive_income,
    })
}

/// Runs the `calculate` subcommand and returns the JSON document to print.
pub fn run_calculate(args: &CalculateArgs) -> Result<String, String> {
    let calculator = args.engine.build_calculator()?;
    let request = request_from_args(args)?;
    let result = calculator.calculate(&request).map_err(|e| e.to_string())?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    json.map_err(|e| format!("failed to serialize result: {e}"))
}
