use tracing::{debug, info, warn};

use super::assembler::{aggregate_metrics, assemble_portfolio};
use super::catalog::Catalog;
use super::engine::{ForecastInputs, SimulationSettings, derive_seed, run_forecast};
use super::error::{CompositionError, EngineError};
use super::types::{BandWidth, Composition, RiskBucket};

pub const MAX_ITERATIONS: u32 = 10;
pub const BOND_STEP: f64 = 5.0;
pub const BOND_CAP: f64 = 95.0;

const SOLVER_SEED_STREAM: u64 = 0x100;

#[derive(Debug, Clone, Copy)]
pub struct NoLossSolveConfig {
    pub initial_amount: f64,
    pub months: u32,
    pub monthly_contribution: f64,
    pub simulations: u32,
    pub base_seed: u64,
}

impl NoLossSolveConfig {
    pub fn total_principal(&self) -> f64 {
        self.initial_amount + self.monthly_contribution * self.months as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoLossIteration {
    pub iteration: u32,
    pub bond_share: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub worst_case_final: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Termination {
    Accepted,
    BondCapReached,
    IterationsExhausted,
}

#[derive(Debug, Clone)]
pub struct NoLossSolveResult {
    pub composition: Composition,
    pub total_principal: f64,
    pub iterations: Vec<NoLossIteration>,
    pub termination: Termination,
}

/// Moves weight from the risky buckets into bonds until the lower band of the
/// final month covers the money put in, the bond share hits the cap, or the
/// iteration budget runs out. The last two return the current composition as
/// the best available one.
pub fn solve_no_loss(
    initial: &Composition,
    catalog: &Catalog,
    config: NoLossSolveConfig,
) -> Result<NoLossSolveResult, EngineError> {
    let total_principal = config.total_principal();
    let mut composition = if initial.is_balanced() {
        initial.clone()
    } else {
        initial.rescale()?
    };
    let mut iterations = Vec::with_capacity(MAX_ITERATIONS as usize);

    for iteration in 0..MAX_ITERATIONS {
        let portfolio = assemble_portfolio(&composition, catalog, None)?;
        let metrics = aggregate_metrics(&portfolio);
        let forecast = run_forecast(
            &ForecastInputs {
                initial_amount: config.initial_amount,
                months: config.months,
                annual_return_percent: metrics.annual_return,
                annual_volatility_percent: metrics.annual_volatility,
                monthly_contribution: config.monthly_contribution,
                band: BandWidth::Wide,
            },
            SimulationSettings {
                simulations: config.simulations,
                seed: derive_seed(config.base_seed, SOLVER_SEED_STREAM + iteration as u64),
            },
        );

        let bond_share = composition.share(RiskBucket::Bonds);
        let worst_case_final = forecast.final_min();
        iterations.push(NoLossIteration {
            iteration,
            bond_share,
            annual_return: metrics.annual_return,
            annual_volatility: metrics.annual_volatility,
            worst_case_final,
        });
        debug!(
            iteration = iteration + 1,
            bond_share,
            annual_return = metrics.annual_return,
            annual_volatility = metrics.annual_volatility,
            worst_case_final,
            total_principal,
            "no-loss trial"
        );

        if worst_case_final >= total_principal {
            info!(bond_share, iterations = iteration + 1, "capital protection reached");
            return Ok(NoLossSolveResult {
                composition,
                total_principal,
                iterations,
                termination: Termination::Accepted,
            });
        }

        if bond_share >= BOND_CAP {
            warn!(
                bond_share,
                worst_case_final,
                total_principal,
                "bond cap reached without capital protection, keeping safest composition"
            );
            return Ok(NoLossSolveResult {
                composition,
                total_principal,
                iterations,
                termination: Termination::BondCapReached,
            });
        }

        composition = shift_toward_bonds(&composition)?;
    }

    warn!(
        bond_share = composition.share(RiskBucket::Bonds),
        total_principal,
        "capital protection not reached within {MAX_ITERATIONS} iterations"
    );
    Ok(NoLossSolveResult {
        composition,
        total_principal,
        iterations,
        termination: Termination::IterationsExhausted,
    })
}

/// Moves `BOND_STEP` points into bonds, taken from the other buckets in
/// proportion to their share. When the other buckets hold no more than the
/// step, everything goes to bonds.
pub fn shift_toward_bonds(composition: &Composition) -> Result<Composition, CompositionError> {
    let bonds = composition.share(RiskBucket::Bonds);
    let risky_total: f64 = composition
        .iter()
        .filter(|a| a.bucket != RiskBucket::Bonds)
        .map(|a| a.percentage)
        .sum();

    let mut next = composition.clone();
    if risky_total <= BOND_STEP {
        for allocation in composition.iter().filter(|a| a.bucket != RiskBucket::Bonds) {
            next.set_share(allocation.bucket, 0.0);
        }
        next.set_share(RiskBucket::Bonds, 100.0);
        return Ok(next);
    }

    for allocation in composition.iter().filter(|a| a.bucket != RiskBucket::Bonds) {
        let reduction = allocation.percentage / risky_total * BOND_STEP;
        next.set_share(allocation.bucket, allocation.percentage - reduction);
    }
    next.set_share(RiskBucket::Bonds, bonds + BOND_STEP);
    next.rescale()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Asset, StrategyTemplate};
    use proptest::prelude::{prop_assert, proptest};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn asset(name: &str, bucket: RiskBucket, ret: f64, vol: f64) -> Asset {
        Asset {
            name: name.to_string(),
            bucket,
            annual_return_percent: ret,
            volatility_percent: vol,
            purchase_url: None,
        }
    }

    fn catalog(assets: Vec<Asset>) -> Catalog {
        Catalog::new(
            assets,
            vec![StrategyTemplate {
                id: "unused".to_string(),
                name: "Unused".to_string(),
                composition: Composition::from_pairs(&[(RiskBucket::Bonds, 100.0)]),
            }],
        )
        .expect("valid catalog")
    }

    fn config() -> NoLossSolveConfig {
        NoLossSolveConfig {
            initial_amount: 100_000.0,
            months: 6,
            monthly_contribution: 0.0,
            simulations: 2_000,
            base_seed: 17,
        }
    }

    fn losing_catalog() -> Catalog {
        catalog(vec![
            asset("Bond", RiskBucket::Bonds, -4.0, 0.0),
            asset("Low", RiskBucket::Low, -2.0, 5.0),
            asset("Medium", RiskBucket::Medium, -1.0, 15.0),
            asset("High", RiskBucket::High, 0.0, 30.0),
        ])
    }

    fn assert_bond_share_non_decreasing(result: &NoLossSolveResult) {
        for pair in result.iterations.windows(2) {
            assert!(
                pair[1].bond_share >= pair[0].bond_share,
                "bond share fell from {} to {}",
                pair[0].bond_share,
                pair[1].bond_share
            );
        }
    }

    #[test]
    fn accepts_initial_composition_when_already_safe() {
        let catalog = catalog(vec![
            asset("Bond", RiskBucket::Bonds, 15.0, 0.0),
            asset("Low", RiskBucket::Low, 12.0, 0.0),
        ]);
        let initial = Composition::from_pairs(&[(RiskBucket::Bonds, 60.0), (RiskBucket::Low, 40.0)]);

        let result = solve_no_loss(&initial, &catalog, config()).expect("solves");
        assert_eq!(result.termination, Termination::Accepted);
        assert_eq!(result.iterations.len(), 1);
        assert_eq!(result.composition, initial);
        assert!(result.iterations[0].worst_case_final >= result.total_principal);
    }

    #[test]
    fn shifts_into_bonds_until_worst_case_covers_principal() {
        let catalog = catalog(vec![
            asset("Bond", RiskBucket::Bonds, 10.0, 0.0),
            asset("Low", RiskBucket::Low, 0.0, 40.0),
        ]);
        let initial = Composition::from_pairs(&[(RiskBucket::Bonds, 60.0), (RiskBucket::Low, 40.0)]);

        let result = solve_no_loss(&initial, &catalog, config()).expect("solves");
        assert_eq!(result.termination, Termination::Accepted);
        assert!(result.iterations.len() > 1);
        assert!(result.composition.share(RiskBucket::Bonds) > 60.0);
        assert!(result.composition.is_balanced());
        let last = result.iterations.last().expect("at least one iteration");
        assert!(last.worst_case_final >= result.total_principal);
        assert_bond_share_non_decreasing(&result);
    }

    #[test]
    fn stops_at_bond_cap_when_nothing_is_safe() {
        let initial = Composition::from_pairs(&[
            (RiskBucket::Bonds, 85.0),
            (RiskBucket::Low, 15.0),
            (RiskBucket::Medium, 0.0),
            (RiskBucket::High, 0.0),
        ]);

        let result = solve_no_loss(&initial, &losing_catalog(), config()).expect("solves");
        assert_eq!(result.termination, Termination::BondCapReached);
        assert!(result.iterations.len() <= MAX_ITERATIONS as usize);
        assert!(result.composition.share(RiskBucket::Bonds) >= BOND_CAP - 1e-9);
        let last = result.iterations.last().expect("at least one iteration");
        assert!(last.worst_case_final < result.total_principal);
        assert_bond_share_non_decreasing(&result);
    }

    #[test]
    fn returns_last_composition_after_exhausting_iterations() {
        let initial = Composition::from_pairs(&[
            (RiskBucket::Bonds, 40.0),
            (RiskBucket::Low, 40.0),
            (RiskBucket::Medium, 15.0),
            (RiskBucket::High, 5.0),
        ]);

        let result = solve_no_loss(&initial, &losing_catalog(), config()).expect("solves");
        assert_eq!(result.termination, Termination::IterationsExhausted);
        assert_eq!(result.iterations.len(), MAX_ITERATIONS as usize);
        assert_close(result.iterations[9].bond_share, 85.0, 1e-6);
        assert_close(result.composition.share(RiskBucket::Bonds), 90.0, 1e-6);
        assert!(result.composition.is_balanced());
        assert_bond_share_non_decreasing(&result);
    }

    #[test]
    fn principal_includes_contributions() {
        let mut cfg = config();
        cfg.monthly_contribution = 5_000.0;
        assert_close(cfg.total_principal(), 130_000.0, 1e-9);
    }

    #[test]
    fn shift_collapses_small_risky_remainder_into_bonds() {
        let composition = Composition::from_pairs(&[
            (RiskBucket::Bonds, 96.0),
            (RiskBucket::Low, 3.0),
            (RiskBucket::High, 1.0),
        ]);
        let next = shift_toward_bonds(&composition).expect("shifts");
        assert_eq!(next.share(RiskBucket::Bonds), 100.0);
        assert_eq!(next.share(RiskBucket::Low), 0.0);
        assert_eq!(next.share(RiskBucket::High), 0.0);
    }

    #[test]
    fn shift_adds_bond_bucket_when_missing() {
        let composition = Composition::from_pairs(&[(RiskBucket::Low, 50.0), (RiskBucket::High, 50.0)]);
        let next = shift_toward_bonds(&composition).expect("shifts");
        assert_close(next.share(RiskBucket::Bonds), 5.0, 1e-9);
        assert_close(next.share(RiskBucket::Low), 47.5, 1e-9);
        assert_close(next.share(RiskBucket::High), 47.5, 1e-9);
    }

    #[test]
    fn bonds_only_composition_without_bond_assets_is_empty() {
        let catalog = catalog(vec![asset("Low", RiskBucket::Low, 5.0, 5.0)]);
        let initial = Composition::from_pairs(&[(RiskBucket::Bonds, 100.0)]);
        let err = solve_no_loss(&initial, &catalog, config()).expect_err("no bond assets");
        assert_eq!(err, EngineError::EmptyPortfolio);
    }

    #[test]
    fn zero_total_composition_is_an_empty_portfolio() {
        let zero = Composition::from_pairs(&[
            (RiskBucket::Bonds, 0.0),
            (RiskBucket::Low, 0.0),
            (RiskBucket::High, 0.0),
        ]);
        let err = solve_no_loss(&zero, &losing_catalog(), config()).expect_err("nothing to scale");
        assert_eq!(err, EngineError::EmptyPortfolio);
    }

    #[test]
    fn unbalanced_start_is_rescaled_before_the_first_trial() {
        let catalog = catalog(vec![
            asset("Bond", RiskBucket::Bonds, 15.0, 0.0),
            asset("Low", RiskBucket::Low, 12.0, 0.0),
        ]);
        let initial = Composition::from_pairs(&[(RiskBucket::Bonds, 30.0), (RiskBucket::Low, 20.0)]);

        let result = solve_no_loss(&initial, &catalog, config()).expect("solves");
        assert_eq!(result.termination, Termination::Accepted);
        assert!(result.composition.is_balanced());
        assert_close(result.composition.share(RiskBucket::Bonds), 60.0, 1e-9);
        assert_close(result.iterations[0].annual_return, 15.0 * 0.6 + 12.0 * 0.4, 1e-9);
        assert_close(result.iterations[0].annual_volatility, 0.0, 1e-12);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_shift_keeps_total_and_never_lowers_bonds(
            bonds in 0u32..100,
            low in 0u32..100,
            medium in 0u32..100,
            high in 1u32..100
        ) {
            let total = (bonds + low + medium + high) as f64;
            let composition = Composition::from_pairs(&[
                (RiskBucket::Bonds, bonds as f64 / total * 100.0),
                (RiskBucket::Low, low as f64 / total * 100.0),
                (RiskBucket::Medium, medium as f64 / total * 100.0),
                (RiskBucket::High, high as f64 / total * 100.0),
            ]);
            let next = shift_toward_bonds(&composition).expect("non-degenerate");
            prop_assert!(next.is_balanced());
            prop_assert!(next.share(RiskBucket::Bonds) >= composition.share(RiskBucket::Bonds));
            prop_assert!(next.iter().all(|a| a.percentage >= -1e-9));
        }
    }
}
