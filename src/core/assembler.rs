use std::collections::HashSet;

use tracing::warn;

use super::catalog::Catalog;
use super::error::EngineError;
use super::types::{Asset, Composition, CompositionEntry, Holding, Portfolio, RiskBucket};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioMetrics {
    pub annual_return: f64,
    pub annual_volatility: f64,
}

/// Builds a portfolio for `composition`. Without an explicit selection the
/// highest-return unused asset of each bucket is picked; with one, each named
/// asset takes the share of its own bucket.
pub fn assemble_portfolio(
    composition: &Composition,
    catalog: &Catalog,
    selected_funds: Option<&[String]>,
) -> Result<Portfolio, EngineError> {
    let portfolio = match selected_funds {
        Some(names) => assemble_explicit(composition, catalog, names),
        None => assemble_automatic(composition, catalog),
    };

    if portfolio.is_empty() {
        return Err(EngineError::EmptyPortfolio);
    }
    if !portfolio.unmatched.is_empty() {
        warn!(
            unmatched = ?portfolio.unmatched,
            allocated = portfolio.total_weight(),
            "composition buckets without an asset stay unallocated"
        );
    }
    Ok(portfolio)
}

fn assemble_automatic(composition: &Composition, catalog: &Catalog) -> Portfolio {
    let mut used: HashSet<&str> = HashSet::new();
    let mut portfolio = Portfolio::default();

    for allocation in composition.iter().filter(|a| a.percentage > 0.0) {
        let best = catalog
            .assets()
            .iter()
            .filter(|a| a.bucket == allocation.bucket && !used.contains(a.name.as_str()))
            .max_by(|a, b| a.annual_return_percent.total_cmp(&b.annual_return_percent));

        match best {
            Some(asset) => {
                used.insert(asset.name.as_str());
                portfolio.holdings.push(Holding {
                    asset: asset.clone(),
                    weight: allocation.percentage,
                });
            }
            None => portfolio.unmatched.push(allocation.bucket),
        }
    }

    portfolio
}

fn assemble_explicit(composition: &Composition, catalog: &Catalog, names: &[String]) -> Portfolio {
    // One asset per bucket; a later pick for the same bucket replaces the earlier one.
    let mut picks: Vec<(RiskBucket, &Asset)> = Vec::new();
    for name in names {
        let Some(asset) = catalog.asset(name) else {
            warn!(fund = %name, "selected fund is not in the catalog, dropping it");
            continue;
        };
        if composition.share(asset.bucket) <= 0.0 {
            warn!(
                fund = %name,
                bucket = %asset.bucket,
                "selected fund has no share in the composition, dropping it"
            );
            continue;
        }
        match picks.iter_mut().find(|(bucket, _)| *bucket == asset.bucket) {
            Some(pick) => pick.1 = asset,
            None => picks.push((asset.bucket, asset)),
        }
    }

    let mut portfolio = Portfolio::default();
    for allocation in composition.iter().filter(|a| a.percentage > 0.0) {
        match picks.iter().find(|(bucket, _)| *bucket == allocation.bucket) {
            Some((_, asset)) => portfolio.holdings.push(Holding {
                asset: (*asset).clone(),
                weight: allocation.percentage,
            }),
            None => portfolio.unmatched.push(allocation.bucket),
        }
    }
    portfolio
}

/// Weighted sum of the holdings' return and volatility. Unallocated weight
/// contributes nothing.
pub fn aggregate_metrics(portfolio: &Portfolio) -> PortfolioMetrics {
    portfolio.holdings.iter().fold(
        PortfolioMetrics {
            annual_return: 0.0,
            annual_volatility: 0.0,
        },
        |acc, holding| {
            let fraction = holding.weight / 100.0;
            PortfolioMetrics {
                annual_return: acc.annual_return + holding.asset.annual_return_percent * fraction,
                annual_volatility: acc.annual_volatility
                    + holding.asset.volatility_percent * fraction,
            }
        },
    )
}

pub fn composition_entries(portfolio: &Portfolio) -> Vec<CompositionEntry> {
    portfolio
        .holdings
        .iter()
        .map(|h| CompositionEntry {
            fund_name: h.asset.name.clone(),
            percentage: h.weight,
            bucket: h.asset.bucket,
            purchase_url: h.asset.purchase_url.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StrategyTemplate;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
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

    fn sample_catalog() -> Catalog {
        Catalog::new(
            vec![
                asset("Bond A", RiskBucket::Bonds, 10.0, 0.0),
                asset("Bond B", RiskBucket::Bonds, 12.0, 0.0),
                asset("Low A", RiskBucket::Low, 8.0, 4.0),
                asset("Medium A", RiskBucket::Medium, 14.0, 15.0),
                asset("Medium B", RiskBucket::Medium, 11.0, 12.0),
                asset("High A", RiskBucket::High, 20.0, 25.0),
            ],
            vec![StrategyTemplate {
                id: "balanced".to_string(),
                name: "Balanced".to_string(),
                composition: balanced(),
            }],
        )
        .expect("valid catalog")
    }

    fn balanced() -> Composition {
        Composition::from_pairs(&[
            (RiskBucket::Bonds, 40.0),
            (RiskBucket::Low, 30.0),
            (RiskBucket::Medium, 20.0),
            (RiskBucket::High, 10.0),
        ])
    }

    #[test]
    fn automatic_mode_picks_highest_return_per_bucket() {
        let catalog = sample_catalog();
        let portfolio = assemble_portfolio(&balanced(), &catalog, None).expect("assembles");

        let names: Vec<&str> = portfolio
            .holdings
            .iter()
            .map(|h| h.asset.name.as_str())
            .collect();
        assert_eq!(names, vec!["Bond B", "Low A", "Medium A", "High A"]);
        assert_approx(portfolio.total_weight(), 100.0);
        assert!(portfolio.unmatched.is_empty());
    }

    #[test]
    fn automatic_mode_leaves_missing_bucket_unallocated() {
        let catalog = Catalog::new(
            vec![
                asset("Bond A", RiskBucket::Bonds, 10.0, 0.0),
                asset("Low A", RiskBucket::Low, 8.0, 4.0),
            ],
            vec![],
        )
        .expect("valid catalog");

        let portfolio = assemble_portfolio(&balanced(), &catalog, None).expect("assembles");
        assert_eq!(portfolio.holdings.len(), 2);
        assert_eq!(portfolio.unmatched, vec![RiskBucket::Medium, RiskBucket::High]);
        assert_approx(portfolio.total_weight(), 70.0);

        let metrics = aggregate_metrics(&portfolio);
        assert_approx(metrics.annual_return, 10.0 * 0.4 + 8.0 * 0.3);
        assert_approx(metrics.annual_volatility, 4.0 * 0.3);
    }

    #[test]
    fn automatic_mode_skips_zero_share_buckets() {
        let catalog = sample_catalog();
        let composition = Composition::from_pairs(&[
            (RiskBucket::Bonds, 85.0),
            (RiskBucket::Low, 15.0),
            (RiskBucket::Medium, 0.0),
            (RiskBucket::High, 0.0),
        ]);
        let portfolio = assemble_portfolio(&composition, &catalog, None).expect("assembles");
        assert_eq!(portfolio.holdings.len(), 2);
        assert!(portfolio.unmatched.is_empty());
    }

    #[test]
    fn explicit_mode_drops_unknown_funds_and_uses_bucket_share() {
        let catalog = sample_catalog();
        let selected = vec![
            "Medium B".to_string(),
            "Not A Fund".to_string(),
            "Bond A".to_string(),
        ];
        let portfolio =
            assemble_portfolio(&balanced(), &catalog, Some(selected.as_slice())).expect("assembles");

        assert_eq!(portfolio.holdings.len(), 2);
        assert_eq!(portfolio.holdings[0].asset.name, "Bond A");
        assert_approx(portfolio.holdings[0].weight, 40.0);
        assert_eq!(portfolio.holdings[1].asset.name, "Medium B");
        assert_approx(portfolio.holdings[1].weight, 20.0);
        assert_eq!(portfolio.unmatched, vec![RiskBucket::Low, RiskBucket::High]);
    }

    #[test]
    fn explicit_mode_keeps_last_pick_for_shared_bucket() {
        let catalog = sample_catalog();
        let selected = vec!["Medium A".to_string(), "Medium B".to_string()];
        let portfolio =
            assemble_portfolio(&balanced(), &catalog, Some(selected.as_slice())).expect("assembles");
        assert_eq!(portfolio.holdings.len(), 1);
        assert_eq!(portfolio.holdings[0].asset.name, "Medium B");
    }

    #[test]
    fn empty_selection_is_an_empty_portfolio() {
        let catalog = sample_catalog();
        let err = assemble_portfolio(&balanced(), &catalog, Some(&[][..])).expect_err("nothing selected");
        assert_eq!(err, EngineError::EmptyPortfolio);
    }

    #[test]
    fn empty_catalog_is_an_empty_portfolio() {
        let catalog = Catalog::new(vec![], vec![]).expect("valid catalog");
        let err = assemble_portfolio(&balanced(), &catalog, None).expect_err("no assets");
        assert_eq!(err, EngineError::EmptyPortfolio);
    }

    #[test]
    fn asset_is_never_used_twice() {
        let catalog = sample_catalog();
        let portfolio = assemble_portfolio(&balanced(), &catalog, None).expect("assembles");
        let unique: HashSet<&str> = portfolio
            .holdings
            .iter()
            .map(|h| h.asset.name.as_str())
            .collect();
        assert_eq!(unique.len(), portfolio.holdings.len());
    }

    #[test]
    fn composition_entries_follow_holdings() {
        let catalog = sample_catalog();
        let portfolio = assemble_portfolio(&balanced(), &catalog, None).expect("assembles");
        let entries = composition_entries(&portfolio);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3].fund_name, "High A");
        assert_eq!(entries[3].bucket, RiskBucket::High);
        assert_approx(entries.iter().map(|e| e.percentage).sum(), 100.0);
    }
}
