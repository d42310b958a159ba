use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use super::types::{BandWidth, ForecastSeries};

const PATHS_PER_CHUNK: usize = 512;

#[derive(Debug, Clone, Copy)]
pub struct ForecastInputs {
    pub initial_amount: f64,
    pub months: u32,
    pub annual_return_percent: f64,
    pub annual_volatility_percent: f64,
    pub monthly_contribution: f64,
    pub band: BandWidth,
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationSettings {
    pub simulations: u32,
    pub seed: u64,
}

pub fn monthly_rate(annual_return_percent: f64) -> f64 {
    (1.0 + annual_return_percent / 100.0).powf(1.0 / 12.0) - 1.0
}

pub fn monthly_volatility(annual_volatility_percent: f64) -> f64 {
    (annual_volatility_percent / 100.0) / 12.0_f64.sqrt()
}

/// Simulates `settings.simulations` independent capital paths month by month.
///
/// Each month the contribution (possibly zero) is added before that month's
/// return `m + z * sigma_m` is applied, with one standard normal draw `z` per
/// path. Capital is not floored at zero. Month 0 is the initial amount on every
/// band.
pub fn run_forecast(inputs: &ForecastInputs, settings: SimulationSettings) -> ForecastSeries {
    let months = inputs.months as usize;
    let paths = settings.simulations.max(1) as usize;
    let (lower_pct, upper_pct) = inputs.band.percentiles();
    let m = monthly_rate(inputs.annual_return_percent);
    let sigma_m = monthly_volatility(inputs.annual_volatility_percent);
    let contribution = inputs.monthly_contribution;

    let mut labels = Vec::with_capacity(months + 1);
    let mut avg = Vec::with_capacity(months + 1);
    let mut min = Vec::with_capacity(months + 1);
    let mut max = Vec::with_capacity(months + 1);
    labels.push(0);
    avg.push(inputs.initial_amount);
    min.push(inputs.initial_amount);
    max.push(inputs.initial_amount);

    let mut capital = vec![inputs.initial_amount; paths];
    let mut rngs: Vec<StdRng> = (0..paths.div_ceil(PATHS_PER_CHUNK))
        .map(|chunk| StdRng::seed_from_u64(derive_seed(settings.seed, chunk as u64)))
        .collect();
    let mut sorted = Vec::with_capacity(paths);

    for month in 1..=months {
        capital
            .par_chunks_mut(PATHS_PER_CHUNK)
            .zip(rngs.par_iter_mut())
            .for_each(|(chunk, rng)| {
                for value in chunk.iter_mut() {
                    let shock: f64 = StandardNormal.sample(rng);
                    let realized = m + shock * sigma_m;
                    *value = (*value + contribution) * (1.0 + realized);
                }
            });

        sorted.clear();
        sorted.extend_from_slice(&capital);
        sorted.sort_by(|a, b| a.total_cmp(b));

        labels.push(month as u32);
        avg.push(mean(&capital));
        min.push(percentile_sorted(&sorted, lower_pct));
        max.push(percentile_sorted(&sorted, upper_pct));
    }

    ForecastSeries {
        labels,
        avg,
        min,
        max,
    }
}

pub fn derive_seed(base_seed: u64, stream: u64) -> u64 {
    splitmix64(base_seed ^ stream.rotate_left(32))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linear interpolation between closest ranks of an ascending slice.
fn percentile_sorted(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
