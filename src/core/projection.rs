/// Fixed-rate deposit with monthly capitalization. Contributions land at the
/// start of each month, before that month's interest.
pub fn deposit_forecast(
    initial_amount: f64,
    months: u32,
    monthly_contribution: f64,
    annual_rate_percent: f64,
) -> Vec<f64> {
    let monthly_rate = annual_rate_percent / 100.0 / 12.0;
    let mut capital = initial_amount;
    let mut series = Vec::with_capacity(months as usize + 1);
    series.push(capital);
    for _ in 0..months {
        capital += monthly_contribution;
        capital += capital * monthly_rate;
        series.push(capital);
    }
    series
}

/// Monthly income a capital series could sustain at a fixed annual withdrawal rate.
pub fn monthly_income_forecast(capital: &[f64], annual_rate_percent: f64) -> Vec<f64> {
    let rate = annual_rate_percent / 100.0;
    capital.iter().map(|c| c * rate / 12.0).collect()
}

/// Capital needed to fund `monthly_income` at the withdrawal rate.
pub fn target_capital(monthly_income: f64, annual_rate_percent: f64) -> f64 {
    if annual_rate_percent <= 0.0 {
        return 0.0;
    }
    monthly_income * 12.0 / (annual_rate_percent / 100.0)
}
