use serde::{Deserialize, Serialize};

/// Caller-facing recommendation payload, serialized in the shape the dashboard
/// renders: `{"stocks": {...}, "mutualFunds": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub stocks: StockRecommendations,
    #[serde(rename = "mutualFunds")]
    pub mutual_funds: FundRecommendations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecommendations {
    pub category: String,
    pub recommendations: Vec<StockPick>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPick {
    pub name: String,
    /// Two-decimal display string, e.g. `"3500.50"`.
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundRecommendations {
    pub category: String,
    pub recommendations: Vec<FundPick>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundPick {
    pub name: String,
    pub nav: String,
}

/// Two-decimal rendering. Exact midpoints round away from zero, matching
/// JavaScript's `toFixed(2)`; `{:.2}` alone would round them to even.
pub fn format_amount(value: f64) -> String {
    // A binary double sits exactly on a hundredths midpoint only when it is an
    // odd number of eighths.
    let eighths = value * 8.0;
    let is_midpoint = eighths.fract() == 0.0
        && eighths.rem_euclid(2.0) == 1.0
        && eighths.abs() < MAX_EXACT_EIGHTHS;
    if !is_midpoint {
        return format!("{value:.2}");
    }

    let hundredths = (value.abs() * 100.0 + 0.5) as u64;
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{}.{:02}", hundredths / 100, hundredths % 100)
}

const MAX_EXACT_EIGHTHS: f64 = (1u64 << 49) as f64;
