use crate::advisor::error::AdvisorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "Conservative",
            Self::Moderate => "Moderate",
            Self::Aggressive => "Aggressive",
        }
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTolerance {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "conservative" => Ok(Self::Conservative),
            "moderate" => Ok(Self::Moderate),
            "aggressive" => Ok(Self::Aggressive),
            _ => Err(AdvisorError::InvalidPreference(format!(
                "unknown risk tolerance: {s:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "Short-term")]
    ShortTerm,
    #[serde(rename = "Medium-term")]
    MediumTerm,
    #[serde(rename = "Long-term")]
    LongTerm,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "Short-term",
            Self::MediumTerm => "Medium-term",
            Self::LongTerm => "Long-term",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Horizon {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "shortterm" => Ok(Self::ShortTerm),
            "mediumterm" => Ok(Self::MediumTerm),
            "longterm" => Ok(Self::LongTerm),
            _ => Err(AdvisorError::InvalidPreference(format!(
                "unknown investment horizon: {s:?}"
            ))),
        }
    }
}

// "Short-term", "short term" and "shortterm" all collapse to "shortterm".
fn normalize_label(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Preferences for one recommendation request. Fields are private so every
/// instance has passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceInput {
    risk_tolerance: RiskTolerance,
    horizon: Horizon,
    amount: f64,
}

impl PreferenceInput {
    pub fn new(
        risk_tolerance: RiskTolerance,
        horizon: Horizon,
        amount: f64,
    ) -> Result<Self, AdvisorError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AdvisorError::InvalidPreference(format!(
                "investment amount must be a positive number (got {amount})"
            )));
        }

        Ok(Self {
            risk_tolerance,
            horizon,
            amount,
        })
    }

    /// Builds an input from free-form form fields.
    pub fn parse(risk: &str, horizon: &str, amount: &str) -> Result<Self, AdvisorError> {
        let amount = amount.trim().parse::<f64>().map_err(|_| {
            AdvisorError::InvalidPreference(format!("investment amount is not a number: {amount:?}"))
        })?;
        Self::new(risk.parse()?, horizon.parse()?, amount)
    }

    pub fn risk_tolerance(&self) -> RiskTolerance {
        self.risk_tolerance
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// The submission body: `{"data": [risk, horizon, amount]}`.
    pub fn to_submission_body(&self) -> serde_json::Value {
        serde_json::json!({
            "data": [self.risk_tolerance.as_str(), self.horizon.as_str(), self.amount],
        })
    }
}
