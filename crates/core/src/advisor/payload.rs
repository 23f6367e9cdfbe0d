use crate::advisor::error::AdvisorError;
use crate::advisor::frames::{self, StreamOutcome};
use crate::advisor::{JobStatus, Progress};
use crate::domain::recommendation::{
    format_amount, FundPick, FundRecommendations, RecommendationResult, StockPick,
    StockRecommendations,
};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

const SUCCESS_STATUS: &str = "success";

/// Turns a raw status-endpoint body into a [`JobStatus`].
pub fn status_from_body(body: &str) -> Result<JobStatus, AdvisorError> {
    match frames::read_stream(body)? {
        StreamOutcome::Pending => Ok(JobStatus::Processing(Progress::Queued)),
        StreamOutcome::Errored(reason) => Ok(JobStatus::Failed(reason)),
        StreamOutcome::Payload(payload) => decode_payload(payload),
    }
}

/// Only entry 0 of the payload array is inspected. Anything short of a
/// `success` status there means the job is still running.
pub fn decode_payload(payload: Value) -> Result<JobStatus, AdvisorError> {
    let Value::Array(entries) = payload else {
        return Ok(JobStatus::Processing(Progress::Generating));
    };
    let Some(Value::Object(mut first)) = entries.into_iter().next() else {
        return Ok(JobStatus::Processing(Progress::Generating));
    };

    if first.get("status").and_then(Value::as_str) != Some(SUCCESS_STATUS) {
        return Ok(JobStatus::Processing(Progress::Generating));
    }

    let data = first
        .remove("data")
        .ok_or_else(|| AdvisorError::poll("payload", "success payload has no data"))?;
    let data = serde_json::from_value::<ModelOutput>(data)
        .map_err(|e| AdvisorError::poll("payload", format!("unexpected success payload: {e}")))?;

    Ok(JobStatus::Completed(data.into_result()))
}

#[derive(Debug, Deserialize)]
struct ModelOutput {
    #[serde(rename = "Predicted Stock Category")]
    stock_category: String,
    #[serde(rename = "Predicted MF Category")]
    fund_category: String,
    #[serde(rename = "Recommended Stocks")]
    stocks: OrderedAmounts,
    #[serde(rename = "Recommended Mutual Funds")]
    funds: OrderedAmounts,
}

impl ModelOutput {
    fn into_result(self) -> RecommendationResult {
        RecommendationResult {
            stocks: StockRecommendations {
                category: self.stock_category,
                recommendations: self
                    .stocks
                    .0
                    .into_iter()
                    .map(|(name, price)| StockPick {
                        name,
                        price: format_amount(price),
                    })
                    .collect(),
            },
            mutual_funds: FundRecommendations {
                category: self.fund_category,
                recommendations: self
                    .funds
                    .0
                    .into_iter()
                    .map(|(name, nav)| FundPick {
                        name,
                        nav: format_amount(nav),
                    })
                    .collect(),
            },
        }
    }
}

/// A JSON object of `name -> number`, kept in document order.
#[derive(Debug, Default)]
struct OrderedAmounts(Vec<(String, f64)>);

impl<'de> Deserialize<'de> for OrderedAmounts {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AmountsVisitor;

        impl<'de> Visitor<'de> for AmountsVisitor {
            type Value = OrderedAmounts;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of names to numbers")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, amount)) = map.next_entry::<String, f64>()? {
                    out.push((name, amount));
                }
                Ok(OrderedAmounts(out))
            }
        }

        deserializer.deserialize_map(AmountsVisitor)
    }
}
