//! Stock research actions simulating revenue-growth lookups from different
//! sources. The return values are canned; replace them with real
//! integrations (finance API, SQL, document retrieval) as needed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::action::{Action, ActionOutput};
use crate::engine::types::ActionDefinition;
use crate::error::Error;

fn ticker_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "ticker": {
                "type": "string",
                "description": "Stock ticker symbol, e.g. TATAMOTORS.NS"
            }
        },
        "required": ["ticker"]
    })
}

fn ticker_from(input: &Value) -> Result<&str, ActionOutput> {
    match input.get("ticker").and_then(Value::as_str) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(ActionOutput::error(
            "missing required string field: ticker",
        )),
    }
}

/// Fetch revenue growth from Yahoo Finance for the given ticker.
pub struct YahooFinanceRevenueGrowth;

impl Action for YahooFinanceRevenueGrowth {
    fn definition(&self) -> ActionDefinition {
        ActionDefinition {
            name: "yahoo_finance_revenue_growth".into(),
            description: "Fetch revenue growth from Yahoo Finance for the given ticker.".into(),
            input_schema: ticker_schema(),
        }
    }

    fn execute(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutput, Error>> + Send + '_>> {
        Box::pin(async move {
            let ticker = match ticker_from(&input) {
                Ok(t) => t,
                Err(out) => return Ok(out),
            };
            Ok(ActionOutput::success(format!(
                "Internal DB (simulated): Revenue growth for {ticker} is +11.5% YoY."
            )))
        })
    }
}

/// Fetch revenue growth from the internal financial warehouse.
pub struct InternalDbRevenueGrowth;

impl Action for InternalDbRevenueGrowth {
    fn definition(&self) -> ActionDefinition {
        ActionDefinition {
            name: "internal_db_revenue_growth".into(),
            description: "Fetch revenue growth from the internal financial warehouse.".into(),
            input_schema: ticker_schema(),
        }
    }

    fn execute(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutput, Error>> + Send + '_>> {
        Box::pin(async move {
            let ticker = match ticker_from(&input) {
                Ok(t) => t,
                Err(out) => return Ok(out),
            };
            // Replace with real SQL/warehouse logic.
            Ok(ActionOutput::success(format!(
                "Internal DB (simulated): Revenue growth for {ticker} is +9.8% YoY."
            )))
        })
    }
}

/// Summarize revenue growth from the latest analyst PDF.
pub struct AnalystPdfRevenueGrowth;

impl Action for AnalystPdfRevenueGrowth {
    fn definition(&self) -> ActionDefinition {
        ActionDefinition {
            name: "analyst_pdf_revenue_growth".into(),
            description: "Summarize revenue growth from the latest analyst PDF.".into(),
            input_schema: ticker_schema(),
        }
    }

    fn execute(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutput, Error>> + Send + '_>> {
        Box::pin(async move {
            if let Err(out) = ticker_from(&input) {
                return Ok(out);
            }
            // Replace with document parsing / retrieval over analyst reports.
            Ok(ActionOutput::success(
                "Analyst PDF (simulated): Consensus notes Tata Motors revenue growth at +10.5% YoY.\n\
                 Commentary: demand recovery, margin expansion from product mix.",
            ))
        })
    }
}

/// All research actions, in registration order.
pub fn research_actions() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(YahooFinanceRevenueGrowth),
        Arc::new(InternalDbRevenueGrowth),
        Arc::new(AnalystPdfRevenueGrowth),
    ]
}

/// Return a cached/static value when a live Yahoo Finance fetch fails.
///
/// Minimal offline cache; extend as needed. The degraded path for a future
/// live integration of [`YahooFinanceRevenueGrowth`].
pub fn fallback_revenue_growth(ticker: &str, reason: &str) -> String {
    let cached = match ticker.to_uppercase().as_str() {
        "TATAMOTORS.NS" => Some("+10.5% YoY (cached sample)"),
        "TCS.NS" => Some("+7.9% YoY (cached sample)"),
        "RELIANCE.NS" => Some("+6.1% YoY (cached sample)"),
        _ => None,
    };
    match cached {
        Some(val) => format!("Fallback revenue growth for {ticker}: {val}. (Reason: {reason})"),
        None => format!(
            "Could not fetch Yahoo Finance revenue for {ticker}. Reason: {reason}. \
             Add a cached value to the offline cache or wire a live integration."
        ),
    }
}
