//! Response and request shapes of the REIMS backend.
//!
//! The backend owns these shapes, so every optional field defaults when it is
//! missing. Loosely structured sub-objects stay as [`Value`] here and are
//! narrowed with [`Document::financials`] and [`MarketAnalysis::snapshot`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::query::QueryError;

/// Portfolio-wide KPI aggregates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiSummary {
    pub total_properties: u32,
    pub total_value: f64,
    pub occupancy_rate: f64,
    /// Net operating income.
    pub noi: f64,
    /// Debt service coverage ratio.
    pub dscr: Option<f64>,
    /// Internal rate of return.
    pub irr: Option<f64>,
    pub active_alerts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub occupancy_rate: Option<f64>,
    #[serde(default)]
    pub noi: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    #[serde(default)]
    pub property_id: Option<u64>,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Exit-strategy analysis for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitAnalysis {
    pub property_id: u64,
    #[serde(default)]
    pub scenarios: Vec<ExitScenario>,
    #[serde(default)]
    pub recommended: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitScenario {
    pub strategy: String,
    #[serde(default)]
    pub irr: Option<f64>,
    #[serde(default)]
    pub npv: Option<f64>,
    #[serde(default)]
    pub hold_years: Option<u32>,
    #[serde(default)]
    pub net_proceeds: Option<f64>,
}

impl ExitAnalysis {
    /// The recommended scenario, or the one with the highest IRR.
    pub fn best_scenario(&self) -> Option<&ExitScenario> {
        if let Some(name) = &self.recommended {
            if let Some(found) = self.scenarios.iter().find(|s| &s.strategy == name) {
                return Some(found);
            }
        }
        self.scenarios
            .iter()
            .filter(|s| s.irr.is_some())
            .max_by(|a, b| a.irr.partial_cmp(&b.irr).unwrap_or(std::cmp::Ordering::Equal))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl DocumentStatus {
    /// Whether processing has finished, successfully or not.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub filename: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub property_id: Option<u64>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Extraction output, shaped by whatever model processed the document.
    #[serde(default)]
    pub extracted_data: Value,
}

impl Document {
    /// Narrows `extracted_data` into financial figures.
    ///
    /// Returns `Ok(None)` when nothing has been extracted yet.
    pub fn financials(&self) -> Result<Option<ExtractedFinancials>, QueryError> {
        match &self.extracted_data {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            value => Ok(Some(ExtractedFinancials::deserialize(value)?)),
        }
    }
}

/// A file to upload for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub filename: String,
    pub content: Vec<u8>,
    pub property_id: Option<u64>,
}

impl DocumentUpload {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            property_id: None,
        }
    }

    #[must_use]
    pub const fn for_property(mut self, property_id: u64) -> Self {
        self.property_id = Some(property_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatusReport {
    pub id: u64,
    pub status: DocumentStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Financial figures extracted from a document.
///
/// Extractors emit numbers either as JSON numbers or as formatted strings such
/// as `"$1,250,000"`; both are accepted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedFinancials {
    #[serde(deserialize_with = "lenient_f64")]
    pub gross_revenue: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub operating_expenses: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub noi: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub debt_service: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub occupancy_rate: Option<f64>,
}

impl ExtractedFinancials {
    /// Reported NOI, or revenue minus expenses.
    pub fn noi(&self) -> Option<f64> {
        self.noi
            .or_else(|| Some(self.gross_revenue? - self.operating_expenses?))
    }

    /// NOI over debt service.
    pub fn dscr(&self) -> Option<f64> {
        let debt = self.debt_service.filter(|d| *d > 0.0)?;
        Some(self.noi()? / debt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub location: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub market_data: Value,
}

impl MarketAnalysis {
    /// Narrows `market_data` into the figures the dashboard shows.
    pub fn snapshot(&self) -> Result<MarketSnapshot, QueryError> {
        match &self.market_data {
            Value::Null => Ok(MarketSnapshot::default()),
            value => Ok(MarketSnapshot::deserialize(value)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSnapshot {
    #[serde(deserialize_with = "lenient_f64")]
    pub median_price: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub price_per_sqft: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub vacancy_rate: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub cap_rate: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub rent_growth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_id: Option<u64>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            property_id: None,
        }
    }

    #[must_use]
    pub const fn about(mut self, property_id: u64) -> Self {
        self.property_id = Some(property_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: u64,
    pub summary: String,
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
                .collect();
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("not a number: {s}")))
        }
        Some(other) => Err(serde::de::Error::custom(format!("expected a number, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kpis_tolerate_missing_fields() {
        let kpis: KpiSummary = serde_json::from_value(json!({
            "total_properties": 12,
            "occupancy_rate": 0.94,
            "noi": 1_250_000.0
        }))
        .expect("decode");

        assert_eq!(kpis.total_properties, 12);
        assert_eq!(kpis.dscr, None);
        assert_eq!(kpis.active_alerts, 0);
    }

    #[test]
    fn test_unknown_alert_severity() {
        let alert: Alert = serde_json::from_value(json!({
            "id": 3,
            "severity": "emergency",
            "message": "Roof leak reported"
        }))
        .expect("decode");

        assert_eq!(alert.severity, AlertSeverity::Unknown);
        assert!(!alert.acknowledged);
    }

    #[test]
    fn test_document_financials_narrowing() {
        let doc: Document = serde_json::from_value(json!({
            "id": 7,
            "filename": "rent_roll.pdf",
            "status": "completed",
            "extracted_data": {
                "gross_revenue": "$1,500,000",
                "operating_expenses": 600000,
                "debt_service": "450,000.00",
                "tenant_count": 42
            }
        }))
        .expect("decode");

        let financials = doc.financials().expect("narrow").expect("extracted");
        assert_eq!(financials.gross_revenue, Some(1_500_000.0));
        assert_eq!(financials.noi(), Some(900_000.0));
        assert_eq!(financials.dscr(), Some(2.0));
    }

    #[test]
    fn test_document_without_extraction() {
        let doc: Document = serde_json::from_value(json!({
            "id": 8,
            "filename": "lease.pdf",
            "status": "processing"
        }))
        .expect("decode");

        assert_eq!(doc.financials(), Ok(None));
        assert!(!doc.status.is_terminal());
    }

    #[test]
    fn test_malformed_extraction_is_a_decode_error() {
        let doc = Document {
            id: 9,
            filename: "t12.xlsx".to_string(),
            status: DocumentStatus::Completed,
            property_id: None,
            uploaded_at: None,
            extracted_data: json!({ "noi": ["not", "a", "number"] }),
        };

        assert!(matches!(doc.financials(), Err(QueryError::Decode(_))));
    }

    #[test]
    fn test_market_snapshot() {
        let analysis: MarketAnalysis = serde_json::from_value(json!({
            "location": "Austin, TX",
            "market_data": { "cap_rate": 0.055, "vacancy_rate": "7.5", "comparables": [] }
        }))
        .expect("decode");

        let snapshot = analysis.snapshot().expect("narrow");
        assert_eq!(snapshot.cap_rate, Some(0.055));
        assert_eq!(snapshot.vacancy_rate, Some(7.5));
        assert_eq!(snapshot.median_price, None);
    }

    #[test]
    fn test_best_exit_scenario() {
        let analysis: ExitAnalysis = serde_json::from_value(json!({
            "property_id": 1,
            "scenarios": [
                { "strategy": "hold", "irr": 0.08 },
                { "strategy": "sell", "irr": 0.12 },
                { "strategy": "refinance" }
            ]
        }))
        .expect("decode");
        assert_eq!(analysis.best_scenario().map(|s| s.strategy.as_str()), Some("sell"));

        let recommended = ExitAnalysis {
            recommended: Some("hold".to_string()),
            ..analysis
        };
        assert_eq!(recommended.best_scenario().map(|s| s.strategy.as_str()), Some("hold"));
    }

    #[test]
    fn test_chat_request_omits_missing_property() {
        let body = serde_json::to_value(ChatRequest::new("What is the NOI?")).expect("encode");
        assert_eq!(body, json!({ "message": "What is the NOI?" }));

        let body = serde_json::to_value(ChatRequest::new("Summarize").about(4)).expect("encode");
        assert_eq!(body["property_id"], 4);
    }
}
