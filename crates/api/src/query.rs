//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// `?days_back=` for the analytics endpoint. Clamped to `1..=365`,
/// default 30.
#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    pub days_back: Option<i64>,
}
