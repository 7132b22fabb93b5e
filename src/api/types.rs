//! Shared types for the API layer.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::core_state::CoreState;

// ═══════════════════════════════════════════════════════════
// API context — shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes. Handlers open their own connection.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }

    pub fn open_db(&self) -> Result<rusqlite::Connection, ApiError> {
        Ok(self.core.open_db()?)
    }

    /// Patient-local wall clock for this request.
    pub fn now(&self) -> NaiveDateTime {
        self.core.local_now()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Parse a UUID path segment.
pub fn parse_id(kind: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::BadRequest(format!("Invalid {kind} id: {raw}")))
}

/// Parse an optional `YYYY-MM-DD` query value.
pub fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, crate::models::DATE_FORMAT)
                .map_err(|_| ApiError::BadRequest(format!("Invalid {field}: '{s}' is not YYYY-MM-DD")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("patient", "not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id("patient", &id.to_string()).unwrap(), id);
    }

    #[test]
    fn parse_date_optional() {
        assert_eq!(parse_date("date", None).unwrap(), None);
        assert_eq!(parse_date("date", Some(" ")).unwrap(), None);
        assert_eq!(
            parse_date("date", Some("2025-03-04")).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 4)
        );
        assert!(parse_date("date", Some("04/03/2025")).is_err());
    }
}
