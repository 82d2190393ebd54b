use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CoreError;

/// The business case being analyzed: everything the planner and the agents
/// need to know about a prospect. Captured once at trigger time and carried
/// in the checkpoint so a resumed worker replans deterministically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ScanSubject {
    /// Opaque identifier of the CRM case this scan belongs to.
    pub case_id: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u32>,
    /// Free-form budget indication from the sales rep, e.g. "10-50k".
    /// When absent the pipeline pauses to ask for one before estimating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_hint: Option<String>,
}

impl ScanSubject {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.case_id.trim().is_empty() {
            return Err(CoreError::Validation("case_id must not be empty".into()));
        }
        if self.company_name.trim().is_empty() {
            return Err(CoreError::Validation(
                "company_name must not be empty".into(),
            ));
        }
        if let Some(url) = &self.website_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CoreError::Validation(format!(
                    "website_url must be an http(s) URL, got: {url}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ScanSubject {
        ScanSubject {
            case_id: "case-1".to_string(),
            company_name: "Acme".to_string(),
            website_url: Some("https://acme.example".to_string()),
            industry: None,
            employee_count: None,
            budget_hint: None,
        }
    }

    #[test]
    fn test_valid_subject() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_empty_case_id_rejected() {
        let mut s = valid();
        s.case_id = "  ".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_empty_company_rejected() {
        let mut s = valid();
        s.company_name = String::new();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_bad_url_rejected() {
        let mut s = valid();
        s.website_url = Some("ftp://acme.example".to_string());
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_missing_optionals_deserialize() {
        let s: ScanSubject =
            serde_json::from_str(r#"{"case_id":"c","company_name":"Acme"}"#).unwrap();
        assert!(s.website_url.is_none());
        assert!(s.budget_hint.is_none());
    }
}
