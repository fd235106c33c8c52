//! # Search Criteria Module
//!
//! ## Purpose
//! Parses the URL-encoded key/value strings submitted by the search form
//! (and persisted verbatim on alerts) into a validated, typed `CleanData`
//! record the query compiler consumes.
//!
//! ## Input/Output Specification
//! - **Input**: URL-encoded query strings (`type=oa&q=Smith&court=scotus`)
//! - **Output**: `CleanData` with typed, defaulted fields, or a validation error
//! - **Round-trip**: `CleanData::to_query_string` re-parses to an equal record
//!
//! ## Key Features
//! - Unknown keys are ignored; invalid type codes and dates reject the record
//! - Date fields accept ISO (`2020-01-05`) and US (`01/05/2020`) formats
//! - Multi-court selection via whitespace-separated court identifiers

use crate::errors::{Result, SearchError};
use crate::query::filters::RangeRelation;
use crate::{Rate, SearchType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An open key→value mapping parsed from a URL-encoded search string.
/// Order and repeated keys are preserved so the serialized form round-trips.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pairs: Vec<(String, String)>,
}

impl SearchCriteria {
    /// Parse a URL-encoded query string. Parsing itself never fails; bad
    /// values surface later during validation.
    pub fn parse(raw: &str) -> Self {
        let pairs = form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// Last value for a key, mirroring how web frameworks resolve repeats.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// A copy of these criteria without the given key. Used to strip
    /// `order_by` before compiling percolator queries.
    pub fn without(&self, key: &str) -> Self {
        Self {
            pairs: self
                .pairs
                .iter()
                .filter(|(k, _)| k != key)
                .cloned()
                .collect(),
        }
    }

    /// Serialize back to the URL-encoded wire format.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.pairs {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }

    /// Read only the search type out of a raw query string, defaulting to
    /// opinions. Alerts derive their document type this way on save.
    pub fn peek_search_type(raw: &str) -> SearchType {
        Self::parse(raw)
            .get("type")
            .and_then(SearchType::from_code)
            .unwrap_or(SearchType::Opinion)
    }

    /// Validate and project into a typed `CleanData` record. Every absent
    /// field is defaulted; invalid enum codes or dates reject the record.
    pub fn validate(&self) -> Result<CleanData> {
        let search_type = match self.get("type") {
            None | Some("") => SearchType::Opinion,
            Some(code) => SearchType::from_code(code).ok_or_else(|| {
                SearchError::ValidationFailed {
                    field: "type".to_string(),
                    reason: format!("Unknown search type '{}'", code),
                }
            })?,
        };

        let relation = match self.get("relation") {
            None | Some("") => None,
            Some(value) => Some(RangeRelation::from_code(value)?),
        };

        Ok(CleanData {
            search_type,
            q: self.get("q").unwrap_or_default().to_string(),
            order_by: self.get("order_by").unwrap_or_default().to_string(),
            court: self
                .get("court")
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            judge: self.get("judge").unwrap_or_default().to_string(),
            case_name: self.get("case_name").unwrap_or_default().to_string(),
            docket_number: self.get("docket_number").unwrap_or_default().to_string(),
            filed_after: parse_date_field(self.get("filed_after"), "filed_after")?,
            filed_before: parse_date_field(self.get("filed_before"), "filed_before")?,
            argued_after: parse_date_field(self.get("argued_after"), "argued_after")?,
            argued_before: parse_date_field(self.get("argued_before"), "argued_before")?,
            born_after: parse_date_field(self.get("born_after"), "born_after")?,
            born_before: parse_date_field(self.get("born_before"), "born_before")?,
            relation,
        })
    }
}

fn parse_date_field(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>> {
    let value = match value {
        None => return Ok(None),
        Some(v) if v.trim().is_empty() => return Ok(None),
        Some(v) => v.trim(),
    };

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .map(Some)
        .map_err(|_| SearchError::ValidationFailed {
            field: field.to_string(),
            reason: format!("'{}' is not a valid date", value),
        })
}

/// The validated, typed projection of `SearchCriteria`. Fields irrelevant
/// to the selected search type are carried but ignored by the compiler,
/// matching how the search form treats its blended field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanData {
    pub search_type: SearchType,
    pub q: String,
    pub order_by: String,
    pub court: Vec<String>,
    pub judge: String,
    pub case_name: String,
    pub docket_number: String,
    pub filed_after: Option<NaiveDate>,
    pub filed_before: Option<NaiveDate>,
    pub argued_after: Option<NaiveDate>,
    pub argued_before: Option<NaiveDate>,
    pub born_after: Option<NaiveDate>,
    pub born_before: Option<NaiveDate>,
    pub relation: Option<RangeRelation>,
}

impl CleanData {
    /// True when neither a text query nor any filter is present, in which
    /// case the compiled query matches everything.
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
            && self.court.is_empty()
            && self.judge.is_empty()
            && self.case_name.is_empty()
            && self.docket_number.is_empty()
            && self.filed_after.is_none()
            && self.filed_before.is_none()
            && self.argued_after.is_none()
            && self.argued_before.is_none()
            && self.born_after.is_none()
            && self.born_before.is_none()
    }

    /// Serialize back to the URL-encoded wire format. Defaulted fields are
    /// omitted so re-parsing through `validate` yields an equal record.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.append_pair("type", self.search_type.as_code());
        if !self.q.is_empty() {
            serializer.append_pair("q", &self.q);
        }
        if !self.order_by.is_empty() {
            serializer.append_pair("order_by", &self.order_by);
        }
        if !self.court.is_empty() {
            serializer.append_pair("court", &self.court.join(" "));
        }
        for (key, value) in [
            ("judge", &self.judge),
            ("case_name", &self.case_name),
            ("docket_number", &self.docket_number),
        ] {
            if !value.is_empty() {
                serializer.append_pair(key, value);
            }
        }
        for (key, value) in [
            ("filed_after", self.filed_after),
            ("filed_before", self.filed_before),
            ("argued_after", self.argued_after),
            ("argued_before", self.argued_before),
            ("born_after", self.born_after),
            ("born_before", self.born_before),
        ] {
            if let Some(date) = value {
                serializer.append_pair(key, &date.format("%Y-%m-%d").to_string());
            }
        }
        if let Some(relation) = self.relation {
            serializer.append_pair("relation", relation.as_code());
        }
        serializer.finish()
    }
}

/// Parameters accepted when creating or updating an alert over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRequest {
    pub user_id: crate::UserId,
    pub user_email: String,
    pub name: String,
    pub query: String,
    pub rate: Rate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_fields() {
        let criteria =
            SearchCriteria::parse("type=oa&q=Smith&court=scotus%20ca9&argued_after=2020-01-05");
        let clean = criteria.validate().unwrap();
        assert_eq!(clean.search_type, SearchType::OralArgument);
        assert_eq!(clean.q, "Smith");
        assert_eq!(clean.court, vec!["scotus".to_string(), "ca9".to_string()]);
        assert_eq!(
            clean.argued_after,
            Some(NaiveDate::from_ymd_opt(2020, 1, 5).unwrap())
        );
    }

    #[test]
    fn missing_type_defaults_to_opinions() {
        let clean = SearchCriteria::parse("q=habeas").validate().unwrap();
        assert_eq!(clean.search_type, SearchType::Opinion);
    }

    #[test]
    fn rejects_unknown_type_code() {
        let err = SearchCriteria::parse("type=zz").validate().unwrap_err();
        assert!(matches!(err, SearchError::ValidationFailed { .. }));
    }

    #[test]
    fn rejects_malformed_dates() {
        let err = SearchCriteria::parse("filed_after=not-a-date")
            .validate()
            .unwrap_err();
        assert!(matches!(err, SearchError::ValidationFailed { .. }));
    }

    #[test]
    fn accepts_us_date_format() {
        let clean = SearchCriteria::parse("filed_after=01%2F05%2F2020")
            .validate()
            .unwrap();
        assert_eq!(
            clean.filed_after,
            Some(NaiveDate::from_ymd_opt(2020, 1, 5).unwrap())
        );
    }

    #[test]
    fn clean_data_round_trips_through_query_string() {
        let raw = "type=oa&q=Smith+v.+Jones&order_by=dateArgued+desc&court=scotus+ca9\
                   &judge=Ginsburg&docket_number=21-123&argued_after=2020-01-05\
                   &argued_before=2020-01-10";
        let clean = SearchCriteria::parse(raw).validate().unwrap();
        let reparsed = SearchCriteria::parse(&clean.to_query_string())
            .validate()
            .unwrap();
        assert_eq!(clean, reparsed);
    }

    #[test]
    fn without_strips_a_key() {
        let criteria = SearchCriteria::parse("type=oa&q=Smith&order_by=score+desc");
        let stripped = criteria.without("order_by");
        assert_eq!(stripped.get("order_by"), None);
        assert_eq!(stripped.get("q"), Some("Smith"));
    }

    #[test]
    fn peek_search_type_reads_raw_strings() {
        assert_eq!(
            SearchCriteria::peek_search_type("type=oa&q=Smith"),
            SearchType::OralArgument
        );
        assert_eq!(
            SearchCriteria::peek_search_type("q=Smith"),
            SearchType::Opinion
        );
    }
}
