//! Filter clause builders: small pure functions producing engine filter
//! clauses, each a no-op on empty input so callers can extend a filter
//! list unconditionally.

use crate::errors::{Result, SearchError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How a range filter matches against range-typed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RangeRelation {
    Intersects,
    Contains,
    Within,
}

impl RangeRelation {
    pub fn as_code(&self) -> &'static str {
        match self {
            RangeRelation::Intersects => "INTERSECTS",
            RangeRelation::Contains => "CONTAINS",
            RangeRelation::Within => "WITHIN",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "INTERSECTS" => Ok(RangeRelation::Intersects),
            "CONTAINS" => Ok(RangeRelation::Contains),
            "WITHIN" => Ok(RangeRelation::Within),
            other => Err(SearchError::ValidationFailed {
                field: "relation".to_string(),
                reason: format!("'{}' is not an allowed relation", other),
            }),
        }
    }
}

/// Exact-match clause over one field. No-op for empty values.
pub fn build_term_filter(field: &str, value: &str) -> Vec<Value> {
    if value.is_empty() {
        return vec![];
    }
    vec![json!({ "term": { field: value } })]
}

/// Exact-match-any clause over a list of values. Falsy entries are removed
/// first; an empty result is a no-op.
pub fn build_terms_filter(field: &str, values: &[String]) -> Vec<Value> {
    let values: Vec<&String> = values.iter().filter(|v| !v.is_empty()).collect();
    if values.is_empty() {
        return vec![];
    }
    vec![json!({ "terms": { field: values } })]
}

/// Phrase clause over one field requiring terms in order, with a slop
/// allowance. Used for docket numbers so `1:21-bk-1234` still matches
/// its `21-bk-1234` spelling.
pub fn build_phrase_filter(field: &str, value: &str, slop: u32) -> Vec<Value> {
    if value.is_empty() {
        return vec![];
    }
    vec![json!({ "match_phrase": { field: { "query": value, "slop": slop } } })]
}

/// Free-text filter over one field with AND semantics between terms.
/// The value passes the shared query-syntax checks first.
pub fn build_text_filter(field: &str, value: &str) -> Result<Vec<Value>> {
    if value.is_empty() {
        return Ok(vec![]);
    }
    super::fulltext::validate_query_syntax(value)?;
    Ok(vec![json!({
        "query_string": {
            "query": value,
            "fields": [field],
            "default_operator": "AND",
        }
    })])
}

/// Inclusive date-range clause. `after` lower-bounds at local midnight and
/// `before` upper-bounds at 23:59:59 of that day. No-op when neither bound
/// is supplied.
pub fn build_daterange_filter(
    field: &str,
    before: Option<NaiveDate>,
    after: Option<NaiveDate>,
    relation: Option<RangeRelation>,
) -> Vec<Value> {
    if before.is_none() && after.is_none() {
        return vec![];
    }

    let mut params = serde_json::Map::new();
    if let Some(after) = after {
        params.insert(
            "gte".to_string(),
            json!(format!("{}T00:00:00Z", after.format("%Y-%m-%d"))),
        );
    }
    if let Some(before) = before {
        params.insert(
            "lte".to_string(),
            json!(format!("{}T23:59:59Z", before.format("%Y-%m-%d"))),
        );
    }
    if let Some(relation) = relation {
        params.insert("relation".to_string(), json!(relation.as_code()));
    }

    vec![json!({ "range": { field: Value::Object(params) } })]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_values_yield_no_clause() {
        assert!(build_term_filter("court_id", "").is_empty());
        assert!(build_terms_filter("court_id", &[]).is_empty());
        assert!(build_terms_filter("court_id", &["".to_string()]).is_empty());
        assert!(build_phrase_filter("docketNumber", "", 1).is_empty());
        assert!(build_text_filter("judge", "").unwrap().is_empty());
        assert!(build_daterange_filter("dateFiled", None, None, None).is_empty());
    }

    #[test]
    fn terms_filter_drops_falsy_entries() {
        let clauses = build_terms_filter(
            "court_id",
            &["scotus".to_string(), "".to_string(), "ca9".to_string()],
        );
        assert_eq!(
            clauses,
            vec![serde_json::json!({ "terms": { "court_id": ["scotus", "ca9"] } })]
        );
    }

    #[test]
    fn daterange_bounds_cover_whole_days() {
        let clauses = build_daterange_filter(
            "dateFiled",
            Some(date(2020, 1, 10)),
            Some(date(2020, 1, 5)),
            None,
        );
        assert_eq!(
            clauses,
            vec![serde_json::json!({
                "range": {
                    "dateFiled": {
                        "gte": "2020-01-05T00:00:00Z",
                        "lte": "2020-01-10T23:59:59Z",
                    }
                }
            })]
        );
    }

    #[test]
    fn daterange_accepts_single_bound() {
        let clauses = build_daterange_filter("dateArgued", None, Some(date(2021, 6, 1)), None);
        assert_eq!(clauses.len(), 1);
        assert_eq!(
            clauses[0]["range"]["dateArgued"]["gte"],
            "2021-06-01T00:00:00Z"
        );
        assert!(clauses[0]["range"]["dateArgued"].get("lte").is_none());
    }

    #[test]
    fn daterange_carries_relation() {
        let clauses = build_daterange_filter(
            "dateRange",
            Some(date(2020, 1, 10)),
            None,
            Some(RangeRelation::Within),
        );
        assert_eq!(clauses[0]["range"]["dateRange"]["relation"], "WITHIN");
    }

    #[test]
    fn invalid_relation_codes_are_rejected() {
        assert!(RangeRelation::from_code("OVERLAPS").is_err());
        assert_eq!(
            RangeRelation::from_code("CONTAINS").unwrap(),
            RangeRelation::Contains
        );
    }
}
