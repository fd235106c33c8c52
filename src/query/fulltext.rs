//! Full-text clause construction: query-grammar validation, advanced-syntax
//! escaping, implicit conjunctions and the per-type field boost tables.

use crate::errors::{Result, SearchError};
use crate::SearchType;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Field boost tables, one per document type. Statically enumerated so the
/// compiled query shape is known at build time rather than reflected from
/// the index schema.
fn boosted_query_fields(search_type: SearchType) -> &'static [(&'static str, f64)] {
    match search_type {
        SearchType::Opinion => &[
            ("caseName", 4.0),
            ("docketNumber", 3.0),
            ("judge", 2.0),
            ("court", 1.5),
            ("citation", 2.0),
            ("text", 1.0),
        ],
        SearchType::OralArgument => &[
            ("caseName", 4.0),
            ("docketNumber", 3.0),
            ("judge", 2.0),
            ("court", 1.5),
            ("text", 1.0),
        ],
        SearchType::Recap => &[
            ("caseName", 4.0),
            ("docketNumber", 3.0),
            ("description", 2.0),
            ("suitNature", 1.0),
            ("text", 1.0),
        ],
        SearchType::People => &[
            ("name", 4.0),
            ("court", 1.5),
            ("school", 1.0),
            ("text", 1.0),
        ],
    }
}

/// Render the boost table as `field^boost` entries, adding a heavy exact
/// case-name boost when the query obviously names a case.
pub fn boost_list(search_type: SearchType, case_name_query: bool) -> Vec<String> {
    let mut fields: Vec<String> = boosted_query_fields(search_type)
        .iter()
        .map(|(field, boost)| format!("{}^{}", field, boost))
        .collect();
    if case_name_query {
        fields.push("caseName.exact^75".to_string());
    }
    fields
}

/// Determines if the given query value is likely a case name query.
pub fn is_case_name_query(query_value: &str) -> bool {
    let versus = [" v ", " v. ", " vs. ", " vs "]
        .iter()
        .any(|token| query_value.contains(token));
    let lower = query_value.to_lowercase();
    versus
        || lower.starts_with("in re ")
        || lower.starts_with("matter of ")
        || lower.starts_with("ex parte ")
}

fn count_unescaped(value: &str, needle: char) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == needle {
            count += 1;
        }
    }
    count
}

/// True when opening and closing parentheses do not pair up.
pub fn check_unbalanced_parentheses(value: &str) -> bool {
    count_unescaped(value, '(') != count_unescaped(value, ')')
}

/// True when the query contains an odd number of quote characters.
pub fn check_unbalanced_quotes(value: &str) -> bool {
    count_unescaped(value, '"') % 2 != 0
}

/// True when the query uses Westlaw/Lexis proximity connectors (`w/5`,
/// `/s`, `/p`) that the engine grammar has no equivalent for.
pub fn check_proximity_tokens(value: &str) -> bool {
    static PROXIMITY_RE: OnceLock<Regex> = OnceLock::new();
    let re = PROXIMITY_RE.get_or_init(|| {
        Regex::new(r"(?i)(^|\s)(w/\d+|w/s|w/p|/s|/p)(\s|$)").expect("static regex")
    });
    re.is_match(value)
}

/// Validate the grammar of a query string, raising the matching syntax
/// error kind for unbalanced parentheses, unbalanced quotes, or
/// unsupported proximity tokens.
pub fn validate_query_syntax(value: &str) -> Result<()> {
    if check_unbalanced_parentheses(value) {
        return Err(SearchError::UnbalancedParentheses {
            query: value.to_string(),
        });
    }
    if check_unbalanced_quotes(value) {
        return Err(SearchError::UnbalancedQuotes {
            query: value.to_string(),
        });
    }
    if check_proximity_tokens(value) {
        return Err(SearchError::BadProximityQuery {
            query: value.to_string(),
        });
    }
    Ok(())
}

/// The colon separates field name and value in the query grammar, so any
/// colon inside a `docketNumber:` value (`1:21-bk-1234`) must be escaped
/// before the value is embedded in the compiled query.
pub fn escape_docket_number_colons(value: &str) -> String {
    static DOCKET_FIELD_RE: OnceLock<Regex> = OnceLock::new();
    let re = DOCKET_FIELD_RE
        .get_or_init(|| Regex::new(r"docketNumber:([^ ]+)").expect("static regex"));
    re.replace_all(value, |caps: &regex::Captures| {
        format!("docketNumber:{}", caps[1].replace(':', r"\:"))
    })
    .into_owned()
}

/// NFC-normalize and collapse runs of whitespace.
pub fn normalize_query(value: &str) -> String {
    let normalized: String = value.nfc().collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Append implicit `AND` conjunctions between bare terms so each term must
/// match across the searched fields. Terms inside groups or quotes, and
/// terms adjacent to explicit operators, are left alone.
pub fn append_query_conjunctions(query: &str) -> String {
    let mut clean_q: Vec<String> = Vec::new();
    let mut inside_group: i32 = 0;
    let mut quotation = false;
    let mut logic_operand = false;

    for word in query.split_whitespace() {
        let upper = word.to_uppercase();
        let binary_operator = upper == "AND" || upper == "OR";
        let should_add_conjunction = !clean_q.is_empty()
            && inside_group == 0
            && !logic_operand
            && !quotation
            && !binary_operator;

        let opening = word.chars().filter(|c| *c == '(' || *c == '[').count() as i32;
        let closing = word.chars().filter(|c| *c == ')' || *c == ']').count() as i32;
        if opening > 0 {
            inside_group += opening;
        } else if closing > 0 {
            inside_group -= closing;
        } else if word.contains('"') {
            quotation = !quotation;
        }

        if should_add_conjunction {
            clean_q.push("AND".to_string());
        }
        clean_q.push(word.to_string());

        logic_operand = upper == "AND" || upper == "OR" || upper == "NOT";
    }

    clean_q.join(" ")
}

/// Build the free-text clause for a query string, or `None` when the text
/// is empty. Two weighted `query_string` views (best-fields with implicit
/// conjunctions, plus a phrase view) are combined in a should group, with
/// an extra exact phrase boost for case-name-looking queries.
pub fn build_fulltext_clause(search_type: SearchType, value: &str) -> Result<Option<Value>> {
    if value.is_empty() {
        return Ok(None);
    }
    validate_query_syntax(value)?;

    let escaped = escape_docket_number_colons(value);
    let query_value = normalize_query(&escaped);
    let query_with_conjunctions = append_query_conjunctions(&query_value);

    let case_name_query = is_case_name_query(&query_value);
    let fields = boost_list(search_type, case_name_query);

    let mut should: Vec<Value> = Vec::new();
    if case_name_query && !query_value.contains('"') {
        should.push(json!({
            "match_phrase": {
                "caseName.exact": {
                    "query": query_value,
                    "boost": 2,
                    "slop": 1,
                }
            }
        }));
    }
    should.push(json!({
        "query_string": {
            "fields": fields,
            "query": query_with_conjunctions,
            "quote_field_suffix": ".exact",
            "default_operator": "AND",
            "tie_breaker": 0.3,
            "fuzziness": 2,
        }
    }));
    should.push(json!({
        "query_string": {
            "fields": fields,
            "query": query_value,
            "quote_field_suffix": ".exact",
            "default_operator": "AND",
            "type": "phrase",
            "fuzziness": 2,
        }
    }));

    Ok(Some(json!({ "bool": { "should": should } })))
}
