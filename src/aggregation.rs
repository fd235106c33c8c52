//! # Result Aggregation Module
//!
//! ## Purpose
//! Post-processing of raw engine hits for rendering: groups child
//! documents under their parent with a bounded top-hits window, merges
//! highlighted fragments back into result payloads, and backfills fields
//! the index does not store. All passes are pure read+merge — the backing
//! store is never written.
//!
//! ## Input/Output Specification
//! - **Input**: raw hits (live search or percolation), highlight maps,
//!   court lookup tables
//! - **Output**: render-ready result payloads
//!
//! ## Key Features
//! - Per-bucket top-hits truncation (default 5, raised for single-group
//!   queries) with bucket-level max-of-ordering-field sorting
//! - Distinct highlight tags for live search and alert rendering

use crate::index::SearchHit;
use chrono::NaiveDate;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One parent bucket of grouped child hits.
#[derive(Debug, Clone)]
pub struct ParentGroup {
    /// The shared value of the grouping field
    pub group_key: String,
    /// Child hits kept for this bucket, best first, at most the window size
    pub top_hits: Vec<SearchHit>,
    /// Max of the ordering field across all bucket members (not only the
    /// kept ones), so buckets themselves can be ordered by it
    pub max_sort_value: Option<Value>,
}

fn sort_value(hit: &SearchHit, order_field: &str) -> Option<Value> {
    if order_field == "_score" {
        return hit.score.map(|score| Value::from(score));
    }
    match &hit.source[order_field] {
        Value::Null => None,
        value => Some(value.clone()),
    }
}

/// Order two JSON sort values: numbers numerically, strings (ISO dates
/// included) lexicographically. Missing values sort last.
fn compare_sort_values(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => a
                .as_str()
                .unwrap_or_default()
                .cmp(b.as_str().unwrap_or_default()),
        },
    }
}

/// Bucket child hits by `group_field`, order each bucket's members by the
/// ordering field, keep only the first `size`, and order the buckets by
/// their member maximum. `order` is `(field, direction)` as produced by
/// the sort spec; `"_score"` orders by relevance.
pub fn group_by_parent(
    hits: &[SearchHit],
    group_field: &str,
    size: usize,
    order: (&str, &str),
) -> Vec<ParentGroup> {
    let (order_field, direction) = order;
    let descending = direction != "asc";

    let mut buckets: BTreeMap<String, Vec<SearchHit>> = BTreeMap::new();
    for hit in hits {
        let key = match &hit.source[group_field] {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            value => value.to_string(),
        };
        buckets.entry(key).or_default().push(hit.clone());
    }

    let mut groups: Vec<ParentGroup> = buckets
        .into_iter()
        .map(|(group_key, mut members)| {
            members.sort_by(|a, b| {
                let ordering =
                    compare_sort_values(&sort_value(a, order_field), &sort_value(b, order_field));
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
            let max_sort_value = members
                .iter()
                .filter_map(|hit| sort_value(hit, order_field))
                .max_by(|a, b| compare_sort_values(&Some(a.clone()), &Some(b.clone())));
            members.truncate(size);
            ParentGroup {
                group_key,
                top_hits: members,
                max_sort_value,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        let ordering = compare_sort_values(&a.max_sort_value, &b.max_sort_value);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    groups
}

/// Overwrite each highlighted field in the result payload with its tagged
/// fragments: a single fragment replaces the field value directly, while
/// multiple fragments replace it as a list. Untouched fields are left
/// as-is. The highlight tag (live search vs alert) was already chosen when
/// the highlight options were built.
pub fn merge_highlights(result: &mut Value, highlights: &BTreeMap<String, Vec<String>>) {
    let Some(object) = result.as_object_mut() else {
        return;
    };
    for (field, fragments) in highlights {
        let merged = match fragments.as_slice() {
            [] => continue,
            [single] => Value::from(single.clone()),
            many => Value::from(many.to_vec()),
        };
        object.insert(field.clone(), merged);
    }
}

/// Convert engine-native string dates in the given fields back to plain
/// ISO dates (`2020-01-05`), accepting both date and datetime spellings.
pub fn convert_date_strings(documents: &mut [Value], fields: &[&str]) {
    for document in documents {
        for field in fields {
            let Some(raw) = document[*field].as_str() else {
                continue;
            };
            let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d").or_else(|_| {
                raw.get(..10)
                    .ok_or(())
                    .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").map_err(|_| ()))
            });
            if let Ok(date) = parsed {
                document[*field] = Value::from(date.format("%Y-%m-%d").to_string());
            }
        }
    }
}

/// Backfill the human-readable court citation string from the authoritative
/// court table, keyed by the `court_id` embedded in each result. Documents
/// referencing unknown courts are left untouched.
pub fn merge_court_names(documents: &mut [Value], courts: &BTreeMap<String, String>) {
    for document in documents {
        let Some(court_id) = document["court_id"].as_str() else {
            continue;
        };
        if let Some(name) = courts.get(court_id) {
            document["citation_string"] = Value::from(name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(cluster: u64, score: f64, date: &str) -> SearchHit {
        SearchHit {
            id: format!("{}-{}", cluster, score),
            score: Some(score),
            source: json!({ "cluster_id": cluster, "dateFiled": date }),
            highlight: BTreeMap::new(),
        }
    }

    #[test]
    fn truncates_buckets_to_the_window_size() {
        let hits: Vec<SearchHit> = (0..150)
            .map(|n| hit(1, n as f64, "2020-01-05"))
            .collect();
        let groups = group_by_parent(&hits, "cluster_id", 5, ("_score", "desc"));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].top_hits.len(), 5);
        // Best-scoring members survive the truncation.
        assert_eq!(groups[0].top_hits[0].score, Some(149.0));
    }

    #[test]
    fn single_group_window_keeps_more_hits() {
        let hits: Vec<SearchHit> = (0..150)
            .map(|n| hit(1, n as f64, "2020-01-05"))
            .collect();
        let groups = group_by_parent(&hits, "cluster_id", 100, ("_score", "desc"));
        assert_eq!(groups[0].top_hits.len(), 100);
    }

    #[test]
    fn buckets_are_ordered_by_member_maximum() {
        let hits = vec![
            hit(1, 1.0, "2020-01-05"),
            hit(2, 3.0, "2021-06-01"),
            hit(1, 2.0, "2019-03-01"),
        ];
        let groups = group_by_parent(&hits, "cluster_id", 5, ("_score", "desc"));
        assert_eq!(groups[0].group_key, "2");
        assert_eq!(groups[1].group_key, "1");
        assert_eq!(groups[1].max_sort_value, Some(Value::from(2.0)));
    }

    #[test]
    fn buckets_can_order_by_a_date_field() {
        let hits = vec![
            hit(1, 9.0, "2019-03-01"),
            hit(2, 1.0, "2021-06-01"),
        ];
        let groups = group_by_parent(&hits, "cluster_id", 5, ("dateFiled", "desc"));
        assert_eq!(groups[0].group_key, "2");
    }

    #[test]
    fn merge_highlights_overwrites_only_highlighted_fields() {
        let mut result = json!({
            "caseName": "Smith v. Jones",
            "court_id": "scotus",
        });
        let mut highlights = BTreeMap::new();
        highlights.insert(
            "caseName".to_string(),
            vec!["<mark>Smith</mark> v. Jones".to_string()],
        );
        merge_highlights(&mut result, &highlights);
        assert_eq!(result["caseName"], "<mark>Smith</mark> v. Jones");
        assert_eq!(result["court_id"], "scotus");
    }

    #[test]
    fn merge_highlights_keeps_multiple_fragments_as_a_list() {
        let mut result = json!({ "text": "long opinion text" });
        let mut highlights = BTreeMap::new();
        highlights.insert(
            "text".to_string(),
            vec!["<mark>first</mark>".to_string(), "<mark>second</mark>".to_string()],
        );
        merge_highlights(&mut result, &highlights);
        assert_eq!(result["text"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn converts_datetime_strings_to_dates() {
        let mut documents = vec![json!({ "dateFiled": "2020-01-05T00:00:00Z" })];
        convert_date_strings(&mut documents, &["dateFiled"]);
        assert_eq!(documents[0]["dateFiled"], "2020-01-05");
    }

    #[test]
    fn merges_court_names_from_lookup() {
        let mut documents = vec![
            json!({ "court_id": "scotus" }),
            json!({ "court_id": "unknown" }),
        ];
        let mut courts = BTreeMap::new();
        courts.insert("scotus".to_string(), "U.S.".to_string());
        merge_court_names(&mut documents, &courts);
        assert_eq!(documents[0]["citation_string"], "U.S.");
        assert!(documents[1].get("citation_string").is_none());
    }
}
