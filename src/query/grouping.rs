//! Parent-group aggregation: buckets child documents by a grouping key and
//! keeps a bounded top-hits window per bucket, with buckets themselves
//! ordered by the max of the requested sort field.

use crate::config::AlertsConfig;
use crate::criteria::CleanData;
use crate::query::sorting;
use regex::Regex;
use serde_json::{json, Value};

/// True when the query already pins one exact group (`cluster_id:1234`),
/// in which case truncating its children to the default window would hide
/// results the user explicitly asked for.
pub fn is_single_group_query(clean_data: &CleanData, group_field: &str) -> bool {
    let pattern = format!(r"{}:\d+", regex::escape(group_field));
    Regex::new(&pattern)
        .map(|re| re.is_match(&clean_data.q))
        .unwrap_or(false)
}

/// Resolve the top-hits window for a query: the configured default, or the
/// single-group window when the query targets one exact group.
pub fn top_hits_window(
    clean_data: &CleanData,
    group_field: &str,
    config: &AlertsConfig,
) -> usize {
    if is_single_group_query(clean_data, group_field) {
        config.top_hits_single_group
    } else {
        config.top_hits_default
    }
}

/// Build the grouping aggregation: a terms bucket on `group_field` with a
/// top-hits sub-aggregation capped at the window size, plus a per-bucket
/// max of the ordering field and a bucket sort over it so groups are
/// returned in the requested order. Returns the aggregation and the
/// window size applied.
pub fn build_group_aggregation(
    clean_data: &CleanData,
    group_field: &str,
    config: &AlertsConfig,
) -> (Value, usize) {
    let size = top_hits_window(clean_data, group_field, config);
    let (order_field, order) = sorting::sort_field_and_order(clean_data);

    let mut aggs = json!({
        "grouped_hits": {
            "top_hits": {
                "size": size,
                "sort": [{ "_score": { "order": "desc" } }],
            }
        }
    });

    if order_field == "_score" {
        aggs["max_score"] = json!({ "max": { "script": "_score" } });
        aggs["sorted_buckets"] = json!({
            "bucket_sort": { "sort": [{ "max_score": { "order": "desc" } }] }
        });
    } else {
        aggs["max_value_field"] = json!({ "max": { "field": order_field } });
        aggs["sorted_buckets"] = json!({
            "bucket_sort": { "sort": [{ "max_value_field": { "order": order } }] }
        });
    }

    let aggregation = json!({
        "groups": {
            "terms": { "field": group_field, "size": 1_000_000 },
            "aggs": aggs,
        }
    });

    (aggregation, size)
}
