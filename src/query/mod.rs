//! # Query Compiler Module
//!
//! ## Purpose
//! Deterministic, pure translation from validated search criteria
//! (`CleanData`) into the structured boolean query document executed by
//! the search engine — for live searches, and for the percolator entries
//! stored when an alert is saved.
//!
//! ## Input/Output Specification
//! - **Input**: `CleanData` plus the alert configuration constants
//! - **Output**: `CompiledQuery` (filters ∧ full-text clause, sort spec,
//!   optional grouping aggregation and highlight options)
//! - **Scoring**: filters run in filter context so relevance reflects only
//!   the full-text match
//!
//! ## Key Features
//! - Filter builders are no-ops on empty input, so every filter can be
//!   applied unconditionally
//! - Query-syntax errors are distinguishable failure kinds, never
//!   swallowed
//! - Grouping caps child windows at the configured top-hits sizes

pub mod filters;
pub mod fulltext;
pub mod grouping;
pub mod highlight;
pub mod sorting;

use crate::config::AlertsConfig;
use crate::criteria::CleanData;
use crate::errors::Result;
use crate::SearchType;
use serde_json::{json, Value};

/// A compiled query ready for execution: the boolean query tree plus the
/// sort, aggregation and highlight companions a search request carries.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub query: Value,
    pub sort: Value,
    pub aggs: Option<Value>,
    pub highlight: Option<Value>,
    pub source_excludes: Vec<String>,
    pub from: Option<usize>,
    pub size: Option<usize>,
    /// Top-hits window applied by the grouping aggregation, if any
    pub top_hits_window: Option<usize>,
}

impl CompiledQuery {
    /// Render the full request body submitted to the engine.
    pub fn body(&self) -> Value {
        let mut body = json!({ "query": self.query, "sort": self.sort });
        if let Some(aggs) = &self.aggs {
            body["aggs"] = aggs.clone();
        }
        if let Some(highlight) = &self.highlight {
            body["highlight"] = highlight.clone();
        }
        if !self.source_excludes.is_empty() {
            body["_source"] = json!({ "excludes": self.source_excludes });
        }
        if let Some(from) = self.from {
            body["from"] = json!(from);
        }
        if let Some(size) = self.size {
            body["size"] = json!(size);
        }
        body
    }
}

/// The grouping key for document types whose children are rolled up under
/// a parent in search results.
pub fn group_field_for(search_type: SearchType) -> Option<&'static str> {
    match search_type {
        SearchType::Opinion => Some("cluster_id"),
        SearchType::Recap => Some("docket_id"),
        SearchType::OralArgument | SearchType::People => None,
    }
}

/// Build the filter clause list for the cleaned data. Only the fields
/// relevant to the selected document type contribute clauses.
pub fn build_filters(clean_data: &CleanData) -> Result<Vec<Value>> {
    let mut clauses: Vec<Value> = Vec::new();

    clauses.extend(filters::build_terms_filter("court_id", &clean_data.court));

    match clean_data.search_type {
        SearchType::Opinion | SearchType::OralArgument | SearchType::Recap => {
            clauses.extend(filters::build_phrase_filter(
                "docketNumber",
                &clean_data.docket_number,
                1,
            ));
            clauses.extend(filters::build_text_filter(
                "caseName.exact",
                &clean_data.case_name,
            )?);
        }
        SearchType::People => {}
    }

    match clean_data.search_type {
        SearchType::Opinion | SearchType::OralArgument => {
            clauses.extend(filters::build_text_filter("judge", &clean_data.judge)?);
        }
        _ => {}
    }

    match clean_data.search_type {
        SearchType::Opinion | SearchType::Recap => {
            clauses.extend(filters::build_daterange_filter(
                "dateFiled",
                clean_data.filed_before,
                clean_data.filed_after,
                clean_data.relation,
            ));
        }
        SearchType::OralArgument => {
            clauses.extend(filters::build_daterange_filter(
                "dateArgued",
                clean_data.argued_before,
                clean_data.argued_after,
                clean_data.relation,
            ));
        }
        SearchType::People => {
            clauses.extend(filters::build_daterange_filter(
                "dob",
                clean_data.born_before,
                clean_data.born_after,
                clean_data.relation,
            ));
        }
    }

    Ok(clauses)
}

/// Combine filters and the optional full-text clause into one boolean
/// query. Filters are ANDed in filter context; the text clause is the only
/// scoring contributor; with neither, the query matches everything.
fn combine(filter_clauses: Vec<Value>, fulltext: Option<Value>) -> Value {
    match (filter_clauses.is_empty(), fulltext) {
        (true, None) => json!({ "match_all": {} }),
        (false, None) => json!({ "bool": { "filter": filter_clauses } }),
        (true, Some(text)) => json!({ "bool": { "must": [text] } }),
        (false, Some(text)) => json!({
            "bool": { "filter": filter_clauses, "must": [text] }
        }),
    }
}

/// Compile the cleaned data into a full query document for live search:
/// filters, text clause, sort spec, grouping aggregation for rolled-up
/// types, and live-search highlighting.
pub fn build_compiled_query(
    clean_data: &CleanData,
    config: &AlertsConfig,
) -> Result<CompiledQuery> {
    let filter_clauses = build_filters(clean_data)?;
    let fulltext = fulltext::build_fulltext_clause(clean_data.search_type, &clean_data.q)?;
    let query = combine(filter_clauses, fulltext);

    let mut aggs = None;
    let mut top_hits_window = None;
    if let Some(group_field) = group_field_for(clean_data.search_type) {
        let (aggregation, size) =
            grouping::build_group_aggregation(clean_data, group_field, config);
        aggs = Some(aggregation);
        top_hits_window = Some(size);
    }

    Ok(CompiledQuery {
        query,
        sort: sorting::build_sort_spec(clean_data),
        aggs,
        highlight: Some(highlight::build_highlight_options(
            clean_data.search_type,
            false,
        )),
        source_excludes: vec![],
        from: None,
        size: None,
        top_hits_window,
    })
}

/// Compile only the boolean query tree, as stored in percolator entries.
/// Sort directives and aggregations are meaningless inside a percolator
/// document, so callers strip `order_by` before validation.
pub fn build_percolator_query(clean_data: &CleanData) -> Result<Value> {
    let filter_clauses = build_filters(clean_data)?;
    let fulltext = fulltext::build_fulltext_clause(clean_data.search_type, &clean_data.q)?;
    Ok(combine(filter_clauses, fulltext))
}
