//! Sort specification: maps the closed set of order-by tokens the search
//! form offers onto engine sort directives.

use crate::criteria::CleanData;
use serde_json::{json, Value};

/// The order-by tokens accepted from the form, paired with their engine
/// sort directives. Anything else falls back to relevance.
const ORDER_BY_MAP: &[(&str, &str, &str)] = &[
    ("score desc", "_score", "desc"),
    ("score asc", "_score", "asc"),
    ("dateFiled desc", "dateFiled", "desc"),
    ("dateFiled asc", "dateFiled", "asc"),
    ("dateArgued desc", "dateArgued", "desc"),
    ("dateArgued asc", "dateArgued", "asc"),
    ("citeCount desc", "citeCount", "desc"),
    ("citeCount asc", "citeCount", "asc"),
    ("name_reverse asc", "name_reverse", "asc"),
    ("name_reverse desc", "name_reverse", "desc"),
    ("dob desc,name_reverse asc", "dob", "desc"),
    ("dob asc,name_reverse asc", "dob", "asc"),
    ("dod desc,name_reverse asc", "dod", "desc"),
];

/// Resolve the sort field and direction for the cleaned data, defaulting
/// to `score desc` for unrecognized or missing tokens.
pub fn sort_field_and_order(clean_data: &CleanData) -> (&'static str, &'static str) {
    ORDER_BY_MAP
        .iter()
        .find(|(token, _, _)| *token == clean_data.order_by)
        .map(|(_, field, order)| (*field, *order))
        .unwrap_or(("_score", "desc"))
}

/// Build the engine sort directive for the cleaned data. The compound
/// people orderings carry their name tiebreaker.
pub fn build_sort_spec(clean_data: &CleanData) -> Value {
    let (field, order) = sort_field_and_order(clean_data);
    match field {
        "dob" | "dod" => json!([
            { field: { "order": order } },
            { "name_reverse": { "order": "asc" } },
        ]),
        _ => json!([{ field: { "order": order } }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchCriteria;

    fn clean(raw: &str) -> CleanData {
        SearchCriteria::parse(raw).validate().unwrap()
    }

    #[test]
    fn known_tokens_map_to_directives() {
        let spec = build_sort_spec(&clean("type=oa&order_by=dateArgued+desc"));
        assert_eq!(spec, json!([{ "dateArgued": { "order": "desc" } }]));
    }

    #[test]
    fn unknown_tokens_default_to_relevance() {
        for raw in ["type=o", "type=o&order_by=bogus+asc"] {
            let spec = build_sort_spec(&clean(raw));
            assert_eq!(spec, json!([{ "_score": { "order": "desc" } }]));
        }
    }

    #[test]
    fn compound_people_sorts_keep_name_tiebreaker() {
        let spec = build_sort_spec(&clean("type=p&order_by=dob+desc%2Cname_reverse+asc"));
        assert_eq!(
            spec,
            json!([
                { "dob": { "order": "desc" } },
                { "name_reverse": { "order": "asc" } },
            ])
        );
    }
}
