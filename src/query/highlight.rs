//! Highlighting configuration: static per-type field tables and the tag
//! pair distinguishing live-search rendering from alert emails.

use crate::SearchType;
use serde_json::{json, Value};

/// Tag wrapped around matched fragments in live search results.
pub const SEARCH_HL_TAG: &str = "mark";

/// Tag wrapped around matched fragments in alert notifications, kept
/// distinct so the two contexts can be styled independently.
pub const ALERTS_HL_TAG: &str = "strong";

/// Fields highlighted per document type, with the fragment budget for
/// each. A budget of zero highlights the whole field.
fn highlight_fields(search_type: SearchType, alerts: bool) -> &'static [(&'static str, u32)] {
    match search_type {
        SearchType::OralArgument => {
            if alerts {
                // Alert emails render whole fields, not fragment windows.
                &[
                    ("caseName", 0),
                    ("judge", 0),
                    ("docketNumber", 0),
                    ("court_citation_string", 0),
                ]
            } else {
                &[
                    ("caseName", 0),
                    ("judge", 0),
                    ("docketNumber", 0),
                    ("text", 5),
                ]
            }
        }
        SearchType::Opinion => &[
            ("caseName", 0),
            ("judge", 0),
            ("docketNumber", 0),
            ("citation", 0),
            ("text", 5),
        ],
        SearchType::Recap => &[
            ("caseName", 0),
            ("docketNumber", 0),
            ("description", 5),
            ("suitNature", 0),
        ],
        SearchType::People => &[("name", 0), ("dob_city", 0), ("dob_state_id", 0)],
    }
}

/// Build the engine highlight options for a document type. `alerts`
/// selects the alert field table and tag.
pub fn build_highlight_options(search_type: SearchType, alerts: bool) -> Value {
    let tag = if alerts { ALERTS_HL_TAG } else { SEARCH_HL_TAG };
    let mut fields = serde_json::Map::new();
    for (field, fragments) in highlight_fields(search_type, alerts) {
        fields.insert(
            (*field).to_string(),
            json!({ "number_of_fragments": fragments }),
        );
    }
    json!({
        "fields": Value::Object(fields),
        "pre_tags": [format!("<{}>", tag)],
        "post_tags": [format!("</{}>", tag)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_highlighting_uses_the_alert_tag() {
        let options = build_highlight_options(SearchType::OralArgument, true);
        assert_eq!(options["pre_tags"][0], "<strong>");
        assert_eq!(options["post_tags"][0], "</strong>");
    }

    #[test]
    fn search_highlighting_uses_the_mark_tag() {
        let options = build_highlight_options(SearchType::Opinion, false);
        assert_eq!(options["pre_tags"][0], "<mark>");
        assert!(options["fields"]["text"].is_object());
    }
}
