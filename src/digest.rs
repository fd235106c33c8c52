//! # Digest Module
//!
//! ## Purpose
//! Batched delivery of scheduled alert hits: on the daily, weekly or
//! monthly cadence, pending hits are read, grouped per user and alert,
//! merged under their parent documents and sent as one digest email per
//! user.
//!
//! ## Input/Output Specification
//! - **Input**: SCHEDULED hits accumulated by the dispatcher
//! - **Output**: one digest email per user with pending hits; hits flip
//!   to SENT; old hits are purged on the daily run
//!
//! ## Key Features
//! - Child documents sharing a parent are merged, with a marker once the
//!   per-result child budget is exhausted
//! - The emailed query link is rewritten with a cut-off date filter so
//!   "view full results" shows the digest window

use crate::aggregation;
use crate::config::AlertsConfig;
use crate::errors::{Result, SearchError};
use crate::notify::Notifier;
use crate::store::{AlertStore, ScheduledAlertHit};
use crate::{Alert, AlertId, Hit, Rate, SearchType, UserId};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one digest run.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DigestSummary {
    pub users_notified: usize,
    pub hits_delivered: usize,
    pub purged: usize,
}

/// Reads scheduled hits and emails them at their owner's chosen cadence.
pub struct DigestRunner {
    store: Arc<AlertStore>,
    notifier: Arc<dyn Notifier>,
    config: AlertsConfig,
}

/// The start of the window a digest covers: the previous day for daily
/// digests, seven days back for weekly, and the first of the previous
/// month for monthly.
pub fn cut_off_date(rate: Rate, today: NaiveDate) -> Option<NaiveDate> {
    match rate {
        Rate::Daily => Some(today - Duration::days(1)),
        Rate::Weekly => Some(today - Duration::days(7)),
        Rate::Monthly => {
            let early_last_month = today - Duration::days(28);
            NaiveDate::from_ymd_opt(early_last_month.year(), early_last_month.month(), 1)
        }
        Rate::RealTime | Rate::Off => None,
    }
}

/// Monthly digests would skip subscribers if run on days the next month
/// lacks, so the 29th through 31st are refused.
pub fn monthly_run_allowed(today: NaiveDate) -> bool {
    today.day() <= 28
}

/// Rewrite an alert's stored query so its date filter starts at the
/// digest cut-off, for the "view full results" link in the email.
pub fn override_query_with_cutoff(alert: &Alert, cutoff: NaiveDate) -> String {
    let field = match alert.alert_type {
        SearchType::Opinion | SearchType::Recap => "filed_after",
        SearchType::OralArgument => "argued_after",
        SearchType::People => "born_after",
    };
    let criteria = crate::SearchCriteria::parse(&alert.query).without(field);
    let mut query = criteria.to_query_string();
    if !query.is_empty() {
        query.push('&');
    }
    query.push_str(&format!("{}={}", field, cutoff.format("%Y-%m-%d")));
    query
}

/// Merge multiple child hits that share one main document. The first
/// document stands in for the parent; `child_docs` lists are concatenated
/// up to the per-result budget, after which `child_remaining` marks that
/// more exist.
pub fn merge_alert_child_documents(documents: &[Value], child_limit: usize) -> Value {
    let mut main_document = documents[0].clone();
    let mut child_docs: Vec<Value> = Vec::new();
    for document in documents {
        if let Some(children) = document["child_docs"].as_array() {
            child_docs.extend(children.iter().cloned());
            if child_docs.len() >= child_limit {
                child_docs.truncate(child_limit);
                main_document["child_remaining"] = Value::from(true);
                break;
            }
        }
    }
    if !child_docs.is_empty() {
        main_document["child_docs"] = Value::from(child_docs);
    }
    main_document
}

/// The id grouping child hits under one parent document.
fn main_document_id(search_type: SearchType, document: &Value) -> String {
    let key = match search_type {
        SearchType::Recap => "docket_id",
        _ => "id",
    };
    match &document[key] {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        value => value.to_string(),
    }
}

impl DigestRunner {
    pub fn new(store: Arc<AlertStore>, notifier: Arc<dyn Notifier>, config: AlertsConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Send every pending digest for a rate, then purge expired hits on
    /// the daily run.
    pub async fn send_scheduled_alerts(&self, rate: Rate) -> Result<DigestSummary> {
        if !rate.is_scheduled() {
            return Err(SearchError::ValidationFailed {
                field: "rate".to_string(),
                reason: format!("'{}' is not a digest rate", rate),
            });
        }
        let today = Utc::now().date_naive();
        if rate == Rate::Monthly && !monthly_run_allowed(today) {
            return Err(SearchError::ValidationFailed {
                field: "rate".to_string(),
                reason: "Monthly alerts cannot be run on the 29th, 30th or 31st".to_string(),
            });
        }

        let pending = self
            .store
            .scheduled_hits_for_rate(rate, crate::store::HitStatus::Scheduled)?;

        // user → alert → main document id → hits
        let mut grouped: HashMap<UserId, HashMap<AlertId, HashMap<String, Vec<ScheduledAlertHit>>>> =
            HashMap::new();
        for hit in pending {
            let alert_type = self
                .store
                .get_alert(hit.alert_id)?
                .map(|alert| alert.alert_type)
                .unwrap_or(SearchType::Opinion);
            let document: Value = serde_json::from_str(&hit.document_content)?;
            let doc_id = main_document_id(alert_type, &document);
            grouped
                .entry(hit.user_id)
                .or_default()
                .entry(hit.alert_id)
                .or_default()
                .entry(doc_id)
                .or_default()
                .push(hit);
        }

        let mut summary = DigestSummary::default();
        let cutoff = cut_off_date(rate, today);

        for (user_id, alerts) in grouped {
            let mut hits: Vec<Hit> = Vec::new();
            let mut delivered: Vec<ScheduledAlertHit> = Vec::new();
            let mut user_email = String::new();

            for (alert_id, document_groups) in alerts {
                let Some(mut alert) = self.store.get_alert(alert_id)? else {
                    // Deleted since the hit was scheduled; drop silently.
                    continue;
                };
                user_email = alert.user_email.clone();

                let mut documents: Vec<Value> = Vec::new();
                for group in document_groups.values() {
                    let mut group_documents: Vec<Value> = Vec::new();
                    for hit in group {
                        let mut document: Value = serde_json::from_str(&hit.document_content)?;
                        aggregation::merge_highlights(&mut document, &hit.highlighted_fields);
                        group_documents.push(document);
                    }
                    documents.push(merge_alert_child_documents(
                        &group_documents,
                        self.config.top_hits_default,
                    ));
                    delivered.extend(group.iter().cloned());
                }

                if let Some(cutoff) = cutoff {
                    alert.query = override_query_with_cutoff(&alert, cutoff);
                }
                let search_type = alert.alert_type;
                let count = documents.len();
                hits.push(Hit {
                    alert,
                    search_type,
                    documents,
                    count,
                });
            }

            if hits.is_empty() {
                continue;
            }

            match self.notifier.send_alert_email(&user_email, &hits).await {
                Ok(()) => {
                    summary.users_notified += 1;
                    summary.hits_delivered += delivered.len();
                    let alert_ids: Vec<_> = hits.iter().map(|hit| hit.alert.id).collect();
                    self.store.touch_date_last_hit(&alert_ids, Utc::now())?;
                    self.store.mark_hits_sent(&delivered)?;
                }
                Err(e) => {
                    // Hits stay SCHEDULED and ride along in the next run.
                    tracing::warn!(
                        "Digest email to user {} failed, hits kept pending: {}",
                        user_id,
                        e
                    );
                }
            }
        }

        if rate == Rate::Daily {
            summary.purged = self
                .store
                .purge_old_hits(self.config.scheduled_hit_retention_days)?;
            if summary.purged > 0 {
                tracing::info!("Removed {} expired scheduled alert hits", summary.purged);
            }
        }

        tracing::info!(
            "Sent {} {} digest emails covering {} hits",
            summary.users_notified,
            rate,
            summary.hits_delivered
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::dispatch::test_support::RecordingNotifier;
    use crate::store::HitStatus;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn alerts_config() -> AlertsConfig {
        AlertsConfig {
            percolator_page_size: 100,
            top_hits_default: 5,
            top_hits_single_group: 100,
            scheduled_hit_retention_days: 90,
        }
    }

    fn test_rig() -> (Arc<AlertStore>, Arc<RecordingNotifier>, DigestRunner, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            AlertStore::new(StorageConfig {
                db_path: dir.path().join("alerts.db"),
                enable_compression: false,
            })
            .unwrap(),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = DigestRunner::new(store.clone(), notifier.clone(), alerts_config());
        (store, notifier, runner, dir)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn cut_off_dates_follow_the_rate() {
        assert_eq!(
            cut_off_date(Rate::Daily, date(2024, 3, 15)),
            Some(date(2024, 3, 14))
        );
        assert_eq!(
            cut_off_date(Rate::Weekly, date(2024, 3, 15)),
            Some(date(2024, 3, 8))
        );
        assert_eq!(
            cut_off_date(Rate::Monthly, date(2024, 3, 15)),
            Some(date(2024, 2, 1))
        );
        assert_eq!(cut_off_date(Rate::RealTime, date(2024, 3, 15)), None);
    }

    #[test]
    fn monthly_runs_are_refused_late_in_the_month() {
        assert!(monthly_run_allowed(date(2024, 3, 28)));
        assert!(!monthly_run_allowed(date(2024, 3, 29)));
        assert!(!monthly_run_allowed(date(2024, 1, 31)));
    }

    #[test]
    fn child_documents_merge_with_a_budget() {
        let documents = vec![
            json!({ "docket_id": 7, "child_docs": [{ "id": 1 }, { "id": 2 }, { "id": 3 }] }),
            json!({ "docket_id": 7, "child_docs": [{ "id": 4 }, { "id": 5 }, { "id": 6 }] }),
        ];
        let merged = merge_alert_child_documents(&documents, 5);
        assert_eq!(merged["child_docs"].as_array().unwrap().len(), 5);
        assert_eq!(merged["child_remaining"], true);

        let under_budget = merge_alert_child_documents(&documents[..1], 5);
        assert_eq!(under_budget["child_docs"].as_array().unwrap().len(), 3);
        assert!(under_budget.get("child_remaining").is_none());
    }

    #[test]
    fn query_override_replaces_the_date_filter() {
        let alert = Alert::new(
            Uuid::new_v4(),
            "owner@example.com",
            "oa digest",
            "type=oa&q=Smith&argued_after=2019-01-01",
            Rate::Daily,
        );
        let query = override_query_with_cutoff(&alert, date(2024, 3, 14));
        assert!(query.contains("argued_after=2024-03-14"));
        assert!(!query.contains("2019-01-01"));
    }

    #[tokio::test]
    async fn digest_sends_one_email_per_user_and_marks_hits_sent() {
        let (store, notifier, runner, _dir) = test_rig();
        let alert = Alert::new(
            Uuid::new_v4(),
            "owner@example.com",
            "daily smith",
            "type=oa&q=Smith",
            Rate::Daily,
        );
        store.save_alert(&alert).unwrap();
        store
            .schedule_hit(&alert, &json!({ "id": 1, "caseName": "Smith v. Jones" }), &BTreeMap::new())
            .await
            .unwrap();
        store
            .schedule_hit(&alert, &json!({ "id": 2, "caseName": "Smith v. Lee" }), &BTreeMap::new())
            .await
            .unwrap();

        let summary = runner.send_scheduled_alerts(Rate::Daily).await.unwrap();
        assert_eq!(summary.users_notified, 1);
        assert_eq!(summary.hits_delivered, 2);

        let emails = notifier.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, "owner@example.com");

        assert!(store
            .scheduled_hits_for_rate(Rate::Daily, HitStatus::Scheduled)
            .unwrap()
            .is_empty());
        assert!(store
            .get_alert(alert.id)
            .unwrap()
            .unwrap()
            .date_last_hit
            .is_some());
    }

    #[tokio::test]
    async fn non_digest_rates_are_rejected() {
        let (_store, _notifier, runner, _dir) = test_rig();
        assert!(runner.send_scheduled_alerts(Rate::RealTime).await.is_err());
    }

    #[tokio::test]
    async fn hits_for_deleted_alerts_are_dropped() {
        let (store, notifier, runner, _dir) = test_rig();
        let alert = Alert::new(
            Uuid::new_v4(),
            "owner@example.com",
            "daily smith",
            "type=oa&q=Smith",
            Rate::Daily,
        );
        store.save_alert(&alert).unwrap();
        store
            .schedule_hit(&alert, &json!({ "id": 1 }), &BTreeMap::new())
            .await
            .unwrap();
        store.delete_alert(alert.id).unwrap();

        let summary = runner.send_scheduled_alerts(Rate::Daily).await.unwrap();
        assert_eq!(summary.users_notified, 0);
        assert!(notifier.emails.lock().unwrap().is_empty());
    }
}
