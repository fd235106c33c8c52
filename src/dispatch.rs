//! # Alert Dispatch Module
//!
//! ## Purpose
//! Converts percolation matches into notifications. Real-time alerts
//! notify immediately (webhooks plus one aggregated email per owner);
//! daily, weekly and monthly alerts accumulate scheduled hits for the
//! digest runner.
//!
//! ## Input/Output Specification
//! - **Input**: percolator matches for one freshly indexed document
//! - **Output**: immediate notifications or persisted scheduled hits
//! - **At-most-once**: percolation fires exactly once per document index
//!   event and document writes are idempotent by id, so no dedup happens
//!   here
//!
//! ## State machine (per match, keyed by alert and document)
//! - Matched → alert missing → dropped
//! - Matched → REAL_TIME → highlights merged, `date_last_hit` bumped,
//!   webhooks triggered, one email per owner → Sent
//! - Matched → DAILY/WEEKLY/MONTHLY → locked get-or-create of the
//!   aggregation roots, scheduled hit persisted → Scheduled

use crate::aggregation;
use crate::notify::Notifier;
use crate::percolator::PercolatorMatch;
use crate::store::AlertStore;
use crate::{Alert, Hit, SearchCriteria, UserId, WebhookEventType};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Counts of how a dispatch call resolved its matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DispatchSummary {
    /// Real-time emails sent (one per notified owner)
    pub emails_sent: usize,
    /// Webhook deliveries triggered
    pub webhooks_sent: usize,
    /// Scheduled hits persisted for digest delivery
    pub scheduled: usize,
    /// Matches dropped (missing alert, disabled rate, storage failure)
    pub dropped: usize,
}

/// Consumes percolation matches and turns them into notifications.
pub struct AlertDispatcher {
    store: Arc<AlertStore>,
    notifier: Arc<dyn Notifier>,
}

impl AlertDispatcher {
    pub fn new(store: Arc<AlertStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Process every match produced by percolating one document.
    ///
    /// Real-time matches for the same owner are aggregated so the owner
    /// receives exactly one email covering all of their triggered alerts,
    /// while each of their enabled search-alert webhooks fires once per
    /// triggered alert.
    pub async fn dispatch(
        &self,
        matches: &[PercolatorMatch],
        document_content: &Value,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        // Owner → (email, real-time hits accumulated this call)
        let mut real_time: HashMap<UserId, (String, Vec<Hit>)> = HashMap::new();

        for matched in matches {
            let alert = match self.store.get_alert(matched.alert_id) {
                Ok(Some(alert)) => alert,
                Ok(None) => {
                    tracing::debug!("Alert {} no longer exists, match dropped", matched.alert_id);
                    summary.dropped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Failed to load alert {}: {}", matched.alert_id, e);
                    summary.dropped += 1;
                    continue;
                }
            };

            if alert.rate.is_scheduled() {
                match self
                    .store
                    .schedule_hit(&alert, document_content, &matched.highlights)
                    .await
                {
                    Ok(_) => summary.scheduled += 1,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to schedule hit for alert {}: {}",
                            alert.id,
                            e
                        );
                        summary.dropped += 1;
                    }
                }
                continue;
            }

            if alert.rate != crate::Rate::RealTime {
                // Rate is off; the alert stays registered but silent.
                summary.dropped += 1;
                continue;
            }

            let mut document = document_content.clone();
            aggregation::merge_highlights(&mut document, &matched.highlights);

            let search_type = SearchCriteria::peek_search_type(&alert.query);
            let user_id = alert.user_id;
            let user_email = alert.user_email.clone();
            let hit = Hit {
                alert,
                search_type,
                documents: vec![document],
                count: 1,
            };
            real_time
                .entry(user_id)
                .or_insert_with(|| (user_email, Vec::new()))
                .1
                .push(hit);
        }

        for (user_id, (user_email, hits)) in real_time {
            self.send_real_time(user_id, &user_email, hits, &mut summary)
                .await;
        }

        summary
    }

    /// Deliver one user's real-time hits: every enabled webhook fires per
    /// triggered alert, then exactly one email covers all of them.
    /// Delivery is best-effort; failures are logged, never retried here.
    async fn send_real_time(
        &self,
        user_id: UserId,
        user_email: &str,
        hits: Vec<Hit>,
        summary: &mut DispatchSummary,
    ) {
        if hits.is_empty() {
            return;
        }

        let now = Utc::now();
        let alert_ids: Vec<_> = hits.iter().map(|hit| hit.alert.id).collect();
        if let Err(e) = self.store.touch_date_last_hit(&alert_ids, now) {
            tracing::warn!("Failed to stamp date_last_hit for {:?}: {}", alert_ids, e);
        }

        let webhooks = match self
            .store
            .webhooks_for_user(user_id, WebhookEventType::SearchAlert)
        {
            Ok(webhooks) => webhooks,
            Err(e) => {
                tracing::warn!("Failed to load webhooks for user {}: {}", user_id, e);
                Vec::new()
            }
        };

        let mut deliveries = Vec::new();
        for hit in &hits {
            for subscription in &webhooks {
                deliveries.push(async move {
                    let result = self
                        .notifier
                        .send_webhook(&hit.documents, subscription, &hit.alert)
                        .await;
                    (subscription.url.as_str(), hit.alert.id, result)
                });
            }
        }
        for (url, alert_id, result) in futures::future::join_all(deliveries).await {
            match result {
                Ok(()) => summary.webhooks_sent += 1,
                Err(e) => tracing::warn!(
                    "Webhook delivery to {} failed for alert {}: {}",
                    url,
                    alert_id,
                    e
                ),
            }
        }

        match self.notifier.send_alert_email(user_email, &hits).await {
            Ok(()) => {
                summary.emails_sent += 1;
                tracing::info!(
                    "Sent 1 real-time alert email to {} covering {} alerts",
                    user_email,
                    hits.len()
                );
            }
            Err(e) => tracing::warn!("Alert email to {} failed: {}", user_email, e),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::errors::Result;
    use crate::WebhookSubscription;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every delivery instead of performing it.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub emails: Mutex<Vec<(String, usize)>>,
        pub webhooks: Mutex<Vec<(String, crate::AlertId)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_alert_email(&self, user_email: &str, hits: &[Hit]) -> Result<()> {
            self.emails
                .lock()
                .unwrap()
                .push((user_email.to_string(), hits.len()));
            Ok(())
        }

        async fn send_webhook(
            &self,
            _documents: &[Value],
            subscription: &WebhookSubscription,
            alert: &Alert,
        ) -> Result<()> {
            self.webhooks
                .lock()
                .unwrap()
                .push((subscription.url.clone(), alert.id));
            Ok(())
        }
    }
}
