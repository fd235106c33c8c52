//! # Notification Module
//!
//! ## Purpose
//! The outbound delivery seam: this engine decides *whether and what* to
//! send; the email transport and webhook receivers decide how delivery
//! happens. Both calls are best-effort and never retried inline.
//!
//! ## Input/Output Specification
//! - **Input**: `Hit` payloads from the dispatcher and digest runner
//! - **Output**: one rendered email per user, one POST per webhook
//! - **Failure semantics**: delivery errors are surfaced to the caller,
//!   which logs and moves on

use crate::config::NotificationsConfig;
use crate::errors::Result;
use crate::utils::TextUtils;
use crate::{Alert, Hit, SearchError, WebhookSubscription};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

/// The notifier contract consumed by the dispatcher and digest runner.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Render and send one alert email covering all given hits.
    async fn send_alert_email(&self, user_email: &str, hits: &[Hit]) -> Result<()>;

    /// POST the matched documents to one registered webhook.
    async fn send_webhook(
        &self,
        documents: &[Value],
        subscription: &WebhookSubscription,
        alert: &Alert,
    ) -> Result<()>;
}

/// HTTP notifier: webhooks go straight to their registered URL; emails are
/// handed to the external mailer service as a rendered message.
pub struct HttpNotifier {
    client: reqwest::Client,
    config: NotificationsConfig,
}

impl HttpNotifier {
    pub fn new(config: NotificationsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.delivery_timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }
}

fn document_title(document: &Value) -> String {
    let title = document["caseName"]
        .as_str()
        .or_else(|| document["name"].as_str())
        .unwrap_or("Untitled result");
    TextUtils::truncate(title, 100)
}

/// Plain-text body listing each alert and its matched documents.
pub fn render_email_text(hits: &[Hit]) -> String {
    let mut body = String::from("Your saved alerts found new results:\n");
    for hit in hits {
        body.push_str(&format!(
            "\n{} ({} new {}):\n",
            hit.alert.name,
            hit.count,
            if hit.count == 1 { "result" } else { "results" },
        ));
        for document in &hit.documents {
            body.push_str(&format!(" - {}\n", document_title(document)));
            if let Some(docket_number) = document["docketNumber"].as_str() {
                body.push_str(&format!("   Docket: {}\n", docket_number));
            }
        }
    }
    body
}

/// HTML alternative of the alert email. Highlight tags embedded in the
/// document fields survive into the markup.
pub fn render_email_html(hits: &[Hit]) -> String {
    let mut body = String::from("<h2>Your saved alerts found new results</h2>\n");
    for hit in hits {
        body.push_str(&format!(
            "<h3>{} &mdash; {} new</h3>\n<ul>\n",
            hit.alert.name, hit.count
        ));
        for document in &hit.documents {
            body.push_str(&format!("<li>{}</li>\n", document_title(document)));
        }
        body.push_str("</ul>\n");
    }
    body
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_alert_email(&self, user_email: &str, hits: &[Hit]) -> Result<()> {
        let message = json!({
            "to": [user_email],
            "from": self.config.from_email,
            "subject": "New hits for your alerts",
            "text": render_email_text(hits),
            "html": render_email_html(hits),
        });

        let response = self
            .client
            .post(&self.config.mailer_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| SearchError::Transport {
                operation: "send_alert_email".to_string(),
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SearchError::Transport {
                operation: "send_alert_email".to_string(),
                details: format!("mailer returned status {}", response.status()),
            });
        }
        Ok(())
    }

    async fn send_webhook(
        &self,
        documents: &[Value],
        subscription: &WebhookSubscription,
        alert: &Alert,
    ) -> Result<()> {
        let payload = json!({
            "webhook": {
                "event_type": subscription.event_type,
                "version": subscription.version,
                "date_created": Utc::now().to_rfc3339(),
            },
            "payload": {
                "alert_id": alert.id,
                "results": documents,
            },
        });

        let response = self
            .client
            .post(&subscription.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SearchError::Transport {
                operation: "send_webhook".to_string(),
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SearchError::Transport {
                operation: "send_webhook".to_string(),
                details: format!(
                    "webhook {} returned status {}",
                    subscription.url,
                    response.status()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Rate, SearchType};
    use uuid::Uuid;

    fn sample_hit() -> Hit {
        let alert = Alert::new(
            Uuid::new_v4(),
            "owner@example.com",
            "smith oa",
            "type=oa&q=Smith",
            Rate::RealTime,
        );
        Hit {
            alert,
            search_type: SearchType::OralArgument,
            documents: vec![json!({
                "caseName": "<strong>Smith</strong> v. Jones",
                "docketNumber": "21-123",
            })],
            count: 1,
        }
    }

    #[test]
    fn text_body_lists_alerts_and_documents() {
        let body = render_email_text(&[sample_hit()]);
        assert!(body.contains("smith oa (1 new result)"));
        assert!(body.contains("Docket: 21-123"));
    }

    #[test]
    fn html_body_keeps_highlight_tags() {
        let body = render_email_html(&[sample_hit()]);
        assert!(body.contains("<strong>Smith</strong>"));
    }

    #[tokio::test]
    async fn webhook_payload_carries_event_envelope() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(NotificationsConfig {
            mailer_url: format!("{}/send", server.uri()),
            from_email: "alerts@legal-search.example".to_string(),
            delivery_timeout_seconds: 2,
        })
        .unwrap();

        let hit = sample_hit();
        let subscription = WebhookSubscription {
            id: Uuid::new_v4(),
            user_id: hit.alert.user_id,
            url: format!("{}/hook", server.uri()),
            event_type: crate::WebhookEventType::SearchAlert,
            enabled: true,
            version: 2,
        };
        notifier
            .send_webhook(&hit.documents, &subscription, &hit.alert)
            .await
            .unwrap();
    }
}
