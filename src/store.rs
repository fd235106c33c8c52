//! # Alert Storage Module
//!
//! ## Purpose
//! Handles persistent storage of alerts, scheduled digest hits, webhook
//! subscriptions and court lookup data using an embedded database.
//!
//! ## Input/Output Specification
//! - **Input**: alerts, percolation matches, webhook registrations
//! - **Output**: persisted records, digest batches, lookup tables
//! - **Storage**: sled embedded database, one tree per record family
//!
//! ## Key Features
//! - Serialized get-or-create of the per-(user, rate) aggregation roots,
//!   so concurrent dispatches cannot create duplicate digest parents
//! - Scheduled hits keyed by rate prefix for efficient digest scans
//! - Optional gzip compression of stored document payloads
//!
//! Document payloads travel as raw JSON strings inside the bincode
//! records; bincode cannot decode self-describing JSON values.

use crate::config::StorageConfig;
use crate::errors::{Result, SearchError};
use crate::{Alert, AlertId, Rate, UserId, WebhookEventType, WebhookSubscription};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// At most one aggregation root per (user, rate) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRateAlert {
    pub id: Uuid,
    pub user_id: UserId,
    pub rate: Rate,
}

/// One aggregation row per (alert, user-rate) pair under a user-rate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentAlert {
    pub id: Uuid,
    pub alert_id: AlertId,
    pub user_rate_id: Uuid,
}

/// Delivery state of a scheduled hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitStatus {
    Scheduled,
    Sent,
}

/// A pending digest notification: one percolation match awaiting batched
/// delivery at the owner's chosen rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledAlertHit {
    pub id: Uuid,
    pub parent_alert_id: Uuid,
    pub alert_id: AlertId,
    pub user_id: UserId,
    pub rate: Rate,
    /// The matched document at the moment it was indexed, as raw JSON
    pub document_content: String,
    /// Alert-tagged highlight fragments keyed by field
    pub highlighted_fields: BTreeMap<String, Vec<String>>,
    pub hit_status: HitStatus,
    pub date_created: DateTime<Utc>,
}

/// Main storage manager for the alert subsystem
pub struct AlertStore {
    config: StorageConfig,
    db: sled::Db,
    alerts: sled::Tree,
    user_rates: sled::Tree,
    parent_alerts: sled::Tree,
    scheduled_hits: sled::Tree,
    webhooks: sled::Tree,
    courts: sled::Tree,
    /// Per-(user, rate) locks serializing the digest get-or-create path
    rate_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AlertStore {
    /// Open (or create) the store at the configured path.
    pub fn new(config: StorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(&config.db_path)?;
        let alerts = db.open_tree("alerts")?;
        let user_rates = db.open_tree("user_rate_alerts")?;
        let parent_alerts = db.open_tree("parent_alerts")?;
        let scheduled_hits = db.open_tree("scheduled_hits")?;
        let webhooks = db.open_tree("webhooks")?;
        let courts = db.open_tree("courts")?;

        tracing::info!(
            "Alert store opened at {:?} with {} alerts",
            config.db_path,
            alerts.len()
        );

        Ok(Self {
            config,
            db,
            alerts,
            user_rates,
            parent_alerts,
            scheduled_hits,
            webhooks,
            courts,
            rate_locks: DashMap::new(),
        })
    }

    // ---- alerts -----------------------------------------------------------

    pub fn save_alert(&self, alert: &Alert) -> Result<()> {
        let bytes = bincode::serialize(alert)?;
        self.alerts.insert(alert.id.to_string().as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>> {
        match self.alerts.get(alert_id.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete_alert(&self, alert_id: AlertId) -> Result<Option<Alert>> {
        match self.alerts.remove(alert_id.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_alerts(&self) -> Result<Vec<Alert>> {
        let mut alerts = Vec::new();
        for entry in self.alerts.iter() {
            let (_, bytes) = entry?;
            alerts.push(bincode::deserialize(&bytes)?);
        }
        Ok(alerts)
    }

    /// Stamp the time of last trigger on a set of alerts.
    pub fn touch_date_last_hit(&self, alert_ids: &[AlertId], when: DateTime<Utc>) -> Result<()> {
        for alert_id in alert_ids {
            if let Some(mut alert) = self.get_alert(*alert_id)? {
                alert.date_last_hit = Some(when);
                self.save_alert(&alert)?;
            }
        }
        Ok(())
    }

    // ---- digest aggregation roots ----------------------------------------

    fn user_rate_key(user_id: UserId, rate: Rate) -> String {
        format!("{}:{}", user_id, rate.as_code())
    }

    fn parent_key(user_id: UserId, rate: Rate, alert_id: AlertId) -> String {
        format!("{}:{}:{}", user_id, rate.as_code(), alert_id)
    }

    fn lock_for(&self, user_id: UserId, rate: Rate) -> Arc<Mutex<()>> {
        self.rate_locks
            .entry(Self::user_rate_key(user_id, rate))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist one scheduled hit for a non-real-time alert match.
    ///
    /// The `UserRateAlert` and `ParentAlert` rows are get-or-created under
    /// a per-(user, rate) lock: concurrent percolation matches for the
    /// same pair serialize here instead of racing to create duplicate
    /// aggregation roots.
    pub async fn schedule_hit(
        &self,
        alert: &Alert,
        document_content: &serde_json::Value,
        highlighted_fields: &BTreeMap<String, Vec<String>>,
    ) -> Result<ScheduledAlertHit> {
        let lock = self.lock_for(alert.user_id, alert.rate);
        let _guard = lock.lock().await;

        let user_rate_key = Self::user_rate_key(alert.user_id, alert.rate);
        let user_rate = match self.user_rates.get(user_rate_key.as_bytes())? {
            Some(bytes) => bincode::deserialize::<UserRateAlert>(&bytes)?,
            None => {
                let row = UserRateAlert {
                    id: Uuid::new_v4(),
                    user_id: alert.user_id,
                    rate: alert.rate,
                };
                self.user_rates
                    .insert(user_rate_key.as_bytes(), bincode::serialize(&row)?)?;
                row
            }
        };

        let parent_key = Self::parent_key(alert.user_id, alert.rate, alert.id);
        let parent = match self.parent_alerts.get(parent_key.as_bytes())? {
            Some(bytes) => bincode::deserialize::<ParentAlert>(&bytes)?,
            None => {
                let row = ParentAlert {
                    id: Uuid::new_v4(),
                    alert_id: alert.id,
                    user_rate_id: user_rate.id,
                };
                self.parent_alerts
                    .insert(parent_key.as_bytes(), bincode::serialize(&row)?)?;
                row
            }
        };

        let hit = ScheduledAlertHit {
            id: Uuid::new_v4(),
            parent_alert_id: parent.id,
            alert_id: alert.id,
            user_id: alert.user_id,
            rate: alert.rate,
            document_content: document_content.to_string(),
            highlighted_fields: highlighted_fields.clone(),
            hit_status: HitStatus::Scheduled,
            date_created: Utc::now(),
        };
        let key = format!(
            "{}/{}/{}/{}",
            alert.rate.as_code(),
            alert.user_id,
            alert.id,
            hit.id
        );
        self.scheduled_hits
            .insert(key.as_bytes(), self.encode_hit(&hit)?)?;
        Ok(hit)
    }

    fn encode_hit(&self, hit: &ScheduledAlertHit) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(hit)?;
        if !self.config.enable_compression {
            return Ok(bytes);
        }
        use std::io::Write;
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&bytes)?;
        Ok(encoder.finish()?)
    }

    fn decode_hit(&self, bytes: &[u8]) -> Result<ScheduledAlertHit> {
        if !self.config.enable_compression {
            return Ok(bincode::deserialize(bytes)?);
        }
        use std::io::Read;
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(bincode::deserialize(&decompressed)?)
    }

    /// All scheduled hits for a rate in the given status.
    pub fn scheduled_hits_for_rate(
        &self,
        rate: Rate,
        status: HitStatus,
    ) -> Result<Vec<ScheduledAlertHit>> {
        let prefix = format!("{}/", rate.as_code());
        let mut hits = Vec::new();
        for entry in self.scheduled_hits.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = entry?;
            let hit = self.decode_hit(&bytes)?;
            if hit.hit_status == status {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    /// Flip a batch of hits to SENT.
    pub fn mark_hits_sent(&self, hits: &[ScheduledAlertHit]) -> Result<()> {
        for hit in hits {
            let key = format!(
                "{}/{}/{}/{}",
                hit.rate.as_code(),
                hit.user_id,
                hit.alert_id,
                hit.id
            );
            let mut updated = hit.clone();
            updated.hit_status = HitStatus::Sent;
            self.scheduled_hits
                .insert(key.as_bytes(), self.encode_hit(&updated)?)?;
        }
        Ok(())
    }

    /// Delete SENT hits older than the retention window and never-sent
    /// hits older than twice the window. Returns the number removed.
    pub fn purge_old_hits(&self, retention_days: i64) -> Result<usize> {
        let sent_cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let scheduled_cutoff = Utc::now() - chrono::Duration::days(2 * retention_days);
        let mut removed = 0;
        for entry in self.scheduled_hits.iter() {
            let (key, bytes) = entry?;
            let hit = self.decode_hit(&bytes)?;
            let expired = match hit.hit_status {
                HitStatus::Sent => hit.date_created < sent_cutoff,
                HitStatus::Scheduled => hit.date_created < scheduled_cutoff,
            };
            if expired {
                self.scheduled_hits.remove(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn user_rate_alerts(&self) -> Result<Vec<UserRateAlert>> {
        let mut rows = Vec::new();
        for entry in self.user_rates.iter() {
            let (_, bytes) = entry?;
            rows.push(bincode::deserialize(&bytes)?);
        }
        Ok(rows)
    }

    pub fn parent_alerts(&self) -> Result<Vec<ParentAlert>> {
        let mut rows = Vec::new();
        for entry in self.parent_alerts.iter() {
            let (_, bytes) = entry?;
            rows.push(bincode::deserialize(&bytes)?);
        }
        Ok(rows)
    }

    // ---- webhooks ---------------------------------------------------------

    pub fn save_webhook(&self, webhook: &WebhookSubscription) -> Result<()> {
        let key = format!("{}:{}", webhook.user_id, webhook.id);
        self.webhooks
            .insert(key.as_bytes(), bincode::serialize(webhook)?)?;
        Ok(())
    }

    /// Enabled webhook subscriptions of the given type for a user.
    pub fn webhooks_for_user(
        &self,
        user_id: UserId,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookSubscription>> {
        let prefix = format!("{}:", user_id);
        let mut subscriptions = Vec::new();
        for entry in self.webhooks.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = entry?;
            let webhook: WebhookSubscription = bincode::deserialize(&bytes)?;
            if webhook.enabled && webhook.event_type == event_type {
                subscriptions.push(webhook);
            }
        }
        Ok(subscriptions)
    }

    // ---- court lookup -----------------------------------------------------

    pub fn save_court(&self, court_id: &str, citation_string: &str) -> Result<()> {
        self.courts
            .insert(court_id.as_bytes(), citation_string.as_bytes())?;
        Ok(())
    }

    /// Citation strings for a set of court ids. Missing courts are simply
    /// absent from the result.
    pub fn court_names(&self, court_ids: &[String]) -> Result<BTreeMap<String, String>> {
        let mut names = BTreeMap::new();
        for court_id in court_ids {
            if let Some(bytes) = self.courts.get(court_id.as_bytes())? {
                let name = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    SearchError::Internal {
                        message: format!("Corrupt court name for '{}': {}", court_id, e),
                    }
                })?;
                names.insert(court_id.clone(), name);
            }
        }
        Ok(names)
    }

    // ---- maintenance ------------------------------------------------------

    /// Test basic database operations.
    pub fn health_check(&self) -> Result<()> {
        let test_key = b"health_check";
        self.alerts.insert(test_key, b"ok".as_ref())?;
        if self.alerts.get(test_key)?.is_none() {
            return Err(SearchError::Internal {
                message: "Health check value not found".to_string(),
            });
        }
        self.alerts.remove(test_key)?;
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            alerts: self.alerts.len(),
            scheduled_hits: self.scheduled_hits.len(),
            webhooks: self.webhooks.len(),
            database_size_bytes: self.db.size_on_disk().unwrap_or(0),
        }
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

/// Storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub alerts: usize,
    pub scheduled_hits: usize,
    pub webhooks: usize,
    pub database_size_bytes: u64,
}
