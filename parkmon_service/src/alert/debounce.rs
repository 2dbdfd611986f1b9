//! Alert deduplication within a rolling window.
//!
//! An alert is raised for a key only when no unhandled alert for the same
//! key was raised inside the window. Handled alerts never block a new one,
//! so this is "at most one live alert per key per window" rather than rate
//! limiting.
//!
//! # Clock injection
//! Every operation takes `now: DateTime<Utc>` instead of calling
//! `Utc::now()`, which keeps window behaviour deterministic in tests.
//!
//! # Sharing
//! The store is an ordinary value guarded by a mutex. Construct one per
//! process (or per test) and pass it by reference; `try_raise` performs the
//! check and the insert under a single lock.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::logging::{self, Subsystem};
use crate::model::{AlertKey, AlertKind, AlertRecord, MonitorError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning for the alert store, read from the `[debounce]` config table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Suppression window in minutes.
    pub window_minutes: i64,
    /// Oldest records beyond this count are dropped when a key records more.
    pub max_records_per_key: usize,
    /// `sweep` drops records older than this many windows.
    pub retention_multiplier: i32,
    /// Upper bound on the size of an active-alert listing.
    pub list_limit: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window_minutes: 30,
            max_records_per_key: 20,
            retention_multiplier: 4,
            list_limit: 50,
        }
    }
}

/// Longest accepted suppression window: one day.
pub const MAX_WINDOW_MINUTES: i64 = 24 * 60;

/// Longest accepted retention, in windows.
pub const MAX_RETENTION_MULTIPLIER: i32 = 100;

impl DebounceConfig {
    /// Rejects settings that would disable deduplication or overflow
    /// timestamp arithmetic.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.window_minutes) {
            return Err(MonitorError::InvalidDebounce(format!(
                "window_minutes = {} (must be 1..={})",
                self.window_minutes, MAX_WINDOW_MINUTES
            )));
        }
        if !(1..=MAX_RETENTION_MULTIPLIER).contains(&self.retention_multiplier) {
            return Err(MonitorError::InvalidDebounce(format!(
                "retention_multiplier = {} (must be 1..={})",
                self.retention_multiplier, MAX_RETENTION_MULTIPLIER
            )));
        }
        if self.max_records_per_key == 0 {
            return Err(MonitorError::InvalidDebounce(
                "max_records_per_key must be at least 1".to_string(),
            ));
        }
        if self.list_limit == 0 {
            return Err(MonitorError::InvalidDebounce(
                "list_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured window, clamped to the accepted range.
    pub fn window(&self) -> Duration {
        Duration::minutes(self.window_minutes.clamp(1, MAX_WINDOW_MINUTES))
    }

    fn retention(&self) -> Duration {
        self.window() * self.retention_multiplier.clamp(1, MAX_RETENTION_MULTIPLIER)
    }
}

/// `now - span`, saturating at the earliest representable instant.
fn window_start(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Narrows an active-alert listing. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertFilter {
    pub subject_id: Option<String>,
    pub secondary_id: Option<String>,
    pub kind: Option<AlertKind>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn subject(subject_id: &str) -> Self {
        Self {
            subject_id: Some(subject_id.to_string()),
            ..Self::default()
        }
    }

    pub fn kind(kind: AlertKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn matches(&self, key: &AlertKey) -> bool {
        self.subject_id.as_ref().is_none_or(|s| *s == key.subject_id)
            && self
                .secondary_id
                .as_ref()
                .is_none_or(|s| key.secondary_id.as_ref() == Some(s))
            && self.kind.is_none_or(|k| k == key.kind)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory alert history keyed by [`AlertKey`]. Records under a key are
/// kept in insertion order, which is also time order.
#[derive(Debug, Default)]
pub struct AlertDebouncer {
    config: DebounceConfig,
    records: Mutex<HashMap<AlertKey, Vec<AlertRecord>>>,
}

impl AlertDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    /// Configured suppression window.
    pub fn window(&self) -> Duration {
        self.config.window()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AlertKey, Vec<AlertRecord>>> {
        // Every mutation leaves the map consistent, so a poisoned lock is safe to reuse.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `true` when no unhandled record for `key` was raised after
    /// `now - window`. A key with no history always returns `true`.
    pub fn should_raise(&self, key: &AlertKey, now: DateTime<Utc>, window: Duration) -> bool {
        let records = self.lock();
        no_live_record(records.get(key), now, window)
    }

    /// Appends an unhandled record without any dedup check.
    ///
    /// Callers pairing this with [`should_raise`](Self::should_raise) race
    /// against concurrent writers; prefer [`try_raise`](Self::try_raise).
    pub fn record(&self, key: AlertKey, message: impl Into<String>, now: DateTime<Utc>) -> AlertRecord {
        let mut records = self.lock();
        self.push(&mut records, key, message.into(), now)
    }

    /// Raises an alert for `key` unless a live one already exists.
    ///
    /// Returns the new record, or `None` when the alert was suppressed.
    pub fn try_raise(
        &self,
        key: AlertKey,
        message: impl Into<String>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Option<AlertRecord> {
        let mut records = self.lock();
        if !no_live_record(records.get(&key), now, window) {
            logging::debug(
                Subsystem::Alerts,
                Some(&key.to_string()),
                "suppressed: unhandled alert inside window",
            );
            return None;
        }
        let record = self.push(&mut records, key, message.into(), now);
        logging::warn(Subsystem::Alerts, Some(&record.key.to_string()), &record.message);
        Some(record)
    }

    fn push(
        &self,
        records: &mut HashMap<AlertKey, Vec<AlertRecord>>,
        key: AlertKey,
        message: String,
        now: DateTime<Utc>,
    ) -> AlertRecord {
        let record = AlertRecord {
            key: key.clone(),
            raised_at: now,
            message,
            handled: false,
        };
        let history = records.entry(key).or_default();
        history.push(record.clone());

        let cap = self.config.max_records_per_key.max(1);
        if history.len() > cap {
            let excess = history.len() - cap;
            history.drain(..excess);
        }
        record
    }

    /// Marks every record under `key` handled. Returns how many records
    /// changed state.
    pub fn acknowledge(&self, key: &AlertKey) -> usize {
        let mut records = self.lock();
        let changed = records.get_mut(key).map(|h| mark_handled(h)).unwrap_or(0);
        if changed > 0 {
            logging::info(
                Subsystem::Alerts,
                Some(&key.to_string()),
                &format!("acknowledged {} alert(s)", changed),
            );
        }
        changed
    }

    /// Acknowledges the key whose display form equals `key_str`,
    /// e.g. `device_fault_D001`. Returns `None` if no such key is stored.
    pub fn acknowledge_by_name(&self, key_str: &str) -> Option<usize> {
        let key = self.lock().keys().find(|k| k.to_string() == key_str).cloned()?;
        Some(self.acknowledge(&key))
    }

    /// Marks every stored record handled. History is kept for the sweep.
    pub fn acknowledge_all(&self) -> usize {
        let mut records = self.lock();
        let changed: usize = records.values_mut().map(|h| mark_handled(h)).sum();
        logging::info(
            Subsystem::Alerts,
            None,
            &format!("acknowledged all alerts ({} record(s))", changed),
        );
        changed
    }

    /// Unhandled records raised after `now - window`, most recent first.
    pub fn list_active(&self, now: DateTime<Utc>, window: Duration, filter: &AlertFilter) -> Vec<AlertRecord> {
        let cutoff = window_start(now, window);
        let records = self.lock();

        let mut active: Vec<AlertRecord> = records
            .iter()
            .filter(|(key, _)| filter.matches(key))
            .flat_map(|(_, history)| history.iter())
            .filter(|r| !r.handled && r.raised_at > cutoff)
            .cloned()
            .collect();

        active.sort_by(|a, b| b.raised_at.cmp(&a.raised_at));
        if let Some(limit) = filter.limit {
            active.truncate(limit);
        }
        active
    }

    /// Drops records older than the retention horizon and removes keys left
    /// without history. Returns the number of records removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let horizon = window_start(now, self.config.retention());
        let mut records = self.lock();
        let mut removed = 0;

        records.retain(|_, history| {
            let before = history.len();
            history.retain(|r| r.raised_at > horizon);
            removed += before - history.len();
            !history.is_empty()
        });

        if removed > 0 {
            logging::debug(
                Subsystem::Alerts,
                None,
                &format!("swept {} expired alert record(s)", removed),
            );
        }
        removed
    }

    /// Total number of stored records, handled or not.
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn no_live_record(history: Option<&Vec<AlertRecord>>, now: DateTime<Utc>, window: Duration) -> bool {
    let cutoff = window_start(now, window);
    history.is_none_or(|h| !h.iter().any(|r| !r.handled && r.raised_at > cutoff))
}

fn mark_handled(history: &mut [AlertRecord]) -> usize {
    let mut changed = 0;
    for record in history.iter_mut().filter(|r| !r.handled) {
        record.handled = true;
        changed += 1;
    }
    changed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
