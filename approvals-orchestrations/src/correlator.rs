//! External Event Correlator
//!
//! Matches externally raised events to the instance waiting for them. The
//! in-memory waiter table is an index over history: a waiter is armed when
//! `WaiterRegistered` is written and claimed out of the table before
//! `EventRaised` or `WaiterAbandoned` is written, so a raise is observed by
//! the orchestration at most once.
//!
//! The table lock only guards the map and is never held across store I/O.
//! Callers serialize operations on the same instance; the engine does so
//! with its per-instance lock.

use std::collections::HashMap;
use std::sync::Arc;

use approvals_models::{HistoryEvent, PendingEventWaiter};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{CorrelatorError, StoreError};
use crate::store::InstanceStore;

type WaiterKey = (String, String);

fn key_of(waiter: &PendingEventWaiter) -> WaiterKey {
    (waiter.instance_id.clone(), waiter.event_name.clone())
}

/// Result of an expiry sweep. Waiters whose abandonment could not be
/// recorded stay armed and are picked up by the next sweep.
#[derive(Debug, Default)]
pub struct ExpiredWaiters {
    pub abandoned: Vec<PendingEventWaiter>,
    pub errors: Vec<CorrelatorError>,
}

pub struct EventCorrelator {
    store: Arc<dyn InstanceStore>,
    waiters: Mutex<HashMap<WaiterKey, PendingEventWaiter>>,
}

impl EventCorrelator {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self {
            store,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Records `WaiterRegistered` and arms the waiter.
    pub async fn register(
        &self,
        instance_id: &str,
        seq: u32,
        event_name: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<PendingEventWaiter, CorrelatorError> {
        let waiter = PendingEventWaiter {
            instance_id: instance_id.to_string(),
            event_name: event_name.to_string(),
            seq,
            deadline,
        };
        let key = key_of(&waiter);

        {
            let mut waiters = self.waiters.lock().await;
            if waiters.contains_key(&key) {
                return Err(CorrelatorError::WaiterExists {
                    instance_id: instance_id.to_string(),
                    event_name: event_name.to_string(),
                });
            }
            waiters.insert(key.clone(), waiter.clone());
        }

        let recorded = self
            .store
            .append_history(
                instance_id,
                HistoryEvent::WaiterRegistered {
                    seq,
                    name: event_name.to_string(),
                    deadline,
                },
            )
            .await;

        if let Err(e) = recorded {
            self.waiters.lock().await.remove(&key);
            return Err(e.into());
        }

        tracing::debug!(instance_id, event = event_name, seq, "Waiter registered");
        Ok(waiter)
    }

    /// Re-arms a waiter reloaded from history. Writes nothing.
    pub async fn restore(&self, waiter: PendingEventWaiter) {
        let mut waiters = self.waiters.lock().await;
        let key = key_of(&waiter);
        if !waiters.contains_key(&key) {
            tracing::debug!(
                instance_id = %waiter.instance_id,
                event = %waiter.event_name,
                "Waiter restored from history"
            );
            waiters.insert(key, waiter);
        }
    }

    /// Delivers `payload` to the instance waiting for `event_name`.
    pub async fn raise(
        &self,
        instance_id: &str,
        event_name: &str,
        payload: Value,
    ) -> Result<PendingEventWaiter, CorrelatorError> {
        let waiter = self.take_waiter(instance_id, event_name).await?;

        let recorded = self
            .store
            .append_history(
                instance_id,
                HistoryEvent::EventRaised {
                    seq: waiter.seq,
                    name: event_name.to_string(),
                    payload,
                },
            )
            .await;

        if let Err(e) = recorded {
            self.rearm(waiter).await;
            return Err(e.into());
        }

        tracing::info!(instance_id, event = event_name, seq = waiter.seq, "Event raised");
        Ok(waiter)
    }

    /// Operator action: drops whatever the instance is waiting for.
    pub async fn abandon(&self, instance_id: &str, reason: &str) -> Result<PendingEventWaiter, CorrelatorError> {
        let armed = {
            let mut waiters = self.waiters.lock().await;
            let key = waiters.keys().find(|(id, _)| id == instance_id).cloned();
            key.and_then(|key| waiters.remove(&key))
        };

        let waiter = match armed {
            Some(waiter) => waiter,
            None => self.stored_waiter(instance_id).await?.ok_or_else(|| {
                CorrelatorError::NoSuchInstance {
                    instance_id: instance_id.to_string(),
                    event_name: "*".to_string(),
                }
            })?,
        };

        self.record_abandon(waiter, reason).await
    }

    /// Abandons every waiter whose deadline is at or before `now`. A failed
    /// write does not stop the sweep.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> ExpiredWaiters {
        let due: Vec<PendingEventWaiter> = {
            let mut waiters = self.waiters.lock().await;
            let keys: Vec<WaiterKey> = waiters
                .iter()
                .filter(|(_, w)| w.deadline.is_some_and(|d| d <= now))
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter().filter_map(|k| waiters.remove(k)).collect()
        };

        let mut expired = ExpiredWaiters::default();
        for waiter in due {
            match self.record_abandon(waiter, "deadline exceeded").await {
                Ok(waiter) => expired.abandoned.push(waiter),
                Err(e) => expired.errors.push(e),
            }
        }
        expired
    }

    /// Live waiters, ordered by instance id
    pub async fn pending(&self) -> Vec<PendingEventWaiter> {
        let mut pending: Vec<_> = self.waiters.lock().await.values().cloned().collect();
        pending.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        pending
    }

    async fn record_abandon(
        &self,
        waiter: PendingEventWaiter,
        reason: &str,
    ) -> Result<PendingEventWaiter, CorrelatorError> {
        let recorded = self
            .store
            .append_history(
                &waiter.instance_id,
                HistoryEvent::WaiterAbandoned {
                    seq: waiter.seq,
                    name: waiter.event_name.clone(),
                    reason: reason.to_string(),
                },
            )
            .await;

        if let Err(e) = recorded {
            tracing::error!(
                instance_id = %waiter.instance_id,
                event = %waiter.event_name,
                "Failed to record abandoned waiter: {}",
                e
            );
            self.rearm(waiter).await;
            return Err(e.into());
        }

        tracing::warn!(
            instance_id = %waiter.instance_id,
            event = %waiter.event_name,
            reason,
            "Waiter abandoned"
        );
        Ok(waiter)
    }

    async fn rearm(&self, waiter: PendingEventWaiter) {
        self.waiters.lock().await.insert(key_of(&waiter), waiter);
    }

    /// Claims the armed waiter, falling back to history for waiters this
    /// process has not restored yet.
    async fn take_waiter(&self, instance_id: &str, event_name: &str) -> Result<PendingEventWaiter, CorrelatorError> {
        let key = (instance_id.to_string(), event_name.to_string());
        if let Some(waiter) = self.waiters.lock().await.remove(&key) {
            return Ok(waiter);
        }

        match self.stored_waiter(instance_id).await? {
            Some(waiter) if waiter.event_name == event_name => Ok(waiter),
            _ => {
                tracing::warn!(instance_id, event = event_name, "No waiter for raised event");
                Err(CorrelatorError::NoSuchInstance {
                    instance_id: instance_id.to_string(),
                    event_name: event_name.to_string(),
                })
            }
        }
    }

    async fn stored_waiter(&self, instance_id: &str) -> Result<Option<PendingEventWaiter>, CorrelatorError> {
        match self.store.load(instance_id).await {
            Ok(instance) => Ok(instance.pending_waiter()),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
