//! Periodic removal of expired device requests, sessions and login states.
//!
//! Housekeeping only: reads already treat expired rows as expired. A failed
//! deletion is logged and the sweep moves on to the next row.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::repositories::{AuthStateRepository, DeviceRequestRepository, SessionRepository};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub device_requests: u64,
    pub device_request_failures: u64,
    pub sessions: u64,
    pub auth_states: u64,
}

pub struct ExpirySweeper {
    device_requests: Arc<dyn DeviceRequestRepository>,
    sessions: Arc<dyn SessionRepository>,
    auth_states: Arc<dyn AuthStateRepository>,
}

impl ExpirySweeper {
    pub fn new(
        device_requests: Arc<dyn DeviceRequestRepository>,
        sessions: Arc<dyn SessionRepository>,
        auth_states: Arc<dyn AuthStateRepository>,
    ) -> Self {
        Self {
            device_requests,
            sessions,
            auth_states,
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.device_requests.list_expired(now).await {
            Ok(codes) => {
                for code in codes {
                    match self.device_requests.delete(&code).await {
                        Ok(true) => report.device_requests += 1,
                        // Consumed by a poll in the meantime.
                        Ok(false) => {}
                        Err(err) => {
                            report.device_request_failures += 1;
                            tracing::warn!(error = %err, "Failed to delete expired device request");
                        }
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "Failed to list expired device requests"),
        }

        match self.sessions.delete_expired(now).await {
            Ok(count) => report.sessions = count,
            Err(err) => tracing::warn!(error = %err, "Failed to delete expired sessions"),
        }

        match self.auth_states.delete_expired(now).await {
            Ok(count) => report.auth_states = count,
            Err(err) => tracing::warn!(error = %err, "Failed to delete expired login states"),
        }

        if report != SweepReport::default() {
            tracing::info!(
                device_requests = report.device_requests,
                device_request_failures = report.device_request_failures,
                sessions = report.sessions,
                auth_states = report.auth_states,
                "Expiry sweep finished"
            );
        }
        report
    }

    /// Runs [`Self::run_once`] every `interval` until the handle is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once(Utc::now()).await;
            }
        })
    }
}
