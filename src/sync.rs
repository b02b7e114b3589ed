//! The long-poll synchronization loop.
//!
//! A single task alternates between a long-poll check and, when the check
//! reports waiting changes, a fetch of the message batch. Each step is only
//! started after the previous one completed, so at most one request touches
//! the cursor at a time and the cursor needs no lock beyond the session's.

use crate::client::{Client, now_ms};
use crate::error::{SyncError, TransportError};
use crate::types::events::Event;
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use wxcore::endpoints;
use wxcore::message::RawMessage;
use wxcore::net::HttpRequest;
use wxcore::protocol::{SyncCheckOutcome, SyncRequest, SyncResponse, parse_sync_check};
use wxcore::retry::RetryCounter;
use wxcore::session::{SelfUser, new_device_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Check,
    Fetch,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStage::Check => "long-poll check",
            SyncStage::Fetch => "batch fetch",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Running,
    Stopped,
    /// A retry budget ran out; the loop exited and the cursor was left as-is.
    Stalled(SyncStage),
}

/// Next step of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Checking,
    Fetching,
}

pub(crate) struct FetchedBatch {
    pub(crate) self_user: SelfUser,
    pub(crate) messages: Vec<RawMessage>,
}

impl Client {
    /// Runs the sync loop until [`Client::stop`] is called (`Ok`) or a retry
    /// budget is exhausted (`Err(SyncError::Stalled)`).
    pub async fn run_sync(self: &Arc<Self>) -> Result<(), SyncError> {
        if !self.is_logged_in().await {
            return Err(SyncError::NotLoggedIn);
        }
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(target: "Client/Sync", "Sync loop started while already running.");
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = scopeguard::guard((), |_| {
            self.is_running.store(false, Ordering::SeqCst);
        });

        self.sync_status.send_replace(SyncStatus::Running);
        let result = self.sync_loop().await;
        match &result {
            Ok(()) => {
                info!(target: "Client/Sync", "Sync loop stopped.");
                self.sync_status.send_replace(SyncStatus::Stopped);
                self.dispatch_event(Event::SyncStopped);
            }
            Err(SyncError::Stalled {
                stage,
                attempts,
                last_error,
            }) => {
                error!(
                    target: "Client/Sync",
                    "Sync stalled after {attempts} failed {stage} attempts: {last_error}"
                );
                self.sync_status.send_replace(SyncStatus::Stalled(*stage));
                self.dispatch_event(Event::SyncStalled {
                    stage: *stage,
                    attempts: *attempts,
                    reason: last_error.to_string(),
                });
            }
            Err(_) => {}
        }
        result
    }

    async fn sync_loop(self: &Arc<Self>) -> Result<(), SyncError> {
        let warmup = self.config.sync_warmup();
        if !warmup.is_zero() && self.until_stopped(tokio::time::sleep(warmup)).await.is_none() {
            return Ok(());
        }

        let bound = self.config.retry_bound;
        let mut check_retries = RetryCounter::new(bound);
        let mut fetch_retries = RetryCounter::new(bound);
        let mut state = SyncState::Checking;

        loop {
            // Mocked or cached responses can resolve without suspending.
            tokio::task::yield_now().await;
            if self.is_stop_requested() {
                return Ok(());
            }

            state = match state {
                SyncState::Checking => {
                    let Some(outcome) = self.until_stopped(self.sync_check()).await else {
                        return Ok(());
                    };
                    match outcome {
                        Ok(SyncCheckOutcome::NoChange) => {
                            check_retries.reset();
                            SyncState::Checking
                        }
                        Ok(SyncCheckOutcome::HasChanges { selector }) => {
                            check_retries.reset();
                            debug!(target: "Client/Sync", "Changes waiting (selector {selector})");
                            SyncState::Fetching
                        }
                        Err(e) => {
                            if !check_retries.try_consume() {
                                return Err(stalled(SyncStage::Check, bound, e));
                            }
                            warn!(
                                target: "Client/Sync",
                                "Sync check failed: {e}, retries left: {}",
                                check_retries.remaining()
                            );
                            SyncState::Checking
                        }
                    }
                }
                SyncState::Fetching => {
                    let Some(outcome) = self.until_stopped(self.fetch_batch()).await else {
                        return Ok(());
                    };
                    match outcome {
                        Ok(batch) => {
                            fetch_retries.reset();
                            self.classify_and_publish(&batch.self_user, batch.messages);
                            SyncState::Checking
                        }
                        Err(e) => {
                            if !fetch_retries.try_consume() {
                                return Err(stalled(SyncStage::Fetch, bound, e));
                            }
                            warn!(
                                target: "Client/Sync",
                                "Fetching new messages failed: {e}, retries left: {}",
                                fetch_retries.remaining()
                            );
                            SyncState::Fetching
                        }
                    }
                }
            };
        }
    }

    /// One long-poll check with the current cursor.
    async fn sync_check(&self) -> Result<SyncCheckOutcome, TransportError> {
        let url = {
            let guard = self.session.read().await;
            let session = guard.as_ref().ok_or_else(not_logged_in)?;
            endpoints::sync_check(
                &session.base_url,
                &session.credentials,
                &new_device_id(),
                session.sync_key(),
                now_ms(),
            )
        };
        debug!(target: "Client/Sync", "Starting sync check");
        let request = HttpRequest::get(url).with_timeout(self.config.long_poll_timeout());
        let body = self.transport.get_text(request).await?;
        Ok(parse_sync_check(&body)?)
    }

    /// Fetches the waiting batch and swaps in the cursor the server issued.
    async fn fetch_batch(&self) -> Result<FetchedBatch, TransportError> {
        let (url, body) = {
            let guard = self.session.read().await;
            let session = guard.as_ref().ok_or_else(not_logged_in)?;
            let url = endpoints::sync(&session.base_url, &session.credentials);
            let body = SyncRequest {
                base_request: session.base_request(),
                sync_key: session.sync_key().clone(),
                rr: now_ms(),
            };
            (url, body)
        };
        debug!(target: "Client/Sync", "Fetching new messages");
        let response: SyncResponse = self.transport.post_json(url, &body).await?;

        let mut guard = self.session.write().await;
        let session = guard.as_mut().ok_or_else(not_logged_in)?;
        if response.sync_key.is_empty() {
            warn!(target: "Client/Sync", "Server issued an empty cursor");
        }
        session.replace_sync_key(response.sync_key);
        debug!(
            target: "Client/Sync",
            "Fetched {} messages, next cursor {}",
            response.add_msg_list.len(),
            session.sync_key()
        );
        Ok(FetchedBatch {
            self_user: session.self_user.clone(),
            messages: response.add_msg_list,
        })
    }
}

fn not_logged_in() -> TransportError {
    TransportError::Http(anyhow::anyhow!("session was cleared"))
}

/// One initial try plus `bound` retries all failed.
fn stalled(stage: SyncStage, bound: u32, last_error: TransportError) -> SyncError {
    SyncError::Stalled {
        stage,
        attempts: bound + 1,
        last_error,
    }
}
