//! Command dispatch and acknowledgment correlation

use super::rate_limit::RateLimiter;
use crate::error::{CoordinatorError, Result};
use crate::transport::Publisher;
use resqterra_shared::{codec, topics, AckMessage, CommandMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a dispatch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Fire-and-forget command handed to the transport
    Sent,
    /// The vehicle acknowledged the command
    Acked {
        cmd_id: String,
        status: Option<String>,
    },
}

/// A sent command awaiting its acknowledgment
#[derive(Debug)]
struct PendingCommand {
    callsign: String,
    cmd: String,
    issued_at: Instant,
    /// Single-assignment completion: whoever removes the entry resolves it
    resolve: oneshot::Sender<Option<String>>,
}

/// Sends commands to vehicles and matches acknowledgments to them
pub struct CommandTracker {
    publisher: Arc<dyn Publisher>,
    limiter: Mutex<RateLimiter>,
    /// Pending commands by command id
    pending: Arc<Mutex<HashMap<String, PendingCommand>>>,
}

impl CommandTracker {
    pub fn new(publisher: Arc<dyn Publisher>, min_interval: Duration) -> Self {
        Self {
            publisher,
            limiter: Mutex::new(RateLimiter::new(min_interval)),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Send a command to a vehicle.
    ///
    /// Without `require_ack` the call returns as soon as the command is handed
    /// to the transport. With it, the command is tagged with a fresh id and the
    /// call waits for the matching acknowledgment or `timeout`, whichever comes
    /// first. Either way the pending record is gone when this returns, and
    /// a caller that stops waiting leaves it to expire at the deadline.
    pub async fn dispatch(
        &self,
        callsign: &str,
        command: CommandMessage,
        require_ack: bool,
        timeout: Duration,
    ) -> Result<DispatchOutcome> {
        self.limiter
            .lock()
            .await
            .try_acquire(callsign, Instant::now())
            .map_err(|retry_after| {
                warn!(callsign, cmd = %command.cmd, ?retry_after, "Command rate limited");
                CoordinatorError::RateLimited {
                    callsign: callsign.to_string(),
                    retry_after,
                }
            })?;

        if !require_ack {
            self.send(callsign, &command).await?;
            debug!(callsign, cmd = %command.cmd, "Sent command");
            return Ok(DispatchOutcome::Sent);
        }

        let cmd_id = Uuid::new_v4().to_string();
        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().await.insert(
            cmd_id.clone(),
            PendingCommand {
                callsign: callsign.to_string(),
                cmd: command.cmd.clone(),
                issued_at: Instant::now(),
                resolve: tx,
            },
        );

        let expiry = self.spawn_expiry(cmd_id.clone(), timeout);

        let command = command.tagged(cmd_id.clone());
        if let Err(e) = self.send(callsign, &command).await {
            expiry.abort();
            self.pending.lock().await.remove(&cmd_id);
            return Err(e);
        }
        info!(callsign, cmd = %command.cmd, cmd_id = %cmd_id, "Sent command, awaiting ack");

        let waited = tokio::time::timeout(timeout, &mut rx).await;
        expiry.abort();
        match waited {
            Ok(Ok(status)) => Ok(DispatchOutcome::Acked { cmd_id, status }),
            // Sender dropped without resolving: treat like a missed deadline
            Ok(Err(_)) => Err(self.timed_out(callsign, cmd_id, timeout)),
            Err(_elapsed) => {
                if self.pending.lock().await.remove(&cmd_id).is_some() {
                    return Err(self.timed_out(callsign, cmd_id, timeout));
                }
                // An ack removed the record between the deadline and our cleanup
                match rx.try_recv() {
                    Ok(status) => Ok(DispatchOutcome::Acked { cmd_id, status }),
                    Err(_) => Err(self.timed_out(callsign, cmd_id, timeout)),
                }
            }
        }
    }

    /// Match an acknowledgment to its pending command.
    ///
    /// Returns false for unknown or late acknowledgments, which are discarded.
    pub async fn resolve(&self, callsign: &str, ack: &AckMessage) -> bool {
        let Some(pending) = self.pending.lock().await.remove(&ack.cmd_id) else {
            debug!(callsign, cmd_id = %ack.cmd_id, "Discarding ack for unknown or expired command");
            return false;
        };

        if pending.callsign != callsign {
            warn!(
                cmd_id = %ack.cmd_id,
                expected = %pending.callsign,
                from = callsign,
                "Ack arrived from a different vehicle than the command target"
            );
        }
        info!(
            callsign = %pending.callsign,
            cmd = %pending.cmd,
            cmd_id = %ack.cmd_id,
            status = ?ack.status,
            latency_ms = pending.issued_at.elapsed().as_millis() as u64,
            "Command acknowledged"
        );
        // The waiter may have given up already; nothing to do then
        let _ = pending.resolve.send(ack.status.clone());
        true
    }

    /// Number of commands still waiting for an acknowledgment
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Pending commands for one vehicle
    pub async fn pending_count_for(&self, callsign: &str) -> usize {
        self.pending
            .lock()
            .await
            .values()
            .filter(|c| c.callsign == callsign)
            .count()
    }

    /// Drop the pending record at the deadline, whether or not anyone still waits
    fn spawn_expiry(&self, cmd_id: String, timeout: Duration) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(expired) = pending.lock().await.remove(&cmd_id) {
                debug!(callsign = %expired.callsign, cmd = %expired.cmd, cmd_id = %cmd_id, "Expired unanswered command");
            }
        })
    }

    async fn send(&self, callsign: &str, command: &CommandMessage) -> Result<()> {
        let payload = codec::encode(command)?;
        self.publisher
            .publish(&topics::command(callsign), payload)
            .await?;
        Ok(())
    }

    fn timed_out(&self, callsign: &str, cmd_id: String, timeout: Duration) -> CoordinatorError {
        warn!(callsign, cmd_id = %cmd_id, ?timeout, "Command ack timed out");
        CoordinatorError::AckTimeout {
            callsign: callsign.to_string(),
            cmd_id,
            timeout,
        }
    }
}
