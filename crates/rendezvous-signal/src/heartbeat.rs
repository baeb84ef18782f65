//! Operator channel keepalive
//!
//! Proxies drop WebSockets that stay idle, and an operator may sit in a room
//! for minutes before anyone joins. A `beat` frame goes out every interval
//! until the heartbeat is stopped or dropped.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::channel::ChannelHandle;
use crate::error::RelayError;
use crate::messages::SignalMessage;

/// Running heartbeat task; stops when dropped
#[derive(Debug)]
pub struct Heartbeat {
    quit: Option<oneshot::Sender<()>>,
}

impl Heartbeat {
    /// Spawn a task pushing `beat` onto `channel` every `period`
    pub fn start(channel: ChannelHandle, period: Duration) -> Self {
        let (quit_tx, mut quit_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Never wait on the queue: a slow socket must not hold up the timer.
                        match channel.try_send(SignalMessage::beat()) {
                            Ok(()) => {}
                            Err(RelayError::QueueFull) => debug!("Heartbeat skipped, queue full"),
                            Err(_) => break,
                        }
                    }
                    _ = &mut quit_rx => break,
                }
            }
            debug!("Heartbeat stopped");
        });

        Self {
            quit: Some(quit_tx),
        }
    }

    pub fn stop(&mut self) {
        if let Some(quit) = self.quit.take() {
            let _ = quit.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.quit.as_ref().is_some_and(|q| !q.is_closed())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
