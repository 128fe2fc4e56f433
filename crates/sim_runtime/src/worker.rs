//! The per-container tick worker.
//!
//! One tokio task owns the [`GameLoop`] and processes a sequential inbox of
//! control events, so all tick execution is single-threaded. Auto-advance is
//! an optional interval timer inside the same task; replacing it cancels the
//! previous schedule.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::game_loop::GameLoop;

/// Control events accepted by the tick worker.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Run one tick and reply with the new tick number.
    Advance { reply: oneshot::Sender<i64> },
    /// Start (or replace) the fixed-rate auto-advance timer.
    Play { interval: Duration },
    /// Cancel the auto-advance timer.
    StopTimer,
    /// Stop processing and acknowledge.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Handle to a running tick worker.
#[derive(Debug)]
pub struct WorkerHandle {
    inbox: mpsc::UnboundedSender<WorkerEvent>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// The inbox for submitting control events.
    #[must_use]
    pub fn inbox(&self) -> mpsc::UnboundedSender<WorkerEvent> {
        self.inbox.clone()
    }

    /// The task handle, for awaiting termination.
    pub fn join(self) -> JoinHandle<()> {
        self.join
    }
}

/// Spawn the tick worker for a container.
#[must_use]
pub fn spawn(mut game_loop: GameLoop) -> WorkerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<WorkerEvent>();
    let join = tokio::spawn(async move {
        let mut timer: Option<tokio::time::Interval> = None;
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        None => break, // container dropped
                        Some(WorkerEvent::Advance { reply }) => {
                            let tick = game_loop.advance_tick();
                            let _ = reply.send(tick);
                        }
                        Some(WorkerEvent::Play { interval }) => {
                            debug!(interval_ms = interval.as_millis() as u64, "auto-advance scheduled");
                            // First fire one full interval from now.
                            let mut new_timer = tokio::time::interval_at(
                                tokio::time::Instant::now() + interval,
                                interval,
                            );
                            new_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                            timer = Some(new_timer);
                        }
                        Some(WorkerEvent::StopTimer) => {
                            debug!("auto-advance cancelled");
                            timer = None;
                        }
                        Some(WorkerEvent::Shutdown { reply }) => {
                            let _ = reply.send(());
                            break;
                        }
                    }
                }
                _ = async { timer.as_mut().expect("guarded by is_some").tick().await }, if timer.is_some() => {
                    game_loop.advance_tick();
                }
            }
        }
        info!("tick worker stopped");
    });
    WorkerHandle { inbox: tx, join }
}
