//! Scheduling for a tracker while its view is mounted.
//!
//! `PlaybackSession` moves a [`ProgressTracker`] onto a task that owns it
//! exclusively. The task reacts to media events, saves on a fixed interval
//! while the tracker is ready, and serves manual flush / switch requests.
//! When the session is closed or dropped the task performs one final flush
//! and exits, releasing the timer and listeners with it.

use std::sync::Arc;
use std::time::Duration;

use progress_core::model::VideoId;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::TrackerError;
use crate::media::MediaEvent;
use crate::tracker::{FlushOutcome, ProgressTracker, SkipReason, TrackerState};

const EVENT_BUFFER: usize = 32;
const COMMAND_BUFFER: usize = 8;

/// Snapshot of tracker state published to views.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerStatus {
    pub loaded: bool,
    pub error: Option<String>,
    pub state: TrackerState,
}

impl TrackerStatus {
    fn of(tracker: &ProgressTracker) -> Self {
        Self {
            loaded: tracker.progress_loaded(),
            error: tracker.progress_error().map(str::to_owned),
            state: tracker.state().clone(),
        }
    }
}

enum Command {
    Flush(oneshot::Sender<FlushOutcome>),
    SwitchTarget(VideoId, oneshot::Sender<Result<(), TrackerError>>),
    Close(oneshot::Sender<FlushOutcome>),
}

/// Handle to a running tracker task.
pub struct PlaybackSession {
    events: mpsc::Sender<MediaEvent>,
    /// Pause and unload requests; coalesced, never dropped.
    flush_requests: Arc<Notify>,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<TrackerStatus>,
    task: JoinHandle<()>,
}

impl PlaybackSession {
    /// Spawn the tracker task on the current tokio runtime.
    ///
    /// The tracker stays idle until a `MediaEvent::MetadataLoaded` arrives.
    #[must_use]
    pub fn start(tracker: ProgressTracker, save_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(TrackerStatus::of(&tracker));
        let flush_requests = Arc::new(Notify::new());

        let task = tokio::spawn(drive(
            tracker,
            save_interval,
            events_rx,
            Arc::clone(&flush_requests),
            commands_rx,
            status_tx,
        ));

        Self {
            events: events_tx,
            flush_requests,
            commands: commands_tx,
            status: status_rx,
            task,
        }
    }

    /// Forward a media or window event. Returns `false` if it was dropped.
    ///
    /// Pause and unload only request a flush. Requests made before the task
    /// gets to them collapse into one, so they are never dropped.
    pub fn notify(&self, event: MediaEvent) -> bool {
        match event {
            MediaEvent::Pause | MediaEvent::BeforeUnload => {
                self.flush_requests.notify_one();
                true
            }
            MediaEvent::MetadataLoaded => match self.events.try_send(event) {
                Ok(()) => true,
                Err(err) => {
                    warn!(?event, error = %err, "media event dropped");
                    false
                }
            },
        }
    }

    /// Save progress now, e.g. before navigating away.
    pub async fn save_progress_if_needed(&self) -> FlushOutcome {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(reply)).await.is_err() {
            return FlushOutcome::Skipped(SkipReason::Closed);
        }
        rx.await
            .unwrap_or(FlushOutcome::Skipped(SkipReason::Closed))
    }

    /// Flush the current video, then rebind the tracker to `video_id`.
    ///
    /// # Errors
    ///
    /// Returns the load error for the new video, or
    /// `TrackerError::SessionClosed` if the task has exited.
    pub async fn switch_target(&self, video_id: VideoId) -> Result<(), TrackerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SwitchTarget(video_id, reply))
            .await
            .map_err(|_| TrackerError::SessionClosed)?;
        rx.await.map_err(|_| TrackerError::SessionClosed)?
    }

    #[must_use]
    pub fn status(&self) -> TrackerStatus {
        self.status.borrow().clone()
    }

    /// Receiver that yields every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TrackerStatus> {
        self.status.clone()
    }

    /// Tear down: final flush, stop the timer and wait for the task to exit.
    pub async fn close(self) -> FlushOutcome {
        let (reply, rx) = oneshot::channel();
        let outcome = if self.commands.send(Command::Close(reply)).await.is_ok() {
            rx.await.unwrap_or(FlushOutcome::Skipped(SkipReason::Closed))
        } else {
            FlushOutcome::Skipped(SkipReason::Closed)
        };
        if let Err(err) = self.task.await {
            warn!(error = %err, "playback session task ended abnormally");
        }
        outcome
    }
}

async fn drive(
    mut tracker: ProgressTracker,
    save_interval: Duration,
    mut events: mpsc::Receiver<MediaEvent>,
    flush_requests: Arc<Notify>,
    mut commands: mpsc::Receiver<Command>,
    status: watch::Sender<TrackerStatus>,
) {
    let mut ticker = time::interval_at(Instant::now() + save_interval, save_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let was_ready = tracker.is_ready();

        tokio::select! {
            // Metadata is handled before pending flush requests.
            biased;

            event = events.recv() => match event {
                Some(MediaEvent::MetadataLoaded) => {
                    // Only the first metadata event loads; Errored is terminal.
                    if !tracker.progress_loaded() {
                        let _ = tracker.load().await;
                    }
                }
                Some(MediaEvent::Pause | MediaEvent::BeforeUnload) => {
                    if tracker.is_ready() {
                        tracker.flush().await;
                    }
                }
                None => break,
            },
            () = flush_requests.notified() => {
                if tracker.is_ready() {
                    tracker.flush().await;
                }
            }
            _ = ticker.tick(), if tracker.is_ready() => {
                tracker.flush().await;
            }
            command = commands.recv() => match command {
                Some(Command::Flush(reply)) => {
                    let _ = reply.send(tracker.flush().await);
                }
                Some(Command::SwitchTarget(video_id, reply)) => {
                    let result = tracker.switch_target(video_id).await;
                    // The new target gets a full interval before its first save.
                    if tracker.is_ready() {
                        ticker.reset();
                    }
                    let _ = reply.send(result);
                }
                Some(Command::Close(reply)) => {
                    let outcome = tracker.teardown().await;
                    status.send_replace(TrackerStatus::of(&tracker));
                    debug!(video_id = %tracker.binding().video_id, "playback session closed");
                    let _ = reply.send(outcome);
                    return;
                }
                None => break,
            },
        }

        if !was_ready && tracker.is_ready() {
            ticker.reset();
        }
        status.send_if_modified(|current| {
            let next = TrackerStatus::of(&tracker);
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // Handle dropped without close(): still save what we can.
    tracker.teardown().await;
    status.send_replace(TrackerStatus::of(&tracker));
    debug!(video_id = %tracker.binding().video_id, "playback session dropped");
}
