//! Paced delivery of encoded frames to the device.
//!
//! Devices hold a small jitter buffer, so frames cannot be written as fast as
//! the backend produces audio. The sender bursts the first
//! [`PRE_BUFFER_FRAMES`] frames of an utterance and then releases one frame per
//! frame duration, anchored to the start of playback so timer drift does not
//! accumulate.
//!
//! Playback indications share the frame queue, which keeps a `stop` behind the
//! last frame of its utterance. [`PacedSender::reset`] discards everything
//! queued so far.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use super::turn::AbortSignal;

/// Frames written back-to-back when an utterance starts.
pub const PRE_BUFFER_FRAMES: u32 = 3;

/// Playback boundary sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackIndication {
    Start,
    Stop,
}

impl PlaybackIndication {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackIndication::Start => "start",
            PlaybackIndication::Stop => "stop",
        }
    }
}

/// Everything a session writes to its device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutput {
    Playback(PlaybackIndication),
    Audio(Bytes),
}

enum Paced {
    Frame { opus: Bytes, duration: Duration },
    Indication(PlaybackIndication),
}

struct Queued {
    epoch: u64,
    item: Paced,
}

/// Playback timeline of the current utterance.
struct PlaybackClock {
    start: Instant,
    sent: u32,
}

impl PlaybackClock {
    fn starting_at(start: Instant) -> Self {
        Self { start, sent: 0 }
    }

    /// When the next frame is due, or `None` while still pre-buffering.
    ///
    /// If the device has played everything it was given, the timeline
    /// restarts and the next frames are burst again.
    fn next_due(&mut self, duration: Duration, now: Instant) -> Option<Instant> {
        if self.sent < PRE_BUFFER_FRAMES {
            return None;
        }

        let due = self.start + duration * (self.sent - PRE_BUFFER_FRAMES + 1);
        if now > due + duration * PRE_BUFFER_FRAMES {
            trace!("Device playback ran dry, restarting pacing clock");
            *self = Self::starting_at(now);
            return None;
        }
        Some(due)
    }
}

/// Handle to a per-session pacing task.
pub struct PacedSender {
    queue: Option<mpsc::UnboundedSender<Queued>>,
    epoch: Arc<AtomicU64>,
    flushed: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PacedSender {
    /// Spawn the pacing task writing into `device`.
    ///
    /// Frames queued while `abort` is set are dropped; indications are not.
    pub fn spawn(device: mpsc::Sender<DeviceOutput>, abort: AbortSignal) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));
        let flushed = Arc::new(Notify::new());

        let task = tokio::spawn(run(
            rx,
            device,
            Arc::clone(&epoch),
            Arc::clone(&flushed),
            abort,
        ));

        Self {
            queue: Some(tx),
            epoch,
            flushed,
            task: Some(task),
        }
    }

    /// Queue one encoded frame.
    pub fn send_frame(&self, opus: Bytes, duration: Duration) {
        self.enqueue(Paced::Frame { opus, duration });
    }

    /// Queue a playback indication behind any frames already queued.
    pub fn indicate(&self, indication: PlaybackIndication) {
        self.enqueue(Paced::Indication(indication));
    }

    /// Drop everything queued and restart the pacing clock.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.flushed.notify_waiters();
    }

    /// Stop the pacing task, discarding queued output.
    pub async fn shutdown(&mut self) {
        self.reset();
        self.queue.take();
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                debug!("Paced sender task ended with error: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn enqueue(&self, item: Paced) {
        let Some(queue) = &self.queue else {
            trace!("Paced sender already shut down, dropping output");
            return;
        };
        let epoch = self.epoch.load(Ordering::SeqCst);
        if queue.send(Queued { epoch, item }).is_err() {
            trace!("Paced sender task gone, dropping output");
        }
    }
}

impl Drop for PacedSender {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    mut queue: mpsc::UnboundedReceiver<Queued>,
    device: mpsc::Sender<DeviceOutput>,
    epoch: Arc<AtomicU64>,
    flushed: Arc<Notify>,
    abort: AbortSignal,
) {
    let mut clock: Option<PlaybackClock> = None;
    let mut clock_epoch = u64::MAX;

    while let Some(Queued {
        epoch: item_epoch,
        item,
    }) = queue.recv().await
    {
        // Registered before the epoch check so a reset in between still wakes us
        let flush = flushed.notified();
        tokio::pin!(flush);

        if item_epoch != epoch.load(Ordering::SeqCst) {
            continue;
        }
        if item_epoch != clock_epoch {
            clock = None;
            clock_epoch = item_epoch;
        }

        let output = match item {
            Paced::Indication(indication) => DeviceOutput::Playback(indication),
            Paced::Frame { opus, duration } => {
                if abort.is_set() {
                    continue;
                }

                let now = Instant::now();
                let timeline = clock.get_or_insert_with(|| PlaybackClock::starting_at(now));
                if let Some(due) = timeline.next_due(duration, now) {
                    tokio::select! {
                        _ = sleep_until(due) => {}
                        _ = &mut flush => {}
                    }
                    if item_epoch != epoch.load(Ordering::SeqCst) || abort.is_set() {
                        continue;
                    }
                }
                timeline.sent += 1;
                DeviceOutput::Audio(opus)
            }
        };

        if device.send(output).await.is_err() {
            debug!("Device output closed, stopping paced sender");
            break;
        }
    }
}
