use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::encoder::Encoder;
use crate::library::TrackData;
use crate::playlist::MasterPlaylist;

/// Per-client channel depth. Bounded so one slow subscriber can't grow
/// memory without limit.
pub const SUBSCRIPTION_QUEUE_CAPACITY: usize = 512;
const EMPTY_PLAYLIST_BACKOFF: Duration = Duration::from_secs(2);
const POST_ERROR_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CurrentTrackInfo {
    pub track: TrackData,
}

/// A listener's view onto the live stream: a bounded byte-chunk queue
/// fed by the broadcast loop.
pub struct Subscription {
    id: u64,
    broadcaster: Arc<Broadcaster>,
    pub rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

/// Runs the continuous encode-and-fan-out loop and holds the registry
/// of live listeners. The only writer of MP3 bytes in the system; every
/// subscriber gets the exact same stream.
pub struct Broadcaster {
    master: Arc<RwLock<MasterPlaylist>>,
    encoder: Encoder,
    subscribers: StdMutex<HashMap<u64, mpsc::Sender<Bytes>>>,
    next_subscriber_id: AtomicU64,
    current_track: StdMutex<Option<CurrentTrackInfo>>,
    skip_requested: Notify,
    max_subscribers: usize,
    queue_capacity: usize,
}

impl Broadcaster {
    pub fn new(
        master: Arc<RwLock<MasterPlaylist>>,
        encoder: Encoder,
        max_subscribers: usize,
    ) -> Arc<Self> {
        Self::with_queue_capacity(master, encoder, max_subscribers, SUBSCRIPTION_QUEUE_CAPACITY)
    }

    /// As `new`, but with an explicit per-subscriber queue depth.
    pub fn with_queue_capacity(
        master: Arc<RwLock<MasterPlaylist>>,
        encoder: Encoder,
        max_subscribers: usize,
        queue_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Broadcaster {
            master,
            encoder,
            subscribers: StdMutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            current_track: StdMutex::new(None),
            skip_requested: Notify::new(),
            max_subscribers,
            queue_capacity,
        })
    }

    /// Registers a new listener, rejecting the connection once
    /// `max_subscribers` is reached.
    pub fn subscribe(self: &Arc<Self>) -> Option<Subscription> {
        let mut subs = self.subscribers.lock().unwrap();
        if subs.len() >= self.max_subscribers {
            return None;
        }
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        subs.insert(id, tx);
        Some(Subscription { id, broadcaster: Arc::clone(self), rx })
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().unwrap().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn current_track(&self) -> Option<CurrentTrackInfo> {
        self.current_track.lock().unwrap().clone()
    }

    /// Cancels whatever track is currently encoding. Coalesces repeated
    /// calls into a single pending wakeup — a one-deep mailbox, not a
    /// queue.
    pub fn skip(&self) {
        self.skip_requested.notify_one();
    }

    /// The main broadcast loop: pick the next track, run it through the
    /// encoder, fan the output to every subscriber, repeat until
    /// `shutdown` fires.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let track = {
                let mut master = self.master.write().await;
                master.next()
            };
            let track = match track {
                Ok(track) => track,
                Err(_) => {
                    tokio::select! {
                        _ = tokio::time::sleep(EMPTY_PLAYLIST_BACKOFF) => {}
                        _ = shutdown.cancelled() => return,
                    }
                    continue;
                }
            };

            *self.current_track.lock().unwrap() = Some(CurrentTrackInfo { track: track.to_data() });

            let track_cancel = CancellationToken::new();
            let skip_watch = tokio::spawn({
                let broadcaster = Arc::clone(&self);
                let track_cancel = track_cancel.clone();
                async move {
                    broadcaster.skip_requested.notified().await;
                    track_cancel.cancel();
                }
            });

            let writer = BroadcastWriter { broadcaster: Arc::clone(&self) };
            let file_path = track.file_path();
            let result = tokio::select! {
                result = self.encoder.stream(&file_path, writer, track_cancel.clone()) => result,
                _ = shutdown.cancelled() => {
                    track_cancel.cancel();
                    Ok(())
                }
            };
            track_cancel.cancel();
            skip_watch.abort();

            if let Err(e) = result {
                warn!("encoder error while streaming {}: {e}", track.file_path());
                tokio::select! {
                    _ = tokio::time::sleep(POST_ERROR_BACKOFF) => {}
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }
}

/// Fans every byte written to it out to all current subscribers. Full
/// per-client queues silently drop the chunk rather than block the
/// encoder.
struct BroadcastWriter {
    broadcaster: Arc<Broadcaster>,
}

impl AsyncWrite for BroadcastWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let chunk = Bytes::copy_from_slice(buf);
        let mut subs = self.broadcaster.subscribers.lock().unwrap();
        subs.retain(|_, tx| match tx.try_send(chunk.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
