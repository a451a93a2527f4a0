//! Drop-oldest frame fan-out.
//!
//! Every new frame replaces the previous one in a single-slot watch channel;
//! each subscriber holds its own receiver. A consumer that falls behind sees
//! sequence gaps, never growing buffers, and the capture loop is never
//! throttled by a slow consumer.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::source::VideoSource;
use crate::Fault;

/// One encoded frame with its monotonic capture sequence number.
#[derive(Clone, Debug)]
pub struct Frame {
    pub seq: u64,
    pub jpeg: Bytes,
}

pub struct FrameHub {
    sender: watch::Sender<Option<Frame>>,
    seq: AtomicU64,
}

impl FrameHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sender: watch::channel(None).0,
            seq: AtomicU64::new(0),
        })
    }

    /// New subscribers immediately observe the latest frame, if any.
    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.sender.subscribe()
    }

    /// Publish a frame by whole-value swap, returning its sequence number.
    pub fn publish(&self, jpeg: Bytes) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.sender.send_replace(Some(Frame { seq, jpeg }));
        seq
    }

    /// Spawn the blocking capture loop.
    ///
    /// A capture failure is fatal: a frozen feed must never be mistaken for
    /// a live one, so the fault is surfaced and the loop exits.
    pub fn spawn_capture(
        self: &Arc<Self>,
        mut source: Box<dyn VideoSource>,
        fault_sender: mpsc::Sender<Fault>,
        cancel: CancellationToken,
    ) {
        let hub = Arc::clone(self);

        tokio::task::spawn_blocking(move || {
            info!("Video capture loop started");
            while !cancel.is_cancelled() {
                match source.next_frame() {
                    Ok(jpeg) => {
                        let seq = hub.publish(jpeg);
                        if seq % 300 == 0 {
                            debug!(
                                "Captured frame {} ({} subscriber(s))",
                                seq,
                                hub.sender.receiver_count()
                            );
                        }
                    }
                    Err(e) => {
                        error!("Video capture failed: {}", e);
                        let _ = fault_sender.blocking_send(Fault::new("video", e));
                        return;
                    }
                }
            }
            info!("Video capture loop stopped");
        });
    }
}
