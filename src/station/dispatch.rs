//! Outbound dispatch queue
//!
//! The message router and the scheduler never talk to the radio directly.
//! Both push [`OutboundBatch`]es into one bounded queue and a single
//! dispatcher task drains it, so fragments of a multi-part reply go out in
//! order and never interleave with another batch.
//!
//! * Producers use `try_send`: a full queue drops the new batch with a
//!   warning instead of stalling inbound processing.
//! * Consecutive sends, within a batch and across batches, are spaced by
//!   the configured pacing gap.
//! * A failed send abandons the rest of its batch. There is no retry.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::logutil::escape_log;
use crate::meshtastic::MeshLink;
use crate::metrics;

pub const DEFAULT_PACING: Duration = Duration::from_secs(2);
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Who produced a batch. Only used for logging and stats.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Origin {
    Reply,
    Scheduled,
}

/// Ordered parts to send back to back on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundBatch {
    pub channel: u32,
    pub parts: Vec<String>,
    pub origin: Origin,
}

impl OutboundBatch {
    pub fn new(channel: u32, parts: Vec<String>, origin: Origin) -> Self {
        Self {
            channel,
            parts,
            origin,
        }
    }

    pub fn single(channel: u32, text: impl Into<String>, origin: Origin) -> Self {
        Self::new(channel, vec![text.into()], origin)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub pacing: Duration,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub batches: u64,
    pub parts_sent: u64,
    pub send_failures: u64,
}

/// Producer handle for the dispatcher. Cheap to clone.
#[derive(Clone, Debug)]
pub struct OutboundQueue {
    tx: mpsc::Sender<OutboundBatch>,
}

impl OutboundQueue {
    /// Queue `batch` without waiting. Returns `false` when it was dropped.
    pub fn enqueue(&self, batch: OutboundBatch) -> bool {
        if batch.parts.is_empty() {
            return true;
        }
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(batch)) => {
                metrics::inc_outbound_dropped();
                warn!(
                    "outbound queue full: dropped {:?} batch of {} part(s) for ch={}",
                    batch.origin,
                    batch.parts.len(),
                    batch.channel
                );
                false
            }
            Err(TrySendError::Closed(batch)) => {
                metrics::inc_outbound_dropped();
                warn!(
                    "dispatcher stopped: dropped {:?} batch for ch={}",
                    batch.origin, batch.channel
                );
                false
            }
        }
    }
}

/// Spawn the single consumer that paces batches onto `link`.
///
/// The task ends once every [`OutboundQueue`] clone has been dropped and the
/// queue is drained.
pub fn start_dispatcher(
    cfg: DispatchConfig,
    link: Arc<dyn MeshLink>,
) -> (OutboundQueue, JoinHandle<DispatchStats>) {
    let (tx, mut rx) = mpsc::channel::<OutboundBatch>(cfg.queue_capacity.max(1));
    let handle = tokio::spawn(async move {
        let mut stats = DispatchStats::default();
        let mut last_sent: Option<Instant> = None;
        while let Some(batch) = rx.recv().await {
            stats.batches += 1;
            let total = batch.parts.len();
            for (i, part) in batch.parts.iter().enumerate() {
                if let Some(last) = last_sent {
                    tokio::time::sleep_until(last + cfg.pacing).await;
                }
                match link.send_text(batch.channel, part) {
                    Ok(()) => {
                        last_sent = Some(Instant::now());
                        stats.parts_sent += 1;
                        metrics::inc_replies_sent();
                        debug!(
                            "dispatched {:?} part {}/{} on ch={}: {}",
                            batch.origin,
                            i + 1,
                            total,
                            batch.channel,
                            escape_log(part)
                        );
                    }
                    Err(e) => {
                        stats.send_failures += 1;
                        metrics::inc_send_failures();
                        warn!(
                            "send failed on ch={} (part {}/{}), abandoning batch: {}",
                            batch.channel,
                            i + 1,
                            total,
                            e
                        );
                        break;
                    }
                }
            }
        }
        debug!(
            "dispatcher stopped: batches={} parts_sent={} send_failures={}",
            stats.batches, stats.parts_sent, stats.send_failures
        );
        stats
    });
    (OutboundQueue { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshtastic::TransportError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLink {
        sent: Mutex<Vec<(Instant, u32, String)>>,
        fail_on: Option<String>,
    }

    impl MeshLink for RecordingLink {
        fn send_text(&self, channel: u32, text: &str) -> Result<(), TransportError> {
            if self.fail_on.as_deref() == Some(text) {
                return Err(TransportError::Closed);
            }
            self.sent
                .lock()
                .unwrap()
                .push((Instant::now(), channel, text.to_string()));
            Ok(())
        }
    }

    fn parts(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn paces_parts_within_and_across_batches() {
        let link = Arc::new(RecordingLink::default());
        let (queue, handle) = start_dispatcher(DispatchConfig::default(), link.clone());
        assert!(queue.enqueue(OutboundBatch::new(1, parts(&["a", "b"]), Origin::Reply)));
        assert!(queue.enqueue(OutboundBatch::single(2, "c", Origin::Scheduled)));
        drop(queue);
        let stats = handle.await.unwrap();
        assert_eq!(stats.parts_sent, 3);

        let sent = link.sent.lock().unwrap();
        let texts: Vec<_> = sent.iter().map(|(_, ch, t)| (*ch, t.as_str())).collect();
        assert_eq!(texts, vec![(1, "a"), (1, "b"), (2, "c")]);
        assert_eq!(sent[1].0 - sent[0].0, DEFAULT_PACING);
        assert_eq!(sent[2].0 - sent[1].0, DEFAULT_PACING);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_abandons_rest_of_batch() {
        let link = Arc::new(RecordingLink {
            fail_on: Some("b".into()),
            ..Default::default()
        });
        let (queue, handle) = start_dispatcher(DispatchConfig::default(), link.clone());
        queue.enqueue(OutboundBatch::new(1, parts(&["a", "b", "c"]), Origin::Reply));
        queue.enqueue(OutboundBatch::single(1, "next", Origin::Reply));
        drop(queue);
        let stats = handle.await.unwrap();
        assert_eq!(stats.send_failures, 1);
        let sent: Vec<String> = link.sent.lock().unwrap().iter().map(|s| s.2.clone()).collect();
        assert_eq!(sent, vec!["a".to_string(), "next".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_new_batch() {
        let link = Arc::new(RecordingLink::default());
        let cfg = DispatchConfig {
            pacing: Duration::from_secs(2),
            queue_capacity: 1,
        };
        let (queue, handle) = start_dispatcher(cfg, link.clone());
        // nothing has been received yet, so the single slot fills up
        assert!(queue.enqueue(OutboundBatch::single(1, "first", Origin::Reply)));
        assert!(!queue.enqueue(OutboundBatch::single(1, "second", Origin::Reply)));
        drop(queue);
        handle.await.unwrap();
        assert_eq!(link.sent.lock().unwrap().len(), 1);
    }
}
