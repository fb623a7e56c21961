//! Outbound queue monitoring.
//!
//! Every connection owns a bounded outbound queue drained by its writer
//! task. [`OutboundMailbox`] tracks the queue depth, the peak depth and the
//! drops, and logs when a recipient falls behind:
//!
//! | Depth | Level |
//! |-------|-------|
//! | < 64 | Normal |
//! | 64-192 | Warning |
//! | > 192 | Critical |

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

pub const OUTBOUND_NORMAL: usize = 64;
pub const OUTBOUND_WARNING: usize = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Depth and drop accounting for one connection's outbound queue.
#[derive(Debug)]
pub struct OutboundMailbox {
    /// Label for logs (`room/participant`).
    owner: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl OutboundMailbox {
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// A notification was queued.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(new_depth, Ordering::Relaxed);

        match level_for_depth(new_depth) {
            MailboxLevel::Critical => warn!(
                target: "sig.transport",
                owner = %self.owner,
                depth = new_depth,
                threshold = OUTBOUND_WARNING,
                "Outbound queue depth critical"
            ),
            // Log once when crossing into warning
            MailboxLevel::Warning if new_depth == OUTBOUND_NORMAL + 1 => debug!(
                target: "sig.transport",
                owner = %self.owner,
                depth = new_depth,
                "Outbound queue depth elevated"
            ),
            _ => {}
        }
    }

    /// The writer task took a notification off the queue.
    pub fn record_dequeue(&self) {
        // Saturate: a dequeue racing the enqueue bookkeeping must not wrap.
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            });
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// A notification was dropped because the queue was full.
    pub fn record_drop(&self) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            target: "sig.transport",
            owner = %self.owner,
            dropped,
            "Notification dropped, recipient queue full"
        );
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        level_for_depth(self.current_depth())
    }
}

fn level_for_depth(depth: usize) -> MailboxLevel {
    if depth > OUTBOUND_WARNING {
        MailboxLevel::Critical
    } else if depth > OUTBOUND_NORMAL {
        MailboxLevel::Warning
    } else {
        MailboxLevel::Normal
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_and_peak_tracking() {
        let mailbox = OutboundMailbox::new("42/alice");

        for _ in 0..5 {
            mailbox.record_enqueue();
        }
        mailbox.record_dequeue();
        mailbox.record_dequeue();

        assert_eq!(mailbox.current_depth(), 3);
        assert_eq!(mailbox.peak_depth(), 5);
        assert_eq!(mailbox.delivered(), 2);
    }

    #[test]
    fn test_dequeue_never_underflows() {
        let mailbox = OutboundMailbox::new("42/alice");
        mailbox.record_dequeue();
        assert_eq!(mailbox.current_depth(), 0);
    }

    #[test]
    fn test_levels() {
        let mailbox = OutboundMailbox::new("42/alice");
        assert_eq!(mailbox.current_level(), MailboxLevel::Normal);

        for _ in 0..=OUTBOUND_NORMAL {
            mailbox.record_enqueue();
        }
        assert_eq!(mailbox.current_level(), MailboxLevel::Warning);

        for _ in 0..OUTBOUND_WARNING {
            mailbox.record_enqueue();
        }
        assert_eq!(mailbox.current_level(), MailboxLevel::Critical);
    }

    #[test]
    fn test_drops_counted() {
        let mailbox = OutboundMailbox::new("42/alice");
        mailbox.record_drop();
        mailbox.record_drop();
        assert_eq!(mailbox.dropped(), 2);
    }
}
