//! Process-wide counters.
//!
//! Cheap relaxed atomics bumped from the hot paths and read back as a
//! [`Snapshot`] for periodic debug logging.
use std::sync::atomic::{AtomicU64, Ordering};

static PACKETS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static TEXT_MESSAGES: AtomicU64 = AtomicU64::new(0);
static COMMANDS_HANDLED: AtomicU64 = AtomicU64::new(0);
static RESPONDER_FAILURES: AtomicU64 = AtomicU64::new(0);
static REPLIES_SENT: AtomicU64 = AtomicU64::new(0);
static SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
static OUTBOUND_DROPPED: AtomicU64 = AtomicU64::new(0);
static SCHEDULED_FIRED: AtomicU64 = AtomicU64::new(0);

pub fn inc_packets_received() {
    PACKETS_RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_text_messages() {
    TEXT_MESSAGES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_commands_handled() {
    COMMANDS_HANDLED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_responder_failures() {
    RESPONDER_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_replies_sent() {
    REPLIES_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_send_failures() {
    SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_outbound_dropped() {
    OUTBOUND_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_scheduled_fired() {
    SCHEDULED_FIRED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub packets_received: u64,
    pub text_messages: u64,
    pub commands_handled: u64,
    pub responder_failures: u64,
    pub replies_sent: u64,
    pub send_failures: u64,
    pub outbound_dropped: u64,
    pub scheduled_fired: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        packets_received: PACKETS_RECEIVED.load(Ordering::Relaxed),
        text_messages: TEXT_MESSAGES.load(Ordering::Relaxed),
        commands_handled: COMMANDS_HANDLED.load(Ordering::Relaxed),
        responder_failures: RESPONDER_FAILURES.load(Ordering::Relaxed),
        replies_sent: REPLIES_SENT.load(Ordering::Relaxed),
        send_failures: SEND_FAILURES.load(Ordering::Relaxed),
        outbound_dropped: OUTBOUND_DROPPED.load(Ordering::Relaxed),
        scheduled_fired: SCHEDULED_FIRED.load(Ordering::Relaxed),
    }
}
