//! Correlation state for one outstanding request category (GET or SET).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How many timed-out transaction ids are remembered for late-reply logging.
const TIMEOUT_HISTORY: usize = 4;

/// Outcome of matching a reply against the in-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMatch {
    /// Reply to the outstanding request; the slot is now free.
    Matched(Duration),
    /// Reply to a request that had already timed out.
    Late,
    /// Reply that matches nothing we sent recently.
    Unexpected,
}

/// In-flight request slot.
#[derive(Debug)]
pub struct InflightRequest {
    name: &'static str,
    timeout: Duration,
    tid: u16,
    sent_at: Option<Instant>,
    timeout_count: u32,
    timed_out: VecDeque<u16>,
}

impl InflightRequest {
    pub fn new(name: &'static str, timeout: Duration) -> Self {
        Self {
            name,
            timeout,
            tid: 0,
            sent_at: None,
            timeout_count: 0,
            timed_out: VecDeque::with_capacity(TIMEOUT_HISTORY),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.sent_at.is_some()
    }

    pub fn tid(&self) -> Option<u16> {
        self.sent_at.map(|_| self.tid)
    }

    /// Consecutive timeouts since the last matched reply.
    pub fn timeout_count(&self) -> u32 {
        self.timeout_count
    }

    pub fn start(&mut self, tid: u16, now: Instant) {
        self.tid = tid;
        self.sent_at = Some(now);
    }

    pub fn handle_response(&mut self, tid: u16, now: Instant) -> ResponseMatch {
        match self.sent_at {
            Some(sent_at) if tid == self.tid => {
                self.sent_at = None;
                self.timeout_count = 0;
                ResponseMatch::Matched(now.saturating_duration_since(sent_at))
            }
            _ if self.timed_out.contains(&tid) => ResponseMatch::Late,
            _ => ResponseMatch::Unexpected,
        }
    }

    /// Free the slot if the outstanding request is older than the timeout.
    ///
    /// Returns the abandoned transaction id.
    pub fn check_timeout(&mut self, now: Instant) -> Option<u16> {
        let sent_at = self.sent_at?;
        if now.saturating_duration_since(sent_at) < self.timeout {
            return None;
        }

        self.sent_at = None;
        self.timeout_count = self.timeout_count.saturating_add(1);
        if self.timed_out.len() == TIMEOUT_HISTORY {
            self.timed_out.pop_front();
        }
        self.timed_out.push_back(self.tid);
        tracing::debug!(
            "{} request tid={} timed out ({} consecutive)",
            self.name,
            self.tid,
            self.timeout_count
        );
        Some(self.tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_response_frees_slot() {
        let t0 = Instant::now();
        let mut slot = InflightRequest::new("get", Duration::from_secs(2));
        slot.start(10, t0);
        assert!(slot.is_waiting());
        assert_eq!(slot.tid(), Some(10));

        let result = slot.handle_response(10, t0 + Duration::from_millis(40));
        assert_eq!(result, ResponseMatch::Matched(Duration::from_millis(40)));
        assert!(!slot.is_waiting());
    }

    #[test]
    fn test_unexpected_response_keeps_slot() {
        let t0 = Instant::now();
        let mut slot = InflightRequest::new("get", Duration::from_secs(2));
        slot.start(10, t0);
        assert_eq!(slot.handle_response(99, t0), ResponseMatch::Unexpected);
        assert!(slot.is_waiting());
        assert_eq!(slot.tid(), Some(10));
    }

    #[test]
    fn test_timeout_then_late_reply() {
        let t0 = Instant::now();
        let mut slot = InflightRequest::new("get", Duration::from_secs(2));
        slot.start(10, t0);
        assert_eq!(slot.check_timeout(t0 + Duration::from_secs(1)), None);
        assert_eq!(slot.check_timeout(t0 + Duration::from_secs(2)), Some(10));
        assert!(!slot.is_waiting());
        assert_eq!(slot.timeout_count(), 1);

        slot.start(11, t0 + Duration::from_secs(3));
        assert_eq!(slot.handle_response(10, t0 + Duration::from_secs(3)), ResponseMatch::Late);
        assert!(slot.is_waiting());
    }

    #[test]
    fn test_timeout_history_is_bounded() {
        let t0 = Instant::now();
        let mut slot = InflightRequest::new("get", Duration::from_millis(1));
        for tid in 0..10u16 {
            slot.start(tid, t0);
            slot.check_timeout(t0 + Duration::from_millis(5));
        }
        assert_eq!(slot.timeout_count(), 10);
        assert_eq!(slot.handle_response(9, t0), ResponseMatch::Late);
        assert_eq!(slot.handle_response(2, t0), ResponseMatch::Unexpected);
    }
}
