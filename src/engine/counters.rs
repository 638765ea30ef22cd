// src/engine/counters.rs

//! Nested pause/resume request counting.

/// Two non-negative counters that let independent callers request pause and
/// resume concurrently without losing or double-counting requests.
///
/// Every increment of `pause_requests` is matched by exactly one later
/// decrement through a resume; every resume caller holds one
/// `unpause_requests` slot until it has observed its request being honoured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PauseRequestCounter {
    pause_requests: u32,
    unpause_requests: u32,
}

impl PauseRequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause_requests(&self) -> u32 {
        self.pause_requests
    }

    pub fn unpause_requests(&self) -> u32 {
        self.unpause_requests
    }

    /// Record one more outstanding pause request.
    pub fn add_pause(&mut self) -> u32 {
        self.pause_requests += 1;
        self.pause_requests
    }

    /// Convert one outstanding pause request into an outstanding unpause
    /// request.
    ///
    /// Returns `None` (and changes nothing) if there is no pause to release.
    pub fn release_pause(&mut self) -> Option<u32> {
        if self.pause_requests == 0 {
            return None;
        }
        self.pause_requests -= 1;
        self.unpause_requests += 1;
        Some(self.pause_requests)
    }

    /// A resume caller observed that its request was honoured.
    pub fn acknowledge_unpause(&mut self) {
        self.unpause_requests = self.unpause_requests.saturating_sub(1);
    }

    /// No outstanding requests of either kind.
    pub fn is_settled(&self) -> bool {
        self.pause_requests == 0 && self.unpause_requests == 0
    }
}
