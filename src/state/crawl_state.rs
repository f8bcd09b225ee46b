//! Listing walk termination state
//!
//! The walk carries a [`CrawlState`] from page to page. Each page is reduced to
//! a [`PageOutcome`] and folded into the state by [`CrawlState::advance`], a
//! pure transition, so the termination heuristics can be tested without any
//! fetching.

use std::fmt;

/// Why a listing walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Too many consecutive pages produced no candidate URLs
    ExhaustedEmpty,

    /// Too many consecutive pages contained only already-known URLs
    ExhaustedDuplicate,

    /// Every page in the configured range was visited
    RangeComplete,

    /// The run was cancelled before the next page fetch
    Cancelled,
}

impl StopReason {
    /// Converts the stop reason to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ExhaustedEmpty => "exhausted-empty",
            Self::ExhaustedDuplicate => "exhausted-duplicate",
            Self::RangeComplete => "range-complete",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a stop reason from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "exhausted-empty" => Some(Self::ExhaustedEmpty),
            "exhausted-duplicate" => Some(Self::ExhaustedDuplicate),
            "range-complete" => Some(Self::RangeComplete),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// What one listing page contributed to the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageOutcome {
    /// Candidate URLs extracted from the page (0 when the fetch failed)
    pub candidates: usize,

    /// How many of those candidates the store already knows
    pub known: usize,
}

impl PageOutcome {
    /// A page whose fetch failed; counts as an empty page
    pub fn failed() -> Self {
        Self::default()
    }
}

/// Thresholds for the termination heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub empty: u32,
    pub duplicate: u32,
    pub min_sample: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            empty: 3,
            duplicate: 3,
            min_sample: 5,
        }
    }
}

/// Per-run counters for the termination heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrawlState {
    pub consecutive_empty_pages: u32,
    pub consecutive_duplicate_pages: u32,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one page into the state
    ///
    /// Both counters are updated on every page. A counter resets to zero as
    /// soon as its condition fails to hold. Returns the next state and, if a
    /// counter reached its threshold, the reason to stop. The empty check
    /// wins when both trip at once, which cannot happen in practice since an
    /// empty page is never a duplicate page.
    pub fn advance(self, outcome: PageOutcome, thresholds: &Thresholds) -> (Self, Option<StopReason>) {
        let consecutive_empty_pages = if outcome.candidates == 0 {
            self.consecutive_empty_pages + 1
        } else {
            0
        };

        let all_known = outcome.candidates >= thresholds.min_sample
            && outcome.known >= outcome.candidates;
        let consecutive_duplicate_pages = if all_known {
            self.consecutive_duplicate_pages + 1
        } else {
            0
        };

        let next = Self {
            consecutive_empty_pages,
            consecutive_duplicate_pages,
        };

        let stop = if consecutive_empty_pages >= thresholds.empty {
            Some(StopReason::ExhaustedEmpty)
        } else if consecutive_duplicate_pages >= thresholds.duplicate {
            Some(StopReason::ExhaustedDuplicate)
        } else {
            None
        };

        (next, stop)
    }
}
