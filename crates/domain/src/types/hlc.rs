//! Hybrid logical timestamps
//!
//! A timestamp pairs a wall-clock second with a logical counter that breaks
//! ties inside the same second. After the fiscal operator acknowledges a
//! receipt, its authoritative `server_time` is attached and from then on
//! takes precedence in ordering.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Causally ordered timestamp stamped on every receipt
///
/// There is deliberately no `Ord` impl: the comparison switches basis
/// depending on whether both sides carry a `server_time`, so it is not a
/// total order over mixed sets. Use [`HybridTimestamp::sort_key`] to sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HybridTimestamp {
    /// Wall-clock seconds since the Unix epoch at stamping time
    pub local_time: i64,
    /// Tie-breaker within one `local_time` second
    pub logical_counter: u32,
    /// Operator-assigned seconds, set once on acknowledgement
    pub server_time: Option<i64>,
}

impl HybridTimestamp {
    /// Fresh local timestamp without a server time
    pub fn new(local_time: i64, logical_counter: u32) -> Self {
        Self { local_time, logical_counter, server_time: None }
    }

    /// Attach the operator's authoritative time
    ///
    /// A server time, once set, is never replaced or cleared; returns
    /// `false` if one was already present.
    pub fn assign_server_time(&mut self, server_time: i64) -> bool {
        if self.server_time.is_some() {
            return false;
        }
        self.server_time = Some(server_time);
        true
    }

    /// `server_time` if assigned, otherwise `local_time`
    pub fn effective_time(&self) -> i64 {
        self.server_time.unwrap_or(self.local_time)
    }

    /// Key used for buffer ordering: `(coalesce(server_time, local_time), logical_counter)`
    pub fn sort_key(&self) -> (i64, u32) {
        (self.effective_time(), self.logical_counter)
    }

    /// Pairwise causal comparison
    ///
    /// Compares `server_time` when both sides have one, otherwise
    /// `local_time`; ties fall through to `logical_counter`.
    pub fn causal_cmp(&self, other: &Self) -> Ordering {
        let primary = match (self.server_time, other.server_time) {
            (Some(a), Some(b)) => a.cmp(&b).then(self.local_time.cmp(&other.local_time)),
            _ => self.local_time.cmp(&other.local_time),
        };
        primary.then(self.logical_counter.cmp(&other.logical_counter))
    }
}

impl fmt::Display for HybridTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.server_time {
            Some(server) => write!(f, "{}.{}@{}", self.local_time, self.logical_counter, server),
            None => write!(f, "{}.{}", self.local_time, self.logical_counter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_breaks_ties_within_a_second() {
        let a = HybridTimestamp::new(1_700_000_000, 0);
        let b = HybridTimestamp::new(1_700_000_000, 1);
        assert_eq!(a.causal_cmp(&b), Ordering::Less);
        assert_eq!(b.causal_cmp(&a), Ordering::Greater);
        assert_eq!(a.causal_cmp(&a), Ordering::Equal);
    }

    /// Validates that server time wins only when both sides carry one.
    ///
    /// Assertions:
    /// - Confirms two acknowledged stamps order by server time.
    /// - Confirms a mixed pair falls back to local time.
    #[test]
    fn server_time_used_only_when_both_present() {
        let mut early_local = HybridTimestamp::new(100, 0);
        let mut late_local = HybridTimestamp::new(200, 0);
        early_local.assign_server_time(500);
        late_local.assign_server_time(300);
        assert_eq!(early_local.causal_cmp(&late_local), Ordering::Greater);

        let unsynced = HybridTimestamp::new(150, 0);
        assert_eq!(early_local.causal_cmp(&unsynced), Ordering::Less);
    }

    #[test]
    fn server_time_is_never_replaced() {
        let mut ts = HybridTimestamp::new(10, 3);
        assert!(ts.assign_server_time(42));
        assert!(!ts.assign_server_time(99));
        assert_eq!(ts.server_time, Some(42));
        assert_eq!(ts.sort_key(), (42, 3));
    }

    #[test]
    fn display_includes_server_time_when_present() {
        let mut ts = HybridTimestamp::new(10, 3);
        assert_eq!(ts.to_string(), "10.3");
        ts.assign_server_time(12);
        assert_eq!(ts.to_string(), "10.3@12");
    }
}
