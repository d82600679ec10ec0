//! Priority levels and their integer ranks.
//!
//! Tasks persist a single integer rank, normalized at ingestion; the named
//! levels are fixed anchor points on that scale. Lower rank is served
//! first. Callers may enqueue with any rank in between the anchors.

use serde::{Deserialize, Serialize};

/// Named priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Background,
}

impl Priority {
    /// Fixed numeric rank of this level. Lower is served first; the gaps
    /// leave room for numeric priorities between the named anchors.
    pub fn rank(self) -> i32 {
        match self {
            Priority::Critical => 0,
            Priority::High => 10,
            Priority::Medium => 20,
            Priority::Low => 30,
            Priority::Background => 40,
        }
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority.rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::critical(Priority::Critical, 0)]
    #[case::high(Priority::High, 10)]
    #[case::medium(Priority::Medium, 20)]
    #[case::low(Priority::Low, 30)]
    #[case::background(Priority::Background, 40)]
    fn ranks_are_fixed(#[case] priority: Priority, #[case] rank: i32) {
        assert_eq!(priority.rank(), rank);
    }

    #[test]
    fn lower_rank_means_more_urgent() {
        assert!(Priority::Critical.rank() < Priority::High.rank());
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
        assert!(Priority::Low.rank() < Priority::Background.rank());
    }
}
