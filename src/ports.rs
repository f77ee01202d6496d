//! Port-range utilities.
//!
//! Firewall rules carry `[from, to]` port intervals; the exposure summary
//! wants them as a compact human-readable string. Two ranges are coalesced
//! when they overlap or touch: `(2,3)` and `(4,5)` become `(2,5)`.

use serde::{Deserialize, Serialize};

/// An inclusive port interval.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortRange {
    pub from: i64,
    pub to: i64,
}

impl PortRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    /// The full range a protocol wildcard rule expands to.
    pub fn all() -> Self {
        Self { from: 0, to: 65535 }
    }

    fn touches(&self, other: &PortRange) -> bool {
        self.to >= other.from - 1
    }
}

/// Merge overlapping and adjacent ranges, returning them sorted by `from`.
pub fn merge_ranges(mut ranges: Vec<PortRange>) -> Vec<PortRange> {
    ranges.sort_by_key(|r| (r.from, r.to));

    let mut merged: Vec<PortRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if last.touches(&range) => {
                last.to = last.to.max(range.to);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Render merged ranges as `"80,443-445"`.
pub fn render_ranges(ranges: &[PortRange]) -> String {
    ranges
        .iter()
        .map(|r| {
            if r.from == r.to {
                format!("{}", r.from)
            } else {
                format!("{}-{}", r.from, r.to)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
