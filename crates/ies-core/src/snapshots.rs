//! Dispatch horizon: ordered snapshots and sub-windows over them.

use crate::error::NetworkError;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Ordered timestamps of the dispatch horizon with their objective weightings.
///
/// A weighting is the number of hours a snapshot stands for. It scales both
/// the marginal-cost terms of the objective and the storage time step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshots {
    timestamps: Vec<NaiveDateTime>,
    weightings: Vec<f64>,
}

impl Snapshots {
    /// Build from explicit timestamps, weighting every snapshot with 1 h.
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Result<Self, NetworkError> {
        if let Some(pair) = timestamps.windows(2).find(|w| w[1] <= w[0]) {
            return Err(NetworkError::InvalidSnapshots(format!(
                "timestamps must be strictly increasing ({} is followed by {})",
                pair[0], pair[1]
            )));
        }
        let weightings = vec![1.0; timestamps.len()];
        Ok(Self {
            timestamps,
            weightings,
        })
    }

    /// `count` consecutive hourly snapshots starting at `start`.
    pub fn hourly(start: NaiveDateTime, count: usize) -> Self {
        let timestamps = (0..count)
            .map(|h| start + Duration::hours(h as i64))
            .collect();
        Self {
            timestamps,
            weightings: vec![1.0; count],
        }
    }

    /// Replace the objective weightings.
    pub fn with_weightings(mut self, weightings: Vec<f64>) -> Result<Self, NetworkError> {
        if weightings.len() != self.timestamps.len() {
            return Err(NetworkError::InvalidSnapshots(format!(
                "{} weightings given for {} snapshots",
                weightings.len(),
                self.timestamps.len()
            )));
        }
        if weightings.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(NetworkError::InvalidSnapshots(
                "weightings must be finite and positive".into(),
            ));
        }
        self.weightings = weightings;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn timestamp(&self, t: usize) -> Option<NaiveDateTime> {
        self.timestamps.get(t).copied()
    }

    /// Weighting of snapshot `t` (1.0 outside the horizon).
    pub fn weighting(&self, t: usize) -> f64 {
        self.weightings.get(t).copied().unwrap_or(1.0)
    }

    pub fn weightings(&self) -> &[f64] {
        &self.weightings
    }

    /// The window covering the whole horizon.
    pub fn full_window(&self) -> SnapshotWindow {
        SnapshotWindow {
            start: 0,
            end: self.len(),
        }
    }
}

/// Contiguous half-open window `[start, end)` of snapshot positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotWindow {
    pub start: usize,
    pub end: usize,
}

impl SnapshotWindow {
    /// Create a window, rejecting empty or inverted ranges.
    pub fn new(start: usize, end: usize) -> Result<Self, NetworkError> {
        if start >= end {
            return Err(NetworkError::InvalidWindow {
                start,
                end,
                len: end,
            });
        }
        Ok(Self { start, end })
    }

    /// Check that the window is non-empty and fits the horizon.
    pub fn validate(&self, snapshots: &Snapshots) -> Result<(), NetworkError> {
        if self.start >= self.end || self.end > snapshots.len() {
            return Err(NetworkError::InvalidWindow {
                start: self.start,
                end: self.end,
                len: snapshots.len(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot positions in order.
    pub fn iter(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    /// Final snapshot of the window.
    pub fn last(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.end - 1)
        }
    }

    pub fn contains(&self, t: usize) -> bool {
        (self.start..self.end).contains(&t)
    }

    /// Position of `t` relative to the window start.
    pub fn offset(&self, t: usize) -> Option<usize> {
        self.contains(t).then(|| t - self.start)
    }
}

impl std::fmt::Display for SnapshotWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
