//! Risk classification and catch-up projection.
//!
//! Maps an attendance percentage to a tier and answers "how many consecutive
//! attended classes until the target percentage is reached".

use serde::Serialize;
use strum::Display;

/// Tier boundaries. Anything below 50% is critical regardless of
/// configuration; `high` and `medium` are the configurable upper bounds of
/// their tiers.
#[derive(Debug, Clone)]
pub struct RiskThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high: 75.0,
            medium: 85.0,
        }
    }
}

const CRITICAL_BELOW: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

/// Maps a percentage to its tier. Monotone: a lower percentage never maps to
/// a lower-severity tier.
pub fn risk_tier(percentage: f64, thresholds: &RiskThresholds) -> RiskTier {
    if percentage < CRITICAL_BELOW {
        RiskTier::Critical
    } else if percentage < thresholds.high {
        RiskTier::High
    } else if percentage < thresholds.medium {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// Result of the catch-up projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatchUpPlan {
    /// Classes to attend, capped at `remaining_sessions` when that bound is
    /// known.
    pub classes_needed: u64,
    /// False when the target cannot be reached within the remaining term.
    pub can_reach_target: bool,
}

/// Minimum non-negative `k` with `(attended + k) / (total + k) * 100 >=
/// target`, solved in closed form.
///
/// With `remaining_sessions` supplied, `k` is capped at what the term still
/// offers and the overflow is surfaced via `can_reach_target` instead of
/// being hidden.
pub fn classes_needed_for_target(
    attended: u64,
    total_so_far: u64,
    target_percent: f64,
    remaining_sessions: Option<u64>,
) -> CatchUpPlan {
    let target = target_percent.clamp(0.0, 100.0);
    let a = attended as f64;
    let n = total_so_far as f64;

    // Already at or above target (0/0 counts as unmet unless target is 0).
    let met = if total_so_far == 0 {
        target == 0.0
    } else {
        a / n * 100.0 >= target
    };
    if met {
        return CatchUpPlan {
            classes_needed: 0,
            can_reach_target: true,
        };
    }

    if target >= 100.0 {
        // A missed class can never be outweighed.
        return CatchUpPlan {
            classes_needed: remaining_sessions.unwrap_or(0),
            can_reach_target: false,
        };
    }

    // k * (100 - t) >= t * n - 100 * a
    let needed = ((target * n - 100.0 * a) / (100.0 - target)).ceil().max(1.0) as u64;

    match remaining_sessions {
        Some(remaining) if needed > remaining => CatchUpPlan {
            classes_needed: remaining,
            can_reach_target: false,
        },
        _ => CatchUpPlan {
            classes_needed: needed,
            can_reach_target: true,
        },
    }
}
