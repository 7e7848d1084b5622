//! ============================================================================
//! Performance Tiers - Bronze/Silver/Gold/Platinum from delivery activity
//! ============================================================================
//! Shown on the driver's ratings screen. A tier needs all four minimums at
//! once; Bronze has no requirements that gate it.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rate reported when there is nothing to divide by
pub const DEFAULT_RATE: f64 = 100.0;

/// Bounds of the rating-based on-time estimate
const ON_TIME_FLOOR: f64 = 85.0;
const ON_TIME_CEILING: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// Minimums for one performance tier (rates in percent)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Requirements {
    pub min_rating: f64,
    pub min_completion_rate: f64,
    pub min_acceptance_rate: f64,
    pub min_on_time_rate: f64,
}

impl PerformanceTier {
    /// Highest first
    pub const ALL: [PerformanceTier; 4] = [
        PerformanceTier::Platinum,
        PerformanceTier::Gold,
        PerformanceTier::Silver,
        PerformanceTier::Bronze,
    ];

    pub fn requirements(&self) -> Requirements {
        let (min_rating, min_completion_rate, min_acceptance_rate, min_on_time_rate) = match self {
            PerformanceTier::Bronze => (4.0, 80.0, 60.0, 85.0),
            PerformanceTier::Silver => (4.3, 85.0, 70.0, 88.0),
            PerformanceTier::Gold => (4.5, 90.0, 75.0, 90.0),
            PerformanceTier::Platinum => (4.7, 95.0, 80.0, 95.0),
        };
        Requirements {
            min_rating,
            min_completion_rate,
            min_acceptance_rate,
            min_on_time_rate,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PerformanceTier::Bronze => "Bronze",
            PerformanceTier::Silver => "Silver",
            PerformanceTier::Gold => "Gold",
            PerformanceTier::Platinum => "Platinum",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            PerformanceTier::Bronze => "🥉",
            PerformanceTier::Silver => "🥈",
            PerformanceTier::Gold => "🥇",
            PerformanceTier::Platinum => "💎",
        }
    }

    /// The tier above this one, if any
    pub fn next(&self) -> Option<PerformanceTier> {
        match self {
            PerformanceTier::Bronze => Some(PerformanceTier::Silver),
            PerformanceTier::Silver => Some(PerformanceTier::Gold),
            PerformanceTier::Gold => Some(PerformanceTier::Platinum),
            PerformanceTier::Platinum => None,
        }
    }

    /// Highest tier whose minimums all hold; Bronze otherwise
    pub fn for_stats(stats: &ActivityStats) -> Self {
        Self::ALL
            .into_iter()
            .filter(|t| *t != PerformanceTier::Bronze)
            .find(|t| stats.meets(&t.requirements()))
            .unwrap_or(PerformanceTier::Bronze)
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which requirement a gap refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Rating,
    CompletionRate,
    AcceptanceRate,
    OnTimeRate,
}

/// A requirement not yet met
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementGap {
    pub metric: Metric,
    pub current: f64,
    pub required: f64,
}

impl RequirementGap {
    pub fn shortfall(&self) -> f64 {
        self.required - self.current
    }
}

/// Driver activity summarized as rates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub rating: f64,
    pub completion_rate: f64,
    pub acceptance_rate: f64,
    pub on_time_rate: f64,
    pub total_deliveries: u32,
}

impl ActivityStats {
    /// Build from raw counts. Empty denominators count as 100%, and the
    /// on-time rate is estimated from the rating until it is tracked.
    pub fn from_counts(
        rating: f64,
        total_deliveries: u32,
        assigned_orders: u32,
        delivered_orders: u32,
        offered: u32,
        accepted: u32,
    ) -> Self {
        Self {
            rating,
            completion_rate: rate(delivered_orders, assigned_orders),
            acceptance_rate: rate(accepted, offered),
            on_time_rate: estimate_on_time_rate(rating),
            total_deliveries,
        }
    }

    fn meets(&self, req: &Requirements) -> bool {
        self.gaps(req).is_empty()
    }

    fn gaps(&self, req: &Requirements) -> Vec<RequirementGap> {
        [
            (Metric::Rating, self.rating, req.min_rating),
            (Metric::CompletionRate, self.completion_rate, req.min_completion_rate),
            (Metric::AcceptanceRate, self.acceptance_rate, req.min_acceptance_rate),
            (Metric::OnTimeRate, self.on_time_rate, req.min_on_time_rate),
        ]
        .into_iter()
        .filter(|(_, current, required)| !(current >= required))
        .map(|(metric, current, required)| RequirementGap {
            metric,
            current,
            required,
        })
        .collect()
    }

    pub fn tier(&self) -> PerformanceTier {
        PerformanceTier::for_stats(self)
    }

    /// What is missing for the next tier; None at the top
    pub fn gaps_to_next(&self) -> Option<(PerformanceTier, Vec<RequirementGap>)> {
        let next = self.tier().next()?;
        Some((next, self.gaps(&next.requirements())))
    }
}

fn rate(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        DEFAULT_RATE
    } else {
        f64::from(part) * 100.0 / f64::from(whole)
    }
}

/// `rating * 20`, held between 85 and 95
pub fn estimate_on_time_rate(rating: f64) -> f64 {
    (rating * 20.0).clamp(ON_TIME_FLOOR, ON_TIME_CEILING)
}
