//! ============================================================================
//! Tiers Module - Driver reward tiers and rating display
//! ============================================================================
//! ## Rating tiers (rating AND completed deliveries)
//! - **Elite**: 4.8+ with 100+ deliveries
//! - **Pro**: 4.5+ with 50+
//! - **Rising Star**: 4.0+ with 20+
//! - **New Driver**: everyone else
//!
//! ## Performance tiers (rating, completion, acceptance, on-time)
//! - **Platinum** 4.7/95/80/95, **Gold** 4.5/90/75/90,
//!   **Silver** 4.3/85/70/88, **Bronze** otherwise
//!
//! ## Usage
//! ```rust,ignore
//! use craven_core::tiers::{tier_for_rating, format_rating};
//!
//! let tier = tier_for_rating(profile.rating, profile.completed_orders);
//! println!("{} {} {}", tier.icon, tier.name, format_rating(profile.rating));
//! ```
//! ============================================================================

mod performance;
mod rating;
mod summary;

pub use performance::{
    estimate_on_time_rate, ActivityStats, Metric, PerformanceTier, RequirementGap, Requirements,
};
pub use rating::{
    color_for_rating, format_rating, format_trend, percentage_for_rating, tier_for_rating,
    trend_color, trend_icon, Color, DriverTier, Standing, TierInfo, Trend, ELITE_MIN_DELIVERIES,
    ELITE_MIN_RATING, PRO_MIN_DELIVERIES, PRO_MIN_RATING, RISING_MIN_DELIVERIES,
    RISING_MIN_RATING, STRONG_TREND,
};
pub use summary::{effective_rating, rating_bucket, RatingBucket, TierDistribution};

use crate::types::RatingTier;

impl RatingTier {
    /// Badge color for the stored reward tier
    pub fn color(&self) -> Color {
        match self {
            RatingTier::Bronze => Color::BRONZE,
            RatingTier::Silver => Color::SILVER,
            RatingTier::Gold => Color::GOLD,
            RatingTier::Diamond => Color::PLATINUM,
        }
    }
}
