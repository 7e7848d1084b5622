//! Fleet-wide rating summary for the admin rating dashboard

use serde::Serialize;

use super::rating::{tier_for_rating, DriverTier, ELITE_MIN_RATING, PRO_MIN_RATING, RISING_MIN_RATING};
use crate::types::DriverProfile;

/// Rating assumed for drivers nobody has rated yet
pub const UNRATED_DEFAULT: f64 = 5.0;

/// Rating histogram bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RatingBucket {
    #[serde(rename = "4.8-5.0")]
    Top,
    #[serde(rename = "4.5-4.79")]
    High,
    #[serde(rename = "4.0-4.49")]
    Mid,
    #[serde(rename = "<4.0")]
    Low,
}

impl RatingBucket {
    pub const ALL: [RatingBucket; 4] = [
        RatingBucket::Top,
        RatingBucket::High,
        RatingBucket::Mid,
        RatingBucket::Low,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RatingBucket::Top => "4.8-5.0",
            RatingBucket::High => "4.5-4.79",
            RatingBucket::Mid => "4.0-4.49",
            RatingBucket::Low => "<4.0",
        }
    }
}

pub fn rating_bucket(rating: f64) -> RatingBucket {
    if rating >= ELITE_MIN_RATING {
        RatingBucket::Top
    } else if rating >= PRO_MIN_RATING {
        RatingBucket::High
    } else if rating >= RISING_MIN_RATING {
        RatingBucket::Mid
    } else {
        RatingBucket::Low
    }
}

/// Stored rating, with 0 read as unrated
pub fn effective_rating(profile: &DriverProfile) -> f64 {
    if profile.rating > 0.0 {
        profile.rating
    } else {
        UNRATED_DEFAULT
    }
}

/// Counts per tier and per rating bucket, plus headline numbers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierDistribution {
    pub total: usize,
    pub average_rating: f64,
    /// Rated 4.8 or above, regardless of delivery count
    pub top_rated: usize,
    /// Rated below 4.5
    pub needs_attention: usize,
    pub tiers: Vec<(DriverTier, usize)>,
    pub buckets: Vec<(RatingBucket, usize)>,
}

impl TierDistribution {
    pub fn from_profiles(profiles: &[DriverProfile]) -> Self {
        let ratings: Vec<f64> = profiles.iter().map(effective_rating).collect();

        let tiers = DriverTier::ALL
            .iter()
            .map(|tier| {
                let count = profiles
                    .iter()
                    .zip(&ratings)
                    .filter(|(p, r)| tier_for_rating(**r, p.completed_orders).tier == *tier)
                    .count();
                (*tier, count)
            })
            .collect();

        let buckets = RatingBucket::ALL
            .iter()
            .map(|bucket| {
                let count = ratings.iter().filter(|r| rating_bucket(**r) == *bucket).count();
                (*bucket, count)
            })
            .collect();

        let average_rating = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().sum::<f64>() / ratings.len() as f64
        };

        Self {
            total: profiles.len(),
            average_rating,
            top_rated: ratings.iter().filter(|r| **r >= ELITE_MIN_RATING).count(),
            needs_attention: ratings.iter().filter(|r| **r < PRO_MIN_RATING).count(),
            tiers,
            buckets,
        }
    }

    pub fn tier_count(&self, tier: DriverTier) -> usize {
        self.tiers
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn bucket_count(&self, bucket: RatingBucket) -> usize {
        self.buckets
            .iter()
            .find(|(b, _)| *b == bucket)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}
