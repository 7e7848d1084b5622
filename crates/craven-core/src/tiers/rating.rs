//! ============================================================================
//! Rating Tiers - Driver tier, color and trend classification
//! ============================================================================
//! Pure functions over already-fetched profile fields. Every threshold is an
//! inclusive lower bound: a rating of exactly 4.8 is Elite-colored.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Rating thresholds (inclusive lower bounds)
pub const ELITE_MIN_RATING: f64 = 4.8;
pub const PRO_MIN_RATING: f64 = 4.5;
pub const RISING_MIN_RATING: f64 = 4.0;

/// Completed-delivery thresholds
pub const ELITE_MIN_DELIVERIES: u32 = 100;
pub const PRO_MIN_DELIVERIES: u32 = 50;
pub const RISING_MIN_DELIVERIES: u32 = 20;

/// Deltas beyond this are a "strong" trend
pub const STRONG_TREND: f64 = 0.05;

/// Hex display color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Color(pub &'static str);

impl Color {
    pub const PLATINUM: Color = Color("#E5E4E2");
    pub const GOLD: Color = Color("#D4AF37");
    pub const SILVER: Color = Color("#C0C0C0");
    pub const BRONZE: Color = Color("#CD7F32");

    pub const STRONG_UP: Color = Color("#16A34A");
    pub const UP: Color = Color("#22C55E");
    pub const NEUTRAL: Color = Color("#6B7280");
    pub const DOWN: Color = Color("#F97316");
    pub const STRONG_DOWN: Color = Color("#DC2626");

    pub fn hex(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Named driver tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriverTier {
    #[default]
    New,
    Rising,
    Pro,
    Elite,
}

impl DriverTier {
    /// Highest first
    pub const ALL: [DriverTier; 4] = [
        DriverTier::Elite,
        DriverTier::Pro,
        DriverTier::Rising,
        DriverTier::New,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            DriverTier::Elite => "Elite",
            DriverTier::Pro => "Pro",
            DriverTier::Rising => "Rising Star",
            DriverTier::New => "New Driver",
        }
    }

    pub fn min_rating(&self) -> f64 {
        match self {
            DriverTier::Elite => ELITE_MIN_RATING,
            DriverTier::Pro => PRO_MIN_RATING,
            DriverTier::Rising => RISING_MIN_RATING,
            DriverTier::New => 0.0,
        }
    }

    pub fn min_deliveries(&self) -> u32 {
        match self {
            DriverTier::Elite => ELITE_MIN_DELIVERIES,
            DriverTier::Pro => PRO_MIN_DELIVERIES,
            DriverTier::Rising => RISING_MIN_DELIVERIES,
            DriverTier::New => 0,
        }
    }

    pub fn color(&self) -> Color {
        match self {
            DriverTier::Elite => Color::PLATINUM,
            DriverTier::Pro => Color::GOLD,
            DriverTier::Rising => Color::SILVER,
            DriverTier::New => Color::BRONZE,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            DriverTier::Elite => "👑",
            DriverTier::Pro => "⭐",
            DriverTier::Rising => "🚀",
            DriverTier::New => "🌱",
        }
    }

    /// Tier above this one; None for Elite
    pub fn next(&self) -> Option<DriverTier> {
        match self {
            DriverTier::New => Some(DriverTier::Rising),
            DriverTier::Rising => Some(DriverTier::Pro),
            DriverTier::Pro => Some(DriverTier::Elite),
            DriverTier::Elite => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            DriverTier::New => 0,
            DriverTier::Rising => 1,
            DriverTier::Pro => 2,
            DriverTier::Elite => 3,
        }
    }

    pub fn info(&self) -> TierInfo {
        TierInfo {
            tier: *self,
            minimum: self.min_rating(),
            min_deliveries: self.min_deliveries(),
            color: self.color(),
            name: self.display_name(),
            icon: self.icon(),
        }
    }
}

impl PartialOrd for DriverTier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DriverTier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for DriverTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Badge data for a tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierInfo {
    pub tier: DriverTier,
    pub minimum: f64,
    pub min_deliveries: u32,
    pub color: Color,
    pub name: &'static str,
    pub icon: &'static str,
}

/// Rating-only bucket (NaN and anything below 4.0 is lowest)
fn rating_only_tier(rating: f64) -> DriverTier {
    match rating {
        r if r >= ELITE_MIN_RATING => DriverTier::Elite,
        r if r >= PRO_MIN_RATING => DriverTier::Pro,
        r if r >= RISING_MIN_RATING => DriverTier::Rising,
        _ => DriverTier::New,
    }
}

/// Display color for a rating
pub fn color_for_rating(rating: f64) -> Color {
    rating_only_tier(rating).color()
}

/// Tier for a rating and completed-delivery count; both thresholds must
/// hold, otherwise the next lower tier is tried
pub fn tier_for_rating(rating: f64, deliveries: u32) -> TierInfo {
    DriverTier::ALL
        .iter()
        .find(|t| rating >= t.min_rating() && deliveries >= t.min_deliveries())
        .copied()
        .unwrap_or(DriverTier::New)
        .info()
}

/// `rating / 5 * 100`, not clamped to 0..=100
pub fn percentage_for_rating(rating: f64) -> f64 {
    rating / 5.0 * 100.0
}

/// Two-decimal rating label ("4.60")
pub fn format_rating(rating: f64) -> String {
    format!("{:.2}", rating)
}

/// Direction and strength of a rating change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StrongUp,
    Up,
    Neutral,
    Down,
    StrongDown,
}

impl Trend {
    /// NaN and zero are neutral
    pub fn from_delta(delta: f64) -> Self {
        if delta > STRONG_TREND {
            Trend::StrongUp
        } else if delta > 0.0 {
            Trend::Up
        } else if delta < -STRONG_TREND {
            Trend::StrongDown
        } else if delta < 0.0 {
            Trend::Down
        } else {
            Trend::Neutral
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Trend::StrongUp => "⬆",
            Trend::Up => "↗",
            Trend::Neutral => "→",
            Trend::Down => "↘",
            Trend::StrongDown => "⬇",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Trend::StrongUp => Color::STRONG_UP,
            Trend::Up => Color::UP,
            Trend::Neutral => Color::NEUTRAL,
            Trend::Down => Color::DOWN,
            Trend::StrongDown => Color::STRONG_DOWN,
        }
    }
}

pub fn trend_icon(delta: f64) -> &'static str {
    Trend::from_delta(delta).glyph()
}

pub fn trend_color(delta: f64) -> Color {
    Trend::from_delta(delta).color()
}

/// Signed two-decimal trend label ("+0.12", "-0.30", "0.00")
pub fn format_trend(delta: f64) -> String {
    if delta > 0.0 {
        format!("+{:.2}", delta)
    } else if delta.is_nan() {
        format_rating(0.0)
    } else {
        format!("{:.2}", delta)
    }
}

/// Standing badge on the admin rating table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    Excellent,
    Good,
    Average,
    AtRisk,
}

impl Standing {
    pub fn for_rating(rating: f64) -> Self {
        match rating_only_tier(rating) {
            DriverTier::Elite => Standing::Excellent,
            DriverTier::Pro => Standing::Good,
            DriverTier::Rising => Standing::Average,
            DriverTier::New => Standing::AtRisk,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Standing::Excellent => "Excellent",
            Standing::Good => "Good",
            Standing::Average => "Average",
            Standing::AtRisk => "At Risk",
        }
    }

    /// Below "Good" needs admin attention
    pub fn needs_attention(&self) -> bool {
        matches!(self, Standing::Average | Standing::AtRisk)
    }
}
