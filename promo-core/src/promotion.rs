// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const HOUR_SECS: u64 = 60 * 60;

const TRENDING_DURATIONS: [PromoDuration; 4] = [
    PromoDuration::hours(6),
    PromoDuration::hours(12),
    PromoDuration::hours(18),
    PromoDuration::hours(24),
];

const WINDOW_DURATIONS: [PromoDuration; 5] = [
    PromoDuration::days(30),
    PromoDuration::days(60),
    PromoDuration::days(90),
    PromoDuration::days(180),
    PromoDuration::days(365),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionKind {
    /// Boosted placement in the trending list.
    Trending,
    /// Fee to display a custom image with notifications.
    Image,
    /// Footer advertisement slot.
    Footer,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Normal,
    Premium,
}

/// Length of a promotion window, kept in whole hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromoDuration {
    hours: u32,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromotionError {
    #[error("unknown promotion kind: {0}")]
    UnknownKind(String),
    #[error("unknown tier: {0}")]
    UnknownTier(String),
    #[error("{kind} promotions do not offer a {duration} duration")]
    UnknownDuration {
        kind: PromotionKind,
        duration: PromoDuration,
    },
    #[error("{kind} promotions have no {tier} tier")]
    UnsupportedTier { kind: PromotionKind, tier: Tier },
}

impl PromotionKind {
    pub const ALL: [PromotionKind; 3] = [Self::Trending, Self::Image, Self::Footer];

    /// The closed set of durations that can be bought for this kind.
    pub fn durations(self) -> &'static [PromoDuration] {
        match self {
            Self::Trending => &TRENDING_DURATIONS,
            Self::Image | Self::Footer => &WINDOW_DURATIONS,
        }
    }

    pub fn tiers(self) -> &'static [Tier] {
        match self {
            Self::Trending => &[Tier::Normal, Tier::Premium],
            Self::Image | Self::Footer => &[Tier::Normal],
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Trending => "trending",
            Self::Image => "image",
            Self::Footer => "footer",
        }
    }

    /// Checks that `(duration, tier)` is something this kind sells.
    pub fn check_offer(self, duration: PromoDuration, tier: Tier) -> Result<(), PromotionError> {
        if !self.durations().contains(&duration) {
            return Err(PromotionError::UnknownDuration {
                kind: self,
                duration,
            });
        }
        if !self.tiers().contains(&tier) {
            return Err(PromotionError::UnsupportedTier { kind: self, tier });
        }
        Ok(())
    }
}

impl Tier {
    pub fn key(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Premium => "premium",
        }
    }
}

impl PromoDuration {
    pub const fn hours(hours: u32) -> Self {
        Self { hours }
    }

    /// Whole days, saturating at `u32::MAX` hours.
    pub const fn days(days: u32) -> Self {
        Self {
            hours: days.saturating_mul(24),
        }
    }

    /// `days`, or `None` when the hour count does not fit a `u32`.
    pub const fn checked_days(days: u32) -> Option<Self> {
        match days.checked_mul(24) {
            Some(hours) => Some(Self { hours }),
            None => None,
        }
    }

    pub fn as_hours(self) -> u32 {
        self.hours
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.hours) * HOUR_SECS)
    }
}

impl fmt::Display for PromotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl fmt::Display for PromoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hours > 24 && self.hours % 24 == 0 {
            write!(f, "{}d", self.hours / 24)
        } else {
            write!(f, "{}h", self.hours)
        }
    }
}

impl FromStr for PromotionKind {
    type Err = PromotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trending" | "trend" | "boost" => Ok(Self::Trending),
            "image" | "image_fee" => Ok(Self::Image),
            "footer" | "footer_ad" | "ad" => Ok(Self::Footer),
            _ => Err(PromotionError::UnknownKind(s.to_string())),
        }
    }
}

impl FromStr for Tier {
    type Err = PromotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "premium" => Ok(Self::Premium),
            _ => Err(PromotionError::UnknownTier(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_sets_are_closed_per_kind() {
        let trending: Vec<u32> = PromotionKind::Trending
            .durations()
            .iter()
            .map(|d| d.as_hours())
            .collect();
        assert_eq!(trending, vec![6, 12, 18, 24]);
        assert_eq!(PromotionKind::Footer.durations().len(), 5);
        assert_eq!(
            PromotionKind::Image.durations(),
            PromotionKind::Footer.durations()
        );
    }

    #[test]
    fn check_offer_rejects_foreign_durations_and_tiers() {
        assert!(
            PromotionKind::Trending
                .check_offer(PromoDuration::hours(24), Tier::Premium)
                .is_ok()
        );
        assert!(matches!(
            PromotionKind::Trending.check_offer(PromoDuration::days(30), Tier::Normal),
            Err(PromotionError::UnknownDuration { .. })
        ));
        assert!(matches!(
            PromotionKind::Image.check_offer(PromoDuration::days(30), Tier::Premium),
            Err(PromotionError::UnsupportedTier { .. })
        ));
    }

    #[test]
    fn durations_render_in_natural_units() {
        assert_eq!(PromoDuration::hours(24).to_string(), "24h");
        assert_eq!(PromoDuration::days(365).to_string(), "365d");
        assert_eq!(
            PromoDuration::hours(6).as_duration(),
            Duration::from_secs(6 * 3600)
        );
    }

    #[test]
    fn oversized_day_counts_never_wrap() {
        assert_eq!(PromoDuration::checked_days(30), Some(PromoDuration::days(30)));
        assert_eq!(PromoDuration::checked_days(u32::MAX), None);
        // 536870913 * 24 wraps to 24 in u32 arithmetic.
        assert_eq!(PromoDuration::checked_days(536_870_913), None);
        assert_eq!(PromoDuration::days(u32::MAX).as_hours(), u32::MAX);
        assert!(matches!(
            PromotionKind::Trending.check_offer(PromoDuration::days(536_870_913), Tier::Normal),
            Err(PromotionError::UnknownDuration { .. })
        ));
    }
}
