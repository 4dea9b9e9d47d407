use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::error::AppError;

pub mod context;
pub mod recommendation;
pub mod resource;

pub use context::{RecommendationContext, UserSignals};
pub use recommendation::{
    FeedRecommendations, Recommendation, RecommendationItem, RecommendationKey, ScoredResource,
};
pub use resource::{Resource, Topic};

/// Category of learning resource that recommendations are grouped by
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FeedType {
    Paper,
    Video,
    BlogPost,
    CurrentEvent,
    SocialMediaPost,
}

impl FeedType {
    /// Every feed type, in the order feeds are presented
    pub const ALL: [FeedType; 5] = [
        FeedType::Paper,
        FeedType::Video,
        FeedType::BlogPost,
        FeedType::CurrentEvent,
        FeedType::SocialMediaPost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Paper => "paper",
            FeedType::Video => "video",
            FeedType::BlogPost => "blog_post",
            FeedType::CurrentEvent => "current_event",
            FeedType::SocialMediaPost => "social_media_post",
        }
    }
}

impl Display for FeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        FeedType::ALL
            .into_iter()
            .find(|feed_type| feed_type.as_str() == normalized)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown feed type: {}", s)))
    }
}

/// A user's vote on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

impl Vote {
    /// Maps the stored `+1` / `-1` representation
    pub fn from_value(value: i16) -> Option<Self> {
        match value {
            1 => Some(Vote::Up),
            -1 => Some(Vote::Down),
            _ => None,
        }
    }
}
