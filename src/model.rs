use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::score")]
    pub avg_review: Option<f64>,
}

impl Movie {
    /// Average rating with one decimal, or a dash for unreviewed movies.
    pub fn score_label(&self) -> String {
        match self.avg_review {
            Some(score) => format!("{:.1}", score),
            None => "–".to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Review {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub review: Option<String>,
    #[serde(deserialize_with = "lenient::rating")]
    pub rating: Rating,
    #[serde(default)]
    pub last_updated: String,
}

impl Review {
    /// Date part of `last_updated`; unparseable timestamps are shown as sent.
    pub fn updated_on(&self) -> String {
        let raw = self.last_updated.trim();
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map(|t| t.date())
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|t| t.date_naive()))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|_| raw.to_owned())
    }
}

/// Review score between 0 and 10 inclusive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Rating(value))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Every value the rating selector offers.
    pub fn all() -> impl Iterator<Item = Rating> {
        (0..=Self::MAX).map(Rating)
    }
}

impl Default for Rating {
    fn default() -> Self {
        Rating(Self::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingOutOfRange(pub i64);

impl fmt::Display for RatingOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rating {} is not between 0 and {}", self.0, Rating::MAX)
    }
}

impl TryFrom<u8> for Rating {
    type Error = RatingOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rating::new(value).ok_or(RatingOutOfRange(value.into()))
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Rating::new)
            .ok_or(RatingOutOfRange(value))
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> u8 {
        rating.value()
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The movie API serializes SQL decimals as strings and averages as null
/// for movies nobody reviewed yet.
mod lenient {
    use super::Rating;
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Float(f64),
        Text(String),
    }

    impl Number {
        fn into_f64<E: Error>(self) -> Result<f64, E> {
            match self {
                Number::Float(n) => Ok(n),
                Number::Text(s) => s.trim().parse().map_err(E::custom),
            }
        }
    }

    pub fn score<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Option::<Number>::deserialize(d)?
            .map(Number::into_f64)
            .transpose()
    }

    pub fn rating<'de, D: Deserializer<'de>>(d: D) -> Result<Rating, D::Error> {
        let n = Number::deserialize(d)?.into_f64::<D::Error>()?;
        if n.fract() != 0.0 {
            return Err(D::Error::custom(format!("rating {} is not an integer", n)));
        }
        Rating::try_from(n as i64).map_err(D::Error::custom)
    }
}
