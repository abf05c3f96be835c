//! Wire schema for the forum listing API.

mod listing;

pub use listing::{ForumListing, ForumPost, ListingEnvelope, ThingEnvelope};

use serde::{Deserialize, Serialize};

/// Listing sort methods supported by the forum API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMethod {
    Hot,
    New,
    Top,
    Rising,
    Controversial,
}

impl SortMethod {
    /// All sort methods, in listing-endpoint order.
    pub const ALL: [SortMethod; 5] = [
        SortMethod::Hot,
        SortMethod::New,
        SortMethod::Top,
        SortMethod::Rising,
        SortMethod::Controversial,
    ];

    /// URL path segment for the listing endpoint (`/r/<sub>/<sort>.json`).
    pub fn as_str(self) -> &'static str {
        match self {
            SortMethod::Hot => "hot",
            SortMethod::New => "new",
            SortMethod::Top => "top",
            SortMethod::Rising => "rising",
            SortMethod::Controversial => "controversial",
        }
    }

    /// Whether the endpoint accepts a `t=<time filter>` query parameter.
    pub fn supports_time_filter(self) -> bool {
        matches!(self, SortMethod::Top | SortMethod::Controversial)
    }
}

impl std::fmt::Display for SortMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window filter for `top` and `controversial` listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 6] = [
        TimeFilter::Hour,
        TimeFilter::Day,
        TimeFilter::Week,
        TimeFilter::Month,
        TimeFilter::Year,
        TimeFilter::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl std::fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
