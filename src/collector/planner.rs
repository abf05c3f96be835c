//! Diversified sampling plans.
//!
//! A single sort order caps out quickly on a busy sub-source; spreading the
//! same request budget across sort × time-filter × offset dimensions yields
//! far more unique posts per run. The final shuffle spreads the load across
//! credentials and avoids hammering one endpoint shape back-to-back.

use groundswell_schema::forum::{SortMethod, TimeFilter};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

/// Max items one listing call may return.
pub const MAX_LISTING_LIMIT: u32 = 100;

const TWO_DAYS_SECS: i64 = 2 * 24 * 3600;
const THIRTY_DAYS_SECS: i64 = 30 * 24 * 3600;
const DEEP_OFFSETS: [u32; 5] = [50, 100, 200, 400, 600];

/// One listing call to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingStrategy {
    pub sub_source: String,
    pub sort: SortMethod,
    /// Only meaningful for `top`/`controversial`.
    pub time_filter: Option<TimeFilter>,
    pub limit: u32,
    /// Creation-time window bounds (unix seconds), for windowed `new` scans.
    pub before_unix: Option<i64>,
    pub after_unix: Option<i64>,
    /// Pagination depth to skip into before collecting.
    pub offset: Option<u32>,
}

impl SamplingStrategy {
    fn basic(sub_source: &str, sort: SortMethod, limit: u32) -> Self {
        Self {
            sub_source: sub_source.to_string(),
            sort,
            time_filter: None,
            limit: limit.clamp(1, MAX_LISTING_LIMIT),
            before_unix: None,
            after_unix: None,
            offset: None,
        }
    }
}

/// Emits a shuffled multi-dimensional plan for one harvest run.
pub fn plan(
    sub_sources: &[String],
    target_count: usize,
    now_unix: i64,
    rng: &mut impl Rng,
) -> Vec<SamplingStrategy> {
    if sub_sources.is_empty() || target_count == 0 {
        return Vec::new();
    }

    let target_per_sub = target_count.div_ceil(sub_sources.len());
    let base_limit =
        u32::try_from(target_per_sub.div_ceil(SortMethod::ALL.len())).unwrap_or(MAX_LISTING_LIMIT);

    let mut strategies = Vec::new();
    for sub in sub_sources {
        // One strategy per sort method.
        for sort in SortMethod::ALL {
            let mut s = SamplingStrategy::basic(sub, sort, base_limit);
            if sort.supports_time_filter() {
                s.time_filter = Some(TimeFilter::Day);
            }
            strategies.push(s);
        }

        // Extra randomized time windows for the filterable sorts.
        for sort in [SortMethod::Top, SortMethod::Controversial] {
            for _ in 0..3 {
                let mut s = SamplingStrategy::basic(sub, sort, base_limit);
                s.time_filter = TimeFilter::ALL.choose(rng).copied();
                strategies.push(s);
            }
        }

        // Shallow resamples of the fast-moving sorts.
        for sort in [SortMethod::New, SortMethod::Hot, SortMethod::Rising] {
            for _ in 0..2 {
                strategies.push(SamplingStrategy::basic(sub, sort, 25));
            }
        }

        // Five random 2-day windows inside the last 30 days, newest-first scan.
        for _ in 0..5 {
            let start_back = rng.random_range(TWO_DAYS_SECS..THIRTY_DAYS_SECS);
            let after = now_unix - start_back;
            let mut s = SamplingStrategy::basic(sub, SortMethod::New, base_limit);
            s.after_unix = Some(after);
            s.before_unix = Some(after + TWO_DAYS_SECS);
            strategies.push(s);
        }

        // Deep pagination offsets for hot/rising.
        for sort in [SortMethod::Hot, SortMethod::Rising] {
            let base = DEEP_OFFSETS.choose(rng).copied().unwrap_or(50);
            let mut s = SamplingStrategy::basic(sub, sort, base_limit);
            s.offset = Some(base + rng.random_range(0..50));
            strategies.push(s);
        }
    }

    strategies.shuffle(rng);
    strategies
}
