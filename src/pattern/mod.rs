//! Braking patterns: precomputed distance tables, the registries that turn
//! wayside data into (target speed, end location) constraints, and the
//! aggregator that finds the binding constraint each frame.

use smallvec::SmallVec;

pub mod aggregate;
pub mod registry;
pub mod table;

pub use aggregate::{PatternSet, PatternStatus};
pub use table::{DecelerationBand, DecelerationProfile, PatternTable};

/// Most patterns any device tracks at once (digital ATC: section, three
/// station stops, three user slots and the fallback).
pub const MAX_PATTERNS: usize = 8;

/// Pattern list for one frame, fallback last.
pub type PatternList = SmallVec<[PatternEntry; MAX_PATTERNS]>;

/// One braking constraint: be at or below `target_speed` by `end_location`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PatternEntry {
    /// Target speed [km/h].
    pub target_speed: i32,
    /// Location where the target speed must be reached [m].
    pub end_location: f64,
    pub valid: bool,
}

impl PatternEntry {
    pub fn new(target_speed: i32, end_location: f64) -> Self {
        Self {
            target_speed,
            end_location,
            valid: true,
        }
    }

    /// The vehicle maximum-speed ceiling appended to every list.
    pub fn fallback(max_speed: i32) -> Self {
        Self::new(max_speed, 0.0)
    }
}

/// Gather registry outputs in order and append the fallback entry.
pub fn collect_patterns<I>(sources: I, max_speed: i32) -> PatternList
where
    I: IntoIterator<Item = PatternEntry>,
{
    let mut list: PatternList = sources.into_iter().collect();
    list.push(PatternEntry::fallback(max_speed));
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_still_yield_the_fallback() {
        let list = collect_patterns(std::iter::empty(), 220);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0], PatternEntry::fallback(220));
        assert!(list[0].valid);
    }

    #[test]
    fn fallback_is_appended_after_sources() {
        let sources = [PatternEntry::new(0, 500.0), PatternEntry::default()];
        let list = collect_patterns(sources, 140);
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].target_speed, 0);
        assert!(!list[1].valid);
        assert_eq!(list[2].target_speed, 140);
    }
}
