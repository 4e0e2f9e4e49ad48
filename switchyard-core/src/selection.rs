//! Candidate ordering strategies.
//!
//! A [`Selector`] takes the full provider list and returns the available
//! subset in the order the request should try them. It never waits or
//! retries; an empty result means the caller fails fast.

use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::types::FallbackStrategy;

/// What a selector needs to know about a provider.
pub trait Ranked {
    /// Unique name.
    fn name(&self) -> &str;
    /// Lower is preferred.
    fn priority(&self) -> i32;
    /// Currently eligible.
    fn is_available(&self) -> bool;
}

/// Orders providers according to a [`FallbackStrategy`].
#[derive(Debug)]
pub struct Selector {
    strategy: FallbackStrategy,
    /// Name of the provider the previous round-robin call started with.
    last_start: Mutex<Option<String>>,
}

impl Selector {
    /// Create a selector for `strategy`.
    #[must_use]
    pub fn new(strategy: FallbackStrategy) -> Self {
        Self {
            strategy,
            last_start: Mutex::new(None),
        }
    }

    /// The configured strategy.
    #[must_use]
    pub fn strategy(&self) -> FallbackStrategy {
        self.strategy
    }

    /// Ordered candidates among the available entries of `entries`.
    ///
    /// `entries` is expected in registration order; it breaks priority ties.
    pub fn order<T: Ranked + Clone>(&self, entries: &[T]) -> Vec<T> {
        match self.strategy {
            FallbackStrategy::Priority => by_priority(entries)
                .into_iter()
                .filter(Ranked::is_available)
                .collect(),
            FallbackStrategy::RoundRobin => self.rotate(entries),
            FallbackStrategy::Random => {
                let mut available: Vec<T> = entries.iter().filter(|e| e.is_available()).cloned().collect();
                available.shuffle(&mut rand::thread_rng());
                available
            }
        }
    }

    /// Rotation is keyed on provider identity in the full priority order, so
    /// the next start is "the first available provider after the last start"
    /// even when the available set grew or shrank in between.
    fn rotate<T: Ranked + Clone>(&self, entries: &[T]) -> Vec<T> {
        let ordered = by_priority(entries);
        let mut last_start = self.last_start.lock();

        let after = last_start
            .as_deref()
            .and_then(|name| ordered.iter().position(|e| e.name() == name))
            .map_or(0, |i| i + 1);

        let n = ordered.len();
        let rotated: Vec<T> = (0..n)
            .map(|k| &ordered[(after + k) % n.max(1)])
            .filter(|e| e.is_available())
            .cloned()
            .collect();

        if let Some(first) = rotated.first() {
            *last_start = Some(first.name().to_string());
        }
        rotated
    }
}

fn by_priority<T: Ranked + Clone>(entries: &[T]) -> Vec<T> {
    let mut sorted = entries.to_vec();
    // `sort_by_key` is stable: equal priorities keep registration order.
    sorted.sort_by_key(Ranked::priority);
    sorted
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct P {
        name: &'static str,
        priority: i32,
        available: bool,
    }

    impl Ranked for P {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn p(name: &'static str, priority: i32, available: bool) -> P {
        P { name, priority, available }
    }

    fn names(list: &[P]) -> Vec<&'static str> {
        list.iter().map(|p| p.name).collect()
    }

    #[test]
    fn priority_sorts_ascending_and_drops_unavailable() {
        let selector = Selector::new(FallbackStrategy::Priority);
        let entries = [p("c", 3, true), p("a", 1, true), p("x", 0, false), p("b", 2, true)];
        assert_eq!(names(&selector.order(&entries)), ["a", "b", "c"]);
    }

    #[test]
    fn priority_ties_keep_registration_order() {
        let selector = Selector::new(FallbackStrategy::Priority);
        let entries = [p("first", 5, true), p("second", 5, true), p("top", 1, true)];
        assert_eq!(names(&selector.order(&entries)), ["top", "first", "second"]);
    }

    #[test]
    fn round_robin_advances_start() {
        let selector = Selector::new(FallbackStrategy::RoundRobin);
        let entries = [p("a", 1, true), p("b", 2, true), p("c", 3, true)];
        assert_eq!(names(&selector.order(&entries)), ["a", "b", "c"]);
        assert_eq!(names(&selector.order(&entries)), ["b", "c", "a"]);
        assert_eq!(names(&selector.order(&entries)), ["c", "a", "b"]);
        assert_eq!(names(&selector.order(&entries)), ["a", "b", "c"]);
    }

    #[test]
    fn round_robin_skips_unavailable_without_losing_place() {
        let selector = Selector::new(FallbackStrategy::RoundRobin);
        let all_up = [p("a", 1, true), p("b", 2, true), p("c", 3, true)];
        assert_eq!(selector.order(&all_up)[0].name, "a");

        let b_down = [p("a", 1, true), p("b", 2, false), p("c", 3, true)];
        assert_eq!(names(&selector.order(&b_down)), ["c", "a"]);

        assert_eq!(selector.order(&all_up)[0].name, "a");
    }

    #[test]
    fn round_robin_single_member_repeats() {
        let selector = Selector::new(FallbackStrategy::RoundRobin);
        let entries = [p("solo", 1, true), p("down", 2, false)];
        assert_eq!(names(&selector.order(&entries)), ["solo"]);
        assert_eq!(names(&selector.order(&entries)), ["solo"]);
    }

    #[test]
    fn empty_or_all_down_yields_nothing() {
        for strategy in [FallbackStrategy::Priority, FallbackStrategy::RoundRobin, FallbackStrategy::Random] {
            let selector = Selector::new(strategy);
            assert!(selector.order::<P>(&[]).is_empty());
            assert!(selector.order(&[p("a", 1, false)]).is_empty());
        }
    }

    #[test]
    fn random_first_pick_is_roughly_uniform() {
        let selector = Selector::new(FallbackStrategy::Random);
        let entries = [p("a", 1, true), p("b", 2, true), p("c", 3, true), p("d", 4, false)];
        let trials = 6000;
        let mut firsts: HashMap<&str, u32> = HashMap::new();
        for _ in 0..trials {
            let order = selector.order(&entries);
            assert_eq!(order.len(), 3);
            *firsts.entry(order[0].name).or_default() += 1;
        }
        assert!(!firsts.contains_key("d"));
        for name in ["a", "b", "c"] {
            let count = firsts.get(name).copied().unwrap_or(0);
            // Expected 2000 each; bounds are far outside sampling noise.
            assert!((1500..=2500).contains(&count), "{name} first {count} times");
        }
    }
}
