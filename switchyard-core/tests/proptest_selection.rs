//! Property-based tests for candidate ordering.
//!
//! Uses `proptest` to check the ordering guarantees of every strategy over
//! arbitrary provider sets: only available providers are returned, each at
//! most once, and priority order and rotation hold regardless of input.

use std::collections::HashSet;

use proptest::prelude::*;

use switchyard_core::FallbackStrategy;
use switchyard_core::config::RouterConfig;
use switchyard_core::selection::{Ranked, Selector};

#[derive(Debug, Clone)]
struct P {
    name: String,
    priority: i32,
    available: bool,
}

impl Ranked for P {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_providers(max: usize) -> impl Strategy<Value = Vec<P>> {
    prop::collection::vec((-5..5i32, any::<bool>()), 0..max).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (priority, available))| P {
                name: format!("p{i}"),
                priority,
                available,
            })
            .collect()
    })
}

fn arb_strategy() -> impl Strategy<Value = FallbackStrategy> {
    prop_oneof![
        Just(FallbackStrategy::Priority),
        Just(FallbackStrategy::RoundRobin),
        Just(FallbackStrategy::Random),
    ]
}

fn names(ps: &[P]) -> Vec<String> {
    ps.iter().map(|p| p.name.clone()).collect()
}

// ---------------------------------------------------------------------------
// Property: every strategy returns exactly the available set
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn candidates_are_exactly_the_available_providers(
        providers in arb_providers(12),
        strategy in arb_strategy(),
        calls in 1..4usize,
    ) {
        let selector = Selector::new(strategy);
        let expected: HashSet<String> =
            providers.iter().filter(|p| p.available).map(|p| p.name.clone()).collect();

        for _ in 0..calls {
            let ordered = names(&selector.order(&providers));
            let unique: HashSet<String> = ordered.iter().cloned().collect();
            prop_assert_eq!(ordered.len(), unique.len(), "no provider appears twice");
            prop_assert_eq!(&unique, &expected);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: priority order is non-decreasing and stable on ties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn priority_order_is_ascending_and_stable(providers in arb_providers(12)) {
        let ordered = Selector::new(FallbackStrategy::Priority).order(&providers);
        for pair in ordered.windows(2) {
            prop_assert!(pair[0].priority <= pair[1].priority);
            if pair[0].priority == pair[1].priority {
                let index = |p: &P| providers.iter().position(|q| q.name == p.name);
                prop_assert!(index(&pair[0]) < index(&pair[1]), "ties keep registration order");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property: round-robin never starts at the same provider twice in a row
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn round_robin_moves_the_start(providers in arb_providers(8), calls in 2..10usize) {
        let available = providers.iter().filter(|p| p.available).count();
        prop_assume!(available >= 2);

        let selector = Selector::new(FallbackStrategy::RoundRobin);
        let mut previous: Option<String> = None;
        for _ in 0..calls {
            let first = selector.order(&providers)[0].name.clone();
            prop_assert_ne!(Some(&first), previous.as_ref());
            previous = Some(first);
        }
    }
}

proptest! {
    #[test]
    fn round_robin_visits_every_available_start(providers in arb_providers(8)) {
        let available = providers.iter().filter(|p| p.available).count();
        prop_assume!(available >= 1);

        let selector = Selector::new(FallbackStrategy::RoundRobin);
        let starts: HashSet<String> = (0..available)
            .map(|_| selector.order(&providers)[0].name.clone())
            .collect();
        prop_assert_eq!(starts.len(), available);
    }
}

// ---------------------------------------------------------------------------
// Property: backoff doubles and never exceeds the cap
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn backoff_is_capped_and_monotonic(
        base in 1..5_000u64,
        cap in 1..120_000u64,
        attempts in 1..40u32,
    ) {
        let config = RouterConfig {
            backoff_base_ms: base,
            max_backoff_ms: cap,
            ..RouterConfig::default()
        };
        let mut last = std::time::Duration::ZERO;
        for attempt in 1..=attempts {
            let delay = config.backoff_delay(attempt);
            prop_assert!(delay.as_millis() <= u128::from(cap));
            prop_assert!(delay >= last);
            last = delay;
        }
        prop_assert_eq!(config.backoff_delay(1).as_millis(), u128::from(base.min(cap)));
    }
}
