//! Weighted scenario selection (`spec.md` §4.3).

use rand::Rng;

use crate::model::Scenario;

/// Pick one scenario with probability proportional to its declared
/// `weight`. Uses the engine's own RNG stream so a fixed seed reproduces
/// the same sequence of selections.
pub fn select_weighted<'a>(scenarios: &'a [Scenario], rng: &mut impl Rng) -> &'a Scenario {
    debug_assert!(!scenarios.is_empty(), "scenario set must be non-empty");

    let total: u64 = scenarios.iter().map(|s| u64::from(s.weight)).sum();
    let mut pick = rng.random_range(0..total.max(1));

    for scenario in scenarios {
        let weight = u64::from(scenario.weight);
        if pick < weight {
            return scenario;
        }
        pick -= weight;
    }

    scenarios.last().expect("checked non-empty above")
}
