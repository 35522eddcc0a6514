//! Side-pot settlement from per-player contributions.
//!
//! When players go all in for different amounts the pot splits into layers.
//! [`side_pots`] rebuilds those layers from the hand's total contributions:
//! each distinct contribution level (ascending) forms one pot holding
//! `(level - previous_level) * contributors_at_or_above`, and only players
//! who reached that level *and* are still in the hand can win it.
//!
//! With contributions `{a: 100, b: 100, c: 50}` and nobody folded this
//! yields `[{150, {a, b, c}}, {100, {a, b}}]`.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::entities::{Chips, PlayerId};

/// One layer of the pot and the players who can win it.
///
/// `eligible` can be empty when every contributor at this level folded;
/// the showdown folds such orphaned chips into the award for the winners
/// below it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SidePot {
    pub amount: Chips,
    pub eligible: BTreeSet<PlayerId>,
}

/// Split total contributions into ordered side pots, main pot first.
///
/// The slices always account for every contributed chip, folded players
/// included: folding forfeits eligibility, never the chips.
pub fn side_pots(
    contributions: &HashMap<PlayerId, Chips>,
    active: &HashSet<PlayerId>,
) -> Vec<SidePot> {
    let mut levels: Vec<Chips> = contributions
        .values()
        .copied()
        .filter(|&amount| amount > 0)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let mut pots = Vec::with_capacity(levels.len());
    let mut prev = 0;
    for level in levels {
        let contributors: Vec<&PlayerId> = contributions
            .iter()
            .filter(|&(_, &amount)| amount >= level)
            .map(|(player, _)| player)
            .collect();
        let amount = (level - prev) * contributors.len() as Chips;
        let eligible = contributors
            .into_iter()
            .filter(|player| active.contains(*player))
            .cloned()
            .collect();
        pots.push(SidePot { amount, eligible });
        prev = level;
    }
    pots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contributions(entries: &[(&str, Chips)]) -> HashMap<PlayerId, Chips> {
        entries
            .iter()
            .map(|(id, amount)| (PlayerId::from(*id), *amount))
            .collect()
    }

    fn actives(ids: &[&str]) -> HashSet<PlayerId> {
        ids.iter().map(|id| PlayerId::from(*id)).collect()
    }

    fn eligible(ids: &[&str]) -> BTreeSet<PlayerId> {
        ids.iter().map(|id| PlayerId::from(*id)).collect()
    }

    #[test]
    fn test_short_all_in_creates_two_pots() {
        let pots = side_pots(
            &contributions(&[("a", 100), ("b", 100), ("c", 50)]),
            &actives(&["a", "b", "c"]),
        );
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[0].amount, 150);
        assert_eq!(pots[0].eligible, eligible(&["a", "b", "c"]));
        assert_eq!(pots[1].amount, 100);
        assert_eq!(pots[1].eligible, eligible(&["a", "b"]));
    }

    #[test]
    fn test_equal_contributions_form_one_pot() {
        let pots = side_pots(
            &contributions(&[("a", 40), ("b", 40), ("c", 40)]),
            &actives(&["a", "b", "c"]),
        );
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 120);
        assert_eq!(pots[0].eligible.len(), 3);
    }

    #[test]
    fn test_folding_forfeits_eligibility_not_chips() {
        let pots = side_pots(
            &contributions(&[("a", 100), ("b", 100), ("c", 50)]),
            &actives(&["a", "c"]),
        );
        // b's chips stay in both layers, b can win neither.
        assert_eq!(pots[0].amount, 150);
        assert_eq!(pots[0].eligible, eligible(&["a", "c"]));
        assert_eq!(pots[1].amount, 100);
        assert_eq!(pots[1].eligible, eligible(&["a"]));
    }

    #[test]
    fn test_folded_top_contributor_leaves_orphan_layer() {
        let pots = side_pots(
            &contributions(&[("a", 100), ("b", 150)]),
            &actives(&["a"]),
        );
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[1].amount, 50);
        assert!(pots[1].eligible.is_empty());
    }

    #[test]
    fn test_every_chip_lands_in_exactly_one_pot() {
        let entries = contributions(&[("a", 75), ("b", 200), ("c", 200), ("d", 10)]);
        let pots = side_pots(&entries, &actives(&["a", "b", "c", "d"]));
        let total: Chips = pots.iter().map(|pot| pot.amount).sum();
        assert_eq!(total, entries.values().sum::<Chips>());
    }

    #[test]
    fn test_no_contributions_no_pots() {
        let pots = side_pots(&HashMap::new(), &actives(&["a"]));
        assert!(pots.is_empty());
    }
}
