//! Side-pot layering checked example by example, then property-based.
//!
//! The properties that matter:
//! - every contributed chip lands in exactly one layer, folds included
//! - folding forfeits eligibility, never the chips
//! - one layer per distinct contribution level, main pot first
//! - deeper layers only ever lose contenders

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

use holdem_rooms::game::{
    SidePot,
    entities::{Chips, PlayerId},
    side_pots,
};

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
fn test_laddered_all_ins_layer_by_stack() {
    // Four seats all in for 25, 75, 150 and 150. Each distinct level
    // opens a pot; the two deep stacks contest the top alone.
    let table = contributions(&[("p1", 25), ("p2", 75), ("p3", 150), ("p4", 150)]);
    let pots = side_pots(&table, &actives(&["p1", "p2", "p3", "p4"]));
    assert_eq!(
        pots,
        vec![
            SidePot {
                amount: 100,
                eligible: eligible(&["p1", "p2", "p3", "p4"]),
            },
            SidePot {
                amount: 150,
                eligible: eligible(&["p2", "p3", "p4"]),
            },
            SidePot {
                amount: 150,
                eligible: eligible(&["p3", "p4"]),
            },
        ]
    );
}

#[test]
fn test_folded_middle_stack_funds_every_layer_it_reached() {
    // p2 folded after matching 75. The chips stay in the layers they
    // fell into; only the eligibility drops out.
    let table = contributions(&[("p1", 25), ("p2", 75), ("p3", 150), ("p4", 150)]);
    let pots = side_pots(&table, &actives(&["p1", "p3", "p4"]));
    assert_eq!(
        pots,
        vec![
            SidePot {
                amount: 100,
                eligible: eligible(&["p1", "p3", "p4"]),
            },
            SidePot {
                amount: 150,
                eligible: eligible(&["p3", "p4"]),
            },
            SidePot {
                amount: 150,
                eligible: eligible(&["p3", "p4"]),
            },
        ]
    );
}

/// Strategy for one seat's total contribution.
fn contribution_strategy() -> impl Strategy<Value = Chips> {
    1u32..=1000
}

/// Strategy for a 2..=9 seat table of contributions.
fn table_strategy() -> impl Strategy<Value = HashMap<PlayerId, Chips>> {
    (2usize..=9).prop_flat_map(|n| {
        prop::collection::vec(contribution_strategy(), n).prop_map(|amounts| {
            amounts
                .into_iter()
                .enumerate()
                .map(|(i, amount)| (PlayerId::from(format!("player{i}")), amount))
                .collect()
        })
    })
}

/// Same table, plus an arbitrary subset of seats still in the hand.
fn table_with_folds_strategy() -> impl Strategy<Value = (HashMap<PlayerId, Chips>, HashSet<PlayerId>)>
{
    table_strategy().prop_flat_map(|table| {
        let ids: Vec<PlayerId> = table.keys().cloned().collect();
        prop::collection::vec(any::<bool>(), ids.len()).prop_map(move |stays| {
            let active: HashSet<PlayerId> = ids
                .iter()
                .zip(&stays)
                .filter(|(_, keep)| **keep)
                .map(|(id, _)| id.clone())
                .collect();
            (table.clone(), active)
        })
    })
}

proptest! {
    /// The layers always account for every contributed chip, no matter
    /// who folded.
    #[test]
    fn test_chip_conservation((table, active) in table_with_folds_strategy()) {
        let pots = side_pots(&table, &active);
        let pooled: Chips = pots.iter().map(|pot| pot.amount).sum();
        let contributed: Chips = table.values().sum();
        prop_assert_eq!(pooled, contributed);
    }

    /// One pot per distinct contribution level.
    #[test]
    fn test_one_layer_per_level(table in table_strategy()) {
        let active: HashSet<PlayerId> = table.keys().cloned().collect();
        let pots = side_pots(&table, &active);
        let levels: BTreeSet<Chips> = table.values().copied().collect();
        prop_assert_eq!(pots.len(), levels.len());
    }

    /// The main pot takes the shortest stack's level from every seat,
    /// and everyone still in can win it.
    #[test]
    fn test_main_pot_holds_the_minimum_level(table in table_strategy()) {
        let active: HashSet<PlayerId> = table.keys().cloned().collect();
        let pots = side_pots(&table, &active);
        let min = *table.values().min().unwrap();
        prop_assert_eq!(pots[0].amount, min * table.len() as Chips);
        prop_assert_eq!(pots[0].eligible.len(), table.len());
    }

    /// Walking up the layers, the set of contenders never grows.
    #[test]
    fn test_eligibility_shrinks((table, active) in table_with_folds_strategy()) {
        let pots = side_pots(&table, &active);
        for pair in pots.windows(2) {
            prop_assert!(pair[1].eligible.is_subset(&pair[0].eligible));
        }
    }

    /// A folded seat contests nothing.
    #[test]
    fn test_folded_players_never_eligible((table, active) in table_with_folds_strategy()) {
        let pots = side_pots(&table, &active);
        for pot in &pots {
            for id in &pot.eligible {
                prop_assert!(active.contains(id));
            }
        }
    }

    /// An uneven split leaves fewer odd chips than winners, and shares
    /// plus odd chips rebuild the pot exactly.
    #[test]
    fn test_split_remainder_arithmetic(pot in 1u32..=10_000u32, winners in 1usize..=9) {
        let share = pot / winners as Chips;
        let remainder = pot % winners as Chips;
        prop_assert!((remainder as usize) < winners);
        prop_assert_eq!(share * winners as Chips + remainder, pot);
    }
}
