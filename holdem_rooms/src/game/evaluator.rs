//! Best-five hand evaluation.
//!
//! [`evaluate`] sweeps every 5-card combination of the cards it is given
//! (hole cards plus community, 5 to 7 total) and returns the strongest as a
//! single [`HandScore`]. Scores are plain integers, so comparing two hands
//! or picking winners at showdown is just `>` and `==`.

use std::fmt;

use super::entities::{Card, Value};

/// Hand categories from weakest to strongest. The derived order is the
/// poker order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HandRank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl HandRank {
    /// Spelled-out category for chat lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HighCard => "high card",
            Self::OnePair => "a pair",
            Self::TwoPair => "two pair",
            Self::ThreeOfAKind => "three of a kind",
            Self::Straight => "a straight",
            Self::Flush => "a flush",
            Self::FullHouse => "a full house",
            Self::FourOfAKind => "four of a kind",
            Self::StraightFlush => "a straight flush",
        }
    }
}

impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "hi",
            Self::OnePair => "1p",
            Self::TwoPair => "2p",
            Self::ThreeOfAKind => "3k",
            Self::Straight => "s8",
            Self::Flush => "fs",
            Self::FullHouse => "fh",
            Self::FourOfAKind => "4k",
            Self::StraightFlush => "sf",
        };
        write!(f, "{repr}")
    }
}

/// Total-ordered strength of a five-card hand.
///
/// Layout: the category sits above bit 20 and up to five tiebreak values
/// fill the nibbles below it, most significant first. Card values max out
/// at 14, so each fits a nibble and integer comparison decides every
/// tie the way the category's kicker rules do.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HandScore(u32);

impl HandScore {
    fn new(rank: HandRank, tiebreaks: &[Value]) -> Self {
        let mut score = (rank as u32) << 20;
        for (i, &value) in tiebreaks.iter().take(5).enumerate() {
            score |= u32::from(value) << (16 - 4 * i);
        }
        Self(score)
    }

    pub fn rank(&self) -> HandRank {
        match self.0 >> 20 {
            0 => HandRank::HighCard,
            1 => HandRank::OnePair,
            2 => HandRank::TwoPair,
            3 => HandRank::ThreeOfAKind,
            4 => HandRank::Straight,
            5 => HandRank::Flush,
            6 => HandRank::FullHouse,
            7 => HandRank::FourOfAKind,
            _ => HandRank::StraightFlush,
        }
    }
}

impl fmt::Display for HandScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rank().fmt(f)
    }
}

/// Score the best five cards out of `cards`. Expects 5 to 7 cards.
pub fn evaluate(cards: &[Card]) -> HandScore {
    debug_assert!((5..=7).contains(&cards.len()));
    let n = cards.len();
    let mut best = HandScore(0);
    for a in 0..n - 4 {
        for b in a + 1..n - 3 {
            for c in b + 1..n - 2 {
                for d in c + 1..n - 1 {
                    for e in d + 1..n {
                        let five = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                        let score = score_five(&five);
                        if score > best {
                            best = score;
                        }
                    }
                }
            }
        }
    }
    best
}

fn score_five(five: &[Card; 5]) -> HandScore {
    let mut values: Vec<Value> = five.iter().map(|card| card.0).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = five.iter().all(|card| card.1 == five[0].1);

    let mut counts = [0u8; 15];
    for &value in &values {
        counts[value as usize] += 1;
    }

    // Distinct values, still descending.
    let mut uniq = values.clone();
    uniq.dedup();

    let mut straight_high = None;
    if uniq.len() == 5 {
        if uniq[0] - uniq[4] == 4 {
            straight_high = Some(uniq[0]);
        } else if uniq == [14, 5, 4, 3, 2] {
            // The wheel ranks below every other straight.
            straight_high = Some(5);
        }
    }

    let quad = uniq.iter().copied().find(|&v| counts[v as usize] == 4);
    let trips = uniq.iter().copied().find(|&v| counts[v as usize] == 3);
    let pairs: Vec<Value> = uniq
        .iter()
        .copied()
        .filter(|&v| counts[v as usize] == 2)
        .collect();
    let singles: Vec<Value> = uniq
        .iter()
        .copied()
        .filter(|&v| counts[v as usize] == 1)
        .collect();

    match (straight_high, is_flush, quad, trips) {
        (Some(high), true, ..) => HandScore::new(HandRank::StraightFlush, &[high]),
        (_, _, Some(quad), _) => HandScore::new(HandRank::FourOfAKind, &[quad, singles[0]]),
        (_, _, _, Some(trips)) if !pairs.is_empty() => {
            HandScore::new(HandRank::FullHouse, &[trips, pairs[0]])
        }
        (_, true, ..) => HandScore::new(HandRank::Flush, &values),
        (Some(high), ..) => HandScore::new(HandRank::Straight, &[high]),
        (_, _, _, Some(trips)) => {
            HandScore::new(HandRank::ThreeOfAKind, &[trips, singles[0], singles[1]])
        }
        _ => match pairs.as_slice() {
            [hi, lo, ..] => HandScore::new(HandRank::TwoPair, &[*hi, *lo, singles[0]]),
            [pair] => HandScore::new(
                HandRank::OnePair,
                &[*pair, singles[0], singles[1], singles[2]],
            ),
            [] => HandScore::new(HandRank::HighCard, &values),
        },
    }
}
