//! Sharded vote counters.
//!
//! Each video keeps `shard_count` independent counter documents. A vote bumps
//! one uniformly chosen shard; the true count of an option is the sum over
//! all shards. New videos are seeded with a fixed number of votes on a few
//! random options so the first voter cannot win trivially.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

use super::types::{OptionId, Outcome, ShardCounts, TallyShard};

/// Initial shard layout for a video that has never been voted on.
///
/// Seeds are drawn from `pool` minus `excluded`; every option in `universe`
/// (and every seed) is present with a zero count in every shard.
pub fn seed_shards<R: Rng>(
    universe: &[OptionId],
    pool: &[OptionId],
    excluded: &[OptionId],
    seed_option_count: usize,
    seed_vote_count: i64,
    shard_count: u32,
    rng: &mut R,
) -> Vec<TallyShard> {
    let eligible: Vec<&OptionId> = pool
        .iter()
        .filter(|option| !excluded.contains(*option))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let seeds: Vec<&OptionId> = eligible
        .choose_multiple(rng, seed_option_count.min(eligible.len()))
        .copied()
        .collect();

    let zeroes: ShardCounts = universe
        .iter()
        .chain(seeds.iter().copied())
        .map(|option| (option.clone(), 0))
        .collect();

    (0..shard_count)
        .map(|index| {
            let mut counts = zeroes.clone();
            if index == 0 {
                for seed in &seeds {
                    counts.insert((*seed).clone(), seed_vote_count);
                }
            }
            TallyShard { index, counts }
        })
        .collect()
}

pub fn choose_shard<R: Rng>(shard_count: u32, rng: &mut R) -> u32 {
    rng.gen_range(0..shard_count.max(1))
}

/// Per-option totals across all shards.
pub fn aggregate(shards: &[TallyShard]) -> ShardCounts {
    let mut totals = ShardCounts::new();
    for shard in shards {
        for (option, count) in &shard.counts {
            *totals.entry(option.clone()).or_insert(0) += count;
        }
    }
    totals
}

/// WIN only when `chosen` is the unique maximum. Ties and empty tallies lose.
pub fn determine_outcome(chosen: &str, totals: &ShardCounts) -> Outcome {
    let Some(max) = totals.values().copied().max() else {
        return Outcome::Loss;
    };
    let mut leaders = totals.iter().filter(|(_, count)| **count == max);
    match (leaders.next(), leaders.next()) {
        (Some((option, _)), None) if option == chosen => Outcome::Win,
        _ => Outcome::Loss,
    }
}
