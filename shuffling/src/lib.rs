use core::num::NonZeroU64;

use anyhow::{ensure, Result};
use bit_field::BitArray as _;
use tap::TryConv as _;
use thiserror::Error;
use types::{phase0::primitives::H256, preset::Preset};

const POSITIONS_PER_SOURCE: u64 = (H256::len_bytes() * 8) as u64;

#[derive(Debug, Error)]
pub enum Error {
    #[error("index {index} is out of bounds for a list of {index_count} elements")]
    IndexOutOfBounds { index: u64, index_count: u64 },
    #[error("committee {index} requested but there are only {count} committees")]
    CommitteeOutOfBounds { index: u64, count: u64 },
}

/// Maps `index` to its position in a list of `index_count` elements shuffled with `seed`.
///
/// Runs `P::SHUFFLE_ROUND_COUNT` swap-or-not rounds.
/// Every round is an involution on `[0, index_count)`, so the composition is a permutation.
pub fn shuffled_index<P: Preset>(index: u64, index_count: NonZeroU64, seed: H256) -> Result<u64> {
    ensure!(
        index < index_count.get(),
        Error::IndexOutOfBounds {
            index,
            index_count: index_count.get(),
        },
    );

    let mut index = index;

    for round in 0..P::SHUFFLE_ROUND_COUNT {
        let pivot = compute_pivot(seed, round, index_count);
        let flip = (pivot + index_count.get() - index) % index_count;
        let position = index.max(flip);
        let source = compute_source(seed, round, position / POSITIONS_PER_SOURCE)?;

        if source_bit(source, position) {
            index = flip;
        }
    }

    Ok(index)
}

/// Shuffles `slice` in place so that `slice[i]` ends up holding the element that was at
/// `shuffled_index(i)`.
///
/// This produces the same order as calling [`shuffled_index`] for every position but computes
/// each source hash only once per block of positions.
pub fn shuffle_slice<P: Preset, T>(slice: &mut [T], seed: H256) -> Result<()> {
    let Some(index_count) = NonZeroU64::new(slice.len().try_conv::<u64>()?) else {
        return Ok(());
    };

    // Rounds are applied in reverse so that the first round ends up outermost.
    for round in (0..P::SHUFFLE_ROUND_COUNT).rev() {
        let pivot = compute_pivot(seed, round, index_count);
        let mut sources = SourceWindow::new(seed, round);

        for index in 0..index_count.get() {
            let flip = (pivot + index_count.get() - index) % index_count;

            // Each pair is visited twice. Only act on it from its lower end.
            if index < flip && source_bit(sources.source_for(flip)?, flip) {
                slice.swap(index.try_conv::<usize>()?, flip.try_conv::<usize>()?);
            }
        }
    }

    Ok(())
}

/// Returns committee `index` out of `count` contiguous committees cut from a shuffled view of
/// `indices`.
pub fn compute_committee<P: Preset, T: Copy>(
    indices: &[T],
    seed: H256,
    index: u64,
    count: NonZeroU64,
) -> Result<Vec<T>> {
    ensure!(
        index < count.get(),
        Error::CommitteeOutOfBounds {
            index,
            count: count.get(),
        },
    );

    let Some(index_count) = NonZeroU64::new(indices.len().try_conv::<u64>()?) else {
        return Ok(vec![]);
    };

    let start = committee_boundary(index_count.get(), index, count);
    let end = committee_boundary(index_count.get(), index + 1, count);

    (start..end)
        .map(|position| {
            let shuffled = shuffled_index::<P>(position, index_count, seed)?;
            Ok(indices[shuffled.try_conv::<usize>()?])
        })
        .collect()
}

/// Position where committee `index` starts in a list of `index_count` elements.
#[must_use]
pub fn committee_boundary(index_count: u64, index: u64, count: NonZeroU64) -> u64 {
    // The product may exceed `u64` for large registries and many committees.
    let boundary = u128::from(index_count) * u128::from(index) / u128::from(count.get());

    boundary
        .try_into()
        .unwrap_or(u64::MAX)
}

struct SourceWindow {
    seed: H256,
    round: u8,
    window: Option<(u64, H256)>,
}

impl SourceWindow {
    const fn new(seed: H256, round: u8) -> Self {
        Self {
            seed,
            round,
            window: None,
        }
    }

    fn source_for(&mut self, position: u64) -> Result<H256> {
        let position_window = position / POSITIONS_PER_SOURCE;

        match self.window {
            Some((cached_window, source)) if cached_window == position_window => Ok(source),
            _ => {
                let source = compute_source(self.seed, self.round, position_window)?;
                self.window = Some((position_window, source));
                Ok(source)
            }
        }
    }
}

fn compute_pivot(seed: H256, round: u8, index_count: NonZeroU64) -> u64 {
    let hash = hashing::hash_256_8(seed, round);
    let mut pivot_bytes = [0; size_of::<u64>()];
    pivot_bytes.copy_from_slice(&hash.as_bytes()[..size_of::<u64>()]);
    u64::from_le_bytes(pivot_bytes) % index_count
}

fn compute_source(seed: H256, round: u8, position_window: u64) -> Result<H256> {
    let position_window = position_window.try_conv::<u32>()?;
    Ok(hashing::hash_256_8_32(seed, round, position_window))
}

fn source_bit(source: H256, position: u64) -> bool {
    // The remainder is always below 256.
    let bit_index = (position % POSITIONS_PER_SOURCE) as usize;
    source.as_bytes().get_bit(bit_index)
}
