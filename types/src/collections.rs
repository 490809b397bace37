use easy_ext::ext;
use ssz_types::{BitList, BitVector, FixedVector, VariableList};
use thiserror::Error;
use typenum::{NonZero, Unsigned};

use crate::{
    altair::primitives::ParticipationFlags,
    phase0::{
        containers::{Eth1Data, Validator},
        primitives::{Gwei, H256},
    },
    preset::Preset,
};

pub type RecentRoots<P> = FixedVector<H256, <P as Preset>::SlotsPerHistoricalRoot>;
pub type HistoricalRoots<P> = VariableList<H256, <P as Preset>::HistoricalRootsLimit>;
pub type Eth1DataVotes<P> = VariableList<Eth1Data, <P as Preset>::SlotsPerEth1VotingPeriod>;
pub type Validators<P> = VariableList<Validator, <P as Preset>::ValidatorRegistryLimit>;
pub type Balances<P> = VariableList<Gwei, <P as Preset>::ValidatorRegistryLimit>;
pub type RandaoMixes<P> = FixedVector<H256, <P as Preset>::EpochsPerHistoricalVector>;
pub type Slashings<P> = FixedVector<Gwei, <P as Preset>::EpochsPerSlashingsVector>;
pub type EpochParticipation<P> =
    VariableList<ParticipationFlags, <P as Preset>::ValidatorRegistryLimit>;
pub type InactivityScores<P> = VariableList<u64, <P as Preset>::ValidatorRegistryLimit>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index {index} does not fit in usize")]
    DoesNotFitInUsize { index: u64 },
    #[error("index {index} is out of bounds for collection of length {length}")]
    OutOfBounds { index: u64, length: usize },
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("list is full")]
    ListFull,
}

#[derive(Debug, Error)]
#[error("list of length {length} exceeds maximum length {maximum}")]
pub struct LengthError {
    pub length: usize,
    pub maximum: usize,
}

/// Accessors for lists indexed by the `u64` indices used in consensus objects.
#[ext(ListExt)]
pub impl<T, N: Unsigned> VariableList<T, N> {
    fn try_get(&self, index: u64) -> Result<&T, IndexError> {
        let length = self.len();

        usize::try_from(index)
            .map_err(|_| IndexError::DoesNotFitInUsize { index })
            .and_then(|position| {
                self.get(position)
                    .ok_or(IndexError::OutOfBounds { index, length })
            })
    }

    fn try_get_mut(&mut self, index: u64) -> Result<&mut T, IndexError> {
        let length = self.len();

        let position =
            usize::try_from(index).map_err(|_| IndexError::DoesNotFitInUsize { index })?;

        self.get_mut(position)
            .ok_or(IndexError::OutOfBounds { index, length })
    }

    fn try_push(&mut self, value: T) -> Result<(), PushError> {
        self.push(value).map_err(|_| PushError::ListFull)
    }

    fn try_from_iter(elements: impl IntoIterator<Item = T>) -> Result<Self, LengthError>
    where
        Self: Sized,
    {
        let elements = elements.into_iter().collect::<Vec<_>>();
        let length = elements.len();

        Self::new(elements).map_err(|_| LengthError {
            length,
            maximum: N::USIZE,
        })
    }
}

#[ext(VecExt)]
pub impl<T> Vec<T> {
    fn into_variable_list<N: Unsigned>(self) -> Result<VariableList<T, N>, LengthError> {
        let length = self.len();

        VariableList::new(self).map_err(|_| LengthError {
            length,
            maximum: N::USIZE,
        })
    }
}

/// Circular indexing used for the history vectors in `BeaconState`.
#[ext(VectorExt)]
pub impl<T, N: Unsigned + NonZero> FixedVector<T, N> {
    #[must_use]
    fn mod_index(&self, index: u64) -> &T {
        let position = usize::try_from(index % N::U64)
            .expect("any number below N fits in usize because N elements are in memory");

        &self[position]
    }

    #[must_use]
    fn mod_index_mut(&mut self, index: u64) -> &mut T {
        let position = usize::try_from(index % N::U64)
            .expect("any number below N fits in usize because N elements are in memory");

        &mut self[position]
    }
}

#[ext(BitVectorExt)]
pub impl<N: Unsigned + Clone> BitVector<N> {
    #[must_use]
    fn bit(&self, index: usize) -> bool {
        self.get(index).unwrap_or(false)
    }

    fn try_set(&mut self, index: usize, value: bool) -> Result<(), IndexError> {
        let length = self.len();

        self.set(index, value).map_err(|_| IndexError::OutOfBounds {
            index: index as u64,
            length,
        })
    }
}

#[ext(BitListExt)]
pub impl<N: Unsigned + Clone> BitList<N> {
    fn try_set(&mut self, index: usize, value: bool) -> Result<(), IndexError> {
        let length = self.len();

        self.set(index, value).map_err(|_| IndexError::OutOfBounds {
            index: index as u64,
            length,
        })
    }
}

#[cfg(test)]
mod tests {
    use typenum::{U3, U4};

    use super::*;

    #[test]
    fn mod_index_wraps_around() {
        let mut vector = FixedVector::<u64, U4>::from(vec![0, 1, 2, 3]);

        *vector.mod_index_mut(6) = 9;

        assert_eq!(*vector.mod_index(2), 9);
        assert_eq!(*vector.mod_index(7), 3);
    }

    #[test]
    fn list_operations_respect_bounds() -> anyhow::Result<()> {
        let mut list = VariableList::<u64, U3>::try_from_iter([1, 2])?;

        list.try_push(3)?;

        assert!(list.try_push(4).is_err());
        assert_eq!(*list.try_get(2)?, 3);
        assert!(list.try_get(3).is_err());
        assert!(VariableList::<u64, U3>::try_from_iter(0..4).is_err());

        Ok(())
    }

    #[test]
    fn bit_vector_bits_can_be_set_and_read() -> anyhow::Result<()> {
        let mut bits = BitVector::<U4>::new();

        bits.try_set(2, true)?;

        assert!(bits.bit(2));
        assert!(!bits.bit(1));
        assert!(!bits.bit(10));
        assert!(bits.try_set(4, true).is_err());

        Ok(())
    }
}
