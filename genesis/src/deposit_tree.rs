//! Incremental Merkle tree of deposits, maintained the same way as in the deposit contract.
//!
//! Roots are computed from a branch of `DepositContractTreeDepth` nodes in logarithmic time.
//! Leaves are kept as well so that proofs can be produced for any deposit in the tree.

use anyhow::{ensure, Error as AnyhowError, Result};
use hashing::ZERO_HASHES;
use thiserror::Error;
use tree_hash::TreeHash as _;
use typenum::Unsigned as _;
use types::phase0::{
    consts::{DepositContractTreeDepth, DepositProofLength},
    containers::DepositData,
    primitives::{DepositIndex, H256},
};

const DEPTH: usize = DepositContractTreeDepth::USIZE;
const MAX_DEPOSITS: DepositIndex = 1 << DEPTH;

pub type DepositProof = ssz_types::FixedVector<H256, DepositProofLength>;

#[derive(Clone, Default, Debug)]
pub struct DepositTree {
    pub deposit_count: DepositIndex,
    branch: [H256; DEPTH],
    leaves: Vec<H256>,
}

impl DepositTree {
    pub fn push_and_compute_root(
        &mut self,
        deposit_index: DepositIndex,
        data: DepositData,
    ) -> Result<H256> {
        self.push(deposit_index, data)?;
        Ok(self.root())
    }

    pub fn push(&mut self, deposit_index: DepositIndex, data: DepositData) -> Result<()> {
        ensure!(
            deposit_index < MAX_DEPOSITS,
            Error::Full {
                index: deposit_index,
            },
        );

        ensure!(
            deposit_index == self.deposit_count,
            Error::UnexpectedIndex {
                expected: self.deposit_count,
                actual: deposit_index,
            },
        );

        let leaf = data.tree_hash_root();
        let mut node = leaf;
        let mut size = self.deposit_count + 1;

        for height in 0..DEPTH {
            if size % 2 == 1 {
                self.branch[height] = node;
                break;
            }

            node = hashing::hash_256_256(self.branch[height], node);
            size /= 2;
        }

        self.leaves.push(leaf);
        self.deposit_count += 1;

        Ok(())
    }

    /// The `deposit_root` of the contract after all deposits pushed so far.
    #[must_use]
    pub fn root(&self) -> H256 {
        let mut node = H256::zero();
        let mut size = self.deposit_count;

        for (height, zero_hash) in ZERO_HASHES.iter().copied().enumerate().take(DEPTH) {
            node = if size % 2 == 1 {
                hashing::hash_256_256(self.branch[height], node)
            } else {
                hashing::hash_256_256(node, zero_hash)
            };

            size /= 2;
        }

        hashing::hash_256_256(node, length_node(self.deposit_count))
    }

    /// Builds the proof stored in `Deposit.proof` for the deposit at `deposit_index`.
    ///
    /// The proof is checked against the root of the whole tree, so it is only valid in states
    /// whose `eth1_data.deposit_count` equals the current deposit count.
    pub fn proof(&self, deposit_index: DepositIndex) -> Result<DepositProof> {
        ensure!(
            deposit_index < self.deposit_count,
            Error::NoSuchDeposit {
                index: deposit_index,
                deposit_count: self.deposit_count,
            },
        );

        let mut position = usize::try_from(deposit_index)?;
        let mut layer = self.leaves.clone();
        let mut proof = Vec::with_capacity(DepositProofLength::USIZE);

        for zero_hash in ZERO_HASHES.iter().copied().take(DEPTH) {
            proof.push(layer.get(position ^ 1).copied().unwrap_or(zero_hash));

            layer = layer
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or(zero_hash);
                    hashing::hash_256_256(pair[0], right)
                })
                .collect();

            position /= 2;
        }

        proof.push(length_node(self.deposit_count));

        DepositProof::new(proof).map_err(|error| AnyhowError::msg(format!("{error:?}")))
    }
}

fn length_node(deposit_count: DepositIndex) -> H256 {
    let mut node = H256::zero();
    node[..size_of::<DepositIndex>()].copy_from_slice(&deposit_count.to_le_bytes());
    node
}

#[derive(Debug, Error)]
enum Error {
    #[error("attempted to add deposit with index {index} to full deposit tree")]
    Full { index: DepositIndex },
    #[error("expected deposit with index {expected}, received deposit with index {actual}")]
    UnexpectedIndex {
        expected: DepositIndex,
        actual: DepositIndex,
    },
    #[error("deposit {index} is not in tree with {deposit_count} deposits")]
    NoSuchDeposit {
        index: DepositIndex,
        deposit_count: DepositIndex,
    },
}

#[cfg(test)]
mod tests {
    use bls::{PublicKeyBytes, SignatureBytes};
    use helper_functions::predicates::is_valid_merkle_branch;

    use super::*;

    fn deposit_data(seed: u64) -> DepositData {
        DepositData {
            pubkey: PublicKeyBytes::from_low_u64_be(seed),
            withdrawal_credentials: H256::from_low_u64_be(seed),
            amount: seed * 1_000_000_000,
            signature: SignatureBytes::empty(),
        }
    }

    #[test]
    fn empty_tree_root_is_zero_tree_mixed_with_zero_length() {
        let tree = DepositTree::default();

        assert_eq!(
            tree.root(),
            hashing::hash_256_256(ZERO_HASHES[DEPTH], H256::zero()),
        );
    }

    #[test]
    fn single_deposit_root_hashes_leaf_up_with_zero_siblings() -> Result<()> {
        let data = deposit_data(1);
        let mut tree = DepositTree::default();

        let root = tree.push_and_compute_root(0, data)?;

        let expected = ZERO_HASHES
            .iter()
            .take(DEPTH)
            .fold(data.tree_hash_root(), |node, zero_hash| {
                hashing::hash_256_256(node, *zero_hash)
            });

        assert_eq!(root, hashing::hash_256_256(expected, length_node(1)));

        Ok(())
    }

    #[test]
    fn proofs_of_all_deposits_verify_against_root() -> Result<()> {
        let mut tree = DepositTree::default();

        for deposit_index in 0..5 {
            tree.push(deposit_index, deposit_data(deposit_index + 1))?;
        }

        let root = tree.root();

        for deposit_index in 0..5 {
            let proof = tree.proof(deposit_index)?;
            let leaf = deposit_data(deposit_index + 1).tree_hash_root();

            assert!(is_valid_merkle_branch(
                leaf,
                proof.iter().copied(),
                deposit_index,
                root,
            ));
        }

        assert!(tree.proof(5).is_err());

        Ok(())
    }

    #[test]
    fn deposits_must_be_pushed_in_order() -> Result<()> {
        let mut tree = DepositTree::default();

        tree.push(0, deposit_data(1))?;

        let error = tree
            .push(2, deposit_data(2))
            .expect_err("deposit 1 was skipped");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::UnexpectedIndex {
                expected: 1,
                actual: 2,
            }),
        ));

        assert_eq!(tree.deposit_count, 1);

        Ok(())
    }
}
