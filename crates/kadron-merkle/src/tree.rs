use crate::{MerkleError, Result};

pub const HASH_SIZE: usize = 32;
pub type Hash = [u8; HASH_SIZE];

/// A bottom-up Blake3 Merkle tree over fixed-size fragments.
///
/// `levels[0]` holds the per-fragment leaf hashes (or, for an empty input,
/// a single synthetic entry equal to `Blake3("")` that is simultaneously
/// the leaf and the root). `levels.last()` always has exactly one entry:
/// the root.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    file_size: u64,
    fragment_size: u64,
    fragment_count: usize,
    levels: Vec<Vec<Hash>>,
}

/// One step of a verification path. The sibling position is recorded
/// explicitly rather than re-derived from index arithmetic during
/// verification, so that a path crossing a level where an odd leaf was
/// promoted unchanged can't desync left/right assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStep {
    /// Combine with a sibling hash at the recorded side.
    Sibling { hash: Hash, sibling_is_right: bool },
    /// This level had no sibling (lone odd node); the value passes through
    /// to the next level unchanged.
    Promoted,
}

fn combine(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

impl MerkleTree {
    /// Build a tree over `fragments`. `fragment_size` is recorded for
    /// serialization/import bookkeeping; fragments need not all be exactly
    /// that length (the final fragment is typically shorter).
    pub fn build(fragments: &[&[u8]], fragment_size: u64) -> Self {
        let file_size: u64 = fragments.iter().map(|f| f.len() as u64).sum();
        let fragment_count = fragments.len();

        if fragments.is_empty() {
            let empty_root = *blake3::hash(b"").as_bytes();
            return Self {
                file_size,
                fragment_size,
                fragment_count: 0,
                levels: vec![vec![empty_root]],
            };
        }

        let leaves: Vec<Hash> = fragments
            .iter()
            .map(|fragment| *blake3::hash(fragment).as_bytes())
            .collect();

        let mut levels = vec![leaves];
        while levels.last().expect("at least one level").len() > 1 {
            let prev = levels.last().expect("at least one level");
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            let mut i = 0;
            while i < prev.len() {
                if i + 1 < prev.len() {
                    next.push(combine(&prev[i], &prev[i + 1]));
                } else {
                    next.push(prev[i]);
                }
                i += 2;
            }
            levels.push(next);
        }

        Self {
            file_size,
            fragment_size,
            fragment_count,
            levels,
        }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn fragment_size(&self) -> u64 {
        self.fragment_size
    }

    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    pub fn root(&self) -> Hash {
        self.levels.last().expect("at least one level")[0]
    }

    pub fn leaf_hash(&self, index: usize) -> Result<Hash> {
        if index >= self.fragment_count {
            return Err(MerkleError::IndexOutOfRange {
                index,
                count: self.fragment_count,
            });
        }
        Ok(self.levels[0][index])
    }

    /// Produce the verification path for fragment `index`: the sibling at
    /// each level on the way to the root, in order.
    pub fn path(&self, index: usize) -> Result<Vec<PathStep>> {
        if index >= self.fragment_count {
            return Err(MerkleError::IndexOutOfRange {
                index,
                count: self.fragment_count,
            });
        }

        let mut steps = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            if idx % 2 == 0 {
                if idx + 1 < level.len() {
                    steps.push(PathStep::Sibling {
                        hash: level[idx + 1],
                        sibling_is_right: true,
                    });
                } else {
                    steps.push(PathStep::Promoted);
                }
            } else {
                steps.push(PathStep::Sibling {
                    hash: level[idx - 1],
                    sibling_is_right: false,
                });
            }
            idx /= 2;
        }
        Ok(steps)
    }

    /// Verify that `leaf_hash` combined along `path` reproduces `root`.
    pub fn verify(leaf_hash: &Hash, path: &[PathStep], root: &Hash) -> bool {
        let mut current = *leaf_hash;
        for step in path {
            current = match step {
                PathStep::Sibling {
                    hash,
                    sibling_is_right: true,
                } => combine(&current, hash),
                PathStep::Sibling {
                    hash,
                    sibling_is_right: false,
                } => combine(hash, &current),
                PathStep::Promoted => current,
            };
        }
        current == *root
    }

    /// Fixed 8B file size + 8B fragment size + 32B root header, then
    /// fragment hashes, then level-ordered intermediate hashes bottom-up.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.file_size.to_le_bytes());
        out.extend_from_slice(&self.fragment_size.to_le_bytes());
        out.extend_from_slice(&self.root());

        for hash in &self.levels[0][..self.fragment_count] {
            out.extend_from_slice(hash);
        }
        for level in &self.levels[1..self.levels.len().saturating_sub(1)] {
            for hash in level {
                out.extend_from_slice(hash);
            }
        }
        out
    }

    /// Re-derive level sizes from the fragment count implied by the header
    /// and verify the buffer length before trusting its contents.
    pub fn import(buffer: &[u8]) -> Result<Self> {
        const HEADER_LEN: usize = 8 + 8 + HASH_SIZE;
        if buffer.len() < HEADER_LEN {
            return Err(MerkleError::BufferTooShort {
                expected: HEADER_LEN,
                actual: buffer.len(),
            });
        }

        let file_size = u64::from_le_bytes(buffer[0..8].try_into().expect("8 bytes"));
        let fragment_size = u64::from_le_bytes(buffer[8..16].try_into().expect("8 bytes"));
        let mut root = [0u8; HASH_SIZE];
        root.copy_from_slice(&buffer[16..16 + HASH_SIZE]);

        let fragment_count = if file_size == 0 {
            0
        } else {
            ((file_size + fragment_size - 1) / fragment_size) as usize
        };

        // Re-derive the size of every level between the leaves and the root.
        let mut level_sizes = Vec::new();
        if fragment_count == 0 {
            // Root-only synthetic level; nothing else to read.
        } else {
            level_sizes.push(fragment_count);
            while *level_sizes.last().expect("non-empty") > 1 {
                let prev = *level_sizes.last().expect("non-empty");
                level_sizes.push(prev.div_ceil(2));
            }
        }

        let body_hash_count: usize = level_sizes.iter().take(level_sizes.len().saturating_sub(1)).sum();
        let expected_len = HEADER_LEN + body_hash_count * HASH_SIZE;
        if buffer.len() != expected_len {
            return Err(MerkleError::BufferLengthMismatch {
                expected: expected_len,
                actual: buffer.len(),
            });
        }

        if fragment_count == 0 {
            return Ok(Self {
                file_size,
                fragment_size,
                fragment_count: 0,
                levels: vec![vec![root]],
            });
        }

        let mut cursor = HEADER_LEN;
        let mut levels = Vec::with_capacity(level_sizes.len() + 1);
        for (i, &size) in level_sizes.iter().enumerate() {
            if i + 1 == level_sizes.len() {
                // Last recorded level size is 1 (the root), stored in the header only.
                levels.push(vec![root]);
                break;
            }
            let mut level = Vec::with_capacity(size);
            for _ in 0..size {
                let mut h = [0u8; HASH_SIZE];
                h.copy_from_slice(&buffer[cursor..cursor + HASH_SIZE]);
                level.push(h);
                cursor += HASH_SIZE;
            }
            levels.push(level);
        }

        Ok(Self {
            file_size,
            fragment_size,
            fragment_count,
            levels,
        })
    }
}
