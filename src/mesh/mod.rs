//! Mesh-key resolution over the store's fixed universe.
//!
//! A mesh key is a 9-digit decimal identifier for a geographic cell.
//! The store embeds the ordered universe list and the minimal perfect
//! hash built over it; resolution maps a key to its dense `[0, N)`
//! index in constant time, and the dense universe array maps indices
//! back to keys.

pub mod mph;

use crate::error::Result;
use crate::errdata;

pub use mph::Mph;

/// The one mesh key recognized outside the nine-digit grid. It is the
/// aggregate wide-area cell and occupies the final universe slot.
pub const EXCEPTION_MESH_KEY: u32 = 684_827_214;

/// Smallest valid nine-digit mesh key.
pub const MESH_KEY_MIN: u32 = 100_000_000;

/// Largest valid nine-digit mesh key.
pub const MESH_KEY_MAX: u32 = 999_999_999;

/// Third-level meshes contained in one first-level mesh cell.
pub const MESHES_PER_FIRST_MESH: usize = 25_600;

/// Resolves mesh keys to dense universe indices and back.
///
/// One resolver exists per open store handle; both the universe list
/// and the hash parameters come from the store file.
pub struct MeshResolver {
    universe: Vec<u32>,
    mph: Mph,
}

impl MeshResolver {
    /// Build a resolver (and its perfect hash) over a fresh universe.
    /// Used at store creation; the hash parameters are then embedded in
    /// the store file.
    pub fn build(universe: Vec<u32>) -> Result<Self> {
        let keys: Vec<Vec<u8>> = universe.iter().map(|k| decimal_bytes(*k)).collect();
        let mph = Mph::build(&keys)?;
        Ok(Self { universe, mph })
    }

    /// Reconstruct a resolver from the sections of an opened store and
    /// verify that the hash agrees with the universe list on every key.
    /// A disagreement means the store is corrupt and the open must
    /// abort.
    pub fn from_sections(universe: Vec<u32>, mph_blob: &[u8]) -> Result<Self> {
        let mph = Mph::from_bytes(mph_blob)?;
        if mph.key_count() as usize != universe.len() {
            return errdata!(
                "perfect hash covers {} keys but universe has {}",
                mph.key_count(),
                universe.len()
            );
        }

        let resolver = Self { universe, mph };
        for (index, &key) in resolver.universe.iter().enumerate() {
            match resolver.resolve(key) {
                Some(found) if found as usize == index => {}
                _ => {
                    return errdata!(
                        "universe/hash integrity check failed at index {index} (key {key})"
                    )
                }
            }
        }
        Ok(resolver)
    }

    /// Resolve a mesh key to its dense index, or `None` when the key is
    /// not part of the universe.
    pub fn resolve(&self, key: u32) -> Option<u32> {
        if key == EXCEPTION_MESH_KEY && self.universe.last() == Some(&key) {
            return Some(self.universe.len() as u32 - 1);
        }
        if !(MESH_KEY_MIN..=MESH_KEY_MAX).contains(&key) {
            return None;
        }

        let mut buf = [0u8; 10];
        let digits = decimal_into(key, &mut buf);
        let index = self.mph.index(digits);
        if self.universe.get(index as usize) == Some(&key) {
            Some(index)
        } else {
            None
        }
    }

    /// The mesh key at a dense index.
    pub fn reverse(&self, index: u32) -> Option<u32> {
        self.universe.get(index as usize).copied()
    }

    /// Universe cardinality N.
    pub fn len(&self) -> usize {
        self.universe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.universe.is_empty()
    }

    /// The ordered universe list.
    pub fn universe(&self) -> &[u32] {
        &self.universe
    }

    /// Serialize the hash parameters for embedding in a store file.
    pub fn mph_bytes(&self) -> Vec<u8> {
        self.mph.to_bytes()
    }
}

/// A resolver over an ad-hoc key subset with its own dense index space.
///
/// Useful for working sets such as the third-level meshes inside one
/// coarse cell; the contract matches [`MeshResolver::resolve`] but
/// indices are positions in the subset.
pub struct LocalResolver {
    keys: Vec<u32>,
    mph: Mph,
}

impl LocalResolver {
    pub fn build(keys: Vec<u32>) -> Result<Self> {
        let encoded: Vec<Vec<u8>> = keys.iter().map(|k| decimal_bytes(*k)).collect();
        let mph = Mph::build(&encoded)?;
        Ok(Self { keys, mph })
    }

    pub fn resolve(&self, key: u32) -> Option<u32> {
        let mut buf = [0u8; 10];
        let digits = decimal_into(key, &mut buf);
        let index = self.mph.index(digits);
        if self.keys.get(index as usize) == Some(&key) {
            Some(index)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Enumerate all third-level mesh keys inside one first-level mesh, in
/// canonical order. The second-level digits run 0..8, the third-level
/// digits 0..10, and the quarter digit 1..=4.
pub fn meshes_in_first_mesh(first_mesh: u32) -> Vec<u32> {
    let mut keys = Vec::with_capacity(MESHES_PER_FIRST_MESH);
    for q in 0..8 {
        for v in 0..8 {
            for r in 0..10 {
                for w in 0..10 {
                    for s in 1..=4 {
                        keys.push(first_mesh * 100_000 + q * 10_000 + v * 1_000 + r * 100 + w * 10 + s);
                    }
                }
            }
        }
    }
    keys
}

/// Format a key as decimal digits into the caller's buffer.
fn decimal_into(mut value: u32, buf: &mut [u8; 10]) -> &[u8] {
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    &buf[i..]
}

fn decimal_bytes(value: u32) -> Vec<u8> {
    let mut buf = [0u8; 10];
    decimal_into(value, &mut buf).to_vec()
}
