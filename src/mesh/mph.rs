//! Order-preserving minimal perfect hash over a fixed key set.
//!
//! The construction is the classic CHM scheme: every key is an edge of
//! a random graph on `m ≈ 2.1·n` vertices, with endpoints chosen by two
//! seeded hash functions. When the graph is acyclic, a vertex labeling
//! `g` exists such that `g[u] + g[v] ≡ i (mod n)` for the i-th key's
//! edge `(u, v)`, which makes the hash both minimal and
//! order-preserving. Cyclic graphs are retried with fresh seeds.
//!
//! ## Parameter blob layout
//!
//! ```text
//! +------------------+
//! | Magic (8 bytes)  |
//! +------------------+
//! | Version (u32)    |
//! +------------------+
//! | Key count (u32)  |
//! +------------------+
//! | Vertices (u32)   |
//! +------------------+
//! | Seed 0 (u64)     |
//! +------------------+
//! | Seed 1 (u64)     |
//! +------------------+
//! | g[0..vertices]   |  u32 each
//! +------------------+
//! | CRC32 (u32)      |
//! +------------------+
//! ```
//!
//! All integers are big-endian. The blob is what a store file embeds;
//! evaluation never needs the key set itself.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc::{Crc, CRC_32_ISCSI};
use std::io::Cursor;

use crate::error::Result;
use crate::{errdata, errinput};

const MAGIC: &[u8; 8] = b"MESHDBPH";
const VERSION: u32 = 1;
const MAX_BUILD_ATTEMPTS: u64 = 64;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// An evaluated-form minimal perfect hash function.
#[derive(Debug, Clone)]
pub struct Mph {
    seed0: u64,
    seed1: u64,
    vertices: u32,
    keys: u32,
    g: Vec<u32>,
}

impl Mph {
    /// Build over the given keys, seeding from the clock.
    pub fn build<K: AsRef<[u8]>>(keys: &[K]) -> Result<Self> {
        Self::build_seeded(keys, entropy())
    }

    /// Build over the given keys with a deterministic seed base.
    pub fn build_seeded<K: AsRef<[u8]>>(keys: &[K], base: u64) -> Result<Self> {
        if keys.is_empty() {
            return errinput!("cannot build a perfect hash over zero keys");
        }
        if keys.len() > u32::MAX as usize / 3 {
            return errinput!("key set too large: {}", keys.len());
        }

        let n = keys.len() as u32;
        // Acyclicity needs m > 2n; the extra tenth keeps retries rare.
        let m = 2 * n + n / 10 + 1;

        for attempt in 0..MAX_BUILD_ATTEMPTS {
            let seed0 = mix(base.wrapping_add(2 * attempt));
            let seed1 = mix(base.wrapping_add(2 * attempt + 1));

            if let Some(g) = try_assign(keys, seed0, seed1, m) {
                return Ok(Self {
                    seed0,
                    seed1,
                    vertices: m,
                    keys: n,
                    g,
                });
            }
        }

        errdata!(
            "failed to build perfect hash after {MAX_BUILD_ATTEMPTS} attempts; \
             key set likely contains duplicates"
        )
    }

    /// Hash a key to its dense index in `[0, key_count)`.
    ///
    /// Keys outside the construction set map to an arbitrary in-range
    /// index; callers verify the result against their key table.
    pub fn index(&self, key: &[u8]) -> u32 {
        let u = (hash_key(self.seed0, key) % u64::from(self.vertices)) as usize;
        let v = (hash_key(self.seed1, key) % u64::from(self.vertices)) as usize;
        ((u64::from(self.g[u]) + u64::from(self.g[v])) % u64::from(self.keys)) as u32
    }

    /// Number of keys the function was built over.
    pub fn key_count(&self) -> u32 {
        self.keys
    }

    /// Serialize the parameters to the embeddable blob form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(36 + self.g.len() * 4 + 4);
        buf.extend_from_slice(MAGIC);
        buf.write_u32::<BigEndian>(VERSION).unwrap();
        buf.write_u32::<BigEndian>(self.keys).unwrap();
        buf.write_u32::<BigEndian>(self.vertices).unwrap();
        buf.write_u64::<BigEndian>(self.seed0).unwrap();
        buf.write_u64::<BigEndian>(self.seed1).unwrap();
        for &value in &self.g {
            buf.write_u32::<BigEndian>(value).unwrap();
        }
        let checksum = CRC32.checksum(&buf);
        buf.write_u32::<BigEndian>(checksum).unwrap();
        buf
    }

    /// Deserialize a parameter blob, validating framing and checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 40 {
            return errdata!("perfect hash blob too short: {} bytes", bytes.len());
        }

        let (body, tail) = bytes.split_at(bytes.len() - 4);
        let stored = Cursor::new(tail).read_u32::<BigEndian>()?;
        if CRC32.checksum(body) != stored {
            return errdata!("perfect hash blob checksum mismatch");
        }

        let mut cursor = Cursor::new(body);
        let mut magic = [0u8; 8];
        std::io::Read::read_exact(&mut cursor, &mut magic)?;
        if magic != *MAGIC {
            return errdata!("bad perfect hash magic");
        }

        let version = cursor.read_u32::<BigEndian>()?;
        if version != VERSION {
            return errdata!("unsupported perfect hash version: {version}");
        }

        let keys = cursor.read_u32::<BigEndian>()?;
        let vertices = cursor.read_u32::<BigEndian>()?;
        let seed0 = cursor.read_u64::<BigEndian>()?;
        let seed1 = cursor.read_u64::<BigEndian>()?;

        if keys == 0 || vertices == 0 {
            return errdata!("empty perfect hash blob");
        }
        let expected = 36 + vertices as usize * 4;
        if body.len() != expected {
            return errdata!(
                "perfect hash blob length mismatch: {} != {expected}",
                body.len()
            );
        }

        let mut g = Vec::with_capacity(vertices as usize);
        for _ in 0..vertices {
            g.push(cursor.read_u32::<BigEndian>()?);
        }

        Ok(Self {
            seed0,
            seed1,
            vertices,
            keys,
            g,
        })
    }
}

/// Attempt one CHM assignment. Returns the g-array if the random graph
/// induced by the seeds is simple and acyclic.
fn try_assign<K: AsRef<[u8]>>(keys: &[K], seed0: u64, seed1: u64, m: u32) -> Option<Vec<u32>> {
    let n = keys.len() as u32;

    let mut edges = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.as_ref();
        let u = (hash_key(seed0, key) % u64::from(m)) as u32;
        let v = (hash_key(seed1, key) % u64::from(m)) as u32;
        if u == v {
            return None;
        }
        edges.push((u, v));
    }

    let mut adjacency: Vec<Vec<(u32, u32)>> = vec![Vec::new(); m as usize];
    for (edge, &(u, v)) in edges.iter().enumerate() {
        adjacency[u as usize].push((v, edge as u32));
        adjacency[v as usize].push((u, edge as u32));
    }

    let mut g = vec![0u32; m as usize];
    let mut visited = vec![false; m as usize];
    let mut parent_edge = vec![u32::MAX; m as usize];
    let mut stack = Vec::new();

    for start in 0..m as usize {
        if visited[start] || adjacency[start].is_empty() {
            continue;
        }
        visited[start] = true;
        stack.push(start);

        while let Some(current) = stack.pop() {
            for &(neighbor, edge) in &adjacency[current] {
                if edge == parent_edge[current] {
                    continue;
                }
                if visited[neighbor as usize] {
                    // A non-tree edge closes a cycle.
                    return None;
                }
                visited[neighbor as usize] = true;
                parent_edge[neighbor as usize] = edge;
                g[neighbor as usize] =
                    ((u64::from(edge) + u64::from(n) - u64::from(g[current])) % u64::from(n))
                        as u32;
                stack.push(neighbor as usize);
            }
        }
    }

    Some(g)
}

fn hash_key(seed: u64, key: &[u8]) -> u64 {
    let mut state = seed ^ 0x517c_c1b7_2722_0a95;
    for &byte in key {
        state ^= u64::from(byte);
        state = state.wrapping_mul(0x0000_0100_0000_01b3);
    }
    mix(state)
}

fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    x
}

fn entropy() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}
