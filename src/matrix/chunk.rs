//! Chunk payload codec.
//!
//! A chunk on disk is its cells as little-endian `i32`, row-major, with
//! no framing: the grid position determines the offset and the geometry
//! determines the length. A chunk read back from a region the file has
//! never materialized decodes as all zeros, which is exactly the
//! matrix fill value.

use byteorder::{ByteOrder, LittleEndian};

/// Encode cells into `out`, which must be exactly `cells.len() * 4` bytes.
pub fn encode(cells: &[i32], out: &mut [u8]) {
    debug_assert_eq!(out.len(), cells.len() * 4);
    LittleEndian::write_i32_into(cells, out);
}

/// Decode up to `cells.len()` values from `bytes`; the tail of `cells`
/// beyond the available bytes is zeroed. Trailing partial words are
/// ignored.
pub fn decode(bytes: &[u8], cells: &mut [i32]) {
    let available = (bytes.len() / 4).min(cells.len());
    LittleEndian::read_i32_into(&bytes[..available * 4], &mut cells[..available]);
    cells[available..].fill(0);
}

/// True when every cell is the fill value.
pub fn is_all_zero(cells: &[i32]) -> bool {
    cells.iter().all(|&v| v == 0)
}
