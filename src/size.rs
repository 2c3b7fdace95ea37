//! Conversion of a DAG cumulative size back to the original file size.
//!
//! The default chunker cuts files into chunks of at most [`MAX_CHUNK_SIZE`]
//! bytes and wraps every chunk in a UnixFS/dag-pb envelope. The envelope
//! carries the chunk length as a varint, so its overhead grows with the
//! magnitude of the length. For a file split into several chunks, the root
//! node links to full-size leaves (each `MAX_CHUNK_SIZE + 14` bytes) plus one
//! trailing leaf holding the remainder.

use crate::api::types::ObjectStat;

/// Max payload of one chunk produced by the default IPFS chunker.
pub const MAX_CHUNK_SIZE: u64 = 262_144;

/// Envelope overhead of a full-size leaf.
const FULL_CHUNK_OVERHEAD: u64 = 14;

/// Smallest cumulative size a file of two or more chunks can have.
const MULTI_CHUNK_THRESHOLD: u64 = MAX_CHUNK_SIZE + 123;

/// Size of the data carried by a single leaf node of cumulative size
/// `cumulative_size`.
pub fn convert_small_file_size(cumulative_size: u64) -> u64 {
    let overhead = match cumulative_size {
        0 => 0,
        s if s < 9 => 6,
        s if s < 131 => 8,
        s if s < 139 => 9,
        s if s < 16_388 => 11,
        s if s < 16_398 => 12,
        _ => 14,
    };
    cumulative_size.saturating_sub(overhead)
}

/// Logical file size for an object stat.
pub fn file_size(stat: &ObjectStat) -> u64 {
    let cumulative_size = stat.cumulative_size;
    if cumulative_size < MULTI_CHUNK_THRESHOLD {
        return convert_small_file_size(cumulative_size);
    }

    // Sum of the leaves' cumulative sizes.
    let leaves = cumulative_size.saturating_sub(stat.block_size);
    let full_chunks = leaves / (MAX_CHUNK_SIZE + FULL_CHUNK_OVERHEAD);
    let remainder = leaves % (MAX_CHUNK_SIZE + FULL_CHUNK_OVERHEAD);
    let remainder_overhead = remainder - convert_small_file_size(remainder);

    leaves - full_chunks * FULL_CHUNK_OVERHEAD - remainder_overhead
}
