//! # Scatter/Gather Helpers
//!
//! `MsgSendv` moves data through vectors of buffer parts instead of one
//! contiguous slice. Descriptor lists are staged in inline storage up to
//! [`MAX_IOVEC_LEN`](crate::defaults::MAX_IOVEC_LEN) parts and spill to
//! the heap only for larger vectors, for the duration of the call.

use crate::defaults::MAX_IOVEC_LEN;
use smallvec::SmallVec;

/// Descriptor list staged for one send; inline up to `MAX_IOVEC_LEN`
pub(crate) type PartList<'a> = SmallVec<[&'a [u8]; MAX_IOVEC_LEN]>;

/// Total bytes offered across the input parts
pub fn total_len(parts: &[&[u8]]) -> usize {
    parts.iter().map(|part| part.len()).sum()
}

/// Total bytes receivable across the output parts
pub fn total_capacity(parts: &[&mut [u8]]) -> usize {
    parts.iter().map(|part| part.len()).sum()
}

/// Flatten the input parts into one contiguous buffer
pub fn gather(parts: &[&[u8]]) -> Vec<u8> {
    let staged: PartList<'_> = SmallVec::from_slice(parts);
    let mut gathered = Vec::with_capacity(staged.iter().map(|part| part.len()).sum());
    for part in &staged {
        gathered.extend_from_slice(part);
    }
    gathered
}

/// Spread `bytes` across the output parts in order.
///
/// Returns the number of bytes written; the tail of `bytes` is dropped
/// once the parts are full, and trailing parts stay untouched once the
/// bytes run out.
pub fn scatter(bytes: &[u8], parts: &mut [&mut [u8]]) -> usize {
    let mut copied = 0;
    for part in parts.iter_mut() {
        if copied == bytes.len() {
            break;
        }
        let take = (bytes.len() - copied).min(part.len());
        part[..take].copy_from_slice(&bytes[copied..copied + take]);
        copied += take;
    }
    copied
}
