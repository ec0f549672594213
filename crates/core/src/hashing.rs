//! Shared MD5 hex digest utility.
//!
//! The compile cache keys transpiled output by the digest of the source
//! text. MD5 is not security-sensitive here, it only deduplicates;
//! collisions are acceptable.

use md5::{Digest, Md5};

/// Compute an MD5 hex digest of the given bytes.
pub fn md5_hex(data: &[u8]) -> String {
    let hash = Md5::digest(data);
    format!("{hash:x}")
}
