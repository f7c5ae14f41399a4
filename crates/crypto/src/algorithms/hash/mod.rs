// Path: crates/crypto/src/algorithms/hash/mod.rs
//! SHA-2 digests behind every content hash.

use sha2::{Digest, Sha256, Sha512};

/// SHA-256 of `data`.
pub fn sha256<T: AsRef<[u8]>>(data: T) -> [u8; 32] {
    Sha256::digest(data.as_ref()).into()
}

/// SHA-512 of `data`; used for the long hash form.
pub fn sha512<T: AsRef<[u8]>>(data: T) -> [u8; 64] {
    Sha512::digest(data.as_ref()).into()
}

/// Hashes the concatenation of `parts` without allocating the joined buffer.
pub fn sha256_concat<I, T>(parts: I) -> [u8; 32]
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests;
