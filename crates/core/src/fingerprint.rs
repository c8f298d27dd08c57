//! Request fingerprints
//!
//! A `RequestKey` is the SHA-256 of the fragment text and every parameter
//! pair. Each field is length-prefixed so that moving bytes between adjacent
//! fields always changes the digest. The fragment id and language are not
//! hashed: the same code submitted from two places shares one cache entry.

use sha2::{Digest, Sha256};

use crate::{CodeFragment, QueryParams};

const KEY_DOMAIN: &[u8] = b"decomplens/request-key/v1";

/// Deterministic cache and dedup key for one (fragment, params) pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey([u8; 32]);

impl RequestKey {
  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }

  pub fn to_hex(&self) -> String {
    hex::encode(self.0)
  }

  /// First 12 hex chars, for log fields
  pub fn short(&self) -> String {
    hex::encode(&self.0[..6])
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.to_hex())
  }
}

impl std::fmt::Debug for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "RequestKey({})", self.short())
  }
}

/// Derive the key for a fragment and its request parameters.
pub fn key(fragment: &CodeFragment, params: &QueryParams) -> RequestKey {
  let mut hasher = Sha256::new();
  hasher.update(KEY_DOMAIN);
  update_field(&mut hasher, fragment.text().as_bytes());

  hasher.update((params.len() as u64).to_be_bytes());
  for (name, value) in params.iter() {
    update_field(&mut hasher, name.as_bytes());
    update_field(&mut hasher, value.as_bytes());
  }

  RequestKey(hasher.finalize().into())
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
  hasher.update((bytes.len() as u64).to_be_bytes());
  hasher.update(bytes);
}
