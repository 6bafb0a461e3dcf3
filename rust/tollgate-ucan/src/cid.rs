//! Content identifiers for DAG-CBOR blocks.

use ipld_core::cid::{Cid, multihash::Multihash};
use sha2::{Digest, Sha256};

/// Multicodec code for DAG-CBOR.
pub const DAG_CBOR: u64 = 0x71;

/// Multihash code for SHA2-256.
pub const SHA2_256: u64 = 0x12;

/// Compute the CIDv1 (dag-cbor, sha2-256) of an encoded block.
#[must_use]
#[allow(clippy::expect_used)]
pub fn to_dagcbor_cid(block: &[u8]) -> Cid {
    let digest = Sha256::digest(block);
    // a 32 byte digest always fits the 64 byte multihash
    let hash = Multihash::<64>::wrap(SHA2_256, &digest).expect("sha2-256 digest fits multihash");
    Cid::new_v1(DAG_CBOR, hash)
}

/// Returns `true` if `block` hashes to `cid`.
#[must_use]
pub fn matches(cid: &Cid, block: &[u8]) -> bool {
    cid.codec() == DAG_CBOR
        && cid.hash().code() == SHA2_256
        && cid.hash().digest() == Sha256::digest(block).as_slice()
}
