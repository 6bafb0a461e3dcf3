//! CAR archives of delegation chains.
//!
//! A [`DelegationArchive`] is a CARv1 stream: a DAG-CBOR header
//! `{ roots: [cid], version: 1 }` followed by one entry per block, each
//! entry being `varint(len) ‖ cid ‖ block` where `len` covers the CID and
//! the block. The root is the delegation itself; every proof block reachable
//! from it is included once.

use crate::{
    cid::matches,
    delegation::{Delegation, DelegationError, proof_links},
};
use ipld_core::cid::Cid;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// CAR format version written and accepted.
const CAR_VERSION: u64 = 1;

/// Deepest proof chain accepted when extracting.
pub const MAX_CHAIN_DEPTH: usize = 32;

/// Most blocks accepted in one archive.
pub const MAX_ARCHIVE_BLOCKS: usize = 256;

/// Errors from writing or reading a [`DelegationArchive`].
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Writing the archive failed.
    #[error("failed to encode archive: {0}")]
    Encoding(String),

    /// The header is missing or malformed.
    #[error("invalid archive header: {0}")]
    Header(String),

    /// The header declares a CAR version other than 1.
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u64),

    /// The header names no root.
    #[error("archive has no root")]
    MissingRoot,

    /// A block entry is cut short or its CID cannot be read.
    #[error("invalid archive entry: {0}")]
    Entry(String),

    /// A block does not hash to its CID.
    #[error("block does not match its CID {0}")]
    HashMismatch(Cid),

    /// A linked block is not in the archive.
    #[error("block {0} is missing from the archive")]
    MissingBlock(Cid),

    /// The archive holds more than [`MAX_ARCHIVE_BLOCKS`] blocks.
    #[error("archive holds more than {MAX_ARCHIVE_BLOCKS} blocks")]
    TooManyBlocks,

    /// The proof chain is deeper than [`MAX_CHAIN_DEPTH`].
    #[error("proof chain exceeds {MAX_CHAIN_DEPTH} links")]
    TooDeep,

    /// A block is not a valid delegation.
    #[error(transparent)]
    Delegation(#[from] DelegationError),
}

#[derive(Debug, Serialize, Deserialize)]
struct CarHeader {
    roots: Vec<Cid>,
    version: u64,
}

/// A delegation chain serialized as CAR bytes, addressed by its root CID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationArchive {
    root: Cid,
    bytes: Vec<u8>,
}

impl DelegationArchive {
    /// The root CID as a string.
    #[must_use]
    pub fn root(&self) -> String {
        self.root.to_string()
    }

    /// The root CID.
    #[must_use]
    pub const fn root_cid(&self) -> Cid {
        self.root
    }

    /// The CAR bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the archive, returning the CAR bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Wrap CAR bytes, reading the root from the header.
    ///
    /// Blocks are not checked until [`extract`][Self::extract].
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        let (root, _) = read_header(&bytes)?;
        Ok(Self { root, bytes })
    }

    /// Decode the root delegation together with its proofs.
    ///
    /// # Errors
    ///
    /// Returns an error if a block is malformed, missing, does not match
    /// its CID, or the archive is too large or too deep.
    pub fn extract(&self) -> Result<Delegation, ArchiveError> {
        let (root, mut rest) = read_header(&self.bytes)?;

        let mut blocks = HashMap::new();
        while !rest.is_empty() {
            if blocks.len() == MAX_ARCHIVE_BLOCKS {
                return Err(ArchiveError::TooManyBlocks);
            }
            let (cid, block) = read_entry(&mut rest)?;
            if !matches(&cid, block) {
                return Err(ArchiveError::HashMismatch(cid));
            }
            blocks.insert(cid, block);
        }

        let (delegation, _) = load(&root, &blocks, 0, &mut HashMap::new())?;
        Ok(delegation)
    }
}

fn read_header(bytes: &[u8]) -> Result<(Cid, &[u8]), ArchiveError> {
    let mut cursor = bytes;
    let length = leb128::read::unsigned(&mut cursor)
        .map_err(|e| ArchiveError::Header(format!("unable to read header length: {e}")))?;
    let length = usize::try_from(length)
        .map_err(|_| ArchiveError::Header("header length overflows".to_string()))?;
    if cursor.len() < length {
        return Err(ArchiveError::Header(format!(
            "header needs {length} bytes, {} available",
            cursor.len()
        )));
    }
    let (header, rest) = cursor.split_at(length);
    let header: CarHeader =
        serde_ipld_dagcbor::from_slice(header).map_err(|e| ArchiveError::Header(e.to_string()))?;
    if header.version != CAR_VERSION {
        return Err(ArchiveError::UnsupportedVersion(header.version));
    }
    let root = header.roots.first().copied().ok_or(ArchiveError::MissingRoot)?;
    Ok((root, rest))
}

fn read_entry<'a>(cursor: &mut &'a [u8]) -> Result<(Cid, &'a [u8]), ArchiveError> {
    let length = leb128::read::unsigned(cursor)
        .map_err(|e| ArchiveError::Entry(format!("unable to read entry length: {e}")))?;
    let length = usize::try_from(length)
        .map_err(|_| ArchiveError::Entry("entry length overflows".to_string()))?;
    if cursor.len() < length {
        return Err(ArchiveError::Entry(format!(
            "entry needs {length} bytes, {} available",
            cursor.len()
        )));
    }
    let (entry, rest) = cursor.split_at(length);
    *cursor = rest;

    let mut reader = entry;
    let cid = Cid::read_bytes(&mut reader).map_err(|e| ArchiveError::Entry(e.to_string()))?;
    Ok((cid, reader))
}

/// Decode the delegation at `cid` reached `depth` links below the root,
/// returning it with the height of its proof chain.
///
/// Every block is decoded once; `loaded` shares it between the
/// delegations that cite it.
fn load(
    cid: &Cid,
    blocks: &HashMap<Cid, &[u8]>,
    depth: usize,
    loaded: &mut HashMap<Cid, (Delegation, usize)>,
) -> Result<(Delegation, usize), ArchiveError> {
    if depth > MAX_CHAIN_DEPTH {
        return Err(ArchiveError::TooDeep);
    }
    if let Some((delegation, height)) = loaded.get(cid) {
        if depth + height > MAX_CHAIN_DEPTH {
            return Err(ArchiveError::TooDeep);
        }
        return Ok((delegation.clone(), *height));
    }

    let block = blocks.get(cid).ok_or(ArchiveError::MissingBlock(*cid))?;
    let mut height = 0;
    let mut proofs = Vec::new();
    for link in proof_links(block)? {
        let (proof, below) = load(&link, blocks, depth + 1, loaded)?;
        height = height.max(below + 1);
        proofs.push(proof);
    }
    let delegation = Delegation::from_block(block.to_vec(), proofs)?;
    loaded.insert(*cid, (delegation.clone(), height));
    Ok((delegation, height))
}

fn write_entry(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), ArchiveError> {
    leb128::write::unsigned(out, bytes.len() as u64)
        .map_err(|e| ArchiveError::Encoding(format!("failed to write length: {e}")))?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_blocks(
    delegation: &Delegation,
    out: &mut Vec<u8>,
    seen: &mut HashSet<Cid>,
) -> Result<(), ArchiveError> {
    if !seen.insert(delegation.cid()) {
        return Ok(());
    }
    let entry = [delegation.cid().to_bytes(), delegation.block().to_vec()].concat();
    write_entry(out, &entry)?;
    for proof in delegation.proofs() {
        write_blocks(proof, out, seen)?;
    }
    Ok(())
}

impl Delegation {
    /// Serialize this delegation and its proof chain as a CAR archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be encoded.
    pub fn archive(&self) -> Result<DelegationArchive, ArchiveError> {
        let header = serde_ipld_dagcbor::to_vec(&CarHeader {
            roots: vec![self.cid()],
            version: CAR_VERSION,
        })
        .map_err(|e| ArchiveError::Encoding(e.to_string()))?;

        let mut bytes = Vec::new();
        write_entry(&mut bytes, &header)?;
        write_blocks(self, &mut bytes, &mut HashSet::new())?;

        Ok(DelegationArchive {
            root: self.cid(),
            bytes,
        })
    }

    /// Decode a delegation chain from CAR bytes.
    ///
    /// # Errors
    ///
    /// See [`DelegationArchive::extract`].
    pub fn extract(bytes: &[u8]) -> Result<Self, ArchiveError> {
        DelegationArchive::from_bytes(bytes.to_vec())?.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Capability, Timestamp};
    use pretty_assertions::assert_eq;
    use tollgate_credentials::{Ed25519Signer, Principal};

    async fn chain() -> Delegation {
        let space = Ed25519Signer::import(&[1; 32]).unwrap();
        let agent = Ed25519Signer::import(&[2; 32]).unwrap();
        let user = Ed25519Signer::import(&[3; 32]).unwrap();

        let root = Delegation::builder()
            .audience(&agent)
            .capability(Capability::new(space.did().as_str(), "*"))
            .sign(&space)
            .await
            .unwrap();
        Delegation::builder()
            .audience(&user)
            .capability(Capability::new(space.did().as_str(), "upload/add"))
            .expiration(Timestamp::from_unix(2_000_000_000))
            .proof(root)
            .sign(&agent)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn it_round_trips_a_chain() {
        let delegation = chain().await;
        let archive = delegation.archive().unwrap();
        assert_eq!(archive.root(), delegation.cid().to_string());

        let extracted = Delegation::extract(archive.as_bytes()).unwrap();
        assert_eq!(extracted, delegation);
        assert_eq!(extracted.proofs(), delegation.proofs());
        assert_eq!(extracted.proofs()[0].block(), delegation.proofs()[0].block());
    }

    #[tokio::test]
    async fn it_reads_the_root_from_the_header() {
        let delegation = chain().await;
        let bytes = delegation.archive().unwrap().into_bytes();
        let archive = DelegationArchive::from_bytes(bytes).unwrap();
        assert_eq!(archive.root_cid(), delegation.cid());
    }

    #[tokio::test]
    async fn it_rejects_tampered_blocks() {
        let delegation = chain().await;
        let mut bytes = delegation.archive().unwrap().into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let result = Delegation::extract(&bytes);
        assert!(matches!(result, Err(ArchiveError::HashMismatch(_))));
    }

    #[tokio::test]
    async fn it_rejects_missing_proofs() {
        let delegation = chain().await;
        let archive = delegation.archive().unwrap();
        let bytes = archive.as_bytes();

        // drop the final entry, which is the proof block
        let proof = delegation.proofs()[0].clone();
        let entry_len = proof.cid().to_bytes().len() + proof.block().len();
        let mut varint = Vec::new();
        leb128::write::unsigned(&mut varint, entry_len as u64).unwrap();
        let truncated = &bytes[..bytes.len() - entry_len - varint.len()];

        let result = Delegation::extract(truncated);
        assert!(matches!(result, Err(ArchiveError::MissingBlock(cid)) if cid == proof.cid()));
    }

    #[test]
    fn it_caps_the_number_of_blocks() {
        let mut bytes = Vec::new();
        let header = serde_ipld_dagcbor::to_vec(&CarHeader {
            roots: vec![crate::cid::to_dagcbor_cid(b"0")],
            version: CAR_VERSION,
        })
        .unwrap();
        write_entry(&mut bytes, &header).unwrap();
        for n in 0..=MAX_ARCHIVE_BLOCKS {
            let block = n.to_string().into_bytes();
            let cid = crate::cid::to_dagcbor_cid(&block);
            write_entry(&mut bytes, &[cid.to_bytes(), block].concat()).unwrap();
        }

        let result = Delegation::extract(&bytes);
        assert!(matches!(result, Err(ArchiveError::TooManyBlocks)));
    }

    #[test]
    fn it_rejects_garbage() {
        assert!(matches!(
            DelegationArchive::from_bytes(vec![0x05, 0x01]),
            Err(ArchiveError::Header(_))
        ));
        assert!(DelegationArchive::from_bytes(Vec::new()).is_err());
    }
}
