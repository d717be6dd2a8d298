//! Taproot output commitments ([BIP341](https://github.com/bitcoin/bips/blob/master/bip-0341.mediawiki)).

use alloc::vec::Vec;

use secp256k1::{Parity, Scalar, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::tx;

/// The leaf version of BIP342 tapscripts.
pub const TAPSCRIPT_LEAF_VERSION: u8 = 0xc0;

/// Masks the leaf version out of the first control block byte; the low bit is the output key
/// parity.
pub const LEAF_MASK: u8 = 0xfe;

/// The first byte of a witness item that marks it as the annex.
pub const ANNEX_TAG: u8 = 0x50;

/// Leaf version byte plus internal key.
pub const CONTROL_BASE_SIZE: usize = 33;

/// Each merkle path step.
pub const CONTROL_NODE_SIZE: usize = 32;

/// The deepest a leaf can be in a script tree.
pub const CONTROL_MAX_NODE_COUNT: usize = 128;

/// The largest valid control block.
pub const CONTROL_MAX_SIZE: usize = CONTROL_BASE_SIZE + CONTROL_NODE_SIZE * CONTROL_MAX_NODE_COUNT;

/// Errors from decoding control blocks and building script trees.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("control block of {0} bytes isn’t 33 + 32m bytes with m ≤ 128")]
    WrongControlSize(usize),

    #[error("leaf depth {0} can’t be placed in the tree")]
    InvalidDepth(usize),

    #[error("the script tree has unfilled branches")]
    Incomplete,

    #[error("the internal key isn’t a valid x-only public key")]
    InvalidInternalKey,
}

/// A SHA256 engine primed with the BIP340 tag prefix, `SHA256(tag) || SHA256(tag)`.
pub(crate) fn tagged_engine(tag: &str) -> Sha256 {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut engine = Sha256::new();
    engine.update(tag_hash);
    engine.update(tag_hash);
    engine
}

/// `SHA256(SHA256(tag) || SHA256(tag) || msg)`.
pub fn tagged_hash(tag: &str, msg: &[u8]) -> [u8; 32] {
    let mut engine = tagged_engine(tag);
    engine.update(msg);
    engine.finalize().into()
}

/// The hash committing to one leaf of a script tree.
pub fn tap_leaf_hash(leaf_version: u8, script: &[u8]) -> [u8; 32] {
    let mut msg = vec![leaf_version & LEAF_MASK];
    tx::write_bytes(&mut msg, script);
    tagged_hash("TapLeaf", &msg)
}

/// The hash of an inner node. The children are sorted first, so the order they’re given in
/// doesn’t matter.
pub fn tap_branch_hash(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut engine = tagged_engine("TapBranch");
    engine.update(first);
    engine.update(second);
    engine.finalize().into()
}

/// The tweak applied to the internal key. Key-path-only outputs have no merkle root.
pub fn tap_tweak_hash(internal_key: &[u8; 32], merkle_root: Option<&[u8; 32]>) -> [u8; 32] {
    let mut engine = tagged_engine("TapTweak");
    engine.update(internal_key);
    if let Some(root) = merkle_root {
        engine.update(root);
    }
    engine.finalize().into()
}

/// The last witness item of a script path spend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlBlock {
    /// The leaf version of the script being spent.
    pub leaf_version: u8,
    /// Whether the output key has an odd Y coordinate.
    pub output_key_parity: Parity,
    /// The untweaked key.
    pub internal_key: [u8; 32],
    /// Sibling hashes from the leaf up to the root.
    pub path: Vec<[u8; 32]>,
}

impl ControlBlock {
    /// Split a control block into its parts, checking only its size.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let len = bytes.len();
        if !(CONTROL_BASE_SIZE..=CONTROL_MAX_SIZE).contains(&len)
            || (len - CONTROL_BASE_SIZE) % CONTROL_NODE_SIZE != 0
        {
            return Err(Error::WrongControlSize(len));
        }
        let (base, path) = bytes.split_at(CONTROL_BASE_SIZE);
        let mut internal_key = [0; 32];
        internal_key.copy_from_slice(&base[1..]);
        Ok(ControlBlock {
            leaf_version: base[0] & LEAF_MASK,
            output_key_parity: if base[0] & 1 == 1 {
                Parity::Odd
            } else {
                Parity::Even
            },
            internal_key,
            path: path
                .chunks_exact(CONTROL_NODE_SIZE)
                .map(|node| {
                    let mut hash = [0; 32];
                    hash.copy_from_slice(node);
                    hash
                })
                .collect(),
        })
    }

    /// The encoding placed in the witness.
    pub fn serialize(&self) -> Vec<u8> {
        let parity = match self.output_key_parity {
            Parity::Even => 0,
            Parity::Odd => 1,
        };
        let mut bytes = Vec::with_capacity(CONTROL_BASE_SIZE + CONTROL_NODE_SIZE * self.path.len());
        bytes.push(self.leaf_version | parity);
        bytes.extend_from_slice(&self.internal_key);
        self.path.iter().for_each(|node| bytes.extend_from_slice(node));
        bytes
    }

    /// Fold the path into the root of the tree that contains `leaf_hash`.
    pub fn merkle_root(&self, leaf_hash: [u8; 32]) -> [u8; 32] {
        self.path
            .iter()
            .fold(leaf_hash, |node, sibling| tap_branch_hash(&node, sibling))
    }
}

/// Whether `program` is the internal key of `control` tweaked with the tree containing
/// `leaf_hash`.
pub fn verify_commitment(control: &ControlBlock, program: &[u8; 32], leaf_hash: [u8; 32]) -> bool {
    let (Ok(internal_key), Ok(output_key)) = (
        XOnlyPublicKey::from_slice(&control.internal_key),
        XOnlyPublicKey::from_slice(program),
    ) else {
        return false;
    };
    let root = control.merkle_root(leaf_hash);
    Scalar::from_be_bytes(tap_tweak_hash(&control.internal_key, Some(&root))).is_ok_and(|tweak| {
        internal_key.tweak_add_check(
            &Secp256k1::verification_only(),
            &output_key,
            control.output_key_parity,
            tweak,
        )
    })
}

#[derive(Clone, Debug)]
struct Node {
    hash: [u8; 32],
    /// Indices into `TaprootBuilder::leaves`, with the path built so far.
    leaves: Vec<(usize, Vec<[u8; 32]>)>,
}

impl Node {
    fn combine(mut self, mut other: Node) -> Node {
        self.leaves
            .iter_mut()
            .for_each(|(_, path)| path.push(other.hash));
        other
            .leaves
            .iter_mut()
            .for_each(|(_, path)| path.push(self.hash));
        self.leaves.append(&mut other.leaves);
        Node {
            hash: tap_branch_hash(&self.hash, &other.hash),
            leaves: self.leaves,
        }
    }
}

/// Builds a script tree from leaves given in depth-first order with their depths, the way
/// descriptors list them.
#[derive(Clone, Debug, Default)]
pub struct TaprootBuilder {
    /// The incomplete node waiting for a sibling at each depth.
    branch: Vec<Option<Node>>,
    leaves: Vec<(u8, Vec<u8>)>,
}

impl TaprootBuilder {
    /// An empty tree, which produces a key-path-only output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next leaf at `depth` (the root is depth 0).
    pub fn add_leaf(mut self, depth: usize, leaf_version: u8, script: Vec<u8>) -> Result<Self, Error> {
        if CONTROL_MAX_NODE_COUNT < depth || depth + 1 < self.branch.len() {
            return Err(Error::InvalidDepth(depth));
        }
        let mut node = Node {
            hash: tap_leaf_hash(leaf_version, &script),
            leaves: vec![(self.leaves.len(), vec![])],
        };
        self.leaves.push((leaf_version & LEAF_MASK, script));
        let mut depth = depth;
        while let Some(Some(_)) = self.branch.get(depth) {
            let sibling = self.branch.pop().flatten().ok_or(Error::InvalidDepth(depth))?;
            node = sibling.combine(node);
            depth = depth.checked_sub(1).ok_or(Error::InvalidDepth(0))?;
        }
        if self.branch.len() <= depth {
            self.branch.resize(depth + 1, None);
        }
        self.branch[depth] = Some(node);
        Ok(self)
    }

    /// Tweak `internal_key` with the finished tree.
    pub fn finalize(mut self, internal_key: &[u8; 32]) -> Result<SpendInfo, Error> {
        let root = match self.branch.len() {
            0 => None,
            1 if self.branch[0].is_some() => self.branch.pop().flatten(),
            _ => return Err(Error::Incomplete),
        };
        let secp = Secp256k1::verification_only();
        let merkle_root = root.as_ref().map(|node| node.hash);
        let (output_key, output_key_parity) = XOnlyPublicKey::from_slice(internal_key)
            .ok()
            .zip(Scalar::from_be_bytes(tap_tweak_hash(internal_key, merkle_root.as_ref())).ok())
            .and_then(|(key, tweak)| key.add_tweak(&secp, &tweak).ok())
            .ok_or(Error::InvalidInternalKey)?;
        let mut paths = vec![vec![]; self.leaves.len()];
        if let Some(node) = root {
            node.leaves
                .into_iter()
                .for_each(|(index, path)| paths[index] = path);
        }
        Ok(SpendInfo {
            internal_key: *internal_key,
            merkle_root,
            output_key: output_key.serialize(),
            output_key_parity,
            leaves: self.leaves.into_iter().zip(paths).collect(),
        })
    }
}

/// Everything needed to spend a taproot output.
#[derive(Clone, Debug)]
pub struct SpendInfo {
    /// The untweaked key.
    pub internal_key: [u8; 32],
    /// The root of the script tree, if there is one.
    pub merkle_root: Option<[u8; 32]>,
    /// The witness program of the output.
    pub output_key: [u8; 32],
    /// The parity of the output key.
    pub output_key_parity: Parity,
    leaves: Vec<((u8, Vec<u8>), Vec<[u8; 32]>)>,
}

impl SpendInfo {
    /// The control block for spending the first leaf holding `script` with `leaf_version`.
    pub fn control_block(&self, leaf_version: u8, script: &[u8]) -> Option<ControlBlock> {
        self.leaves
            .iter()
            .find(|((version, leaf), _)| *version == leaf_version && leaf[..] == *script)
            .map(|(_, path)| ControlBlock {
                leaf_version,
                output_key_parity: self.output_key_parity,
                internal_key: self.internal_key,
                path: path.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        tap_branch_hash, tap_leaf_hash, verify_commitment, ControlBlock, Error, TaprootBuilder,
        TAPSCRIPT_LEAF_VERSION,
    };
    use crate::testing;

    fn array(s: &str) -> [u8; 32] {
        hex::decode(s)
            .expect("valid hex")
            .try_into()
            .expect("32 bytes")
    }

    #[test]
    fn key_path_only_output() {
        let internal_key = array("d6889cb081036e0faefa3a35157ad71086b123b2b144b649798b494c300a961d");
        let info = TaprootBuilder::new()
            .finalize(&internal_key)
            .expect("valid key");
        assert_eq!(info.merkle_root, None);
        assert_eq!(
            info.output_key,
            array("53a1f6e454df1aa2776a2814a721372d6258050de330b3c6d10ee8f4e0dda343")
        );
    }

    #[test]
    fn single_leaf_output() {
        let internal_key = array("187791b6f712a8ea41c8ecdd0ee77fab3e85263b37e1ec18a3651926b3a6cf27");
        let script = hex::decode(
            "20d85a959b0290bf19bb89ed43c916be835475d013da4b362117393e25a48229b8ac",
        )
        .expect("valid hex");
        let leaf_hash = array("5b75adecf53548f3ec6ad7d78383bf84cc57b55a3127c72b9a2481752dd88b21");
        assert_eq!(tap_leaf_hash(TAPSCRIPT_LEAF_VERSION, &script), leaf_hash);

        let info = TaprootBuilder::new()
            .add_leaf(0, TAPSCRIPT_LEAF_VERSION, script.clone())
            .and_then(|builder| builder.finalize(&internal_key))
            .expect("valid tree");
        assert_eq!(info.merkle_root, Some(leaf_hash));
        assert_eq!(
            info.output_key,
            array("147c9c57132f6e7ecddba9800bb0c4449251c92a1e60371ee77557b6620f3ea3")
        );
        let control = info
            .control_block(TAPSCRIPT_LEAF_VERSION, &script)
            .expect("leaf is in the tree");
        assert_eq!(
            hex::encode(control.serialize()),
            "c1187791b6f712a8ea41c8ecdd0ee77fab3e85263b37e1ec18a3651926b3a6cf27"
        );
        assert!(verify_commitment(&control, &info.output_key, leaf_hash));
    }

    #[test]
    fn every_leaf_commits_to_the_output() {
        let scripts = [vec![0x51], vec![0x52], vec![0x53]];
        let info = TaprootBuilder::new()
            .add_leaf(1, TAPSCRIPT_LEAF_VERSION, scripts[0].clone())
            .and_then(|b| b.add_leaf(2, TAPSCRIPT_LEAF_VERSION, scripts[1].clone()))
            .and_then(|b| b.add_leaf(2, TAPSCRIPT_LEAF_VERSION, scripts[2].clone()))
            .and_then(|b| b.finalize(&testing::INTERNAL_KEY))
            .expect("valid tree");
        let leaf_hashes = scripts
            .clone()
            .map(|script| tap_leaf_hash(TAPSCRIPT_LEAF_VERSION, &script));
        assert_eq!(
            info.merkle_root,
            Some(tap_branch_hash(
                &leaf_hashes[0],
                &tap_branch_hash(&leaf_hashes[1], &leaf_hashes[2])
            ))
        );
        for (script, leaf_hash) in scripts.iter().zip(leaf_hashes) {
            let control = info
                .control_block(TAPSCRIPT_LEAF_VERSION, script)
                .expect("leaf is in the tree");
            assert_eq!(
                ControlBlock::parse(&control.serialize()).as_ref(),
                Ok(&control)
            );
            assert!(verify_commitment(&control, &info.output_key, leaf_hash));
            assert!(!verify_commitment(&control, &info.output_key, [0; 32]));
        }
    }

    #[test]
    fn malformed_trees_and_control_blocks() {
        assert_eq!(
            TaprootBuilder::new()
                .add_leaf(1, TAPSCRIPT_LEAF_VERSION, vec![0x51])
                .and_then(|b| b.finalize(&testing::INTERNAL_KEY))
                .map(|info| info.output_key),
            Err(Error::Incomplete)
        );
        assert_eq!(
            TaprootBuilder::new()
                .add_leaf(0, TAPSCRIPT_LEAF_VERSION, vec![0x51])
                .and_then(|b| b.add_leaf(0, TAPSCRIPT_LEAF_VERSION, vec![0x52]))
                .map(|_| ()),
            Err(Error::InvalidDepth(0))
        );
        assert_eq!(ControlBlock::parse(&[0xc0; 32]), Err(Error::WrongControlSize(32)));
        assert_eq!(ControlBlock::parse(&[0xc0; 34]), Err(Error::WrongControlSize(34)));
        assert_eq!(
            ControlBlock::parse(&[0xc0; 33 + 32 * 129]),
            Err(Error::WrongControlSize(33 + 32 * 129))
        );
    }
}
