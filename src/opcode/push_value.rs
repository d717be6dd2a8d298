//! Constant values represented as opcodes.

#![allow(non_camel_case_types)]

use alloc::{
    string::{String, ToString},
    vec::Vec,
};

use bounded_vec::{BoundedVec, EmptyBoundedVec};

use crate::{num, opcode, script::Asm, signature};

/// Data values that aren’t represented within their opcode byte.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LargeValue {
    /// NB: The lower bound here is 1 because `PushdataBytelength([;0])` has the same encoding as
    ///     [`OP_0`].
    PushdataBytelength(BoundedVec<u8, 1, 0x4b>),
    /// A value whose byte length can fit into a single byte.
    OP_PUSHDATA1(EmptyBoundedVec<u8, 0xff>),
    /// A value whose byte length can fit into two bytes.
    OP_PUSHDATA2(EmptyBoundedVec<u8, { Self::MAX_SIZE }>),
    /// NB: This constructor is only minimal if [`crate::interpreter::Flags::MinimalData`] isn’t
    ///     set, as no element can be large enough to need it.
    OP_PUSHDATA4(EmptyBoundedVec<u8, { Self::MAX_SIZE }>),
}

use LargeValue::*;

impl LargeValue {
    pub(crate) const PUSHDATA1_BYTE: u8 = 0x4c;
    pub(crate) const PUSHDATA2_BYTE: u8 = 0x4d;
    pub(crate) const PUSHDATA4_BYTE: u8 = 0x4e;

    /// The maximum number of bytes able to be stored in a single [`PushValue`].
    pub const MAX_SIZE: usize = 520; // bytes

    /// The number of bytes this requires in a script.
    pub(crate) fn byte_len(&self) -> usize {
        1 + match self {
            PushdataBytelength(data) => data.as_slice().len(),
            OP_PUSHDATA1(data) => 1 + data.as_slice().len(),
            OP_PUSHDATA2(data) => 2 + data.as_slice().len(),
            OP_PUSHDATA4(data) => 4 + data.as_slice().len(),
        }
    }

    /// Returns the smallest [`LargeValue`] encoding that can hold `v`. Values that have a
    /// [`SmallValue`] encoding are not redirected here, see [`super::PushValue::from_slice`].
    pub(crate) fn from_slice(v: &[u8]) -> Option<LargeValue> {
        if let Ok(bv) = BoundedVec::try_from(v.to_vec()) {
            Some(PushdataBytelength(bv))
        } else if let Ok(bv) = BoundedVec::try_from(v.to_vec()) {
            Some(OP_PUSHDATA1(bv))
        } else if let Ok(bv) = BoundedVec::try_from(v.to_vec()) {
            Some(OP_PUSHDATA2(bv))
        } else {
            None
        }
    }

    fn split_value(script: &[u8], needed_bytes: usize) -> (Result<&[u8], opcode::Error>, &[u8]) {
        match script.split_at_checked(needed_bytes) {
            None => (
                Err(opcode::Error::Read {
                    expected_bytes: needed_bytes,
                    available_bytes: script.len(),
                }),
                &[],
            ),
            Some((value, remainder)) => (
                // The size is only checked once the bytes have been read, so an oversized push
                // still leaves the parser positioned after it.
                if needed_bytes <= Self::MAX_SIZE {
                    Ok(value)
                } else {
                    Err(opcode::Error::PushSize(Some(needed_bytes)))
                },
                remainder,
            ),
        }
    }

    /// First splits `size_size` bytes to determine the size of the value to read, then splits the
    /// value.
    fn split_tagged_value(
        script: &[u8],
        size_size: usize,
    ) -> (Result<&[u8], opcode::Error>, &[u8]) {
        match script.split_at_checked(size_size) {
            None => (
                Err(opcode::Error::Read {
                    expected_bytes: size_size,
                    available_bytes: script.len(),
                }),
                &[],
            ),
            Some((size_bytes, rem)) => {
                let size = size_bytes
                    .iter()
                    .rev()
                    .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));
                Self::split_value(rem, size)
            }
        }
    }

    fn bounded<const L: usize, const U: usize, W>(
        res: Result<&[u8], opcode::Error>,
    ) -> Result<BoundedVec<u8, L, U, W>, opcode::Error>
    where
        BoundedVec<u8, L, U, W>: TryFrom<Vec<u8>>,
    {
        res.and_then(|v| {
            BoundedVec::try_from(v.to_vec()).map_err(|_| opcode::Error::PushSize(Some(v.len())))
        })
    }

    /// Parse a single [`LargeValue`] from a script. Returns `None` if the first byte doesn’t
    /// correspond to a [`LargeValue`].
    pub(crate) fn parse(script: &[u8]) -> Option<(Result<LargeValue, opcode::Error>, &[u8])> {
        let (leading_byte, script) = script.split_first()?;
        match *leading_byte {
            0x01..LargeValue::PUSHDATA1_BYTE => {
                let (res, rem) = Self::split_value(script, (*leading_byte).into());
                Some((Self::bounded(res).map(PushdataBytelength), rem))
            }
            LargeValue::PUSHDATA1_BYTE => {
                let (res, rem) = Self::split_tagged_value(script, 1);
                Some((Self::bounded(res).map(OP_PUSHDATA1), rem))
            }
            LargeValue::PUSHDATA2_BYTE => {
                let (res, rem) = Self::split_tagged_value(script, 2);
                Some((Self::bounded(res).map(OP_PUSHDATA2), rem))
            }
            LargeValue::PUSHDATA4_BYTE => {
                let (res, rem) = Self::split_tagged_value(script, 4);
                Some((Self::bounded(res).map(OP_PUSHDATA4), rem))
            }
            _ => None,
        }
    }

    /// Get the [`crate::interpreter::Stack`] element represented by this [`LargeValue`].
    pub fn value(&self) -> &[u8] {
        match self {
            PushdataBytelength(v) => v.as_slice(),
            OP_PUSHDATA1(v) => v.as_slice(),
            OP_PUSHDATA2(v) => v.as_slice(),
            OP_PUSHDATA4(v) => v.as_slice(),
        }
    }

    /// Returns false if there is a smaller possible encoding of the provided value.
    pub(crate) fn is_minimal_push(&self) -> bool {
        match self {
            PushdataBytelength(data) => match data.as_slice() {
                [b] => *b != 0x81 && (*b < 1 || 16 < *b),
                _ => true,
            },
            OP_PUSHDATA1(data) => usize::from(Self::PUSHDATA1_BYTE) <= data.as_slice().len(),
            OP_PUSHDATA2(data) => 0x100 <= data.as_slice().len(),
            OP_PUSHDATA4(data) => 0x10000 <= data.as_slice().len(),
        }
    }

    /// Returns the numeric value represented by the opcode, if one exists.
    pub(crate) fn to_num(&self) -> Result<i64, num::Error> {
        num::parse(self.value(), false, Some(8))
    }
}

impl From<&LargeValue> for Vec<u8> {
    fn from(value: &LargeValue) -> Self {
        let contents = value.value();
        // Every length fits, as `MAX_SIZE` is well under `u16::MAX`.
        let len = u32::try_from(contents.len()).unwrap_or(u32::MAX).to_le_bytes();
        let mut bytes = Vec::with_capacity(value.byte_len());
        match value {
            PushdataBytelength(_) => bytes.push(len[0]),
            OP_PUSHDATA1(_) => bytes.extend([LargeValue::PUSHDATA1_BYTE, len[0]]),
            OP_PUSHDATA2(_) => bytes.extend([LargeValue::PUSHDATA2_BYTE, len[0], len[1]]),
            OP_PUSHDATA4(_) => {
                bytes.push(LargeValue::PUSHDATA4_BYTE);
                bytes.extend(len);
            }
        }
        bytes.extend_from_slice(contents);
        bytes
    }
}

impl Asm for LargeValue {
    fn to_asm(&self, attempt_sighash_decode: bool) -> String {
        let value = self.value();
        if value.len() <= 4 {
            return num::parse(value, false, None).unwrap_or(0).to_string();
        }
        let suffix = attempt_sighash_decode
            .then(|| signature::strict_hash_type(value))
            .flatten();
        match suffix {
            Some(hash_type) => format!(
                "{}[{}]",
                hex_string(&value[..value.len() - 1]),
                hash_type.to_asm(false)
            ),
            None => hex_string(value),
        }
    }
}

/// Lower-case hex, without pulling in a dependency outside of tests.
pub(crate) fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Data values represented entirely by their opcode byte.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[allow(missing_docs)]
#[repr(u8)]
pub enum SmallValue {
    // push value
    OP_0 = 0x00,
    OP_1NEGATE = 0x4f,
    OP_1 = 0x51,
    OP_2 = 0x52,
    OP_3 = 0x53,
    OP_4 = 0x54,
    OP_5 = 0x55,
    OP_6 = 0x56,
    OP_7 = 0x57,
    OP_8 = 0x58,
    OP_9 = 0x59,
    OP_10 = 0x5a,
    OP_11 = 0x5b,
    OP_12 = 0x5c,
    OP_13 = 0x5d,
    OP_14 = 0x5e,
    OP_15 = 0x5f,
    OP_16 = 0x60,
}

use SmallValue::*;

impl SmallValue {
    /// Decodes this opcode from its byte encoding.
    pub(crate) fn decode(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(OP_0),
            0x4f => Some(OP_1NEGATE),
            0x51 => Some(OP_1),
            0x52 => Some(OP_2),
            0x53 => Some(OP_3),
            0x54 => Some(OP_4),
            0x55 => Some(OP_5),
            0x56 => Some(OP_6),
            0x57 => Some(OP_7),
            0x58 => Some(OP_8),
            0x59 => Some(OP_9),
            0x5a => Some(OP_10),
            0x5b => Some(OP_11),
            0x5c => Some(OP_12),
            0x5d => Some(OP_13),
            0x5e => Some(OP_14),
            0x5f => Some(OP_15),
            0x60 => Some(OP_16),
            _ => None,
        }
    }

    /// Returns the byte encoding of this opcode.
    pub(crate) fn encode(self) -> u8 {
        self as u8
    }

    /// Get the [`crate::interpreter::Stack`] element represented by this [`SmallValue`].
    pub(crate) fn value(&self) -> Vec<u8> {
        match self {
            OP_0 => vec![],
            OP_1NEGATE => vec![0x81],
            _ => vec![self.encode() - (OP_1.encode() - 1)],
        }
    }

    /// Returns the numeric value of the opcode. It will always be in the range -1..=16.
    pub(crate) fn to_num(self) -> i8 {
        match self {
            OP_0 => 0,
            OP_1NEGATE => -1,
            // `OP_1` through `OP_16` are contiguous.
            _ => i8::try_from(self.encode() - (OP_1.encode() - 1)).unwrap_or(i8::MAX),
        }
    }
}

impl Asm for SmallValue {
    fn to_asm(&self, _attempt_sighash_decode: bool) -> String {
        self.to_num().to_string()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::{LargeValue, SmallValue};
    use crate::opcode;

    #[test]
    fn small_values_are_their_numbers() {
        for b in 0..=u8::MAX {
            if let Some(sv) = SmallValue::decode(b) {
                assert_eq!(
                    crate::num::parse(&sv.value(), true, None),
                    Ok(i64::from(sv.to_num()))
                );
            }
        }
    }

    #[test]
    fn pushdata_lengths_are_fixed_width() {
        let value = vec![0xab; 300];
        let lv = LargeValue::from_slice(&value).expect("fits");
        assert!(matches!(lv, LargeValue::OP_PUSHDATA2(_)));
        let bytes = Vec::from(&lv);
        assert_eq!(&bytes[..3], &[0x4d, 0x2c, 0x01]);
        assert_eq!(bytes.len(), lv.byte_len());

        let (parsed, rem) = LargeValue::parse(&bytes).expect("is a large value");
        assert_eq!(parsed, Ok(lv));
        assert!(rem.is_empty());

        let tiny = [0x4e, 0x01, 0x00, 0x00, 0x00, 0x07];
        let (parsed, _) = LargeValue::parse(&tiny).expect("is a large value");
        let parsed = parsed.expect("valid");
        assert!(!parsed.is_minimal_push());
        assert_eq!(Vec::from(&parsed), tiny.to_vec());
    }

    #[test]
    fn truncated_and_oversized_pushes() {
        assert_eq!(
            LargeValue::parse(&[0x4c]).map(|(res, _)| res),
            Some(Err(opcode::Error::Read {
                expected_bytes: 1,
                available_bytes: 0
            }))
        );
        assert_eq!(
            LargeValue::parse(&[0x05, 0x01, 0x02]).map(|(res, _)| res),
            Some(Err(opcode::Error::Read {
                expected_bytes: 5,
                available_bytes: 2
            }))
        );

        let mut oversized = vec![0x4d, 0x09, 0x02];
        oversized.extend([0; 521]);
        oversized.push(0x61);
        let (res, rem) = LargeValue::parse(&oversized).expect("is a large value");
        assert_eq!(res, Err(opcode::Error::PushSize(Some(521))));
        assert_eq!(rem, &[0x61]);
    }
}
