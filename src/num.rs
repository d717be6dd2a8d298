//! Script numbers: little-endian sign-magnitude integers with minimal encodings.

use alloc::vec::Vec;

use thiserror::Error;

/// Things that can go wrong when reading a stack element as a number.
#[allow(missing_docs)]
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("non-minimal encoding of script number")]
    NonMinimalEncoding(Option<Vec<u8>>),

    #[error("script number overflow: max: {max_size}, actual: {actual}")]
    Overflow { max_size: usize, actual: usize },
}

/// Most numeric opcodes accept at most 4-byte operands.
pub const DEFAULT_MAX_SIZE: usize = 4;

/// `OP_CHECKLOCKTIMEVERIFY` and `OP_CHECKSEQUENCEVERIFY` accept 5-byte operands, which avoids a
/// year-2038 problem for time-based lock times.
pub const LOCK_TIME_MAX_SIZE: usize = 5;

/// Convert bytes to the integer they encode.
///
/// `max_size` defaults to [`DEFAULT_MAX_SIZE`]. Anything above 8 bytes is rejected regardless,
/// since it can’t be represented.
pub fn parse(vch: &[u8], require_minimal: bool, max_size: Option<usize>) -> Result<i64, Error> {
    let Some(vch_back) = vch.last() else {
        return Ok(0);
    };

    let max_size = max_size.unwrap_or(DEFAULT_MAX_SIZE);
    if vch.len() > max_size {
        return Err(Error::Overflow {
            max_size,
            actual: vch.len(),
        });
    }

    if require_minimal && (vch_back & 0x7f) == 0 {
        // If the most-significant byte, excluding the sign bit, is zero then the encoding isn’t
        // minimal. This also rejects negative zero (`[0x80]`).
        //
        // The exception is when the next byte down has its high bit set, because then the extra
        // byte is needed to hold the sign, e.g. 255 is `[0xff, 0x00]`.
        if vch.len() <= 1 || (vch[vch.len() - 2] & 0x80) == 0 {
            return Err(Error::NonMinimalEncoding(Some(vch.to_vec())));
        }
    }

    if vch.len() > 8 {
        return Err(Error::Overflow {
            max_size: 8,
            actual: vch.len(),
        });
    }

    let magnitude = vch
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, byte)| acc | (u64::from(*byte) << (8 * i)));
    let sign_bit = 0x80u64 << (8 * (vch.len() - 1));

    if magnitude & sign_bit == 0 {
        // 8 bytes without the sign bit set always fits in 63 bits.
        i64::try_from(magnitude).map_err(|_| Error::Overflow {
            max_size: 8,
            actual: vch.len(),
        })
    } else {
        i64::try_from(magnitude & !sign_bit)
            .map(|n| -n)
            .map_err(|_| Error::Overflow {
                max_size: 8,
                actual: vch.len(),
            })
    }
}

/// Encode an integer minimally.
pub fn serialize(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    let mut result = Vec::new();
    let neg = value < 0;
    let mut absvalue = value.unsigned_abs();

    while absvalue != 0 {
        result.push(absvalue.to_le_bytes()[0]);
        absvalue >>= 8;
    }

    // - If the most significant byte is >= 0x80 and the value is positive, push a new zero-byte to
    //   make the significant byte < 0x80 again.
    // - If the most significant byte is >= 0x80 and the value is negative, push a new 0x80 byte
    //   that will be popped off when converting to an integral.
    // - If the most significant byte is < 0x80 and the value is negative, add 0x80 to it, since it
    //   will be subtracted and interpreted as a negative when converting to an integral.
    if result.last().is_some_and(|last| last & 0x80 != 0) {
        result.push(if neg { 0x80 } else { 0 });
    } else if neg {
        if let Some(last) = result.last_mut() {
            *last |= 0x80;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use proptest::prelude::*;

    use super::{parse, serialize, Error};

    #[test]
    fn known_encodings() {
        let cases: &[(i64, &[u8])] = &[
            (0, &[]),
            (1, &[0x01]),
            (-1, &[0x81]),
            (127, &[0x7f]),
            (128, &[0x80, 0x00]),
            (-128, &[0x80, 0x80]),
            (255, &[0xff, 0x00]),
            (-255, &[0xff, 0x80]),
            (256, &[0x00, 0x01]),
            (6000, &[0x70, 0x17]),
            (0x7fff_ffff, &[0xff, 0xff, 0xff, 0x7f]),
            (-0x7fff_ffff, &[0xff, 0xff, 0xff, 0xff]),
        ];
        for (n, bytes) in cases {
            assert_eq!(serialize(*n), bytes.to_vec(), "serializing {}", n);
            assert_eq!(parse(bytes, true, None), Ok(*n), "parsing {:?}", bytes);
        }
    }

    #[test]
    fn rejects_non_minimal() {
        assert_eq!(
            parse(&[0x80], true, None),
            Err(Error::NonMinimalEncoding(Some(vec![0x80])))
        );
        assert_eq!(
            parse(&[0x01, 0x00], true, None),
            Err(Error::NonMinimalEncoding(Some(vec![0x01, 0x00])))
        );
        // Without the minimality requirement these are just odd encodings of 0 and 1.
        assert_eq!(parse(&[0x80], false, None), Ok(0));
        assert_eq!(parse(&[0x01, 0x00], false, None), Ok(1));
    }

    #[test]
    fn respects_max_size() {
        let five = [0x00, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(
            parse(&five, false, None),
            Err(Error::Overflow {
                max_size: 4,
                actual: 5
            })
        );
        assert_eq!(parse(&five, false, Some(5)), Ok(0x01_0000_0000));
    }

    #[test]
    fn extremes() {
        assert_eq!(serialize(i64::MIN), vec![0, 0, 0, 0, 0, 0, 0, 0x80, 0x80]);
        assert_eq!(parse(&serialize(i64::MAX), true, Some(8)), Ok(i64::MAX));
        assert_eq!(parse(&serialize(i64::MIN + 1), true, Some(8)), Ok(i64::MIN + 1));
    }

    proptest! {
        #[test]
        fn round_trip(n in (i64::MIN + 1)..=i64::MAX) {
            let bytes = serialize(n);
            prop_assert!(bytes.len() <= 8);
            prop_assert_eq!(parse(&bytes, true, Some(8)), Ok(n));
        }

        #[test]
        fn serialization_is_minimal(n in -0x7fff_ffffi64..=0x7fff_ffff) {
            let bytes: Vec<u8> = serialize(n);
            prop_assert!(parse(&bytes, true, None).is_ok());
        }
    }
}
