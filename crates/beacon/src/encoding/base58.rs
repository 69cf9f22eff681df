//! Bitcoin-alphabet base58 for 128-bit values.
//!
//! Values are always rendered with [`U128_WIDTH`] characters, left-padded with
//! the zero symbol `1`. Because the alphabet is in ascending ASCII order, two
//! encodings compare exactly like the integers they encode.

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const NO_VALUE: u8 = 255;

/// Number of characters needed for any `u128` (`58^22 > 2^128`).
pub const U128_WIDTH: usize = 22;

const LOOKUP: [u8; 256] = {
    let mut lut = [NO_VALUE; 256];
    let mut i = 0;
    while i < 58 {
        lut[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    lut
};

/// Encodes `value` into its fixed-width representation.
pub fn encode_u128(mut value: u128) -> String {
    let mut buf = [ALPHABET[0]; U128_WIDTH];
    for slot in buf.iter_mut().rev() {
        if value == 0 {
            break;
        }
        *slot = ALPHABET[(value % 58) as usize];
        value /= 58;
    }
    buf.iter().map(|&b| char::from(b)).collect()
}

/// Decodes a base58 string of any width into a `u128`.
///
/// Returns `None` on an unknown symbol or overflow.
pub fn decode_u128(encoded: &str) -> Option<u128> {
    encoded.bytes().try_fold(0_u128, |acc, b| {
        let v = LOOKUP[b as usize];
        if v == NO_VALUE {
            return None;
        }
        acc.checked_mul(58)?.checked_add(u128::from(v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_is_constant() {
        assert_eq!(encode_u128(0), "1".repeat(U128_WIDTH));
        assert_eq!(encode_u128(u128::MAX).len(), U128_WIDTH);
        assert_eq!(encode_u128(57), format!("{}z", "1".repeat(U128_WIDTH - 1)));
    }

    #[test]
    fn decode_inverts_encode() {
        for v in [0, 1, 57, 58, 1 << 64, u128::MAX - 1, u128::MAX] {
            assert_eq!(decode_u128(&encode_u128(v)), Some(v));
        }
    }

    #[test]
    fn encoding_preserves_numeric_order() {
        let values = [0_u128, 1, 57, 58, 3_363, 1 << 63, 1 << 64, 1 << 100, u128::MAX];
        for pair in values.windows(2) {
            assert!(encode_u128(pair[0]) < encode_u128(pair[1]));
        }
    }

    #[test]
    fn decode_rejects_ambiguous_symbols() {
        for bad in ["0", "O", "I", "l", "+"] {
            assert_eq!(decode_u128(bad), None, "{bad}");
        }
    }
}
