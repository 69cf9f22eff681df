const NO_VALUE: u8 = 255;
const BITS_PER_CHAR: usize = 5;

/// A 32-symbol alphabet with its reverse lookup table.
///
/// Both alphabets below list their symbols in ascending ASCII order, so a
/// fixed-width encoding of an integer sorts exactly like the integer itself.
pub struct Alphabet {
    symbols: &'static [u8; 32],
    lookup: [u8; 256],
}

impl Alphabet {
    /// Crockford base32. Decoding accepts lower case and the `O`/`I`/`L`
    /// aliases.
    pub const CROCKFORD: Self = {
        let symbols = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
        let mut lookup = build_lookup(symbols);
        lookup[b'O' as usize] = 0;
        lookup[b'o' as usize] = 0;
        lookup[b'I' as usize] = 1;
        lookup[b'i' as usize] = 1;
        lookup[b'L' as usize] = 1;
        lookup[b'l' as usize] = 1;
        Self { symbols, lookup }
    };

    /// The geohash alphabet (no `a`, `i`, `l`, `o`).
    pub const GEOHASH: Self = {
        let symbols = b"0123456789bcdefghjkmnpqrstuvwxyz";
        Self {
            symbols,
            lookup: build_lookup(symbols),
        }
    };

    /// Returns the symbol for a 5-bit value. Only the low 5 bits are used.
    #[inline]
    pub const fn symbol(&self, value: u8) -> u8 {
        self.symbols[(value & 0x1F) as usize]
    }

    /// Returns the 5-bit value of `byte`, or `None` when it is not part of the
    /// alphabet.
    #[inline]
    pub const fn value(&self, byte: u8) -> Option<u8> {
        match self.lookup[byte as usize] {
            NO_VALUE => None,
            v => Some(v),
        }
    }
}

/// Builds the reverse table, accepting both cases of every letter.
const fn build_lookup(symbols: &[u8; 32]) -> [u8; 256] {
    let mut lut = [NO_VALUE; 256];
    let mut i = 0;
    while i < 32 {
        let c = symbols[i];
        lut[c as usize] = i as u8;
        if c.is_ascii_uppercase() {
            lut[c.to_ascii_lowercase() as usize] = i as u8;
        } else if c.is_ascii_lowercase() {
            lut[c.to_ascii_uppercase() as usize] = i as u8;
        }
        i += 1;
    }
    lut
}

/// Encodes `input` as a big-endian number into `buf`, left-padding with zero
/// bits so that `buf.len() * 5 >= input.len() * 8`.
///
/// The output is fixed width, which keeps lexicographic order equal to numeric
/// order.
pub fn encode_into(alphabet: &Alphabet, input: &[u8], buf: &mut [u8]) {
    let input_bits = input.len() * 8;
    let total_bits = buf.len() * BITS_PER_CHAR;
    debug_assert!(total_bits >= input_bits);
    let mut bits = total_bits - input_bits;
    let mut acc = 0_u16;

    let mut out = 0;
    for &b in input {
        acc = (acc << 8) | u16::from(b);
        bits += 8;
        while bits >= BITS_PER_CHAR {
            bits -= BITS_PER_CHAR;
            buf[out] = alphabet.symbol(((acc >> bits) & 0x1F) as u8);
            out += 1;
        }
    }
}

/// Encodes a `u32` into its 7-character fixed-width form.
pub fn encode_u32(alphabet: &Alphabet, value: u32) -> String {
    let mut buf = [0_u8; 7];
    encode_into(alphabet, &value.to_be_bytes(), &mut buf);
    buf.iter().map(|&b| char::from(b)).collect()
}

/// Decodes a fixed-width string back into a `u64`.
///
/// Returns `None` on an unknown symbol or when the value does not fit.
pub fn decode_u64(alphabet: &Alphabet, encoded: &str) -> Option<u64> {
    encoded.bytes().try_fold(0_u64, |acc, b| {
        let v = alphabet.value(b)?;
        acc.checked_mul(32)?.checked_add(u64::from(v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_encoding_is_fixed_width() {
        for v in [0, 1, 31, 32, u32::MAX / 2, u32::MAX] {
            let s = encode_u32(&Alphabet::CROCKFORD, v);
            assert_eq!(s.len(), 7, "{v} -> {s}");
            assert_eq!(decode_u64(&Alphabet::CROCKFORD, &s), Some(u64::from(v)));
        }
        assert_eq!(encode_u32(&Alphabet::CROCKFORD, 0), "0000000");
        assert_eq!(encode_u32(&Alphabet::CROCKFORD, u32::MAX), "3ZZZZZZ");
    }

    #[test]
    fn fixed_width_encoding_preserves_order() {
        let values = [0_u32, 7, 31, 32, 1_000, 65_535, 1 << 20, u32::MAX - 1, u32::MAX];
        for pair in values.windows(2) {
            let a = encode_u32(&Alphabet::CROCKFORD, pair[0]);
            let b = encode_u32(&Alphabet::CROCKFORD, pair[1]);
            assert!(a < b, "{} ({a}) !< {} ({b})", pair[0], pair[1]);
        }
    }

    #[test]
    fn crockford_decode_accepts_aliases_and_lower_case() {
        let canonical = decode_u64(&Alphabet::CROCKFORD, "01ABC").unwrap();
        assert_eq!(decode_u64(&Alphabet::CROCKFORD, "oLabc"), Some(canonical));
        assert_eq!(decode_u64(&Alphabet::CROCKFORD, "0iABC"), Some(canonical));
    }

    #[test]
    fn geohash_alphabet_rejects_excluded_letters() {
        for b in [b'a', b'i', b'l', b'o', b'!'] {
            assert_eq!(Alphabet::GEOHASH.value(b), None, "{}", b as char);
        }
        assert_eq!(Alphabet::GEOHASH.value(b'b'), Some(10));
        assert_eq!(Alphabet::GEOHASH.value(b'z'), Some(31));
        assert_eq!(Alphabet::GEOHASH.symbol(31), b'z');
    }

    #[test]
    fn decode_rejects_overflow() {
        assert_eq!(decode_u64(&Alphabet::CROCKFORD, &"Z".repeat(14)), None);
    }
}
