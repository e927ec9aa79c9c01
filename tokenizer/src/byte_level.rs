//! GPT-2 byte ↔ unicode mapping (compile-time const tables).
//!
//! Byte-level vocabularies store every raw byte as a printable char so that
//! tokens remain valid strings. The pre-tokenizer maps bytes to chars before
//! the model runs; the decoder maps them back.

/// Whether byte `b` maps to itself: printable ASCII plus most of Latin-1.
const fn is_direct_byte(b: u8) -> bool {
    matches!(b, 0x21..=0x7E | 0xA1..=0xAC | 0xAE..=0xFF)
}

/// Direct bytes map to their own code point; the rest are shifted to
/// U+0100 onwards in byte order.
const fn build_byte_to_unicode() -> [char; 256] {
    let mut table = ['\0'; 256];
    let mut n = 0u32;
    let mut b = 0u16;
    while b < 256 {
        let code = if is_direct_byte(b as u8) { b as u32 } else { 256 + n };
        if !is_direct_byte(b as u8) {
            n += 1;
        }
        table[b as usize] = match char::from_u32(code) {
            Some(c) => c,
            None => '\0',
        };
        b += 1;
    }
    table
}

/// Highest mapped code point is U+0143 (68 shifted bytes from U+0100).
const CHAR_TABLE_LEN: usize = 324;

const fn build_char_to_byte() -> [Option<u8>; CHAR_TABLE_LEN] {
    let b2u = build_byte_to_unicode();
    let mut table: [Option<u8>; CHAR_TABLE_LEN] = [None; CHAR_TABLE_LEN];
    let mut b = 0u16;
    while b < 256 {
        let idx = b2u[b as usize] as usize;
        if idx < CHAR_TABLE_LEN {
            table[idx] = Some(b as u8);
        }
        b += 1;
    }
    table
}

static BYTE_TO_UNICODE: [char; 256] = build_byte_to_unicode();
static CHAR_TO_BYTE: [Option<u8>; CHAR_TABLE_LEN] = build_char_to_byte();

/// Map every byte of `text` to its GPT-2 char.
pub fn encode_bytes(text: &str) -> String {
    text.bytes().map(|b| BYTE_TO_UNICODE[b as usize]).collect()
}

/// Inverse of a single char, if it belongs to the alphabet.
#[inline]
pub fn char_to_byte(c: char) -> Option<u8> {
    CHAR_TO_BYTE.get(c as usize).copied().flatten()
}

/// Map GPT-2 chars back to bytes and decode as (lossy) UTF-8.
///
/// Chars outside the alphabet are kept as their own UTF-8 encoding.
pub fn decode_chars(tokens: &str) -> String {
    let mut bytes = Vec::with_capacity(tokens.len());
    for c in tokens.chars() {
        match char_to_byte(c) {
            Some(b) => bytes.push(b),
            None => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_unicode_tables_are_inverse() {
        let mut seen = std::collections::HashSet::new();
        for b in 0u16..256 {
            let c = BYTE_TO_UNICODE[b as usize];
            assert!(c != '\0');
            assert!(seen.insert(c), "duplicate mapping for byte {b:#x}");
            assert_eq!(char_to_byte(c), Some(b as u8));
        }
    }

    #[test]
    fn test_space_maps_to_g_dot() {
        assert_eq!(encode_bytes(" a"), "Ġa");
        assert_eq!(encode_bytes("\n"), "Ċ");
        assert_eq!(decode_chars("ĠhelloĊ"), " hello\n");
    }

    #[test]
    fn test_multibyte_roundtrip() {
        let text = "héllo 世界 🎉";
        assert_eq!(decode_chars(&encode_bytes(text)), text);
    }
}
