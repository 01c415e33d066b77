use std::borrow::Cow;

use cesu8_str::java as cesu8_java;

/// Decode modified UTF-8, honoring the two-byte NUL and surrogate pairs.
pub(crate) fn decode(bytes: &[u8]) -> Option<Cow<'_, str>> {
    let java_str = cesu8_java::JavaStr::from_java_cesu8(bytes).ok()?;
    Some(cesu8_java::from_java_cesu8(java_str))
}

pub(crate) fn encode(s: &str) -> Vec<u8> {
    cesu8_java::from_utf8(s).as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nul_and_supplementary() {
        assert_eq!(decode(&[0x61, 0xc0, 0x80, 0x62]).unwrap(), "a\0b");
        assert_eq!(
            decode(&[0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80]).unwrap(),
            "\u{1F600}"
        );
        assert_eq!(decode(b"plain").unwrap(), "plain");
    }

    #[test]
    fn test_encode_matches_decode() {
        let text = "x\0y\u{1F600}";
        assert_eq!(decode(&encode(text)).unwrap(), text);
        assert_eq!(encode("abc"), b"abc");
    }
}
