//! Byte-level cleanup of the text segment.
//!
//! The sanitizer walks the text left to right and keeps a byte run only if
//! it matches one of the UTF-8 byte-class patterns below. Anything else is
//! dropped one byte at a time, so a broken multi-byte sequence costs its
//! lead byte and the scan resumes right after it.
//!
//! ```text
//! 0x00..=0x7F  single byte   kept if >= 0x20 or one of \t \n \r
//! 0xC2..=0xDF  lead of 2     + 1 continuation (0x80..=0xBF)
//! 0xE0..=0xEF  lead of 3     + 2 continuations
//! 0xF0..=0xF7  lead of 4     + 3 continuations
//! other        dropped       (stray continuation, 0xC0/0xC1, 0xF8..)
//! ```
//!
//! Only the byte-class pattern is checked, never the decoded scalar value:
//! overlong three/four byte forms, surrogates and values above U+10FFFF pass
//! through. Downstream JSON parsing rejects those on its own.

use std::borrow::Cow;

/// Classification of a byte as the start of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteClass {
    /// Printable ASCII or tab/LF/CR.
    Text,
    /// ASCII control byte other than tab/LF/CR.
    Control,
    /// Lead byte expecting `n` continuation bytes.
    Lead(usize),
    /// Continuation byte or a value that never starts a sequence.
    Invalid,
}

const fn classify(byte: u8) -> ByteClass {
    match byte {
        0x09 | 0x0A | 0x0D => ByteClass::Text,
        0x00..=0x1F => ByteClass::Control,
        0x20..=0x7F => ByteClass::Text,
        0xC2..=0xDF => ByteClass::Lead(1),
        0xE0..=0xEF => ByteClass::Lead(2),
        0xF0..=0xF7 => ByteClass::Lead(3),
        _ => ByteClass::Invalid,
    }
}

#[inline]
const fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Returns the length of the sequence starting at `pos` if it is kept, or
/// `None` if the byte at `pos` must be dropped.
fn accepted_len(input: &[u8], pos: usize) -> Option<usize> {
    match classify(input[pos]) {
        ByteClass::Text => Some(1),
        ByteClass::Control | ByteClass::Invalid => None,
        ByteClass::Lead(n) => {
            let tail = input.get(pos + 1..pos + 1 + n)?;
            tail.iter()
                .all(|&b| is_continuation(b))
                .then_some(n + 1)
        }
    }
}

/// Sanitizes a text segment.
///
/// Returns the input unchanged (borrowed) when nothing had to be dropped.
pub fn sanitize(input: &[u8]) -> Cow<'_, [u8]> {
    let mut pos = 0;
    while pos < input.len() {
        match accepted_len(input, pos) {
            Some(len) => pos += len,
            None => break,
        }
    }
    if pos == input.len() {
        return Cow::Borrowed(input);
    }

    let mut out = Vec::with_capacity(input.len());
    out.extend_from_slice(&input[..pos]);
    let mut dropped = 0usize;
    while pos < input.len() {
        match accepted_len(input, pos) {
            Some(len) => {
                out.extend_from_slice(&input[pos..pos + len]);
                pos += len;
            }
            None => {
                dropped += 1;
                pos += 1;
            }
        }
    }
    tracing::warn!("Sanitizer dropped {} invalid byte(s) from text segment", dropped);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_ascii_is_borrowed() {
        let input = br#"{"protocol":"login"}"#;
        assert!(matches!(sanitize(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_control_bytes() {
        let input = b"a\x00b\tc\nd\re\x1bf\x7f";
        assert_eq!(sanitize(input).as_ref(), b"ab\tc\nd\ref\x7f");
    }

    #[test]
    fn test_valid_three_byte_sequence_passes() {
        let input = [0xE3, 0x81, 0x82];
        assert_eq!(sanitize(&input).as_ref(), &input[..]);
    }

    #[test]
    fn test_corrupted_three_byte_sequence() {
        // Lead dropped, 0x81 is then a stray continuation, 0x20 survives.
        let input = [0xE3, 0x81, 0x20];
        assert_eq!(sanitize(&input).as_ref(), b" ");
    }

    #[test]
    fn test_lone_continuation_dropped() {
        let input = [b'a', 0x80, b'b'];
        assert_eq!(sanitize(&input).as_ref(), b"ab");
    }

    #[test]
    fn test_two_and_four_byte_sequences() {
        let input = "é😀".as_bytes();
        assert_eq!(sanitize(input).as_ref(), input);
    }

    #[test]
    fn test_truncated_sequence_at_end() {
        let input = [b'x', 0xF0, 0x9F, 0x98];
        assert_eq!(sanitize(&input).as_ref(), b"x");
    }

    #[test]
    fn test_never_lead_bytes_dropped() {
        let input = [0xC0, 0xAF, 0xC1, b'k', 0xF8, 0xFF];
        assert_eq!(sanitize(&input).as_ref(), b"k");
    }

    #[test]
    fn test_permissive_surrogate_passes() {
        // ED A0 80 encodes U+D800; byte classes match so it is kept.
        let input = [0xED, 0xA0, 0x80];
        assert_eq!(sanitize(&input).as_ref(), &input[..]);
    }

    #[test]
    fn test_korean_text_preserved() {
        let input = "근무변경 신청".as_bytes();
        assert_eq!(sanitize(input).as_ref(), input);
    }

    proptest! {
        #[test]
        fn prop_sanitize_idempotent(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let once = sanitize(&bytes).into_owned();
            let twice = sanitize(&once);
            prop_assert_eq!(twice.as_ref(), once.as_slice());
        }

        #[test]
        fn prop_valid_utf8_text_untouched(s in "[\\PC\t\n\r]*") {
            let sanitized = sanitize(s.as_bytes());
            prop_assert_eq!(sanitized.as_ref(), s.as_bytes());
        }
    }
}
