//! Modified UTF-7 mailbox-name codec (RFC 3501 section 5.1.3).
//!
//! Printable ASCII stands for itself except `&`, which is written `&-`.
//! Everything else is encoded as UTF-16BE, base64'd with `,` in place of `/`
//! and no padding, and wrapped in `&` ... `-`.
//!
//! Decoding fails closed: if the input is not valid modified UTF-7 the input
//! is returned unchanged, so an unchanged result means "could not decode".

use std::borrow::Cow;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

const MUTF7: GeneralPurpose = GeneralPurpose::new(
    &alphabet::IMAP_MUTF7,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

const fn is_direct(c: char) -> bool {
    matches!(c, ' '..='~') && c != '&'
}

const fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b','
}

/// Encodes a mailbox name into modified UTF-7.
#[must_use]
pub fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending = String::new();
    for c in name.chars() {
        if is_direct(c) || c == '&' {
            flush_shifted(&mut out, &mut pending);
            if c == '&' {
                out.push_str("&-");
            } else {
                out.push(c);
            }
        } else {
            pending.push(c);
        }
    }
    flush_shifted(&mut out, &mut pending);
    out
}

fn flush_shifted(out: &mut String, pending: &mut String) {
    if pending.is_empty() {
        return;
    }
    let bytes: Vec<u8> = pending.encode_utf16().flat_map(u16::to_be_bytes).collect();
    out.push('&');
    MUTF7.encode_string(&bytes, out);
    out.push('-');
    pending.clear();
}

/// Decodes a modified UTF-7 mailbox name.
///
/// Returns the input unchanged when it contains no shift sequence or is
/// malformed (unterminated shift, bad base64, dangling bits, an odd number of
/// UTF-16 bytes or an unpaired surrogate).
#[must_use]
pub fn decode(name: &str) -> Cow<'_, str> {
    if !name.contains('&') {
        return Cow::Borrowed(name);
    }
    try_decode(name).map_or(Cow::Borrowed(name), Cow::Owned)
}

fn try_decode(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let shifted = &rest[start + 1..];
        let end = shifted.find('-')?;
        let encoded = &shifted[..end];
        if encoded.is_empty() {
            out.push('&');
        } else {
            if !encoded.bytes().all(is_base64_char) {
                return None;
            }
            let bytes = MUTF7.decode(encoded).ok()?;
            if bytes.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            out.push_str(&String::from_utf16(&units).ok()?);
        }
        rest = &shifted[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Returns true if decoding the name changes it.
#[must_use]
pub fn is_encoded(name: &str) -> bool {
    matches!(decode(name), Cow::Owned(ref decoded) if decoded != name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode("INBOX"), "INBOX");
        assert_eq!(encode("Lost & Found"), "Lost &- Found");
        assert_eq!(
            encode("~peter/mail/\u{53f0}\u{5317}/\u{65e5}\u{672c}\u{8a9e}"),
            "~peter/mail/&U,BTFw-/&ZeVnLIqe-"
        );
        assert_eq!(encode("\u{263a}!"), "&Jjo-!");
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode("INBOX"), "INBOX");
        assert_eq!(decode("Lost &- Found"), "Lost & Found");
        assert_eq!(
            decode("~peter/mail/&U,BTFw-/&ZeVnLIqe-"),
            "~peter/mail/\u{53f0}\u{5317}/\u{65e5}\u{672c}\u{8a9e}"
        );
        assert_eq!(decode("&U,BTF2XlZyyKng-"), "\u{53f0}\u{5317}\u{65e5}\u{672c}\u{8a9e}");
    }

    #[test]
    fn test_cyrillic_round_trip() {
        let name = "\u{41e}\u{442}\u{43f}\u{440}\u{430}\u{432}\u{43b}\u{435}\u{43d}\u{43d}\u{44b}\u{435}";
        let encoded = encode(name);
        assert!(encoded.starts_with('&'));
        assert!(encoded.is_ascii());
        assert_eq!(decode(&encoded), name);
        assert!(is_encoded(&encoded));
    }

    #[test]
    fn test_decode_fails_closed() {
        for bad in ["&Jjo", "&Jj*-", "&Jj-", "&AGE", "&2D0-", "&AGEA-"] {
            assert!(
                matches!(decode(bad), Cow::Borrowed(s) if s == bad),
                "{bad} should be returned unchanged"
            );
            assert!(!is_encoded(bad));
        }
    }

    #[test]
    fn test_plain_names_are_not_encoded() {
        assert!(!is_encoded("INBOX"));
        assert!(!is_encoded("[Gmail]/Sent Mail"));
        assert!(is_encoded("Lost &- Found"));
    }

    proptest! {
        #[test]
        fn prop_round_trip(s in ".*") {
            let encoded = encode(&s);
            prop_assert_eq!(decode(&encoded), s.as_str());
        }

        #[test]
        fn prop_canonical_encoding_is_stable(s in ".*") {
            let encoded = encode(&s);
            let decoded = decode(&encoded).into_owned();
            prop_assert_eq!(encode(&decoded), encoded);
        }

        #[test]
        fn prop_decode_never_panics(s in ".*") {
            let _ = decode(&s);
        }
    }
}
