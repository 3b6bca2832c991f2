//! Metric key sanitization.

/// Sanitizes a raw metric name into a key that is safe to forward downstream.
///
/// Every byte outside of `[A-Za-z0-9_.-]` is replaced with an underscore. The translation is total and
/// length-preserving: nothing is ever dropped, so the output always has exactly as many characters as the input had
/// bytes. Non-ASCII input is handled bytewise, meaning a multi-byte UTF-8 character turns into one underscore per byte.
///
/// When `prefix` is non-empty, the result is `<prefix>.<sanitized>`. The prefix itself is taken as-is, and is expected
/// to have been sanitized when it was configured.
pub fn sanitize_key<K>(raw: K, prefix: &str) -> String
where
    K: AsRef<[u8]>,
{
    let raw = raw.as_ref();
    let mut key = String::with_capacity(prefix.len() + 1 + raw.len());

    if !prefix.is_empty() {
        key.push_str(prefix);
        key.push('.');
    }

    key.extend(raw.iter().map(|b| if valid_key_byte(*b) { char::from(*b) } else { '_' }));
    key
}

#[inline]
pub(crate) fn valid_key_byte(b: u8) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z0-9_.-].
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-'
}

#[cfg(test)]
mod tests {
    use super::{sanitize_key, valid_key_byte};
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_key_known_cases() {
        let cases: &[(&[u8], &str)] = &[
            (b"foo", "foo"),
            (b"foo.bar", "foo.bar"),
            (b"foo-bar_baz", "foo-bar_baz"),
            (b"Foo.BAR.123", "Foo.BAR.123"),
            (b"foo/bar", "foo_bar"),
            (b"foo bar", "foo_bar"),
            (b"\t\n#! foo . bar \0 ^", "_____foo_._bar____"),
            (b"caf\xc3\xa9", "caf__"),
            (b"\xff", "_"),
            (b"", ""),
        ];

        for (input, expected) in cases {
            let result = sanitize_key(input, "");
            assert_eq!(expected, &result);
        }
    }

    #[test]
    fn test_sanitize_key_with_prefix() {
        assert_eq!(sanitize_key("foo", "pfx"), "pfx.foo");
        assert_eq!(sanitize_key("foo/bar", "a.b"), "a.b.foo_bar");
        assert_eq!(sanitize_key("", "pfx"), "pfx.");
    }

    proptest! {
        #[test]
        fn test_sanitize_key_charset(input in proptest::collection::vec(any::<u8>(), 0..64)) {
            let result = sanitize_key(&input, "");

            assert_eq!(result.len(), input.len(), "sanitization must not drop or add characters");
            assert!(result.bytes().all(valid_key_byte), "invalid character in key: {:?}", result);
        }

        #[test]
        fn test_sanitize_key_idempotent(input in ".*") {
            let once = sanitize_key(&input, "");
            let twice = sanitize_key(&once, "");

            assert_eq!(once, twice);
        }
    }
}
