use bstr::{BString, ByteSlice};
use std::ops::{Deref, DerefMut};

/// Owned binary string with the case-insensitive and NUL-skipping helpers
/// the header tables need. Wraps a [`BString`] so the usual `Vec<u8>`
/// surface is available through deref.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bstr {
    s: BString,
}

impl Bstr {
    /// Make a new empty Bstr.
    pub fn new() -> Self {
        Bstr {
            s: BString::from(Vec::new()),
        }
    }

    /// Make a new empty Bstr with the given capacity.
    pub fn with_capacity(len: usize) -> Self {
        Bstr {
            s: BString::from(Vec::with_capacity(len)),
        }
    }

    /// Extend with the given bytes.
    pub fn add<B: AsRef<[u8]>>(&mut self, other: B) {
        self.s.extend_from_slice(other.as_ref())
    }

    /// Borrow the contents as a plain byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.s.as_slice()
    }

    /// Byte-for-byte equality with the given slice.
    pub fn eq_slice<B: AsRef<[u8]>>(&self, other: B) -> bool {
        self.as_slice() == other.as_ref()
    }

    /// Equality with the given slice, ignoring ASCII case.
    pub fn eq_nocase<B: AsRef<[u8]>>(&self, other: B) -> bool {
        slice_eq_nocase(self.as_slice(), other.as_ref())
    }

    /// Equality with the given slice, ignoring ASCII case and skipping any
    /// NUL bytes in `self`. NULs may be injected into header names to fool
    /// naive matchers, so lookups must see through them.
    pub fn eq_nocase_nozero<B: AsRef<[u8]>>(&self, other: B) -> bool {
        let left = self
            .as_slice()
            .iter()
            .copied()
            .filter(|b| *b != 0)
            .map(|b| b.to_ascii_lowercase());
        let right = other.as_ref().iter().copied().map(|b| b.to_ascii_lowercase());
        left.eq(right)
    }

    /// As [`Bstr::eq_nocase`], with surrounding ASCII whitespace on `self`
    /// ignored.
    pub fn eq_nocase_trimmed<B: AsRef<[u8]>>(&self, other: B) -> bool {
        slice_eq_nocase(self.s.trim_with(|c| c.is_ascii_whitespace()), other.as_ref())
    }

    /// As [`Bstr::eq_nocase_nozero`], with surrounding ASCII whitespace on
    /// `self` ignored.
    pub fn eq_nocase_nozero_trimmed<B: AsRef<[u8]>>(&self, other: B) -> bool {
        let left = self
            .s
            .trim_with(|c| c.is_ascii_whitespace())
            .iter()
            .copied()
            .filter(|b| *b != 0)
            .map(|b| b.to_ascii_lowercase());
        let right = other.as_ref().iter().copied().map(|b| b.to_ascii_lowercase());
        left.eq(right)
    }

    /// Whether this string starts with the given bytes, ignoring ASCII case.
    pub fn starts_with_nocase<B: AsRef<[u8]>>(&self, other: B) -> bool {
        let other = other.as_ref();
        self.len() >= other.len() && self.as_slice()[..other.len()].eq_ignore_ascii_case(other)
    }

    /// Find the byte index of the given needle, ignoring ASCII case.
    pub fn index_of_nocase<B: AsRef<[u8]>>(&self, needle: B) -> Option<usize> {
        let haystack = self.as_slice().to_ascii_lowercase();
        let needle = needle.as_ref().to_ascii_lowercase();
        haystack.find(&needle)
    }

    /// Find the byte index of the given needle, ignoring ASCII case and any
    /// NUL bytes in `self`. The returned index refers to the NUL-less view.
    pub fn index_of_nocase_nozero<B: AsRef<[u8]>>(&self, needle: B) -> Option<usize> {
        let haystack: Vec<u8> = self
            .as_slice()
            .iter()
            .copied()
            .filter(|b| *b != 0)
            .map(|b| b.to_ascii_lowercase())
            .collect();
        let needle = needle.as_ref().to_ascii_lowercase();
        haystack.find(&needle)
    }
}

fn slice_eq_nocase(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len() && left.eq_ignore_ascii_case(right)
}

impl Deref for Bstr {
    type Target = BString;

    fn deref(&self) -> &Self::Target {
        &self.s
    }
}

impl DerefMut for Bstr {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.s
    }
}

impl From<&[u8]> for Bstr {
    fn from(src: &[u8]) -> Self {
        Bstr {
            s: BString::from(src),
        }
    }
}

impl From<&str> for Bstr {
    fn from(src: &str) -> Self {
        src.as_bytes().into()
    }
}

impl From<Vec<u8>> for Bstr {
    fn from(src: Vec<u8>) -> Self {
        Bstr {
            s: BString::from(src),
        }
    }
}

impl PartialEq<&str> for Bstr {
    fn eq(&self, rhs: &&str) -> bool {
        self.as_slice() == rhs.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ABCDefgh", "ABCDefgh", true)]
    #[case("ABCDefgh", "abcdefgh", true)]
    #[case("ABCDefgh", "ABCDEFGH", true)]
    #[case("ABCDefgh", "ABCDefghi", false)]
    #[case("ABCDefgh", "ABCDefg", false)]
    fn test_eq_nocase(#[case] input: &str, #[case] other: &str, #[case] expected: bool) {
        assert_eq!(Bstr::from(input).eq_nocase(other), expected);
    }

    #[rstest]
    #[case(b"A\x00B\x00\x00C\x00Defg\x00h".as_ref(), "ABCDefgh", true)]
    #[case(b"A\x00B\x00\x00C\x00Defg\x00h".as_ref(), "abcdefgh", true)]
    #[case(b"A\x00B".as_ref(), "ABC", false)]
    fn test_eq_nocase_nozero(#[case] input: &[u8], #[case] other: &str, #[case] expected: bool) {
        assert_eq!(Bstr::from(input).eq_nocase_nozero(other), expected);
    }

    #[rstest]
    #[case("  Host\t", "host", true)]
    #[case("  Host\t", "host ", false)]
    fn test_eq_nocase_trimmed(#[case] input: &str, #[case] other: &str, #[case] expected: bool) {
        assert_eq!(Bstr::from(input).eq_nocase_trimmed(other), expected);
    }

    #[test]
    fn starts_with_nocase() {
        let b = Bstr::from("ABCD");
        assert!(b.starts_with_nocase("AB"));
        assert!(b.starts_with_nocase("ab"));
        assert!(!b.starts_with_nocase("CD"));
        assert!(!b.starts_with_nocase("ABCDE"));
    }

    #[test]
    fn index_of_nocase() {
        let b = Bstr::from("ABCDefgh");
        assert_eq!(Some(4), b.index_of_nocase("E"));
        assert_eq!(Some(3), b.index_of_nocase("dE"));
        assert_eq!(None, b.index_of_nocase("z"));
    }

    #[test]
    fn index_of_nocase_nozero() {
        let b = Bstr::from(b"chu\x00nked".as_ref());
        assert_eq!(Some(0), b.index_of_nocase_nozero("CHUNKED"));
        assert_eq!(None, b.index_of_nocase_nozero("identity"));
    }

    #[test]
    fn add_and_deref() {
        let mut b = Bstr::from("abc");
        b.add("def");
        assert!(b.eq_slice("abcdef"));
        b.clear();
        assert!(b.is_empty());
    }
}
