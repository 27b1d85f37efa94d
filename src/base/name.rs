//! Domain names.
//!
//! This module provides [`Name`], an owned, absolute domain name kept in
//! uncompressed wire format. Names compare case-insensitively and order
//! according to the canonical DNS name order of [RFC 4034, section 6.1].
//!
//! [RFC 4034, section 6.1]: https://tools.ietf.org/html/rfc4034#section-6.1

use super::wire::{ParseError, Parser};
use bytes::Bytes;
use core::cmp::Ordering;
use core::hash::{Hash, Hasher};
use core::str::FromStr;
use core::fmt;
use smallvec::SmallVec;
use std::vec::Vec;

/// The maximum number of compression pointers followed for a single name.
pub const MAX_COMPRESSION_HOPS: usize = 32;

//------------ Name ----------------------------------------------------------

/// An absolute domain name.
///
/// The name is kept as a sequence of labels in wire format, each preceded
/// by its length, ending in the empty root label. The type guarantees that
/// no label is longer than 63 octets and that the whole name is at most
/// 255 octets long.
#[derive(Clone)]
pub struct Name(Bytes);

impl Name {
    /// The maximum length of a name in its wire format.
    pub const MAX_LEN: usize = 255;

    /// The maximum length of a single label.
    pub const MAX_LABEL_LEN: usize = 63;

    /// Returns the root name.
    pub fn root() -> Self {
        Name(Bytes::from_static(b"\0"))
    }

    /// Creates a name from an uncompressed wire format slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, NameError> {
        Self::check_slice(slice)?;
        Ok(Name(Bytes::copy_from_slice(slice)))
    }

    /// Creates a name from a static wire format slice.
    ///
    /// The slice is not checked and must be a valid uncompressed name.
    pub(crate) fn from_static(slice: &'static [u8]) -> Self {
        debug_assert!(Self::check_slice(slice).is_ok());
        Name(Bytes::from_static(slice))
    }

    /// Creates a name from a sequence of labels.
    ///
    /// The root label is added at the end and must not be part of the
    /// sequence.
    pub fn from_labels<'a, I>(labels: I) -> Result<Self, NameError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut buf = Vec::new();
        for label in labels {
            if label.is_empty() {
                return Err(NameError::EmptyLabel);
            }
            if label.len() > Self::MAX_LABEL_LEN {
                return Err(NameError::LongLabel);
            }
            buf.push(label.len() as u8);
            buf.extend_from_slice(label);
        }
        buf.push(0);
        if buf.len() > Self::MAX_LEN {
            return Err(NameError::LongName);
        }
        Ok(Name(buf.into()))
    }

    fn check_slice(slice: &[u8]) -> Result<(), NameError> {
        if slice.len() > Self::MAX_LEN {
            return Err(NameError::LongName);
        }
        let mut pos = 0;
        loop {
            let len = match slice.get(pos) {
                Some(len) => usize::from(*len),
                None => return Err(NameError::ShortInput),
            };
            if len == 0 {
                if pos + 1 != slice.len() {
                    return Err(NameError::TrailingData);
                }
                return Ok(());
            }
            if len > Self::MAX_LABEL_LEN {
                return Err(NameError::BadLabel);
            }
            pos += len + 1;
        }
    }

    /// Returns the wire format of the name.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Returns the length of the wire format of the name.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Returns whether the leftmost label is the asterisk label.
    pub fn is_wildcard(&self) -> bool {
        self.first_label() == b"*"
    }

    /// Returns an iterator over the labels, excluding the root label.
    pub fn iter_labels(&self) -> NameLabels<'_> {
        NameLabels {
            slice: self.as_slice(),
        }
    }

    /// Returns the number of labels, not counting the root label.
    pub fn label_count(&self) -> usize {
        self.iter_labels().count()
    }

    /// Returns the leftmost label.
    ///
    /// For the root name, this is the empty root label.
    pub fn first_label(&self) -> &[u8] {
        let len = usize::from(self.0[0]);
        &self.0[1..1 + len]
    }

    /// Returns the name with the leftmost label removed.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let len = usize::from(self.0[0]);
        Some(Name(self.0.slice(len + 1..)))
    }

    /// Returns the name with the `n` leftmost labels removed.
    pub fn strip_labels(&self, n: usize) -> Option<Self> {
        let mut res = self.clone();
        for _ in 0..n {
            res = res.parent()?;
        }
        Some(res)
    }

    /// Returns whether `base` is this name or one of its ancestors.
    pub fn ends_with(&self, base: &Name) -> bool {
        let own = self.label_count();
        let other = base.label_count();
        if other > own {
            return false;
        }
        match self.strip_labels(own - other) {
            Some(suffix) => suffix == *base,
            None => false,
        }
    }

    /// Returns a new name with `label` added to the left.
    pub fn prepend(&self, label: &[u8]) -> Result<Self, NameError> {
        let mut labels: Vec<&[u8]> = vec![label];
        labels.extend(self.iter_labels());
        Self::from_labels(labels)
    }

    /// Returns the canonical, i.e., lowercase version of the name.
    pub fn to_canonical(&self) -> Self {
        Name(self.0.to_ascii_lowercase().into())
    }

    /// Compares two names in canonical DNS name order.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        let left: SmallVec<[&[u8]; 16]> = self.iter_labels().collect();
        let right: SmallVec<[&[u8]; 16]> = other.iter_labels().collect();
        for (l, r) in left.iter().rev().zip(right.iter().rev()) {
            let l = l.iter().map(u8::to_ascii_lowercase);
            let r = r.iter().map(u8::to_ascii_lowercase);
            match l.cmp(r) {
                Ordering::Equal => {}
                res => return res,
            }
        }
        left.len().cmp(&right.len())
    }

    /// Parses a possibly compressed name.
    ///
    /// Compression pointers have to point to an earlier position in the
    /// message than the pointer itself and at most
    /// [`MAX_COMPRESSION_HOPS`] of them are followed. This rejects
    /// pointer loops of any shape. Afterwards, the parser is positioned
    /// right after the name’s first pointer or its root label.
    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let msg = parser.octets_ref();
        let mut pos = parser.pos();
        let mut end = None;
        let mut hops = 0;
        let mut buf = Vec::with_capacity(64);
        loop {
            let ltype = *msg.get(pos).ok_or(ParseError::ShortInput)?;
            match ltype {
                0 => {
                    buf.push(0);
                    if end.is_none() {
                        end = Some(pos + 1);
                    }
                    break;
                }
                1..=0x3F => {
                    let len = usize::from(ltype);
                    let label = msg
                        .get(pos + 1..pos + 1 + len)
                        .ok_or(ParseError::ShortInput)?;
                    buf.push(ltype);
                    buf.extend_from_slice(label);
                    if buf.len() >= Self::MAX_LEN {
                        return Err(ParseError::form_error("long domain name"));
                    }
                    pos += len + 1;
                }
                0xC0..=0xFF => {
                    let low = *msg.get(pos + 1).ok_or(ParseError::ShortInput)?;
                    let target =
                        (usize::from(ltype & 0x3F) << 8) | usize::from(low);
                    if target >= pos {
                        return Err(ParseError::form_error(
                            "compression pointer not pointing backwards",
                        ));
                    }
                    hops += 1;
                    if hops > MAX_COMPRESSION_HOPS {
                        return Err(ParseError::form_error(
                            "too many compression pointers",
                        ));
                    }
                    if end.is_none() {
                        end = Some(pos + 2);
                    }
                    pos = target;
                }
                _ => {
                    return Err(ParseError::form_error("invalid label type"))
                }
            }
        }
        if let Some(end) = end {
            parser.seek(end)?;
        }
        Ok(Name(buf.into()))
    }
}

//--- PartialEq, Eq, Hash

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice().eq_ignore_ascii_case(other.as_slice())
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for ch in self.as_slice() {
            state.write_u8(ch.to_ascii_lowercase())
        }
    }
}

//--- PartialOrd and Ord

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical_cmp(other)
    }
}

//--- FromStr

impl FromStr for Name {
    type Err = NameError;

    /// Parses a name from its presentation format.
    ///
    /// The name is always treated as absolute, the final dot is optional.
    /// Within labels, `\.` and `\\` escape the dot and backslash and
    /// `\DDD` gives an octet by its decimal value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            return Ok(Name::root());
        }
        if s.is_empty() {
            return Err(NameError::EmptyLabel);
        }
        let mut labels: Vec<Vec<u8>> = Vec::new();
        let mut label = Vec::new();
        let mut chars = s.bytes();
        let mut last_was_dot = false;
        while let Some(ch) = chars.next() {
            last_was_dot = false;
            match ch {
                b'.' => {
                    if label.is_empty() {
                        return Err(NameError::EmptyLabel);
                    }
                    labels.push(core::mem::take(&mut label));
                    last_was_dot = true;
                }
                b'\\' => {
                    let first = chars.next().ok_or(NameError::BadEscape)?;
                    if first.is_ascii_digit() {
                        let mut value = u32::from(first - b'0');
                        for _ in 0..2 {
                            let digit =
                                chars.next().ok_or(NameError::BadEscape)?;
                            if !digit.is_ascii_digit() {
                                return Err(NameError::BadEscape);
                            }
                            value = value * 10 + u32::from(digit - b'0');
                        }
                        let value = u8::try_from(value)
                            .map_err(|_| NameError::BadEscape)?;
                        label.push(value);
                    } else {
                        label.push(first);
                    }
                }
                _ => label.push(ch),
            }
        }
        if !last_was_dot {
            labels.push(label);
        }
        Name::from_labels(labels.iter().map(Vec::as_slice))
    }
}

//--- Display and Debug

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.iter_labels() {
            for &ch in label {
                if ch == b'.' || ch == b'\\' {
                    write!(f, "\\{}", ch as char)?;
                } else if ch < 0x21 || ch > 0x7E {
                    write!(f, "\\{:03}", ch)?;
                } else {
                    write!(f, "{}", ch as char)?;
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

//--- Serialize and Deserialize

impl serde::Serialize for Name {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Name {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        struct InnerVisitor;

        impl<'de> serde::de::Visitor<'de> for InnerVisitor {
            type Value = Name;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a domain name")
            }

            fn visit_str<E: serde::de::Error>(
                self,
                v: &str,
            ) -> Result<Self::Value, E> {
                Name::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(InnerVisitor)
    }
}

//------------ NameLabels ----------------------------------------------------

/// An iterator over the non-root labels of a name.
#[derive(Clone, Debug)]
pub struct NameLabels<'a> {
    slice: &'a [u8],
}

impl<'a> Iterator for NameLabels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = usize::from(*self.slice.first()?);
        if len == 0 {
            return None;
        }
        let label = &self.slice[1..1 + len];
        self.slice = &self.slice[1 + len..];
        Some(label)
    }
}

//============ Error Types ===================================================

//------------ NameError -----------------------------------------------------

/// A domain name could not be constructed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NameError {
    /// A label was longer than 63 octets.
    LongLabel,

    /// The name was longer than 255 octets.
    LongName,

    /// An empty label appeared before the end of the name.
    EmptyLabel,

    /// An illegal escape sequence in the presentation format.
    BadEscape,

    /// An unknown label type in the wire format.
    BadLabel,

    /// The wire format ended before the root label.
    ShortInput,

    /// There was data after the root label.
    TrailingData,
}

//--- Display and Error

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            NameError::LongLabel => "label exceeds 63 octets",
            NameError::LongName => "name exceeds 255 octets",
            NameError::EmptyLabel => "empty label",
            NameError::BadEscape => "illegal escape sequence",
            NameError::BadLabel => "illegal label type",
            NameError::ShortInput => "unexpected end of input",
            NameError::TrailingData => "trailing data",
        })
    }
}

impl std::error::Error for NameError {}

//============ Testing =======================================================
