//! Creating and consuming data in wire format.
//!
//! Parsing happens through [`Parser`], the octets parser of the `octseq`
//! crate, positioned over a complete message. Since compressed domain names
//! refer back into the message, a parser always carries the whole message
//! even when it is limited to the record data of a single record.
//!
//! Composing happens through [`Composer`], a growable buffer that optionally
//! remembers where domain names were placed so that later names can be
//! compressed.

use super::name::Name;
use core::fmt;
use octseq::parse::ShortInput;
use std::collections::HashMap;
use std::vec::Vec;

/// The parser used for all wire format data.
pub type Parser<'a> = octseq::parse::Parser<'a, [u8]>;

/// The highest message position a compression pointer can refer to.
const MAX_POINTER_TARGET: usize = 0x3FFF;

//------------ Parse and Compose ---------------------------------------------

/// A type that can be parsed from wire format.
pub trait Parse: Sized {
    /// Parses a value from the beginning of the parser.
    fn parse(parser: &mut Parser) -> Result<Self, ParseError>;
}

impl Parse for u8 {
    fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        parser.parse_u8().map_err(Into::into)
    }
}

impl Parse for u16 {
    fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        parser.parse_u16_be().map_err(Into::into)
    }
}

impl Parse for u32 {
    fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        parser.parse_u32_be().map_err(Into::into)
    }
}

/// A type that can be composed into wire format.
pub trait Compose {
    /// The length of the composed value if it is fixed.
    const COMPOSE_LEN: u16 = 0;

    /// Appends the wire format of the value to the composer.
    fn compose(&self, target: &mut Composer) -> Result<(), ComposeError>;
}

impl Compose for u8 {
    const COMPOSE_LEN: u16 = 1;

    fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        target.append_slice(&[*self])
    }
}

impl Compose for u16 {
    const COMPOSE_LEN: u16 = 2;

    fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        target.append_slice(&self.to_be_bytes())
    }
}

impl Compose for u32 {
    const COMPOSE_LEN: u16 = 4;

    fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        target.append_slice(&self.to_be_bytes())
    }
}

/// Takes `len` octets from the parser.
pub fn parse_slice<'a>(
    parser: &mut Parser<'a>,
    len: usize,
) -> Result<&'a [u8], ParseError> {
    let start = parser.pos();
    parser.advance(len)?;
    Ok(&parser.octets_ref()[start..start + len])
}

/// Takes all remaining octets from the parser.
pub fn parse_remaining<'a>(
    parser: &mut Parser<'a>,
) -> Result<&'a [u8], ParseError> {
    let len = parser.remaining();
    parse_slice(parser, len)
}

/// Parses a value from a sub-parser of exactly `len` octets.
///
/// The closure must consume all of the sub-parser’s data. Left-over data
/// results in a form error.
pub fn parse_exact<'a, T, F>(
    parser: &mut Parser<'a>,
    len: usize,
    op: F,
) -> Result<T, ParseError>
where
    F: FnOnce(&mut Parser<'a>) -> Result<T, ParseError>,
{
    let mut sub = parser.parse_parser(len)?;
    let res = op(&mut sub)?;
    if sub.remaining() != 0 {
        return Err(ParseError::form_error("trailing data"));
    }
    Ok(res)
}

//------------ Composer ------------------------------------------------------

/// A buffer for assembling wire format data.
///
/// If created via [`with_compression`][Self::with_compression], domain
/// names added via [`append_compressed_name`][Self::append_compressed_name]
/// are compressed against all names added this way earlier.
#[derive(Clone, Debug, Default)]
pub struct Composer {
    target: Vec<u8>,
    names: Option<HashMap<Name, u16>>,
}

impl Composer {
    /// Creates a new composer that never compresses names.
    pub fn new() -> Self {
        Composer {
            target: Vec::new(),
            names: None,
        }
    }

    /// Creates a new composer that compresses names.
    pub fn with_compression() -> Self {
        Composer {
            target: Vec::new(),
            names: Some(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.target.as_slice()
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        self.target.as_mut_slice()
    }

    pub fn finish(self) -> Vec<u8> {
        self.target
    }

    /// Shortens the composed data to `len` octets.
    ///
    /// Compression targets beyond the new end are forgotten.
    pub fn truncate(&mut self, len: usize) {
        self.target.truncate(len);
        if let Some(names) = self.names.as_mut() {
            names.retain(|_, pos| usize::from(*pos) < len);
        }
    }

    pub fn append_slice(&mut self, slice: &[u8]) -> Result<(), ComposeError> {
        self.target.extend_from_slice(slice);
        Ok(())
    }

    /// Appends a name without compressing it.
    pub fn append_name(&mut self, name: &Name) -> Result<(), ComposeError> {
        self.append_slice(name.as_slice())
    }

    /// Appends the canonical, i.e., lowercased form of a name.
    pub fn append_canonical_name(
        &mut self,
        name: &Name,
    ) -> Result<(), ComposeError> {
        self.target
            .extend(name.as_slice().iter().map(u8::to_ascii_lowercase));
        Ok(())
    }

    /// Appends a name, compressing it if possible.
    ///
    /// The longest suffix of the name already present is replaced by a
    /// pointer. All new suffixes are remembered as compression targets if
    /// they can still be reached by a pointer.
    pub fn append_compressed_name(
        &mut self,
        name: &Name,
    ) -> Result<(), ComposeError> {
        let names = match self.names.as_mut() {
            Some(names) => names,
            None => {
                self.target.extend_from_slice(name.as_slice());
                return Ok(());
            }
        };
        let mut suffix = name.clone();
        loop {
            if suffix.is_root() {
                self.target.push(0);
                return Ok(());
            }
            if let Some(pos) = names.get(&suffix) {
                self.target.extend_from_slice(&(pos | 0xC000).to_be_bytes());
                return Ok(());
            }
            let pos = self.target.len();
            if pos <= MAX_POINTER_TARGET {
                names.insert(suffix.clone(), pos as u16);
            }
            let label = suffix.first_label();
            self.target.push(label.len() as u8);
            self.target.extend_from_slice(label);
            suffix = match suffix.parent() {
                Some(parent) => parent,
                None => return Ok(()),
            };
        }
    }

    /// Appends data preceded by its length as a 16 bit integer.
    ///
    /// This is used for record data. If the data produced by `op` is
    /// longer than 65,535 octets, a [`ComposeError::LongData`] is
    /// returned.
    pub fn length_prefixed<F>(&mut self, op: F) -> Result<(), ComposeError>
    where
        F: FnOnce(&mut Self) -> Result<(), ComposeError>,
    {
        let start = self.target.len();
        self.target.extend_from_slice(&[0, 0]);
        op(self)?;
        let len = u16::try_from(self.target.len() - start - 2)
            .map_err(|_| ComposeError::LongData)?;
        self.target[start..start + 2].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

//============ Error Types ===================================================

//------------ ComposeError --------------------------------------------------

/// An error happened while composing data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComposeError {
    /// A value is too long for the length field it is preceded by.
    LongData,

    /// The data does not fit into the space available.
    ShortBuf,
}

//--- Display and Error

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ComposeError::LongData => f.write_str("long data"),
            ComposeError::ShortBuf => f.write_str("short buffer"),
        }
    }
}

impl std::error::Error for ComposeError {}

//------------ ParseError ----------------------------------------------------

/// An error happened while parsing data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// An attempt was made to go beyond the end of the parser.
    ShortInput,

    /// A formatting error occurred.
    Form(FormError),
}

impl ParseError {
    /// Creates a new parse error as a form error with the given message.
    pub fn form_error(msg: &'static str) -> Self {
        FormError::new(msg).into()
    }
}

//--- From

impl From<ShortInput> for ParseError {
    fn from(_: ShortInput) -> Self {
        ParseError::ShortInput
    }
}

impl From<FormError> for ParseError {
    fn from(err: FormError) -> Self {
        ParseError::Form(err)
    }
}

//--- Display and Error

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseError::ShortInput => f.write_str("unexpected end of input"),
            ParseError::Form(ref err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ParseError {}

//------------ FormError -----------------------------------------------------

/// A formatting error occured.
///
/// This is a generic error for all kinds of error cases that result in data
/// not being accepted. For diagnostics, the error is being given a static
/// string describing the error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormError(&'static str);

impl FormError {
    /// Creates a new form error value with the given diagnostics string.
    pub fn new(msg: &'static str) -> Self {
        FormError(msg)
    }
}

//--- Display and Error

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for FormError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn length_prefixed() {
        let mut target = Composer::new();
        target
            .length_prefixed(|target| target.append_slice(b"abc"))
            .unwrap();
        assert_eq!(target.as_slice(), b"\x00\x03abc");

        let mut target = Composer::new();
        assert_eq!(
            target.length_prefixed(|target| {
                target.append_slice(&[0u8; 0x1_0000])
            }),
            Err(ComposeError::LongData)
        );
    }

    #[test]
    fn compress_shared_suffix() {
        let mut target = Composer::with_compression();
        target
            .append_compressed_name(&Name::from_str("www.example.com").unwrap())
            .unwrap();
        target
            .append_compressed_name(&Name::from_str("mail.example.com").unwrap())
            .unwrap();
        assert_eq!(
            target.as_slice(),
            b"\x03www\x07example\x03com\x00\x04mail\xc0\x04"
        );
    }

    #[test]
    fn truncate_forgets_targets() {
        let mut target = Composer::with_compression();
        target.append_slice(b"ab").unwrap();
        target
            .append_compressed_name(&Name::from_str("example.com").unwrap())
            .unwrap();
        target.truncate(2);
        target
            .append_compressed_name(&Name::from_str("example.com").unwrap())
            .unwrap();
        assert_eq!(target.as_slice(), b"ab\x07example\x03com\x00");
    }

    #[test]
    fn parse_exact_trailing() {
        let data = b"\x00\x01\x02";
        let mut parser = Parser::from_ref(data.as_ref());
        assert_eq!(
            parse_exact(&mut parser, 3, |parser| u16::parse(parser)),
            Err(ParseError::form_error("trailing data"))
        );
        let mut parser = Parser::from_ref(data.as_ref());
        assert_eq!(
            parse_exact(&mut parser, 2, |parser| u16::parse(parser)),
            Ok(1)
        );
        assert_eq!(parser.remaining(), 1);
    }
}
