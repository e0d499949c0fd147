//! Decoder for ISO 8211 record files, as profiled by IHO S-57 for electronic navigational charts.
//!
//! An ISO 8211 file is a lead record (leader `'L'`) describing every field type, followed by any
//! number of data records (leader `'D'`). The layout of each data field is not known statically.
//! It is compiled at runtime from the array descriptor and format controls stored in the lead record.
//!
//! ```no_run
//! use iso8211::Iso8211Reader;
//!
//! let mut reader = Iso8211Reader::open("US5MD12M.000")?;
//! while let Some(record) = reader.next_record()? {
//!     for field in record.fields.iter() {
//!         println!("{}: {:?}", field.tag, field.subfields);
//!     }
//! }
//! # Ok::<(), iso8211::Iso8211Error>(())
//! ```
use snafu::{prelude::*, Backtrace};
use std::{fmt, io::prelude::*};

pub mod config;
pub mod data_record;
pub mod field_tree;
pub mod format;
pub mod lead_record;
pub mod leader;
pub mod reader;
pub mod subfield;

pub use config::{NumberParsing, ReaderConfig};
pub use data_record::{DataRecord, Field};
pub use field_tree::FieldTree;
pub use format::{SubfieldKind, SubfieldSpec};
pub use lead_record::{DataStructureCode, DataTypeCode, FieldControls, FieldType, LeadRecord};
pub use leader::{DirectoryEntry, Leader, RecordHeader};
pub use reader::Iso8211Reader;
pub use subfield::SubfieldValue;

/// Number of bytes in the fixed leader of every record.
pub const LEADER_SIZE: usize = 24;

/// Terminates a variable-length subfield.
pub const UNIT_TERMINATOR: u8 = 0x1F;
/// Terminates a field and the directory.
pub const FIELD_TERMINATOR: u8 = 0x1E;

const SPACE: u8 = b' ';

/// The character set a field's string subfields are encoded in.
///
/// Selected by the truncated escape sequence in the field controls of each field type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LexicalLevel {
    /// Corresponds to ASCII
    #[default]
    Level0,
    /// Corresponds to Latin 1 - ISO 8859
    Level1,
    /// Corresponds to UTF-16 (little endian)
    Level2,
}
impl LexicalLevel {
    pub fn for_escape_sequence(input: [u8; 3]) -> Option<Self> {
        match &input {
            b"   " => Some(Self::Level0),
            b"-A " => Some(Self::Level1),
            b"%/A" => Some(Self::Level2),
            _ => None,
        }
    }

    pub fn unit_terminator(&self) -> &'static [u8] {
        match self {
            Self::Level0 | Self::Level1 => &[UNIT_TERMINATOR],
            Self::Level2 => &[UNIT_TERMINATOR, 0x00],
        }
    }

    pub fn field_terminator(&self) -> &'static [u8] {
        match self {
            Self::Level0 | Self::Level1 => &[FIELD_TERMINATOR],
            Self::Level2 => &[FIELD_TERMINATOR, 0x00],
        }
    }
}

/// Everything the subfield decoder needs to know about the field it is working on.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DecodingContext<'a> {
    pub(crate) tag: &'a str,
    pub(crate) lexical_level: LexicalLevel,
}
impl<'a> DecodingContext<'a> {
    pub(crate) fn new(tag: &'a str) -> Self {
        Self {
            tag,
            lexical_level: LexicalLevel::Level0,
        }
    }

    pub(crate) fn with_lexical_level(self, lexical_level: LexicalLevel) -> Self {
        Self {
            lexical_level,
            ..self
        }
    }

    pub(crate) fn bytes_to_string(&self, bytes: &[u8]) -> Result<String> {
        match self.lexical_level {
            LexicalLevel::Level0 => std::str::from_utf8(bytes)
                .map(str::to_string)
                .context(Utf8Snafu)
                .context(StringConversionSnafu { tag: self.tag }),
            LexicalLevel::Level1 => {
                let (cow, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
                if had_errors {
                    return Latin1Snafu {
                        bytes: bytes.to_vec(),
                    }
                    .fail()
                    .context(StringConversionSnafu { tag: self.tag });
                }
                Ok(cow.into_owned())
            }
            LexicalLevel::Level2 => {
                if bytes.len() % 2 != 0 {
                    return OddUtf16LengthSnafu { len: bytes.len() }
                        .fail()
                        .context(StringConversionSnafu { tag: self.tag });
                }
                let two_byte_buffer: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
                    .collect();
                String::from_utf16(&two_byte_buffer)
                    .context(FromUtf16Snafu)
                    .context(StringConversionSnafu { tag: self.tag })
            }
        }
    }
}

/// Directory and lead record strings are always level 0.
pub(crate) fn ascii_string(tag: &str, bytes: &[u8]) -> Result<String> {
    DecodingContext::new(tag).bytes_to_string(bytes)
}

pub type Result<T> = std::result::Result<T, Iso8211Error>;

#[derive(Debug, Snafu)]
pub enum Iso8211Error {
    #[snafu(display("Malformed record leader: {description}"))]
    MalformedLeader {
        description: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Expected a record with leader identifier '{expected}' but found '{found}'"))]
    WrongRecordKind {
        expected: char,
        found: char,
        backtrace: Backtrace,
    },
    #[snafu(display("Malformed record directory: {description}"))]
    MalformedDirectory {
        description: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Malformed format controls: {description}"))]
    MalformedFormat {
        description: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Field {tag} is truncated: {description}"))]
    TruncatedField {
        tag: String,
        description: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Error converting bytes of field {tag} into a string: {source}"))]
    StringConversion {
        tag: String,
        source: StringConversionError,
        backtrace: Backtrace,
    },
    #[snafu(display("Error reading bytes: {source}"))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}
impl Iso8211Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedLeader { .. } => ErrorKind::MalformedLeader,
            Self::WrongRecordKind { .. } => ErrorKind::WrongRecordKind,
            Self::MalformedDirectory { .. } => ErrorKind::MalformedDirectory,
            Self::MalformedFormat { .. } => ErrorKind::MalformedFormat,
            Self::TruncatedField { .. } => ErrorKind::TruncatedField,
            Self::StringConversion { .. } => ErrorKind::StringConversion,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    fn assert_format(
        invariant_satisfied: impl FnOnce() -> bool,
        error_msg: impl FnOnce() -> String,
    ) -> Result<()> {
        if invariant_satisfied() {
            Ok(())
        } else {
            MalformedFormatSnafu {
                description: error_msg(),
            }
            .fail()
        }
    }
}

/// The category of an [[Iso8211Error]], for callers that only need to branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedLeader,
    WrongRecordKind,
    MalformedDirectory,
    MalformedFormat,
    TruncatedField,
    StringConversion,
    Io,
}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Snafu)]
pub enum StringConversionError {
    Utf8 { source: std::str::Utf8Error },
    FromUtf16 { source: std::string::FromUtf16Error },
    #[snafu(display("Invalid WINDOWS_1252 string: {bytes:?}"))]
    Latin1 { bytes: Vec<u8> },
    #[snafu(display("UTF-16 string of odd length {len}"))]
    OddUtf16Length { len: usize },
}

impl From<std::io::Error> for Iso8211Error {
    fn from(source: std::io::Error) -> Self {
        Iso8211Error::Io {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

trait AsciiSliceExt {
    /// Parse a fixed-width decimal number.
    ///
    /// All-space input reads as 0. Anything else that is not a number reads as 0 under
    /// [[NumberParsing::Lenient]] and is returned as an error description otherwise.
    fn parse_number(&self, what: &str, mode: NumberParsing) -> std::result::Result<usize, String>;

    /// Same as [[parse_number]] but treat the space character as `None`.
    fn parse_digit_option(
        &self,
        what: &str,
        mode: NumberParsing,
    ) -> std::result::Result<Option<u8>, String>;

    fn take_chars<const NUM: usize>(&self, offset: usize) -> [char; NUM];

    fn read_char(&self, pos: usize) -> char;
}

impl AsciiSliceExt for [u8] {
    fn parse_number(&self, what: &str, mode: NumberParsing) -> std::result::Result<usize, String> {
        if self.iter().all(|c| *c == SPACE) {
            return Ok(0);
        }
        let parsed = std::str::from_utf8(self)
            .ok()
            .map(|number_str| number_str.trim_matches(' '))
            .filter(|digits| digits.bytes().all(|c| c.is_ascii_digit()))
            .and_then(|digits| digits.parse::<usize>().ok());
        match (parsed, mode) {
            (Some(number), _) => Ok(number),
            (None, NumberParsing::Lenient) => {
                log::warn!(
                    "Could not parse {what} from {:?}, reading it as 0.",
                    String::from_utf8_lossy(self)
                );
                Ok(0)
            }
            (None, NumberParsing::Strict) => Err(format!(
                "Number parsing issue for {what} in '{}'",
                String::from_utf8_lossy(self)
            )),
        }
    }

    fn parse_digit_option(
        &self,
        what: &str,
        mode: NumberParsing,
    ) -> std::result::Result<Option<u8>, String> {
        if self.iter().all(|c| *c == SPACE) {
            return Ok(None);
        }
        self.parse_number(what, mode).map(|n| Some(n as u8))
    }

    fn take_chars<const NUM: usize>(&self, offset: usize) -> [char; NUM] {
        let mut chars = [' '; NUM];
        for (c, b) in chars.iter_mut().zip(self[offset..].iter()) {
            *c = char::from(*b);
        }
        chars
    }

    fn read_char(&self, pos: usize) -> char {
        char::from(self[pos])
    }
}

trait ReadFullyExt {
    /// Like `read_exact`, but reports how many bytes were available instead of failing
    /// on a short read, so callers can tell a clean end of stream from a truncated one.
    fn read_fully(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Consume and drop `num_bytes`, returning how many were actually available.
    fn skip_bytes(&mut self, num_bytes: u64) -> Result<u64>;
}

impl<R: Read + ?Sized> ReadFullyExt for R {
    fn read_fully(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buffer.len() {
            match self.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context(IoSnafu),
            }
        }
        Ok(filled)
    }

    fn skip_bytes(&mut self, num_bytes: u64) -> Result<u64> {
        let mut limited = Read::take(self, num_bytes);
        std::io::copy(&mut limited, &mut std::io::sink()).context(IoSnafu)
    }
}
