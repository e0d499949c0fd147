//! Compiles array descriptors and format controls into subfield specifications.
//!
//! The array descriptor is a `!` separated list of tags describing the data field.
//! If it begins with a `*` the tag list is repeated to fill the field.
//! The format controls describe the encoding of each tag, e.g. descriptor `AGEN!FIDN!FIDS`
//! with format `(b12,b14,b12)` is three binary encoded unsigned integers of 2, 4 and 2 bytes.
//! In a binary code the first digit is the type (1 unsigned, 2 signed) and the second the
//! number of bytes. A leading count repeats a code, so `*YCOO!XCOO` with `(2b24)` is a pair
//! of signed 32 bit integers, repeated as often as the field has room for.
use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubfieldKind {
    UnsignedInt8,
    UnsignedInt16,
    UnsignedInt32,
    SignedInt8,
    SignedInt16,
    SignedInt32,
    /// Fixed width if the spec has a width, unit terminated otherwise.
    String,
    /// Fixed width if the spec has a width, unit terminated otherwise.
    Bytes,
}
impl fmt::Display for SubfieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnsignedInt8 => "u8",
            Self::UnsignedInt16 => "u16",
            Self::UnsignedInt32 => "u32",
            Self::SignedInt8 => "i8",
            Self::SignedInt16 => "i16",
            Self::SignedInt32 => "i32",
            Self::String => "string",
            Self::Bytes => "bytes",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubfieldSpec {
    pub kind: SubfieldKind,
    /// Width in bytes. 0 means the value runs up to the next unit terminator.
    pub width: usize,
    pub tag: String,
}
impl SubfieldSpec {
    pub fn is_delimited(&self) -> bool {
        self.width == 0
    }
}
impl fmt::Display for SubfieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_delimited() {
            write!(f, "{}:{}", self.tag, self.kind)
        } else {
            write!(f, "{}:{}({})", self.tag, self.kind, self.width)
        }
    }
}

/// The subfield tags named by `array_descriptor`, without the leading repeat marker.
pub fn subfield_tags(array_descriptor: &str) -> Vec<&str> {
    array_descriptor
        .strip_prefix('*')
        .unwrap_or(array_descriptor)
        .split('!')
        .collect()
}

/// Compile a field's array descriptor and format controls into one spec per subfield.
///
/// Format controls without content (e.g. `()`) compile to no specs at all.
pub fn compile(array_descriptor: &str, format_controls: &str) -> Result<Vec<SubfieldSpec>> {
    if format_controls.len() <= 2 {
        return Ok(Vec::new());
    }
    let tags = subfield_tags(array_descriptor);
    let items = FormatParser::new(format_controls).parse()?;
    let mut codes = Vec::with_capacity(tags.len());
    expand(&items, tags.len(), &mut codes).map_err(|_| {
        MalformedFormatSnafu {
            description: format!(
                "'{format_controls}' describes more subfields than the {} tags in '{array_descriptor}'",
                tags.len()
            ),
        }
        .build()
    })?;
    if codes.len() < tags.len() {
        log::debug!(
            "'{format_controls}' only describes {} of the tags in '{array_descriptor}'",
            codes.len()
        );
    }
    codes
        .into_iter()
        .zip(tags)
        .map(|((code, width), tag)| code.to_spec(width, tag))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FormatCode {
    Letter(char),
    /// `b` followed by a type digit and a width digit.
    Binary { type_code: u8, width: u8 },
}
impl FormatCode {
    fn to_spec(self, width: Option<usize>, tag: &str) -> Result<SubfieldSpec> {
        let (kind, width) = match self {
            Self::Letter('A' | 'I' | 'R' | 'S' | 'C') => (SubfieldKind::String, width.unwrap_or(0)),
            Self::Letter('B') => {
                let bits = width.unwrap_or(0);
                Iso8211Error::assert_format(
                    || bits % 8 == 0,
                    || format!("Bit string width {bits} of {tag} is not a whole number of bytes"),
                )?;
                (SubfieldKind::Bytes, bits / 8)
            }
            Self::Binary {
                type_code: 1,
                width: 1,
            } => (SubfieldKind::UnsignedInt8, 1),
            Self::Binary {
                type_code: 1,
                width: 2,
            } => (SubfieldKind::UnsignedInt16, 2),
            Self::Binary {
                type_code: 1,
                width: 4,
            } => (SubfieldKind::UnsignedInt32, 4),
            Self::Binary {
                type_code: 2,
                width: 1,
            } => (SubfieldKind::SignedInt8, 1),
            Self::Binary {
                type_code: 2,
                width: 2,
            } => (SubfieldKind::SignedInt16, 2),
            Self::Binary {
                type_code: 2,
                width: 4,
            } => (SubfieldKind::SignedInt32, 4),
            Self::Binary { type_code, width } => {
                return MalformedFormatSnafu {
                    description: format!("Unsupported binary format b{type_code}{width} for {tag}"),
                }
                .fail();
            }
            Self::Letter(c) => {
                return MalformedFormatSnafu {
                    description: format!("Unsupported format '{c}' for {tag}"),
                }
                .fail();
            }
        };
        Ok(SubfieldSpec {
            kind,
            width,
            tag: tag.to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum FormatItem {
    Code {
        repeat: usize,
        code: FormatCode,
        width: Option<usize>,
    },
    Group {
        repeat: usize,
        items: Vec<FormatItem>,
    },
}

/// Flatten `items` into one entry per subfield, failing once more than `limit` are produced.
fn expand(
    items: &[FormatItem],
    limit: usize,
    out: &mut Vec<(FormatCode, Option<usize>)>,
) -> std::result::Result<(), ()> {
    for item in items {
        match item {
            FormatItem::Code {
                repeat,
                code,
                width,
            } => {
                for _ in 0..*repeat {
                    if out.len() == limit {
                        return Err(());
                    }
                    out.push((*code, *width));
                }
            }
            FormatItem::Group { repeat, items } => {
                for _ in 0..*repeat {
                    let before = out.len();
                    expand(items, limit, out)?;
                    if out.len() == before {
                        // Every further repetition would add nothing either.
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Recursive descent over the format controls grammar:
///
/// ```text
/// list  := item (',' item)*
/// item  := count? ( '(' list ')' | 'b' digit digit | letter ('(' count ')')? )
/// count := digit+
/// ```
struct FormatParser<'a> {
    input: &'a str,
    pos: usize,
}
impl<'a> FormatParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<Vec<FormatItem>> {
        self.parse_list(false)
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn error<T>(&self, problem: &str) -> Result<T> {
        MalformedFormatSnafu {
            description: format!("{problem} at position {} of '{}'", self.pos, self.input),
        }
        .fail()
    }

    fn parse_list(&mut self, nested: bool) -> Result<Vec<FormatItem>> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None if nested => return self.error("Unbalanced '('"),
                None => return Ok(items),
                Some(b',' | b' ') => self.pos += 1,
                Some(b')') if nested => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(b')') => return self.error("Unbalanced ')'"),
                Some(_) => {
                    let item = self.parse_item()?;
                    items.push(item);
                }
            }
        }
    }

    fn parse_item(&mut self) -> Result<FormatItem> {
        let repeat = self.parse_count()?.unwrap_or(1);
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let items = self.parse_list(true)?;
                if items.is_empty() {
                    return self.error("Empty group");
                }
                Ok(FormatItem::Group { repeat, items })
            }
            Some(b'b') => {
                self.pos += 1;
                let (Some(type_code), Some(width)) = (self.parse_digit(), self.parse_digit()) else {
                    return self.error("Expected two digits after 'b'");
                };
                Ok(FormatItem::Code {
                    repeat,
                    code: FormatCode::Binary { type_code, width },
                    width: None,
                })
            }
            Some(c) if c.is_ascii_alphabetic() => {
                self.pos += 1;
                let width = if self.peek() == Some(b'(') {
                    self.pos += 1;
                    let Some(width) = self.parse_count()? else {
                        return self.error("Expected a width");
                    };
                    if self.peek() != Some(b')') {
                        return self.error("Expected ')' after the width");
                    }
                    self.pos += 1;
                    Some(width)
                } else {
                    None
                };
                Ok(FormatItem::Code {
                    repeat,
                    code: FormatCode::Letter(char::from(c)),
                    width,
                })
            }
            Some(c) => self.error(&format!("Unexpected '{}'", char::from(c))),
            None => self.error("Expected a format after the repeat count"),
        }
    }

    fn parse_digit(&mut self) -> Option<u8> {
        let digit = self.peek().filter(u8::is_ascii_digit)?;
        self.pos += 1;
        Some(digit - b'0')
    }

    /// `None` if there are no digits at the current position.
    fn parse_count(&mut self) -> Result<Option<usize>> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits = &self.input[start..self.pos];
        if digits.is_empty() {
            return Ok(None);
        }
        match digits.parse() {
            Ok(count) => Ok(Some(count)),
            Err(_) => self.error(&format!("Count {digits} is too large")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: SubfieldKind, width: usize, tag: &str) -> SubfieldSpec {
        SubfieldSpec {
            kind,
            width,
            tag: tag.to_string(),
        }
    }

    #[test]
    fn single_delimited_string() {
        let specs = compile("", "(A)").unwrap();
        assert_eq!(vec![spec(SubfieldKind::String, 0, "")], specs);
        assert!(specs[0].is_delimited());

        let specs = compile("OBJN", "(A)").unwrap();
        assert_eq!(vec![spec(SubfieldKind::String, 0, "OBJN")], specs);
    }

    #[test]
    fn record_identifier_format() {
        let specs = compile("AGEN!FIDN!FIDS", "(b12,b14,b12)").unwrap();
        assert_eq!(
            vec![
                spec(SubfieldKind::UnsignedInt16, 2, "AGEN"),
                spec(SubfieldKind::UnsignedInt32, 4, "FIDN"),
                spec(SubfieldKind::UnsignedInt16, 2, "FIDS"),
            ],
            specs
        );
    }

    #[test]
    fn repeated_coordinates() {
        let specs = compile("*YCOO!XCOO", "(2b24)").unwrap();
        assert_eq!(
            vec![
                spec(SubfieldKind::SignedInt32, 4, "YCOO"),
                spec(SubfieldKind::SignedInt32, 4, "XCOO"),
            ],
            specs
        );
    }

    #[test]
    fn mixed_formats() {
        let specs = compile("A!B!C!D!E", "(b11,2b24,A(3),B(40))").unwrap();
        assert_eq!(
            vec![
                spec(SubfieldKind::UnsignedInt8, 1, "A"),
                spec(SubfieldKind::SignedInt32, 4, "B"),
                spec(SubfieldKind::SignedInt32, 4, "C"),
                spec(SubfieldKind::String, 3, "D"),
                spec(SubfieldKind::Bytes, 5, "E"),
            ],
            specs
        );
    }

    #[test]
    fn signed_and_numeric_text_formats() {
        let specs = compile("A!B!C!D!E", "(b21,b22,R(4),I(10),I)").unwrap();
        assert_eq!(
            vec![
                spec(SubfieldKind::SignedInt8, 1, "A"),
                spec(SubfieldKind::SignedInt16, 2, "B"),
                spec(SubfieldKind::String, 4, "C"),
                spec(SubfieldKind::String, 10, "D"),
                spec(SubfieldKind::String, 0, "E"),
            ],
            specs
        );
    }

    #[test]
    fn nested_repeat_groups() {
        let specs = compile("MODN!RCID!A!B!C!D", "(A(2),I(10),2(b12,A))").unwrap();
        let kinds: Vec<SubfieldKind> = specs.iter().map(|s| s.kind).collect();
        assert_eq!(
            vec![
                SubfieldKind::String,
                SubfieldKind::String,
                SubfieldKind::UnsignedInt16,
                SubfieldKind::String,
                SubfieldKind::UnsignedInt16,
                SubfieldKind::String,
            ],
            kinds
        );
        assert_eq!("D", specs[5].tag);
    }

    #[test]
    fn empty_format_controls() {
        assert!(compile("", "").unwrap().is_empty());
        assert!(compile("A!B", "()").unwrap().is_empty());
    }

    #[test]
    fn more_subfields_than_tags() {
        let err = compile("AGEN!FIDN", "(b12,b14,b12)").unwrap_err();
        assert_eq!(ErrorKind::MalformedFormat, err.kind());
        let err = compile("YCOO", "(99999999b24)").unwrap_err();
        assert_eq!(ErrorKind::MalformedFormat, err.kind());
    }

    #[test]
    fn unsupported_formats() {
        for format in ["(b48)", "(X)", "(B(12))", "(A(3)", "(A))", "(b1)", "(#)"] {
            let err = compile("A", format).unwrap_err();
            assert_eq!(ErrorKind::MalformedFormat, err.kind(), "{format}");
        }
    }

    #[test]
    fn oversized_counts() {
        let err = compile("A!B", "(99999999999999999999999b12)").unwrap_err();
        assert_eq!(ErrorKind::MalformedFormat, err.kind());
        let err = compile("A", "(A(99999999999999999999999))").unwrap_err();
        assert_eq!(ErrorKind::MalformedFormat, err.kind());
    }

    #[test]
    fn empty_groups() {
        for format in ["(2(3()))", "(b12,())", "(2000(2000(2000())))"] {
            let err = compile("A!B", format).unwrap_err();
            assert_eq!(ErrorKind::MalformedFormat, err.kind(), "{format}");
        }
    }

    #[test]
    fn groups_without_codes_stop_repeating() {
        let specs = compile("A", "(99999(99999(99999(0b12))))").unwrap();
        assert!(specs.is_empty());
        let specs = compile("A!B", "(99999(99999(0b12)),b12)").unwrap();
        assert_eq!(vec![spec(SubfieldKind::UnsignedInt16, 2, "A")], specs);
    }

    #[test]
    fn compilation_is_idempotent() {
        let first = compile("*ATTL!ATVL", "(b12,A)").unwrap();
        let second = compile("*ATTL!ATVL", "(b12,A)").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tags_without_repeat_marker() {
        assert_eq!(vec!["YCOO", "XCOO"], subfield_tags("*YCOO!XCOO"));
        assert_eq!(vec![""], subfield_tags(""));
    }
}
