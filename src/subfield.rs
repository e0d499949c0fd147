use super::*;
use byteorder::{ReadBytesExt, LE};
use bytes::Buf;

/// A single decoded subfield.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubfieldValue {
    UnsignedInt8(u8),
    UnsignedInt16(u16),
    UnsignedInt32(u32),
    SignedInt8(i8),
    SignedInt16(i16),
    SignedInt32(i32),
    String(String),
    /// Bit strings, and the whole payload of fields without a format.
    Bytes(Vec<u8>),
}
impl SubfieldValue {
    /// The value of any integer subfield, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::UnsignedInt8(v) => Some(v.into()),
            Self::UnsignedInt16(v) => Some(v.into()),
            Self::UnsignedInt32(v) => Some(v.into()),
            Self::SignedInt8(v) => Some(v.into()),
            Self::SignedInt16(v) => Some(v.into()),
            Self::SignedInt32(v) => Some(v.into()),
            Self::String(_) | Self::Bytes(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}
impl fmt::Display for SubfieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "{b:02x?}"),
            Self::UnsignedInt8(v) => write!(f, "{v}"),
            Self::UnsignedInt16(v) => write!(f, "{v}"),
            Self::UnsignedInt32(v) => write!(f, "{v}"),
            Self::SignedInt8(v) => write!(f, "{v}"),
            Self::SignedInt16(v) => write!(f, "{v}"),
            Self::SignedInt32(v) => write!(f, "{v}"),
        }
    }
}

/// Decode `data` by applying `specs` over and over until the data is used up.
///
/// Without any specs the data is returned as a single [[SubfieldValue::Bytes]].
/// Strings are decoded as ASCII; field types read from a lead record use their own
/// lexical level via [[crate::FieldType::decode]].
pub fn decode(data: &[u8], specs: &[SubfieldSpec]) -> Result<Vec<SubfieldValue>> {
    decode_with_ctx(data, specs, &DecodingContext::new("?"))
}

pub(crate) fn decode_with_ctx(
    data: &[u8],
    specs: &[SubfieldSpec],
    ctx: &DecodingContext,
) -> Result<Vec<SubfieldValue>> {
    if specs.is_empty() {
        return Ok(vec![SubfieldValue::Bytes(data.to_vec())]);
    }
    let mut buf = data;
    let mut values = Vec::new();
    while buf.has_remaining() {
        for spec in specs {
            let value = decode_subfield(&mut buf, spec, ctx)?;
            values.push(value);
        }
    }
    Ok(values)
}

fn decode_subfield(
    buf: &mut &[u8],
    spec: &SubfieldSpec,
    ctx: &DecodingContext,
) -> Result<SubfieldValue> {
    if spec.is_delimited() {
        ensure!(
            buf.has_remaining(),
            TruncatedFieldSnafu {
                tag: ctx.tag,
                description: format!("no bytes left for subfield {}", spec.tag),
            }
        );
        let bytes = take_until_terminator(buf, ctx.lexical_level.unit_terminator());
        return match spec.kind {
            SubfieldKind::Bytes => Ok(SubfieldValue::Bytes(bytes.to_vec())),
            _ => ctx.bytes_to_string(bytes).map(SubfieldValue::String),
        };
    }

    ensure!(
        buf.remaining() >= spec.width,
        TruncatedFieldSnafu {
            tag: ctx.tag,
            description: format!(
                "subfield {} needs {} bytes but only {} are left",
                spec.tag,
                spec.width,
                buf.remaining()
            ),
        }
    );
    let value = match spec.kind {
        SubfieldKind::UnsignedInt8 => SubfieldValue::UnsignedInt8(buf.read_u8()?),
        SubfieldKind::UnsignedInt16 => SubfieldValue::UnsignedInt16(buf.read_u16::<LE>()?),
        SubfieldKind::UnsignedInt32 => SubfieldValue::UnsignedInt32(buf.read_u32::<LE>()?),
        SubfieldKind::SignedInt8 => SubfieldValue::SignedInt8(buf.read_i8()?),
        SubfieldKind::SignedInt16 => SubfieldValue::SignedInt16(buf.read_i16::<LE>()?),
        SubfieldKind::SignedInt32 => SubfieldValue::SignedInt32(buf.read_i32::<LE>()?),
        SubfieldKind::String => {
            let value = ctx.bytes_to_string(&buf[..spec.width])?;
            buf.advance(spec.width);
            SubfieldValue::String(value)
        }
        SubfieldKind::Bytes => {
            let value = buf[..spec.width].to_vec();
            buf.advance(spec.width);
            SubfieldValue::Bytes(value)
        }
    };
    Ok(value)
}

/// Split off everything up to `terminator` and drop the terminator.
///
/// Without a terminator the rest of `buf` is the value.
fn take_until_terminator<'a>(buf: &mut &'a [u8], terminator: &[u8]) -> &'a [u8] {
    let data: &'a [u8] = *buf;
    let step = terminator.len();
    match data.chunks(step).position(|chunk| chunk == terminator) {
        Some(index) => {
            let end = index * step;
            *buf = &data[end + step..];
            &data[..end]
        }
        None => {
            log::debug!(
                "Subfield is missing its unit terminator, taking the remaining {} bytes.",
                data.len()
            );
            *buf = &data[data.len()..];
            data
        }
    }
}
