use super::*;
use format::subfield_tags;
use itertools::Itertools;
use leader::strip_field_terminator;
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};
use subfield::decode_with_ctx;

/// Number of field control bytes in front of every data descriptive field,
/// unless the lead leader says otherwise.
const DEFAULT_FIELD_CONTROL_LENGTH: usize = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataStructureCode {
    Elementary,
    Vector,
    Array,
    Concatenated,
    Other(char),
}
impl From<char> for DataStructureCode {
    fn from(c: char) -> Self {
        match c {
            '0' => Self::Elementary,
            '1' => Self::Vector,
            '2' => Self::Array,
            '3' => Self::Concatenated,
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataTypeCode {
    CharacterString,
    ImplicitPoint,
    ExplicitPoint,
    ExplicitPointScaled,
    CharacterModeBitString,
    BitString,
    Mixed,
    Other(char),
}
impl From<char> for DataTypeCode {
    fn from(c: char) -> Self {
        match c {
            '0' => Self::CharacterString,
            '1' => Self::ImplicitPoint,
            '2' => Self::ExplicitPoint,
            '3' => Self::ExplicitPointScaled,
            '4' => Self::CharacterModeBitString,
            '5' => Self::BitString,
            '6' => Self::Mixed,
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldControls {
    pub data_structure_code: DataStructureCode,
    pub data_type_code: DataTypeCode,
    pub auxiliary_controls: [char; 2],
    pub printable_graphics: [char; 2],
    pub truncated_escape_sequence: [u8; 3],
}
impl FieldControls {
    /// Shorter field controls than the usual 9 bytes are padded with spaces.
    fn from_bytes(data: &[u8]) -> Self {
        let mut padded = [SPACE; DEFAULT_FIELD_CONTROL_LENGTH];
        for (target, source) in padded.iter_mut().zip(data) {
            *target = *source;
        }
        FieldControls {
            data_structure_code: padded.read_char(0).into(),
            data_type_code: padded.read_char(1).into(),
            auxiliary_controls: padded.take_chars(2),
            printable_graphics: padded.take_chars(4),
            truncated_escape_sequence: [padded[6], padded[7], padded[8]],
        }
    }

    pub fn lexical_level(&self) -> LexicalLevel {
        LexicalLevel::for_escape_sequence(self.truncated_escape_sequence).unwrap_or_else(|| {
            log::warn!(
                "Unknown character set escape sequence {:?}, using level 0.",
                self.truncated_escape_sequence
            );
            LexicalLevel::Level0
        })
    }
}

/// Describes the structure of every field with the same tag.
#[derive(Clone, Debug)]
pub struct FieldType {
    pub tag: String,
    /// Length of the descriptor in the lead record.
    pub length: usize,
    /// Position of the descriptor in the lead record.
    pub position: usize,
    pub controls: FieldControls,
    pub name: String,
    pub array_descriptor: String,
    pub format_controls: String,
    subfields: OnceLock<Vec<SubfieldSpec>>,
}
impl FieldType {
    fn from_descriptor(
        entry: &DirectoryEntry,
        data: &[u8],
        field_control_length: usize,
        config: &ReaderConfig,
    ) -> Result<Self> {
        ensure!(
            data.len() > field_control_length,
            TruncatedFieldSnafu {
                tag: entry.tag.as_str(),
                description: format!(
                    "descriptor of {} bytes has no room after {field_control_length} bytes of field controls",
                    data.len()
                ),
            }
        );
        let (controls, descriptor) = data.split_at(field_control_length);
        let descriptor = strip_field_terminator(
            &entry.tag,
            descriptor,
            LexicalLevel::Level0.field_terminator(),
            config,
        )?;
        let mut parts = descriptor.split(|b| *b == UNIT_TERMINATOR);
        let mut next_part = || ascii_string(&entry.tag, parts.next().unwrap_or_default());
        let field_type = FieldType {
            tag: entry.tag.clone(),
            length: entry.length,
            position: entry.position,
            controls: FieldControls::from_bytes(controls),
            name: next_part()?,
            array_descriptor: next_part()?,
            format_controls: next_part()?,
            subfields: OnceLock::new(),
        };
        Ok(field_type)
    }

    /// The compiled subfield specs, compiled on first use.
    pub fn subfields(&self) -> Result<&[SubfieldSpec]> {
        if let Some(subfields) = self.subfields.get() {
            return Ok(subfields);
        }
        let compiled = format::compile(&self.array_descriptor, &self.format_controls)?;
        log::debug!(
            "Compiled {} ({}) into [{}]",
            self.tag,
            self.format_controls,
            compiled.iter().join(", ")
        );
        Ok(self.subfields.get_or_init(|| compiled))
    }

    /// Whether the subfield group repeats to fill the field (array descriptor starts with `*`).
    pub fn is_repeating(&self) -> bool {
        self.array_descriptor.starts_with('*')
    }

    pub fn subfield_tags(&self) -> Vec<&str> {
        subfield_tags(&self.array_descriptor)
    }

    pub fn lexical_level(&self) -> LexicalLevel {
        self.controls.lexical_level()
    }

    /// Decode the bytes of a field of this type, without its field terminator.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<SubfieldValue>> {
        let ctx = DecodingContext::new(&self.tag).with_lexical_level(self.lexical_level());
        decode_with_ctx(data, self.subfields()?, &ctx)
    }
}
impl PartialEq for FieldType {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.length == other.length
            && self.position == other.position
            && self.controls == other.controls
            && self.name == other.name
            && self.array_descriptor == other.array_descriptor
            && self.format_controls == other.format_controls
    }
}

/// The first record of a file, describing every field type used by the data records.
#[derive(Clone, Debug)]
pub struct LeadRecord {
    /// Must be a lead leader.
    pub header: RecordHeader,
    pub field_types: FxHashMap<String, Arc<FieldType>>,
}
impl LeadRecord {
    pub fn read<R>(reader: &mut R) -> Result<Self>
    where
        R: Read + ?Sized,
    {
        Self::read_with_config(reader, &ReaderConfig::default())
    }

    pub fn read_with_config<R>(reader: &mut R, config: &ReaderConfig) -> Result<Self>
    where
        R: Read + ?Sized,
    {
        let header = RecordHeader::read(reader, config)?.context(MalformedLeaderSnafu {
            description: "The stream is empty, expected a lead record",
        })?;
        header.expect_kind(Leader::LEAD_IDENTIFIER)?;
        let field_control_length = match header.leader.field_control_length {
            0 => DEFAULT_FIELD_CONTROL_LENGTH,
            n => n,
        };
        let descriptors = header.read_fields(reader, |entry, data| {
            FieldType::from_descriptor(entry, &data, field_control_length, config)
        })?;
        let mut field_types = FxHashMap::default();
        for field_type in descriptors {
            let tag = field_type.tag.clone();
            if field_types.insert(tag, Arc::new(field_type)).is_some() {
                log::warn!("Duplicate field type, keeping the last one.");
            }
        }
        Ok(LeadRecord {
            header,
            field_types,
        })
    }

    pub fn field_type(&self, tag: &str) -> Option<&Arc<FieldType>> {
        self.field_types.get(tag)
    }

    /// The field control field, tagged with all zeros.
    pub fn control_field(&self) -> Option<&FieldType> {
        let tag = "0".repeat(self.header.leader.size_of_field_tag as usize);
        self.field_type(&tag).map(|field_type| &**field_type)
    }

    /// The parent/child relations between the field tags, if the file declares them.
    pub fn field_tree(&self) -> Result<Option<FieldTree>> {
        let Some(control_field) = self.control_field() else {
            return Ok(None);
        };
        if control_field.array_descriptor.is_empty() {
            return Ok(None);
        }
        FieldTree::parse_from_str(
            &control_field.array_descriptor,
            self.header.leader.size_of_field_tag as usize,
        )
        .map(Some)
    }
}
