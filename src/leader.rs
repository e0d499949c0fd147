use super::*;

/// The fixed 24 byte leader at the start of every record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leader {
    pub record_length: usize,
    pub interchange_level: Option<u8>,
    /// `'L'` for the lead record, `'D'` for data records.
    pub leader_identifier: char,
    pub in_line_code_ext_indicator: char,
    pub version: Option<u8>,
    pub application_indicator: char,
    pub field_control_length: usize,
    /// Start address of field area (number of bytes in leader and directory)
    pub base_address_of_field_area: usize,
    pub extended_character_set_indicator: [char; 3],
    pub size_of_field_length: u8,
    pub size_of_field_position: u8,
    pub reserved: char,
    pub size_of_field_tag: u8,
}

impl Leader {
    pub const LEAD_IDENTIFIER: char = 'L';
    pub const DATA_IDENTIFIER: char = 'D';

    pub fn is_lead_leader(&self) -> bool {
        self.leader_identifier == Self::LEAD_IDENTIFIER
    }

    pub fn is_data_leader(&self) -> bool {
        self.leader_identifier == Self::DATA_IDENTIFIER
    }

    pub fn directory_entry_size(&self) -> usize {
        self.size_of_field_length as usize
            + self.size_of_field_position as usize
            + self.size_of_field_tag as usize
    }

    /// Number of bytes between the leader and the field area, including the directory's
    /// field terminator.
    pub fn directory_length(&self) -> usize {
        self.base_address_of_field_area - LEADER_SIZE
    }

    pub fn num_directory_entries(&self) -> Result<usize> {
        let entry_size = self.directory_entry_size();
        ensure!(
            entry_size > 0,
            MalformedDirectorySnafu {
                description: "Directory entries have a width of 0".to_string(),
            }
        );
        let directory_bytes = self.directory_length() - 1;
        ensure!(
            directory_bytes % entry_size == 0,
            MalformedDirectorySnafu {
                description: format!(
                    "{directory_bytes} directory bytes are not a multiple of the entry size {entry_size}"
                ),
            }
        );
        Ok(directory_bytes / entry_size)
    }

    fn directory_entry_reader(&self, number_parsing: NumberParsing) -> DirectoryEntryReader {
        DirectoryEntryReader {
            tag_size: self.size_of_field_tag as usize,
            field_length_size: self.size_of_field_length as usize,
            field_position_size: self.size_of_field_position as usize,
            number_parsing,
        }
    }

    /// `data` *must* be `LEADER_SIZE` bytes long.
    fn from_bytes(data: &[u8], config: &ReaderConfig) -> Result<Self> {
        debug_assert_eq!(LEADER_SIZE, data.len());
        let mode = config.number_parsing;
        let number = |start: usize, end: usize, what: &str| -> Result<usize> {
            data[start..end]
                .parse_number(what, mode)
                .map_err(|description| MalformedLeaderSnafu { description }.build())
        };
        let digit_option = |pos: usize, what: &str| -> Result<Option<u8>> {
            data[pos..=pos]
                .parse_digit_option(what, mode)
                .map_err(|description| MalformedLeaderSnafu { description }.build())
        };
        let leader = Leader {
            record_length: number(0, 5, "record length")?,
            interchange_level: digit_option(5, "interchange level")?,
            leader_identifier: data.read_char(6),
            in_line_code_ext_indicator: data.read_char(7),
            version: digit_option(8, "version")?,
            application_indicator: data.read_char(9),
            field_control_length: number(10, 12, "field control length")?,
            base_address_of_field_area: number(12, 17, "base address of field area")?,
            extended_character_set_indicator: data.take_chars(17),
            size_of_field_length: number(20, 21, "size of field length")? as u8,
            size_of_field_position: number(21, 22, "size of field position")? as u8,
            reserved: data.read_char(22),
            size_of_field_tag: number(23, 24, "size of field tag")? as u8,
        };
        ensure!(
            leader.base_address_of_field_area > LEADER_SIZE,
            MalformedLeaderSnafu {
                description: format!(
                    "Base address {} leaves no room for a directory after the leader",
                    leader.base_address_of_field_area
                ),
            }
        );
        Ok(leader)
    }
}

#[derive(Debug)]
struct DirectoryEntryReader {
    tag_size: usize,
    field_length_size: usize,
    field_position_size: usize,
    number_parsing: NumberParsing,
}
impl DirectoryEntryReader {
    fn data_len(&self) -> usize {
        self.tag_size + self.field_length_size + self.field_position_size
    }

    /// `data` *must* be of `self.data_len()`
    fn read_from_bytes_unchecked(&self, data: &[u8]) -> Result<DirectoryEntry> {
        debug_assert_eq!(self.data_len(), data.len());
        let (tag, rest) = data.split_at(self.tag_size);
        let (length, position) = rest.split_at(self.field_length_size);
        let tag = ascii_string("directory", tag)?;
        let number = |bytes: &[u8], what: &str| -> Result<usize> {
            bytes
                .parse_number(what, self.number_parsing)
                .map_err(|description| {
                    MalformedDirectorySnafu {
                        description: format!("{description} (entry {tag})"),
                    }
                    .build()
                })
        };
        Ok(DirectoryEntry {
            length: number(length, "field length")?,
            position: number(position, "field position")?,
            tag,
        })
    }
}

/// Drop the field terminator from the end of a field's bytes.
///
/// If the terminator is missing the same number of bytes is dropped anyway, unless
/// `config` requires terminators.
pub(crate) fn strip_field_terminator<'a>(
    tag: &str,
    data: &'a [u8],
    terminator: &[u8],
    config: &ReaderConfig,
) -> Result<&'a [u8]> {
    if let Some(stripped) = data.strip_suffix(terminator) {
        return Ok(stripped);
    }
    ensure!(
        !config.require_field_terminators,
        TruncatedFieldSnafu {
            tag,
            description: "field does not end in a field terminator".to_string(),
        }
    );
    log::warn!("Field {tag} does not end in a field terminator.");
    Ok(&data[..data.len().saturating_sub(terminator.len())])
}

/// Describes one field of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub tag: String,
    pub length: usize,
    /// Offset from the base address.
    ///
    /// Fields are read in directory order, so this is only informational.
    pub position: usize,
}

/// Leader and directory, the part common to lead and data records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub leader: Leader,
    pub directory: Vec<DirectoryEntry>,
}
impl RecordHeader {
    /// Read the leader and directory of the next record.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before the leader.
    pub fn read<R>(reader: &mut R, config: &ReaderConfig) -> Result<Option<Self>>
    where
        R: Read + ?Sized,
    {
        let mut leader_bytes = [0u8; LEADER_SIZE];
        match reader.read_fully(&mut leader_bytes)? {
            0 => return Ok(None),
            LEADER_SIZE => (),
            available => {
                return MalformedLeaderSnafu {
                    description: format!(
                        "Expected {LEADER_SIZE} bytes but the stream ended after {available}"
                    ),
                }
                .fail();
            }
        }
        let leader = Leader::from_bytes(&leader_bytes, config)?;
        let num_directory_entries = leader.num_directory_entries()?;

        let mut directory_bytes = vec![0u8; leader.directory_length()];
        let available = reader.read_fully(&mut directory_bytes)?;
        ensure!(
            available == directory_bytes.len(),
            MalformedDirectorySnafu {
                description: format!(
                    "Expected {} directory bytes but the stream ended after {available}",
                    directory_bytes.len()
                ),
            }
        );
        let entry_reader = leader.directory_entry_reader(config.number_parsing);
        let entry_size = entry_reader.data_len();
        let (entry_bytes, terminator) = directory_bytes.split_at(num_directory_entries * entry_size);
        if terminator != [FIELD_TERMINATOR] {
            ensure!(
                !config.require_field_terminators,
                MalformedDirectorySnafu {
                    description: format!("Directory ends in {terminator:?} instead of a field terminator"),
                }
            );
            log::warn!("Directory ends in {terminator:?} instead of a field terminator.");
        }
        let directory = entry_bytes
            .chunks_exact(entry_size)
            .map(|entry| entry_reader.read_from_bytes_unchecked(entry))
            .collect::<Result<Vec<_>>>()?;
        log::trace!(
            "Read '{}' record header with {} fields and length {}.",
            leader.leader_identifier,
            directory.len(),
            leader.record_length
        );
        Ok(Some(RecordHeader { leader, directory }))
    }

    /// Number of bytes in the field area according to the leader, if it declared a record length.
    pub fn field_area_length(&self) -> Option<usize> {
        (self.leader.record_length > 0).then(|| {
            self.leader
                .record_length
                .saturating_sub(self.leader.base_address_of_field_area)
        })
    }

    /// Read the bytes of every field in directory order and hand them to `read_field`.
    ///
    /// Whatever is left of the record after the last field is consumed and dropped.
    pub(crate) fn read_fields<R, T, F>(
        &self,
        reader: &mut R,
        mut read_field: F,
    ) -> Result<Vec<T>>
    where
        R: Read + ?Sized,
        F: FnMut(&DirectoryEntry, Vec<u8>) -> Result<T>,
    {
        let field_area_length = self.field_area_length();
        let mut offset = 0usize;
        let mut fields = Vec::with_capacity(self.directory.len());
        for entry in self.directory.iter() {
            if entry.position != offset {
                log::debug!(
                    "Field {} declares position {} but starts at {offset}.",
                    entry.tag,
                    entry.position
                );
            }
            if let Some(field_area_length) = field_area_length {
                ensure!(
                    offset + entry.length <= field_area_length,
                    TruncatedFieldSnafu {
                        tag: entry.tag.as_str(),
                        description: format!(
                            "{} bytes at offset {offset} run past the end of the {field_area_length} byte field area",
                            entry.length
                        ),
                    }
                );
            }
            let mut data = vec![0u8; entry.length];
            let available = reader.read_fully(&mut data)?;
            ensure!(
                available == entry.length,
                TruncatedFieldSnafu {
                    tag: entry.tag.as_str(),
                    description: format!(
                        "expected {} bytes but the stream ended after {available}",
                        entry.length
                    ),
                }
            );
            offset += entry.length;
            let field = read_field(entry, data)?;
            fields.push(field);
        }
        if let Some(field_area_length) = field_area_length {
            if offset < field_area_length {
                let skipped = reader.skip_bytes((field_area_length - offset) as u64)?;
                log::warn!(
                    "Inconsistent read, skipped {skipped} bytes remaining after the last field."
                );
            }
        }
        Ok(fields)
    }

    /// Fails with `WrongRecordKind` unless this header carries `expected` as leader identifier.
    pub(crate) fn expect_kind(&self, expected: char) -> Result<()> {
        ensure!(
            self.leader.leader_identifier == expected,
            WrongRecordKindSnafu {
                expected,
                found: self.leader.leader_identifier,
            }
        );
        Ok(())
    }
}
