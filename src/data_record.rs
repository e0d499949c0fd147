use super::*;
use leader::strip_field_terminator;
use std::sync::Arc;
use subfield::decode_with_ctx;

/// A decoded field of a data record.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub tag: String,
    pub length: usize,
    pub position: usize,
    /// `None` if the lead record does not describe this tag.
    pub field_type: Option<Arc<FieldType>>,
    pub subfields: Vec<SubfieldValue>,
}
impl Field {
    fn decode(
        entry: &DirectoryEntry,
        data: &[u8],
        lead: &LeadRecord,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let field_type = lead.field_type(&entry.tag).cloned();
        let lexical_level = field_type
            .as_deref()
            .map(FieldType::lexical_level)
            .unwrap_or_default();
        let data = strip_field_terminator(
            &entry.tag,
            data,
            lexical_level.field_terminator(),
            config,
        )?;
        let subfields = match field_type.as_deref() {
            Some(field_type) => field_type.decode(data)?,
            None => {
                log::debug!("No field type for {}, keeping the raw bytes.", entry.tag);
                decode_with_ctx(data, &[], &DecodingContext::new(&entry.tag))?
            }
        };
        Ok(Field {
            tag: entry.tag.clone(),
            length: entry.length,
            position: entry.position,
            field_type,
            subfields,
        })
    }

    /// Every value with the tag of the subfield it was decoded for.
    ///
    /// Repeated groups reuse the tags, so `*YCOO!XCOO` labels values YCOO, XCOO, YCOO, ...
    /// Values of fields without a field type get an empty label.
    pub fn labelled_subfields(&self) -> Vec<(&str, &SubfieldValue)> {
        let specs = self
            .field_type
            .as_deref()
            .and_then(|field_type| field_type.subfields().ok())
            .unwrap_or_default();
        if specs.is_empty() {
            return self.subfields.iter().map(|value| ("", value)).collect();
        }
        specs
            .iter()
            .map(|spec| spec.tag.as_str())
            .cycle()
            .zip(self.subfields.iter())
            .collect()
    }

    /// The first value labelled `tag`.
    pub fn first_value(&self, tag: &str) -> Option<&SubfieldValue> {
        self.labelled_subfields()
            .into_iter()
            .find_map(|(label, value)| (label == tag).then_some(value))
    }
}

/// Any record following the lead record.
#[derive(Clone, Debug, PartialEq)]
pub struct DataRecord {
    /// Must be a data leader.
    pub header: RecordHeader,
    /// In directory order.
    pub fields: Vec<Field>,
}
impl DataRecord {
    /// Read the next data record, using `lead` to decode its fields.
    ///
    /// Returns `Ok(None)` at the end of the stream.
    pub fn read<R>(reader: &mut R, lead: &LeadRecord) -> Result<Option<Self>>
    where
        R: Read + ?Sized,
    {
        Self::read_with_config(reader, lead, &ReaderConfig::default())
    }

    pub fn read_with_config<R>(
        reader: &mut R,
        lead: &LeadRecord,
        config: &ReaderConfig,
    ) -> Result<Option<Self>>
    where
        R: Read + ?Sized,
    {
        let Some(header) = RecordHeader::read(reader, config)? else {
            return Ok(None);
        };
        header.expect_kind(Leader::DATA_IDENTIFIER)?;
        let fields = header.read_fields(reader, |entry, data| {
            Field::decode(entry, &data, lead, config)
        })?;
        Ok(Some(DataRecord { header, fields }))
    }

    pub fn field(&self, tag: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.tag == tag)
    }

    pub fn take_field(self, tag: &str) -> Option<Field> {
        self.fields.into_iter().find(|field| field.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_data;

    fn sample_lead() -> LeadRecord {
        let data = test_data::sample_lead_record();
        LeadRecord::read(&mut data.as_slice()).unwrap()
    }

    #[test]
    fn decode_sample_record() {
        let lead = sample_lead();
        let data = test_data::sample_data_record(42);
        let record = DataRecord::read(&mut data.as_slice(), &lead)
            .unwrap()
            .expect("record");
        assert!(record.header.leader.is_data_leader());
        assert_eq!(
            vec!["0001", "FRID", "SG2D", "ATTF"],
            record.fields.iter().map(|f| f.tag.as_str()).collect::<Vec<_>>()
        );

        let record_id = record.field("0001").expect("0001");
        assert_eq!(vec![SubfieldValue::UnsignedInt16(42)], record_id.subfields);

        let frid = record.field("FRID").expect("FRID");
        assert_eq!(
            vec![
                SubfieldValue::UnsignedInt16(550),
                SubfieldValue::UnsignedInt32(123_456),
                SubfieldValue::UnsignedInt16(7),
            ],
            frid.subfields
        );
        assert_eq!(
            Some(&SubfieldValue::UnsignedInt32(123_456)),
            frid.first_value("FIDN")
        );

        let sg2d = record.field("SG2D").expect("SG2D");
        let labels: Vec<_> = sg2d
            .labelled_subfields()
            .into_iter()
            .map(|(label, value)| (label, value.as_i64()))
            .collect();
        assert_eq!(
            vec![
                ("YCOO", Some(-1)),
                ("XCOO", Some(2)),
                ("YCOO", Some(300_000)),
                ("XCOO", Some(-400_000)),
            ],
            labels
        );

        let attf = record.take_field("ATTF").expect("ATTF");
        assert_eq!(
            vec![
                SubfieldValue::UnsignedInt16(116),
                SubfieldValue::String("5".to_string()),
                SubfieldValue::UnsignedInt16(117),
                SubfieldValue::String("ABC".to_string()),
            ],
            attf.subfields
        );
        assert_eq!(Some("5"), attf.first_value("ATVL").and_then(|v| v.as_str()));
    }

    #[test]
    fn field_types_are_shared_with_the_lead_record() {
        let lead = sample_lead();
        let data = test_data::sample_data_record(1);
        let record = DataRecord::read(&mut data.as_slice(), &lead)
            .unwrap()
            .expect("record");
        let field_type = record.field("FRID").and_then(|f| f.field_type.as_ref());
        assert!(Arc::ptr_eq(
            lead.field_type("FRID").expect("FRID"),
            field_type.expect("field type")
        ));
    }

    #[test]
    fn unknown_tag_keeps_raw_bytes() {
        let lead = sample_lead();
        let data = test_data::record(
            b'D',
            &[("XXXX", test_data::terminated(vec![1, 2, 0x1f, 3]))],
        );
        let record = DataRecord::read(&mut data.as_slice(), &lead)
            .unwrap()
            .expect("record");
        let field = record.field("XXXX").expect("XXXX");
        assert!(field.field_type.is_none());
        assert_eq!(vec![SubfieldValue::Bytes(vec![1, 2, 0x1f, 3])], field.subfields);
        assert_eq!(vec![("", &field.subfields[0])], field.labelled_subfields());
        assert_eq!(None, record.field("FRID"));
    }

    #[test]
    fn lead_record_is_not_a_data_record() {
        let lead = sample_lead();
        let data = test_data::sample_lead_record();
        let err = DataRecord::read(&mut data.as_slice(), &lead).unwrap_err();
        assert_eq!(ErrorKind::WrongRecordKind, err.kind());
    }

    #[test]
    fn end_of_stream() {
        let lead = sample_lead();
        let mut reader: &[u8] = &[];
        assert_eq!(None, DataRecord::read(&mut reader, &lead).unwrap());
    }

    #[test]
    fn truncated_field() {
        let lead = sample_lead();
        let data = test_data::sample_data_record(1);
        let err = DataRecord::read(&mut &data[..data.len() - 3], &lead).unwrap_err();
        assert_eq!(ErrorKind::TruncatedField, err.kind());
    }

    #[test]
    fn field_shorter_than_its_format() {
        let lead = sample_lead();
        let data = test_data::record(b'D', &[("FRID", test_data::terminated(vec![1, 0, 2]))]);
        let err = DataRecord::read(&mut data.as_slice(), &lead).unwrap_err();
        assert_eq!(ErrorKind::TruncatedField, err.kind());
    }

    #[test]
    fn trailing_padding_is_skipped() {
        let lead = sample_lead();
        let mut data = test_data::sample_data_record(1);
        // Declare 4 more bytes than the fields use.
        let record_length = data.len() + 4;
        data[..5].copy_from_slice(format!("{record_length:05}").as_bytes());
        data.extend_from_slice(&[0u8; 4]);
        data.extend(test_data::sample_data_record(2));

        let mut reader = data.as_slice();
        let first = DataRecord::read(&mut reader, &lead).unwrap().expect("first");
        let second = DataRecord::read(&mut reader, &lead).unwrap().expect("second");
        assert_eq!(
            Some(&SubfieldValue::UnsignedInt16(1)),
            first.field("0001").and_then(|f| f.subfields.first())
        );
        assert_eq!(
            Some(&SubfieldValue::UnsignedInt16(2)),
            second.field("0001").and_then(|f| f.subfields.first())
        );
        assert!(reader.is_empty());
    }

    fn utf16_lead() -> LeadRecord {
        let data = test_data::record(
            b'L',
            &[(
                "NATF",
                test_data::descriptor(
                    "1600;&%/A",
                    "Feature record national attribute field",
                    "*ATTL!ATVL",
                    "(b12,A)",
                ),
            )],
        );
        LeadRecord::read(&mut data.as_slice()).unwrap()
    }

    fn utf16_attribute(code: u16, value: &str) -> Vec<u8> {
        let mut out = code.to_le_bytes().to_vec();
        out.extend(value.encode_utf16().flat_map(u16::to_le_bytes));
        out.extend_from_slice(&[0x1f, 0x00]);
        out
    }

    #[test]
    fn utf16_field() {
        let lead = utf16_lead();
        assert_eq!(
            LexicalLevel::Level2,
            lead.field_type("NATF").expect("NATF").lexical_level()
        );
        let mut natf = utf16_attribute(300, "Süd");
        natf.extend(utf16_attribute(301, ""));
        natf.extend_from_slice(&[0x1e, 0x00]);
        let data = test_data::record(b'D', &[("NATF", natf)]);

        for config in [ReaderConfig::default(), ReaderConfig::strict()] {
            let record = DataRecord::read_with_config(&mut data.as_slice(), &lead, &config)
                .unwrap()
                .expect("record");
            let field = record.field("NATF").expect("NATF");
            assert_eq!(
                vec![
                    ("ATTL", &SubfieldValue::UnsignedInt16(300)),
                    ("ATVL", &SubfieldValue::String("Süd".to_string())),
                    ("ATTL", &SubfieldValue::UnsignedInt16(301)),
                    ("ATVL", &SubfieldValue::String(String::new())),
                ],
                field.labelled_subfields()
            );
        }
    }

    #[test]
    fn utf16_field_with_single_byte_terminator() {
        let lead = utf16_lead();
        let mut natf = utf16_attribute(300, "Süd");
        natf.push(0x1e);
        let data = test_data::record(b'D', &[("NATF", natf)]);
        let err = DataRecord::read_with_config(&mut data.as_slice(), &lead, &ReaderConfig::strict())
            .unwrap_err();
        assert_eq!(ErrorKind::TruncatedField, err.kind());
    }

    #[test]
    fn missing_field_terminator_in_strict_mode() {
        let lead = sample_lead();
        let data = test_data::record(b'D', &[("0001", vec![1, 0, 0])]);
        let err = DataRecord::read_with_config(&mut data.as_slice(), &lead, &ReaderConfig::strict())
            .unwrap_err();
        assert_eq!(ErrorKind::TruncatedField, err.kind());

        let record = DataRecord::read(&mut data.as_slice(), &lead)
            .unwrap()
            .expect("record");
        assert_eq!(
            vec![SubfieldValue::UnsignedInt16(1)],
            record.fields[0].subfields
        );
    }
}
