use super::*;
use std::{fs::File, io::BufReader, path::Path};

/// Reads the lead record of a stream up front, then the data records one at a time.
#[derive(Debug)]
pub struct Iso8211Reader<R> {
    reader: R,
    lead: LeadRecord,
    config: ReaderConfig,
}
impl Iso8211Reader<BufReader<File>> {
    /// Open `path` and try to read the lead record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(path)?;
        Self::new(BufReader::new(f))
    }
}
impl<R: Read> Iso8211Reader<R> {
    pub fn new(reader: R) -> Result<Self> {
        Self::with_config(reader, ReaderConfig::default())
    }

    pub fn with_config(mut reader: R, config: ReaderConfig) -> Result<Self> {
        let lead = LeadRecord::read_with_config(&mut reader, &config)?;
        log::debug!(
            "Read lead record with {} field types.",
            lead.field_types.len()
        );
        Ok(Self {
            reader,
            lead,
            config,
        })
    }

    pub fn lead_record(&self) -> &LeadRecord {
        &self.lead
    }

    /// Read the next data record, or `Ok(None)` at the end of the stream.
    pub fn next_record(&mut self) -> Result<Option<DataRecord>> {
        DataRecord::read_with_config(&mut self.reader, &self.lead, &self.config)
    }

    /// Iterate over the remaining data records.
    ///
    /// Iteration ends after the end of the stream or the first error, since the
    /// stream position is unknown after a failed read.
    pub fn records(&mut self) -> impl Iterator<Item = Result<DataRecord>> + '_ {
        let mut done = false;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let next = self.next_record().transpose();
            done = !matches!(next, Some(Ok(_)));
            next
        })
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
