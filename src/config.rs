use serde::{Deserialize, Serialize};

/// How numbers in leaders and directories that are not made up of digits are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumberParsing {
    /// Read them as 0 and log a warning.
    ///
    /// Plenty of slightly broken files in circulation decode fine this way.
    #[default]
    Lenient,
    /// Fail with a malformed leader or directory error.
    Strict,
}

/// Knobs for how forgiving the reader is with non-conforming input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub number_parsing: NumberParsing,
    /// Fail instead of warn if the directory or a field does not end in a field terminator.
    pub require_field_terminators: bool,
}
impl ReaderConfig {
    /// Everything the reader can check is an error.
    pub fn strict() -> Self {
        Self {
            number_parsing: NumberParsing::Strict,
            require_field_terminators: true,
        }
    }
}
