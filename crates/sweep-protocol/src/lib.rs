use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed key set a worker writes to its status file, one `key:value`
/// pair per line. A readable record carries exactly these keys.
pub const STATUS_KEYS: [&str; 8] = [
    "insn",
    "cs_disas",
    "libopcodes_disas",
    "instructions_checked",
    "instructions_skipped",
    "instructions_filtered",
    "hidden_instructions_found",
    "instructions_per_sec",
];

/// One worker's progress snapshot.
///
/// Workers rewrite the whole record continuously while fuzzing; the counters
/// are cumulative and never decrease over a worker's lifetime, while
/// `instructions_per_sec` is an instantaneous rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Encoding currently under test, as the worker prints it.
    pub insn: String,

    /// Capstone's disassembly of the current encoding.
    pub cs_disas: String,

    /// libopcodes' disassembly of the current encoding.
    pub libopcodes_disas: String,

    /// Encodings fully tested so far.
    pub instructions_checked: u64,

    /// Encodings skipped so far.
    pub instructions_skipped: u64,

    /// Encodings rejected by the instruction filter so far.
    pub instructions_filtered: u64,

    /// Hidden instructions discovered so far.
    pub hidden_instructions_found: u64,

    /// Current throughput, encodings per second.
    pub instructions_per_sec: u64,
}

/// Why a status text failed to parse into a [`StatusRecord`].
///
/// Every variant means the same thing to a reader: the record is unreadable
/// right now (most often because it was caught mid-write) and the previous
/// record should be kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusParseError {
    #[error("line without a key separator: {0:?}")]
    MissingSeparator(String),

    #[error("expected {expected} fields, found {found}", expected = STATUS_KEYS.len())]
    WrongFieldCount { found: usize },

    #[error("missing field {0:?}")]
    MissingKey(&'static str),

    #[error("field {key:?} is not a counter: {value:?}")]
    InvalidCounter { key: &'static str, value: String },
}

impl StatusRecord {
    /// Parse the text of a status file.
    ///
    /// Lines split on the first `:` only; tabs in values are normalized to
    /// spaces and values trimmed; blank lines are skipped. The parsed field
    /// set must match [`STATUS_KEYS`] exactly, which is what makes a
    /// half-written file come back as an error instead of a torn record.
    pub fn parse(text: &str) -> Result<Self, StatusParseError> {
        let mut fields: HashMap<String, String> = HashMap::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| StatusParseError::MissingSeparator(line.to_string()))?;
            fields.insert(key.to_string(), value.replace('\t', " ").trim().to_string());
        }

        if fields.len() != STATUS_KEYS.len() {
            return Err(StatusParseError::WrongFieldCount {
                found: fields.len(),
            });
        }

        let mut text_field = |key: &'static str| -> Result<String, StatusParseError> {
            fields.remove(key).ok_or(StatusParseError::MissingKey(key))
        };
        let insn = text_field("insn")?;
        let cs_disas = text_field("cs_disas")?;
        let libopcodes_disas = text_field("libopcodes_disas")?;

        let mut counter = |key: &'static str| -> Result<u64, StatusParseError> {
            let value = fields.remove(key).ok_or(StatusParseError::MissingKey(key))?;
            value
                .parse()
                .map_err(|_| StatusParseError::InvalidCounter { key, value })
        };

        Ok(Self {
            insn,
            cs_disas,
            libopcodes_disas,
            instructions_checked: counter("instructions_checked")?,
            instructions_skipped: counter("instructions_skipped")?,
            instructions_filtered: counter("instructions_filtered")?,
            hidden_instructions_found: counter("hidden_instructions_found")?,
            instructions_per_sec: counter("instructions_per_sec")?,
        })
    }

    /// Sum of the three progress counters: how far into its sub-range the
    /// worker has moved. Saturates rather than wraps; the values are
    /// whatever the worker wrote.
    pub fn instructions_so_far(&self) -> u64 {
        self.instructions_checked
            .saturating_add(self.instructions_skipped)
            .saturating_add(self.instructions_filtered)
    }

    /// Whether any cumulative counter moved backwards relative to `earlier`.
    ///
    /// The rate field is instantaneous and excluded. A regressing read is a
    /// sign of corruption (or a restarted worker) and should be discarded.
    pub fn counters_regressed(&self, earlier: &Self) -> bool {
        self.instructions_checked < earlier.instructions_checked
            || self.instructions_skipped < earlier.instructions_skipped
            || self.instructions_filtered < earlier.instructions_filtered
            || self.hidden_instructions_found < earlier.hidden_instructions_found
    }
}
