//! Payload scanner
//!
//! Instrumented payloads start after a run of all-ones bytes (the sentinel).
//! After it comes a sequence of fixed-size field groups whose first two
//! words are `(stream_id, sequence)`. The scanner locates the payload, walks
//! the groups and collapses consecutive identical pairs into [`Run`]s.
//!
//! ```text
//! .. header .. | FF FF FF FF FF FF FF FF | stream seq pad pad | stream seq pad pad | ..
//! ```
//!
//! Scanning is a pure function of the input slice: nothing is carried from
//! one buffer to the next, and the returned [`Runs`] iterator does not
//! allocate.

use serde::{Deserialize, Serialize};

use flowprobe_core::{ConfigError, EventDraft, ProbeId, ScanError};

/// Width of one embedded word in bytes
pub const WORD_BYTES: usize = 4;

/// Width of the sentinel marker (two all-ones words)
pub const SENTINEL_BYTES: usize = 2 * WORD_BYTES;

/// Bytes needed to read one `(stream_id, sequence)` pair
const PAIR_BYTES: usize = 2 * WORD_BYTES;

/// Smallest field group: just the pair
pub const MIN_GROUP_WORDS: usize = 2;

/// Step used while searching for the sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentinelStride {
    /// Word-aligned search
    #[default]
    Word,
    /// Byte-wise search; also finds unaligned sentinels
    Byte,
}

impl SentinelStride {
    /// Step in bytes
    pub fn bytes(self) -> usize {
        match self {
            Self::Word => WORD_BYTES,
            Self::Byte => 1,
        }
    }
}

/// Byte order of the embedded words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordOrder {
    #[default]
    Little,
    Big,
}

impl WordOrder {
    fn read(self, bytes: [u8; WORD_BYTES]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }

    /// Encode a word in this byte order
    pub fn write(self, value: u32) -> [u8; WORD_BYTES] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }
}

/// What to do with the run still open when the walk ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingRunPolicy {
    /// Emit it only if at least one pair was read into it
    #[default]
    SkipEmpty,
    /// Always emit it, producing a `(0, 0, 0)` run for an empty payload
    EmitAlways,
}

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Sentinel search step
    pub stride: SentinelStride,
    /// Byte order of `(stream_id, sequence)`
    pub word_order: WordOrder,
    /// Words per field group; the walk advances by this many words
    pub group_words: usize,
    /// Handling of the final open run
    pub trailing_run: TrailingRunPolicy,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            stride: SentinelStride::Word,
            word_order: WordOrder::Little,
            group_words: 4,
            trailing_run: TrailingRunPolicy::SkipEmpty,
        }
    }
}

impl ScannerConfig {
    /// Check that a group can hold a `(stream_id, sequence)` pair
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_words < MIN_GROUP_WORDS {
            return Err(ConfigError::invalid(
                "scanner.group_words",
                format!("must be at least 2, got {}", self.group_words),
            ));
        }
        Ok(())
    }

    /// Bytes between consecutive field groups
    ///
    /// Group widths below [`MIN_GROUP_WORDS`] are read as the minimum, so a
    /// scanner built from an unvalidated config still advances.
    pub fn group_bytes(&self) -> usize {
        self.group_words
            .max(MIN_GROUP_WORDS)
            .saturating_mul(WORD_BYTES)
    }
}

/// Consecutive identical `(stream_id, sequence)` observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Run {
    pub stream_id: u32,
    pub sequence: u32,
    pub repeat_count: u16,
}

impl Run {
    pub fn new(stream_id: u32, sequence: u32, repeat_count: u16) -> Self {
        Self {
            stream_id,
            sequence,
            repeat_count,
        }
    }

    /// Event draft for this run at the given probe point
    pub fn draft(self, probe_id: impl Into<ProbeId>) -> EventDraft {
        EventDraft::new(probe_id, self.sequence, self.stream_id, self.repeat_count)
    }
}

/// Stateless payload scanner
#[derive(Debug, Clone, Default)]
pub struct PayloadScanner {
    config: ScannerConfig,
}

impl PayloadScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Offset of the first payload byte after the sentinel run
    ///
    /// # Errors
    ///
    /// [`ScanError::MalformedBuffer`] if no sentinel fits before the end.
    pub fn payload_start(&self, data: &[u8]) -> Result<usize, ScanError> {
        let step = self.config.stride.bytes();
        let mut pos = 0;

        while !is_sentinel(data, pos) {
            pos += step;
            if pos + SENTINEL_BYTES > data.len() {
                return Err(ScanError::MalformedBuffer {
                    scanned: data.len(),
                });
            }
        }

        // A longer marker run ends at the last position that still starts a
        // full sentinel
        while is_sentinel(data, pos + step) {
            pos += step;
        }

        Ok(pos + SENTINEL_BYTES)
    }

    /// Scan a whole slice
    pub fn scan<'a>(&self, data: &'a [u8]) -> Result<Runs<'a>, ScanError> {
        let start = self.payload_start(data)?;
        Ok(Runs {
            data,
            pos: start,
            payload_start: start,
            group_bytes: self.config.group_bytes(),
            word_order: self.config.word_order,
            trailing_run: self.config.trailing_run,
            current: (0, 0),
            count: 0,
            finished: false,
        })
    }

    /// Scan `buffer[..end]`
    ///
    /// # Errors
    ///
    /// [`ScanError::BoundaryOutOfRange`] if `end` lies past the buffer, or
    /// any error from [`scan`](Self::scan).
    pub fn scan_bounded<'a>(&self, buffer: &'a [u8], end: usize) -> Result<Runs<'a>, ScanError> {
        let data = buffer.get(..end).ok_or(ScanError::BoundaryOutOfRange {
            end,
            len: buffer.len(),
        })?;
        self.scan(data)
    }
}

fn is_sentinel(data: &[u8], pos: usize) -> bool {
    pos.checked_add(SENTINEL_BYTES)
        .and_then(|end| data.get(pos..end))
        .is_some_and(|marker| marker.iter().all(|&b| b == 0xFF))
}

/// Lazy sequence of runs found in one payload
#[derive(Debug, Clone)]
pub struct Runs<'a> {
    data: &'a [u8],
    pos: usize,
    payload_start: usize,
    group_bytes: usize,
    word_order: WordOrder,
    trailing_run: TrailingRunPolicy,
    /// (stream_id, sequence) of the open run
    current: (u32, u32),
    count: u16,
    finished: bool,
}

impl Runs<'_> {
    /// Offset of the first payload byte
    pub fn payload_start(&self) -> usize {
        self.payload_start
    }

    fn read_pair(&self, pos: usize) -> Option<(u32, u32)> {
        let bytes = self.data.get(pos..pos.checked_add(PAIR_BYTES)?)?;
        let (stream, sequence) = bytes.split_at(WORD_BYTES);
        Some((
            self.word_order.read(stream.try_into().ok()?),
            self.word_order.read(sequence.try_into().ok()?),
        ))
    }

    fn open_run(&self) -> Run {
        Run::new(self.current.0, self.current.1, self.count)
    }
}

impl Iterator for Runs<'_> {
    type Item = Run;

    fn next(&mut self) -> Option<Run> {
        if self.finished {
            return None;
        }

        while let Some(pair) = self.read_pair(self.pos) {
            self.pos = self.pos.saturating_add(self.group_bytes);

            if pair == self.current && self.count < u16::MAX {
                self.count += 1;
                continue;
            }

            let closed = self.open_run();
            self.current = pair;
            self.count = 1;
            if closed.repeat_count != 0 {
                return Some(closed);
            }
        }

        self.finished = true;
        let last = self.open_run();
        match self.trailing_run {
            TrailingRunPolicy::EmitAlways => Some(last),
            TrailingRunPolicy::SkipEmpty if last.repeat_count != 0 => Some(last),
            TrailingRunPolicy::SkipEmpty => None,
        }
    }
}

impl std::iter::FusedIterator for Runs<'_> {}
