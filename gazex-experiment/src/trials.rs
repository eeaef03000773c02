//! Order files and the block-wise trial sequence built from them.
//!
//! An order file holds one trial per line, fields separated by `_`. Lines
//! are trimmed and lowercased, blank lines are ignored. The line count must
//! be a multiple of the block size. Any bad line rejects the whole file.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

pub const FIELD_DELIMITER: char = '_';

/// One parsed line of an order file.
pub trait TrialRecord: Clone + Debug + PartialEq + Send {
    const FIELD_COUNT: usize;

    /// Builds a record from exactly `FIELD_COUNT` lowercased tokens.
    fn from_fields(fields: &[&str]) -> Result<Self, ParseErrorKind>;

    /// Short human-readable form for logs and the journal.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unknown {column} '{token}'")]
    UnknownToken { column: &'static str, token: String },
    #[error("expected {expected} fields separated by '_', found {found}")]
    WrongFieldCount { expected: usize, found: usize },
    #[error("{lines} lines do not form complete blocks of {block_size}")]
    BlockSizeMismatch { lines: usize, block_size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line} '{content}': {kind}")]
pub struct ParseError {
    /// 1-based line in the source; 0 when the file as a whole is rejected.
    pub line: usize,
    pub content: String,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read order file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid order file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// Forward-only cursor over trials, released one block at a time.
#[derive(Debug, Clone)]
pub struct TrialSequence<T> {
    trials: Vec<T>,
    block_size: usize,
    /// `None` before the first trial.
    index: Option<usize>,
    next_block_start: usize,
}

impl<T: TrialRecord> TrialSequence<T> {
    pub fn load(source: &str, block_size: usize) -> Result<Self, ParseError> {
        let lines: Vec<(usize, String)> = source
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim().to_lowercase()))
            .filter(|(_, line)| !line.is_empty())
            .collect();

        if block_size == 0 || lines.len() % block_size != 0 {
            return Err(ParseError {
                line: 0,
                content: String::new(),
                kind: ParseErrorKind::BlockSizeMismatch {
                    lines: lines.len(),
                    block_size,
                },
            });
        }

        let trials = lines
            .iter()
            .map(|(line, content)| {
                let fields: Vec<&str> = content.split(FIELD_DELIMITER).collect();
                let parsed = if fields.len() != T::FIELD_COUNT {
                    Err(ParseErrorKind::WrongFieldCount {
                        expected: T::FIELD_COUNT,
                        found: fields.len(),
                    })
                } else {
                    T::from_fields(&fields)
                };
                parsed.map_err(|kind| ParseError {
                    line: *line,
                    content: content.clone(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(trials = trials.len(), block_size, "order parsed");
        Ok(Self::from_trials(trials, block_size))
    }

    pub fn load_file(path: impl AsRef<Path>, block_size: usize) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let sequence = Self::load(&text, block_size).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), trials = sequence.len(), "order loaded");
        Ok(sequence)
    }
}

impl<T> TrialSequence<T> {
    pub fn from_trials(trials: Vec<T>, block_size: usize) -> Self {
        Self {
            trials,
            block_size,
            index: None,
            next_block_start: 0,
        }
    }

    /// Moves the block boundary forward and returns the block's first trial.
    pub fn start_block(&mut self) -> Option<&T> {
        self.next_block_start = (self.next_block_start + self.block_size).min(self.trials.len());
        self.next()
    }

    /// Next trial inside the current block, if any.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&T> {
        let candidate = self.next_index();
        if candidate < self.trials.len() && candidate < self.next_block_start {
            self.index = Some(candidate);
            self.trials.get(candidate)
        } else {
            None
        }
    }

    pub fn current(&self) -> Option<&T> {
        self.index.and_then(|i| self.trials.get(i))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.index
    }

    pub fn has_more_trials(&self) -> bool {
        self.next_index() < self.trials.len()
    }

    pub fn has_more_block_trials(&self) -> bool {
        self.next_index() < self.next_block_start
    }

    pub fn has_more_blocks(&self) -> bool {
        self.next_index() + self.block_size <= self.trials.len()
    }

    pub fn reset(&mut self) {
        self.index = None;
        self.next_block_start = 0;
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.trials.len().checked_div(self.block_size).unwrap_or(0)
    }

    fn next_index(&self) -> usize {
        self.index.map_or(0, |i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pair(String, String);

    impl TrialRecord for Pair {
        const FIELD_COUNT: usize = 2;

        fn from_fields(fields: &[&str]) -> Result<Self, ParseErrorKind> {
            for field in fields {
                if !matches!(*field, "a" | "b" | "c") {
                    return Err(ParseErrorKind::UnknownToken {
                        column: "letter",
                        token: field.to_string(),
                    });
                }
            }
            Ok(Pair(fields[0].to_string(), fields[1].to_string()))
        }

        fn describe(&self) -> String {
            format!("{}-{}", self.0, self.1)
        }
    }

    fn pair(a: &str, b: &str) -> Pair {
        Pair(a.into(), b.into())
    }

    #[test]
    fn two_trials_one_block() {
        let mut seq = TrialSequence::<Pair>::load("a_b\nc_a\n", 2).unwrap();
        assert!(seq.has_more_blocks());
        assert_eq!(seq.start_block(), Some(&pair("a", "b")));
        assert!(seq.has_more_block_trials());
        assert_eq!(seq.next(), Some(&pair("c", "a")));
        assert_eq!(seq.next(), None);
        assert!(!seq.has_more_trials());
        assert!(!seq.has_more_blocks());
        assert_eq!(seq.current_index(), Some(1));
    }

    #[test]
    fn next_stops_at_block_boundary() {
        let mut seq = TrialSequence::<Pair>::load("a_a\na_b\nb_a\nb_b\n", 2).unwrap();
        assert_eq!(seq.block_count(), 2);
        assert_eq!(seq.next(), None, "no block started yet");

        seq.start_block();
        seq.next();
        assert!(!seq.has_more_block_trials());
        assert!(seq.has_more_trials());
        assert!(seq.has_more_blocks());
        assert_eq!(seq.next(), None);

        assert_eq!(seq.start_block(), Some(&pair("b", "a")));
        assert_eq!(seq.next(), Some(&pair("b", "b")));
        assert_eq!(seq.start_block(), None);
    }

    #[test]
    fn lines_are_normalized() {
        let seq = TrialSequence::<Pair>::load("  A_B \r\n\n\nC_c\n   \n", 1).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.trials[0], pair("a", "b"));
    }

    #[test]
    fn unknown_token_names_the_line() {
        let err = TrialSequence::<Pair>::load("a_b\n\na_z\n", 1).unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.content, "a_z");
        assert!(matches!(err.kind, ParseErrorKind::UnknownToken { .. }));
    }

    #[test]
    fn wrong_field_count() {
        let err = TrialSequence::<Pair>::load("a_b_c\n", 1).unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::WrongFieldCount {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn incomplete_block_rejects_everything() {
        let err = TrialSequence::<Pair>::load("a_b\nb_c\nc_a\n", 2).unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::BlockSizeMismatch {
                lines: 3,
                block_size: 2
            }
        );
    }

    #[test]
    fn reset_rewinds_to_the_start() {
        let mut seq = TrialSequence::<Pair>::load("a_b\nc_a\n", 1).unwrap();
        seq.start_block();
        seq.start_block();
        seq.reset();
        assert_eq!(seq.current(), None);
        assert_eq!(seq.start_block(), Some(&pair("a", "b")));
    }

    #[test]
    fn load_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.txt");
        std::fs::write(&path, "a_q\n").unwrap();

        match TrialSequence::<Pair>::load_file(&path, 1) {
            Err(LoadError::Parse { path: p, source }) => {
                assert_eq!(p, path);
                assert_eq!(source.line, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            TrialSequence::<Pair>::load_file(dir.path().join("missing.txt"), 1),
            Err(LoadError::Io { .. })
        ));
    }
}
