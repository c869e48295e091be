//! Marker recognition.
//!
//! A line opens a group when it starts with the begin marker and closes the
//! active group when it starts with the end marker. Matching is a literal
//! byte prefix; anything after the marker on the same line is ignored.

use crate::error::{Error, Result};

/// Default prefix that opens a group.
pub const DEFAULT_BEGIN_MARKER: &str = "= BEGIN =";

/// Default prefix that closes a group.
pub const DEFAULT_END_MARKER: &str = "= END =";

/// What a source line means to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Begin,
    End,
    Data,
}

/// The pair of marker prefixes in effect for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    begin: Vec<u8>,
    end: Vec<u8>,
}

impl Markers {
    /// Build a marker pair. Both prefixes must be non-empty, otherwise every
    /// line would be a marker.
    pub fn new(begin: &str, end: &str) -> Result<Self> {
        if begin.is_empty() || end.is_empty() {
            return Err(Error::Config("markers must not be empty".to_string()));
        }
        if begin == end {
            return Err(Error::Config(format!(
                "begin and end markers are identical: {begin:?}"
            )));
        }
        Ok(Self {
            begin: begin.as_bytes().to_vec(),
            end: end.as_bytes().to_vec(),
        })
    }

    /// Classify one raw line (terminator included or not).
    ///
    /// The begin marker is checked first.
    pub fn classify(&self, line: &[u8]) -> LineKind {
        if line.starts_with(&self.begin) {
            LineKind::Begin
        } else if line.starts_with(&self.end) {
            LineKind::End
        } else {
            LineKind::Data
        }
    }
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            begin: DEFAULT_BEGIN_MARKER.as_bytes().to_vec(),
            end: DEFAULT_END_MARKER.as_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_markers() {
        assert!(Markers::new("", "= END =").is_err());
        assert!(Markers::new("= BEGIN =", "").is_err());
    }

    #[test]
    fn rejects_identical_markers() {
        assert!(Markers::new("##", "##").is_err());
    }

    #[test]
    fn begin_wins_when_it_prefixes_end() {
        let markers = Markers::new("--", "--end").unwrap();
        assert_eq!(markers.classify(b"--end\n"), LineKind::Begin);
    }
}
