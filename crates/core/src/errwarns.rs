use std::fmt;

use thiserror::Error;

/// Error raised while building or optimizing an object.
///
/// Errors are not thrown across the core; they are reported into an
/// [`Errwarns`] sink keyed by source line so processing can continue and
/// the user sees as many real problems as possible in one run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("{0}")]
    Value(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("expression is not absolute: {0}")]
    NotAbsolute(String),
    #[error("expression too complex: {0}")]
    TooComplex(String),
    #[error("expression is not constant: {0}")]
    NotConstant(String),
    #[error("failed to read '{path}': {message}")]
    Io { path: String, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Fatal errors abort the current pass immediately instead of letting
    /// the caller accumulate further diagnostics.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Internal(_))
    }
}

impl From<obelisk_num::NumError> for CoreError {
    fn from(err: obelisk_num::NumError) -> Self {
        // Width/bounds misuse of the byte primitives is a core bug, not a
        // user error.
        CoreError::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnKind {
    General,
    UnrecognizedChar,
    Preproc,
    OrphanLabel,
    UninitContents,
    SizeOverflow,
    ImplicitSizeOverride,
}

impl fmt::Display for WarnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarnKind::General => "general",
            WarnKind::UnrecognizedChar => "unrecognized-char",
            WarnKind::Preproc => "preproc",
            WarnKind::OrphanLabel => "orphan-label",
            WarnKind::UninitContents => "uninit-contents",
            WarnKind::SizeOverflow => "size-overflow",
            WarnKind::ImplicitSizeOverride => "implicit-size-override",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub line: u64,
    pub data: EntryData,
}

#[derive(Debug, Clone)]
pub enum EntryData {
    Error(CoreError),
    Warning(WarnKind, String),
}

impl Entry {
    pub fn message(&self) -> String {
        match &self.data {
            EntryData::Error(err) => err.to_string(),
            EntryData::Warning(_, message) => message.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.data, EntryData::Error(_))
    }
}

/// Per-source-line ordered collection of errors and warnings.
#[derive(Debug, Default)]
pub struct Errwarns {
    entries: Vec<Entry>,
    num_errors: usize,
}

impl Errwarns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn propagate(&mut self, line: u64, error: CoreError) {
        self.num_errors += 1;
        self.entries.push(Entry {
            line,
            data: EntryData::Error(error),
        });
    }

    pub fn warn(&mut self, line: u64, kind: WarnKind, message: impl Into<String>) {
        self.entries.push(Entry {
            line,
            data: EntryData::Warning(kind, message.into()),
        });
    }

    pub fn num_errors(&self) -> usize {
        self.num_errors
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were reported.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entries sorted by source line (stable, so same-line entries keep
    /// their reporting order).
    pub fn sorted(&self) -> Vec<&Entry> {
        let mut sorted: Vec<&Entry> = self.entries.iter().collect();
        sorted.sort_by_key(|entry| entry.line);
        sorted
    }

    pub fn errors(&self) -> impl Iterator<Item = (u64, &CoreError)> {
        self.entries.iter().filter_map(|entry| match &entry.data {
            EntryData::Error(err) => Some((entry.line, err)),
            EntryData::Warning(..) => None,
        })
    }

    pub fn warnings(&self) -> impl Iterator<Item = (u64, WarnKind, &str)> {
        self.entries.iter().filter_map(|entry| match &entry.data {
            EntryData::Warning(kind, message) => Some((entry.line, *kind, message.as_str())),
            EntryData::Error(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_errors_but_not_warnings() {
        let mut errwarns = Errwarns::new();
        errwarns.warn(1, WarnKind::General, "something odd");
        errwarns.propagate(2, CoreError::Value("bad value".into()));
        assert_eq!(errwarns.num_errors(), 1);
        assert_eq!(errwarns.entries().len(), 2);
    }

    #[test]
    fn sorted_is_stable_by_line() {
        let mut errwarns = Errwarns::new();
        errwarns.propagate(5, CoreError::Value("first".into()));
        errwarns.propagate(2, CoreError::Value("second".into()));
        errwarns.propagate(5, CoreError::Value("third".into()));
        let lines: Vec<u64> = errwarns.sorted().iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 5, 5]);
        assert_eq!(errwarns.sorted()[1].message(), "first");
    }
}
