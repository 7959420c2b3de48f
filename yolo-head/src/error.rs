use crate::common::*;

/// Signals that a tensor's shape disagrees with the head configuration.
///
/// Shape mismatches are programming or data-preparation errors; they
/// are reported immediately and never recovered from. The error is
/// carried inside [`anyhow::Error`] so callers can downcast when they
/// need to distinguish it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    what: &'static str,
    expected: String,
    found: String,
}

impl ShapeError {
    pub fn new(what: &'static str, expected: impl ToString, found: impl ToString) -> Self {
        Self {
            what,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn what(&self) -> &str {
        self.what
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, found {}",
            self.what, self.expected, self.found
        )
    }
}

impl std::error::Error for ShapeError {}
