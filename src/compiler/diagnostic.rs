use std::fmt;

use crate::compiler::source::SourceRange;

/// How severe a [`Message`] is.
///
/// Anything of severity [`Severity::Error`] causes the owning phase to
/// report failure once it has finished accumulating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Verbose,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
            Self::Verbose => "verbose",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single located diagnostic message.
///
/// The payload is formatted eagerly at push time; rendering only decides
/// presentation. Secondary messages (`primary == false`) are notes attached
/// to the preceding primary message and are rendered with a narrower gutter.
#[derive(Debug)]
pub struct Message {
    pub severity: Severity,
    pub error: anyhow::Error,
    pub primary: bool,
    pub range: SourceRange,
}

/// Append-only buffer of diagnostic [`Message`]s.
///
/// Insertion order is preserved; renderers must not reorder messages within
/// a single source range.
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<Message>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, error: impl Into<anyhow::Error>, range: SourceRange) {
        self.errors += 1;
        self.push(Severity::Error, error, true, range);
    }

    pub fn warning(&mut self, error: impl Into<anyhow::Error>, range: SourceRange) {
        self.push(Severity::Warning, error, true, range);
    }

    /// Pushes a secondary note attached to the previous primary message.
    pub fn note(&mut self, error: impl Into<anyhow::Error>, range: SourceRange) {
        self.push(Severity::Note, error, false, range);
    }

    pub fn verbose(&mut self, error: impl Into<anyhow::Error>, range: SourceRange) {
        self.push(Severity::Verbose, error, true, range);
    }

    fn push(
        &mut self,
        severity: Severity,
        error: impl Into<anyhow::Error>,
        primary: bool,
        range: SourceRange,
    ) {
        self.messages.push(Message {
            severity,
            error: error.into(),
            primary,
            range,
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn errors_are_counted() {
        let mut diagnostics = Diagnostics::new();
        assert!(!diagnostics.has_errors());

        diagnostics.warning(anyhow!("just a warning"), SourceRange::builtin());
        assert!(!diagnostics.has_errors());

        diagnostics.error(anyhow!("a real problem"), SourceRange::builtin());
        diagnostics.note(anyhow!("related to this"), SourceRange::builtin());
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.messages().len(), 3);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error(anyhow!("first"), SourceRange::builtin());
        diagnostics.error(anyhow!("second"), SourceRange::builtin());

        let rendered: Vec<_> = diagnostics
            .messages()
            .iter()
            .map(|message| message.error.to_string())
            .collect();
        assert_eq!(rendered, ["first", "second"]);
    }

    #[test]
    fn notes_are_secondary() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error(anyhow!("problem"), SourceRange::builtin());
        diagnostics.note(anyhow!("declared here"), SourceRange::builtin());
        assert!(diagnostics.messages()[0].primary);
        assert!(!diagnostics.messages()[1].primary);
    }
}
