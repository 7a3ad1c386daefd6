use colored::Colorize;

/// A single line-tagged finding. Everything user-facing that goes wrong,
/// from a parse error to an uninitialized variable, becomes one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub message: String,
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on line {}", self.message, self.line)
    }
}

/// Sink the compiler phases report into. Collected rather than printed
/// eagerly so a single run can surface every finding before exiting.
#[derive(Debug, Default)]
pub struct Diagnostics {
    reported: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, line: u32, message: impl Into<String>) {
        self.reported.push(Diagnostic {
            line,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.reported.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.reported.iter()
    }

    pub fn print_all(&self, origin: &crate::frontend::SourceFileOrigin) {
        for diagnostic in &self.reported {
            eprintln!(
                "{} {} ({}:{})",
                "error:".red().bold(),
                diagnostic.message,
                origin,
                diagnostic.line
            );
        }
    }
}
