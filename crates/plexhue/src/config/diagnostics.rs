use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    NoGroups,
    UnusedScene { name: String },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Parse(ParseError),
    Validation(ValidationError),
}

/// The file is not valid TOML or doesn't match the config structure
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Range<usize>>,
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }

    pub(crate) fn validation(
        field_path: impl Into<String>,
        message: impl Into<String>,
        span: Option<Range<usize>>,
    ) -> Self {
        Diagnostic::Error(Error::Validation(ValidationError {
            field_path: field_path.into(),
            message: message.into(),
            span,
        }))
    }
}

/// All diagnostics produced while loading one config file
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub source: SourceInfo,
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(&self.source, &self.items))
    }
}

impl std::error::Error for Diagnostics {}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(source: &SourceInfo, diagnostics: &[Diagnostic]) -> String {
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(warning) => {
                let warning_msg = match warning {
                    Warning::NoGroups => format!(
                        "Warning: '{}' configures no groups; events will only be recorded\n",
                        source.file_path.display()
                    ),
                    Warning::UnusedScene { name } => {
                        format!("Warning: scene '{}' is not used by any group or light\n", name)
                    }
                };
                output.extend_from_slice(warning_msg.as_bytes());
            }
            Diagnostic::Error(Error::Parse(parse_error)) => match &parse_error.span {
                Some(span) => write_report(
                    &mut output,
                    source,
                    "Failed to parse config".to_string(),
                    span.clone(),
                    &parse_error.message,
                ),
                None => {
                    let error_msg = format!("Parse error: {}\n", parse_error.message);
                    output.extend_from_slice(error_msg.as_bytes());
                }
            },
            Diagnostic::Error(Error::Validation(validation_error)) => {
                match &validation_error.span {
                    Some(span) => write_report(
                        &mut output,
                        source,
                        format!("Invalid value for '{}'", validation_error.field_path),
                        span.clone(),
                        &validation_error.message,
                    ),
                    None => {
                        let error_msg = format!(
                            "Validation error in '{}': {}\n",
                            validation_error.field_path, validation_error.message
                        );
                        output.extend_from_slice(error_msg.as_bytes());
                    }
                }
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}

/// Render one error with a label pointing at `span` in the config source
fn write_report(
    output: &mut Vec<u8>,
    source: &SourceInfo,
    message: String,
    span: Range<usize>,
    label: &str,
) {
    use ariadne::Color;
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;
    use ariadne::Source;

    let file_id = source.file_path.to_string_lossy().to_string();

    Report::build(ReportKind::Error, (file_id.clone(), span.clone()))
        .with_message(message)
        .with_label(
            Label::new((file_id.clone(), span))
                .with_message(label)
                .with_color(Color::Red),
        )
        .finish()
        .write((file_id, Source::from(&source.content)), output)
        .ok();
}
