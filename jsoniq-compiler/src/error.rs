use ariadne::{Config, Label, Report, ReportKind, Source};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};

use crate::ast::{FunctionIdentifier, Name};

/// Byte range within the original query text.
#[derive(Clone, PartialEq, Eq, Copy, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub span: Option<Span>,
    pub reason: Reason,
    pub help: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    UndeclaredVariable {
        name: Name,
    },
    UndeclaredFunction {
        function: FunctionIdentifier,
    },
    UnresolvedType {
        name: Name,
    },
    /// A node was looked up in the side tables before the static-context pass attached a scope to it.
    MissingContext,
    ModuleNotFound {
        namespace: String,
    },
    DuplicateDeclaration {
        what: &'static str,
        name: String,
    },
    CyclicTypeDefinition {
        name: Name,
    },
    InvalidUpdatingPosition {
        construct: String,
        expected: &'static str,
        found: String,
    },
    UpdatingEncapsulationViolation {
        construct: String,
    },
}

impl Error {
    pub fn new(reason: Reason) -> Self {
        Error {
            span: None,
            reason,
            help: None,
        }
    }
}

impl Reason {
    /// JSONiq / XQuery error code that corresponds to this reason.
    pub fn code(&self) -> &'static str {
        match self {
            Reason::UndeclaredVariable { .. } => "XPST0008",
            Reason::UndeclaredFunction { .. } => "XPST0017",
            Reason::UnresolvedType { .. } => "XPST0051",
            Reason::MissingContext => "XPST0001",
            Reason::ModuleNotFound { .. } => "XQST0059",
            Reason::DuplicateDeclaration { what, .. } if *what == "function" => "XQST0034",
            Reason::DuplicateDeclaration { .. } => "XQST0049",
            Reason::CyclicTypeDefinition { .. } => "XQST0054",
            Reason::InvalidUpdatingPosition { .. } => "XUST0001",
            Reason::UpdatingEncapsulationViolation { .. } => "XUST0002",
        }
    }

    fn message(&self) -> String {
        match self {
            Reason::UndeclaredVariable { name } => format!("variable `${name}` is not declared"),
            Reason::UndeclaredFunction { function } => {
                format!("function `{function}` is not declared")
            }
            Reason::UnresolvedType { name } => format!("type `{name}` is not declared"),
            Reason::MissingContext => "no static context is attached to this expression".to_string(),
            Reason::ModuleNotFound { namespace } => {
                format!("no library module is available for namespace `{namespace}`")
            }
            Reason::DuplicateDeclaration { what, name } => {
                format!("{what} `{name}` is declared more than once")
            }
            Reason::CyclicTypeDefinition { name } => {
                format!("type `{name}` is derived from itself")
            }
            Reason::InvalidUpdatingPosition {
                construct,
                expected,
                found,
            } => format!("{construct} expects {expected} operand, but found {found}"),
            Reason::UpdatingEncapsulationViolation { construct } => {
                format!("modify clause of {construct} must be updating or vacuous, but found simple expression")
            }
        }
    }
}

impl StdError for Error {}

// Needed for anyhow
impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.reason.code(), self.reason.message())
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "span-chars-{}-{}", self.start, self.end)
    }
}

pub trait WithErrorInfo {
    fn with_help<S: Into<String>>(self, help: S) -> Self;

    fn with_span(self, span: Option<Span>) -> Self;
}

impl WithErrorInfo for Error {
    fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }
}

impl<T> WithErrorInfo for Result<T, Error> {
    fn with_help<S: Into<String>>(self, help: S) -> Self {
        self.map_err(|e| e.with_help(help))
    }

    fn with_span(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.with_span(span))
    }
}

/// Line and column (both zero based) of the start and end of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub start: (usize, usize),
    pub end: (usize, usize),
}

/// Renders an error against the query text it was reported for.
///
/// Errors that are not compilation errors are printed as-is. The location is
/// only known when the error carries a span.
pub fn format_error(
    error: anyhow::Error,
    source_id: &str,
    source: &str,
    color: bool,
) -> (String, Option<SourceLocation>) {
    let source_id = source_id.to_string();

    let error = match error.downcast::<Error>() {
        Ok(error) => error,
        Err(error) => return (format!("{error:#?}"), None),
    };

    let message = error.to_string();
    let location = error.span.map(|span| get_location(source, span));

    // ariadne counts characters, spans count bytes
    let span = error.span.unwrap_or_default();
    let span = char_offset(source, span.start)..char_offset(source, span.end);

    let config = Config::default().with_color(color);
    let mut report = Report::build(ReportKind::Error, source_id.clone(), span.start)
        .with_config(config)
        .with_message(&message)
        .with_label(Label::new((source_id.clone(), span)).with_message(error.reason.message()));

    if let Some(help) = error.help {
        report.set_help(help);
    }

    let mut out = Vec::new();
    let written = report
        .finish()
        .write((source_id, Source::from(source)), &mut out);

    match written.ok().and_then(|_| String::from_utf8(out).ok()) {
        Some(rendered) => (rendered, location),
        None => (message, location),
    }
}

fn get_location(source: &str, span: Span) -> SourceLocation {
    SourceLocation {
        start: line_and_column(source, span.start),
        end: line_and_column(source, span.end),
    }
}

/// Characters starting before a byte offset. An offset inside a character counts that character.
fn chars_before(source: &str, offset: usize) -> impl Iterator<Item = char> + '_ {
    source
        .char_indices()
        .take_while(move |(i, _)| *i < offset)
        .map(|(_, c)| c)
}

fn char_offset(source: &str, offset: usize) -> usize {
    chars_before(source, offset).count()
}

fn line_and_column(source: &str, offset: usize) -> (usize, usize) {
    chars_before(source, offset).fold((0, 0), |(line, column), c| match c {
        '\n' => (line + 1, 0),
        _ => (line, column + 1),
    })
}
