//! Static analysis core of a JSONiq compiler.
//!
//! Takes a parsed program (main module plus library modules) and runs the
//! semantic passes over it: static-context resolution, classification of
//! updating expressions, dead-code detection and function inlining.
//!
//! Programs are exchanged as serialized ASTs, see [from_yaml] and [from_json].

pub mod ast;
#[cfg(feature = "cli")]
mod cli;
mod error;
mod options;
pub mod semantic;

pub use anyhow::Result;
#[cfg(feature = "cli")]
pub use cli::Cli;
pub use error::{format_error, Error, Reason, SourceLocation, Span, WithErrorInfo};
pub use options::Options;
pub use semantic::{analyze, Analysis};

use ast::Program;

/// Analyzes a program serialized as YAML, with default options.
pub fn compile(yaml: &str) -> Result<Analysis> {
    analyze(from_yaml(yaml)?, &Options::default())
}

pub fn from_yaml(yaml: &str) -> Result<Program> {
    Ok(serde_yaml::from_str(yaml)?)
}

pub fn from_json(json: &str) -> Result<Program> {
    Ok(serde_json::from_str(json)?)
}

pub fn to_yaml(program: &Program) -> Result<String> {
    Ok(serde_yaml::to_string(program)?)
}

pub fn to_json(program: &Program) -> Result<String> {
    Ok(serde_json::to_string(program)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_and_yaml_agree() {
        let yaml = r#"
        main:
          body:
            Expr:
              FunctionCall:
                name: count
                args:
                  - Comma: []
        "#;
        let program = from_yaml(yaml).unwrap();
        let json = to_json(&program).unwrap();
        assert_eq!(from_json(&json).unwrap(), program);

        let analysis = compile(yaml).unwrap();
        assert!(analysis.diagnostics.is_empty());
    }
}
