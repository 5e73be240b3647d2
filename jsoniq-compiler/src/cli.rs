use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Parser};

use crate::{analyze, format_error, from_json, from_yaml, to_yaml, Options};

/// Entrypoint called by [main]
#[derive(Parser)]
#[clap(name = env!("CARGO_PKG_NAME"), about, version)]
pub enum Cli {
    /// Analyze a program and report unused bindings and object keys
    Analyze(CommandIO),
    /// Print a program after its function calls are inlined
    Inline(CommandIO),
}

#[derive(Args)]
pub struct CommandIO {
    /// Serialized program, YAML or JSON by extension. Read as YAML from stdin when omitted.
    input: Option<PathBuf>,

    /// Query text the program was parsed from, used to point at errors
    #[clap(long)]
    source: Option<PathBuf>,

    /// Do not report unused bindings and object keys
    #[clap(long)]
    no_dead_code: bool,
}

impl Cli {
    pub fn run(&self) -> Result<()> {
        let (io, options) = match self {
            Cli::Analyze(io) => (io, Options::default().no_inlining()),
            Cli::Inline(io) => (io, Options::default()),
        };
        let options = if io.no_dead_code {
            options.no_dead_code()
        } else {
            options
        };

        let program = io.read_program()?;
        let analysis = analyze(program, &options).map_err(|e| io.render_error(e))?;

        match self {
            Cli::Analyze(_) => {
                for diagnostic in &analysis.diagnostics {
                    println!("warning: {diagnostic}");
                }
                let body = analysis.program.main.body.as_ref();
                if let Some(class) = analysis.context.classification_of(body.and_then(|b| b.id)) {
                    println!("main module is {class}");
                }
            }
            Cli::Inline(_) => print!("{}", to_yaml(&analysis.program)?),
        }
        Ok(())
    }
}

impl CommandIO {
    fn read_program(&self) -> Result<crate::ast::Program> {
        match &self.input {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                match path.extension().and_then(|e| e.to_str()) {
                    Some("json") => from_json(&text),
                    _ => from_yaml(&text),
                }
            }
            None => {
                let mut text = String::new();
                io::stdin().read_to_string(&mut text)?;
                from_yaml(&text)
            }
        }
    }

    /// Points at the error in the query text, when one was given.
    fn render_error(&self, error: anyhow::Error) -> anyhow::Error {
        let path = match &self.source {
            Some(path) => path,
            None => return error,
        };
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(_) => return error,
        };

        let color = atty::is(atty::Stream::Stderr);
        let (message, _) = format_error(error, &path.to_string_lossy(), &source, color);
        anyhow!(message)
    }
}
