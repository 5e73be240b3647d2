mod builtins;
mod classification;
mod context;
mod dead_code;
mod inliner;
mod numbering;
mod scope;
mod static_context;
mod type_resolver;

use serde::Serialize;
use tracing::debug;

use crate::ast::Program;
use crate::Options;

pub use self::builtins::{Builtins, FunctionCatalogue, BUILTIN_NAMESPACES};
pub use self::classification::{classify_expressions, ExpressionClassification};
pub use self::context::Context;
pub use self::dead_code::{detect_dead_code, Diagnostic, DiagnosticKind, ReferenceMap};
pub use self::inliner::inline_functions;
pub use self::scope::{FunctionSignature, Scope, ScopeId, Variable};
pub use self::static_context::resolve_static_context;

/// Result of [analyze].
#[derive(Debug, Serialize)]
pub struct Analysis {
    pub program: Program,
    #[serde(skip)]
    pub context: Context,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs semantic analysis on a program.
///
/// Resolves the static context, classifies expressions, then optionally
/// reports dead code and inlines function calls. After inlining the static
/// context is resolved again, so all side tables describe the returned tree.
pub fn analyze(program: Program, options: &Options) -> anyhow::Result<Analysis> {
    debug!("resolving static context");
    let (program, mut context) = resolve_static_context(program, None)?;

    debug!("classifying expressions");
    classify_expressions(&program, &mut context)?;

    let diagnostics = if options.dead_code {
        debug!("detecting dead code");
        detect_dead_code(&program, &mut context)
    } else {
        Vec::new()
    };

    if !options.inline_functions {
        return Ok(Analysis {
            program,
            context,
            diagnostics,
        });
    }

    debug!("inlining functions");
    let mut program = inline_functions(program, &mut context)?;

    if options.reresolve_after_inlining {
        debug!("resolving static context of inlined program");
        let (resolved, resolved_context) = resolve_static_context(program, Some(context))?;
        program = resolved;
        context = resolved_context;
        classify_expressions(&program, &mut context)?;
    }

    Ok(Analysis {
        program,
        context,
        diagnostics,
    })
}
