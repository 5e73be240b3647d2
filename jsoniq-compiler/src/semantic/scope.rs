use std::collections::HashMap;
use std::fmt::Debug;

use itertools::Itertools;
use serde::Serialize;

use crate::ast::{FunctionIdentifier, Name, SequenceType, TypeDefinition};

/// Index of a [Scope] in the arena held by [super::Context].
pub type ScopeId = usize;

/// One lexical frame of the static context.
///
/// Lookups fall through to `parent`, so an entry here shadows any entry of the
/// same name further out.
#[derive(Default, Clone, Serialize)]
pub struct Scope {
    pub(super) parent: Option<ScopeId>,

    /// In-scope variables. A `None` type is inferred at runtime.
    pub(super) variables: HashMap<Name, Variable>,

    pub(super) functions: HashMap<FunctionIdentifier, FunctionSignature>,

    /// In-scope schema types, by declared name
    pub(super) types: HashMap<Name, TypeDefinition>,

    /// Namespaces of library modules merged into this frame
    pub(super) imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub ty: Option<SequenceType>,

    /// Declared in a prolog rather than bound by an expression
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSignature {
    pub params: Vec<SequenceType>,
    pub return_ty: SequenceType,
    pub updating: bool,
}

impl Scope {
    pub(super) fn child_of(parent: ScopeId) -> Self {
        Scope {
            parent: Some(parent),
            ..Default::default()
        }
    }

    pub(super) fn add_variable(&mut self, name: Name, ty: Option<SequenceType>, global: bool) {
        self.variables.insert(name, Variable { ty, global });
    }

    /// Copies everything declared in `other` into this frame. Existing entries are kept.
    pub(super) fn absorb(&mut self, other: &Scope) {
        for (name, var) in &other.variables {
            self.variables.entry(name.clone()).or_insert_with(|| var.clone());
        }
        for (id, signature) in &other.functions {
            self.functions
                .entry(id.clone())
                .or_insert_with(|| signature.clone());
        }
        for (name, definition) in &other.types {
            self.types
                .entry(name.clone())
                .or_insert_with(|| definition.clone());
        }
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn variables(&self) -> impl Iterator<Item = (&Name, &Variable)> {
        self.variables.iter()
    }

    pub fn functions(&self) -> impl Iterator<Item = (&FunctionIdentifier, &FunctionSignature)> {
        self.functions.iter()
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(parent) = self.parent {
            writeln!(f, "  parent: {parent}")?;
        }
        for (name, var) in self.variables.iter().sorted_by_key(|k| k.0) {
            let ty = var.ty.as_ref().map_or("?".to_string(), |t| t.to_string());
            writeln!(f, "  ${name:20}: {ty}")?;
        }
        for (id, signature) in self.functions.iter().sorted_by_key(|k| k.0) {
            writeln!(
                f,
                "  {:21}: ({}) as {}",
                id.to_string(),
                signature.params.iter().join(", "),
                signature.return_ty
            )?;
        }
        for name in self.types.keys().sorted() {
            writeln!(f, "  type {name}")?;
        }
        Ok(())
    }
}
