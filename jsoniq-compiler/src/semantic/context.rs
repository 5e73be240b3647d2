use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use itertools::Itertools;

use super::builtins::{Builtins, FunctionCatalogue};
use super::classification::ExpressionClassification;
use super::scope::{FunctionSignature, Scope, ScopeId, Variable};
use crate::ast::*;
use crate::error::{Error, Reason, Span, WithErrorInfo};

/// Static context of a compilation, together with everything the passes have
/// learned about the tree.
///
/// Scopes form a tree stored in an arena. Nodes never point to their scope;
/// annotations live in side tables keyed by node id instead.
#[derive(Clone)]
pub struct Context {
    pub(crate) scopes: Vec<Scope>,

    /// Scope each expression and statement was resolved in
    pub(crate) node_scopes: HashMap<usize, ScopeId>,

    pub(crate) static_types: HashMap<usize, SequenceType>,

    pub(crate) classifications: HashMap<usize, ExpressionClassification>,

    /// Bindings and object keys that are never read
    pub(crate) unreferenced: HashSet<usize>,

    /// Variable references that resolved to a prolog variable
    pub(crate) global_refs: HashSet<usize>,

    /// Resolved library modules, by namespace. Each is resolved at most once per compilation.
    pub(crate) modules: HashMap<String, ScopeId>,

    pub(crate) main_scope: Option<ScopeId>,

    pub(crate) next_id: usize,

    pub(crate) builtins: Arc<dyn FunctionCatalogue + Send + Sync>,
}

impl Default for Context {
    fn default() -> Self {
        Context::with_builtins(Arc::new(Builtins::default()))
    }
}

impl Context {
    pub fn with_builtins(builtins: Arc<dyn FunctionCatalogue + Send + Sync>) -> Self {
        Context {
            scopes: Vec::new(),
            node_scopes: HashMap::new(),
            static_types: HashMap::new(),
            classifications: HashMap::new(),
            unreferenced: HashSet::new(),
            global_refs: HashSet::new(),
            modules: HashMap::new(),
            main_scope: None,
            next_id: 0,
            builtins,
        }
    }

    /// Forgets all scopes, so the static-context pass can run again over a rewritten tree.
    pub(crate) fn reset_scopes(&mut self) {
        self.scopes.clear();
        self.node_scopes.clear();
        self.global_refs.clear();
        self.modules.clear();
        self.main_scope = None;
    }

    pub(crate) fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let scope = match parent {
            Some(parent) => Scope::child_of(parent),
            None => Scope::default(),
        };
        self.scopes.push(scope);
        self.scopes.len() - 1
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id]
    }

    pub(crate) fn fresh_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Scope of the main module's prolog, once resolved.
    pub fn main_scope(&self) -> Option<ScopeId> {
        self.main_scope
    }

    /// Scope attached to a node by the static-context pass.
    pub fn scope_of(&self, node: Option<usize>, span: Option<Span>) -> Result<ScopeId, Error> {
        node.and_then(|id| self.node_scopes.get(&id).copied())
            .ok_or_else(|| Error::new(Reason::MissingContext).with_span(span))
    }

    /// Walks the scope chain outwards from `scope`.
    fn chain(&self, scope: ScopeId) -> impl Iterator<Item = &Scope> {
        let mut next = Some(scope);
        std::iter::from_fn(move || {
            let scope = &self.scopes[next?];
            next = scope.parent;
            Some(scope)
        })
    }

    pub fn lookup_variable(&self, scope: ScopeId, name: &Name) -> Option<&Variable> {
        self.chain(scope).find_map(|s| s.variables.get(name))
    }

    /// Functions declared in some prolog, ignoring built-ins.
    pub fn lookup_declared_function(
        &self,
        scope: ScopeId,
        id: &FunctionIdentifier,
    ) -> Option<&FunctionSignature> {
        self.chain(scope).find_map(|s| s.functions.get(id))
    }

    pub fn lookup_function(
        &self,
        scope: ScopeId,
        id: &FunctionIdentifier,
    ) -> Option<FunctionSignature> {
        self.lookup_declared_function(scope, id)
            .cloned()
            .or_else(|| self.builtins.lookup(id))
    }

    /// Whether a call resolves to a built-in rather than a declared function.
    ///
    /// Calls that were never resolved are judged against the built-in catalogue only.
    pub fn is_builtin(&self, node: Option<usize>, id: &FunctionIdentifier) -> bool {
        let declared = match self.scope_of(node, None) {
            Ok(scope) => self.lookup_declared_function(scope, id).is_some(),
            Err(_) => false,
        };
        !declared && self.builtins.lookup(id).is_some()
    }

    pub fn lookup_type(&self, scope: ScopeId, name: &Name) -> Option<&TypeDefinition> {
        self.chain(scope).find_map(|s| s.types.get(name))
    }

    pub fn static_type_of(&self, node: Option<usize>) -> Option<&SequenceType> {
        node.and_then(|id| self.static_types.get(&id))
    }

    pub fn classification_of(&self, node: Option<usize>) -> Option<ExpressionClassification> {
        node.and_then(|id| self.classifications.get(&id).copied())
    }

    pub fn is_unreferenced(&self, node: Option<usize>) -> bool {
        node.map_or(false, |id| self.unreferenced.contains(&id))
    }

    pub fn references_global(&self, node: Option<usize>) -> bool {
        node.map_or(false, |id| self.global_refs.contains(&id))
    }

    /// Names of all variables visible from `scope`, innermost first.
    pub fn variables_in_scope(&self, scope: ScopeId) -> Vec<&Name> {
        self.chain(scope)
            .flat_map(|s| s.variables.keys().sorted())
            .unique()
            .collect()
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (id, scope) in self.scopes.iter().enumerate() {
            writeln!(f, "[{id:3}]")?;
            write!(f, "{scope:?}")?;
        }
        for (namespace, scope) in self.modules.iter().sorted() {
            writeln!(f, "module {namespace} -> [{scope}]")?;
        }
        writeln!(
            f,
            "{} scoped nodes, {} typed, {} classified, {} unreferenced",
            self.node_scopes.len(),
            self.static_types.len(),
            self.classifications.len(),
            self.unreferenced.len()
        )
    }
}
