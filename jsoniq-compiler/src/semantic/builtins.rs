//! Catalogue of built-in functions.
//!
//! The semantic passes only need signatures, so built-ins are described by
//! their parameter and return types.

use std::collections::HashMap;

use super::scope::FunctionSignature;
use crate::ast::{FunctionIdentifier, Name, SequenceType};

/// Namespaces whose functions are looked up in the built-in catalogue, besides the default one.
pub const BUILTIN_NAMESPACES: [&str; 3] = [
    "http://www.w3.org/2005/xpath-functions",
    "http://jsoniq.org/functions",
    "http://www.w3.org/2005/xpath-functions/math",
];

pub trait FunctionCatalogue {
    fn lookup(&self, id: &FunctionIdentifier) -> Option<FunctionSignature>;
}

pub struct Builtins {
    functions: HashMap<(String, usize), FunctionSignature>,
}

/// `(local name, parameter types, return type)`
const SIGNATURES: &[(&str, &[&str], &str)] = &[
    // sequences
    ("count", &["item*"], "integer"),
    ("empty", &["item*"], "boolean"),
    ("exists", &["item*"], "boolean"),
    ("head", &["item*"], "item?"),
    ("tail", &["item*"], "item*"),
    ("reverse", &["item*"], "item*"),
    ("subsequence", &["item*", "double"], "item*"),
    ("subsequence", &["item*", "double", "double"], "item*"),
    ("insert-before", &["item*", "integer", "item*"], "item*"),
    ("remove", &["item*", "integer"], "item*"),
    ("distinct-values", &["atomic*"], "atomic*"),
    ("index-of", &["atomic*", "atomic"], "integer*"),
    ("deep-equal", &["item*", "item*"], "boolean"),
    ("exactly-one", &["item*"], "item"),
    ("zero-or-one", &["item*"], "item?"),
    ("one-or-more", &["item*"], "item+"),
    ("unordered", &["item*"], "item*"),
    // aggregates
    ("sum", &["atomic*"], "atomic?"),
    ("sum", &["atomic*", "atomic?"], "atomic?"),
    ("avg", &["atomic*"], "atomic?"),
    ("min", &["atomic*"], "atomic?"),
    ("max", &["atomic*"], "atomic?"),
    // booleans
    ("true", &[], "boolean"),
    ("false", &[], "boolean"),
    ("not", &["item*"], "boolean"),
    ("boolean", &["item*"], "boolean"),
    // atomics
    ("data", &["item*"], "atomic*"),
    ("string", &["item?"], "string"),
    ("number", &["atomic?"], "double"),
    ("abs", &["atomic?"], "atomic?"),
    ("ceiling", &["atomic?"], "atomic?"),
    ("floor", &["atomic?"], "atomic?"),
    ("round", &["atomic?"], "atomic?"),
    ("round", &["atomic?", "integer"], "atomic?"),
    // strings
    ("concat", &["atomic?", "atomic?"], "string"),
    ("concat", &["atomic?", "atomic?", "atomic?"], "string"),
    ("string-join", &["string*"], "string"),
    ("string-join", &["string*", "string"], "string"),
    ("string-length", &["string?"], "integer"),
    ("substring", &["string?", "double"], "string"),
    ("substring", &["string?", "double", "double"], "string"),
    ("substring-before", &["string?", "string?"], "string"),
    ("substring-after", &["string?", "string?"], "string"),
    ("upper-case", &["string?"], "string"),
    ("lower-case", &["string?"], "string"),
    ("normalize-space", &["string?"], "string"),
    ("contains", &["string?", "string?"], "boolean"),
    ("starts-with", &["string?", "string?"], "boolean"),
    ("ends-with", &["string?", "string?"], "boolean"),
    ("matches", &["string?", "string"], "boolean"),
    ("replace", &["string?", "string", "string"], "string"),
    ("tokenize", &["string?", "string"], "string*"),
    // json
    ("keys", &["item*"], "string*"),
    ("members", &["item*"], "item*"),
    ("values", &["item*"], "item*"),
    ("size", &["array?"], "integer?"),
    ("flatten", &["item*"], "item*"),
    ("project", &["item*", "string*"], "item*"),
    ("remove-keys", &["item*", "string*"], "item*"),
    ("accumulate", &["item*"], "object"),
    ("descendant-objects", &["item*"], "object*"),
    ("descendant-pairs", &["item*"], "object*"),
    ("null", &[], "null"),
    ("is-null", &["item"], "boolean"),
    ("json-doc", &["string?"], "json-item?"),
    ("json-file", &["string"], "item*"),
    ("json-lines", &["string"], "item*"),
    ("parse-json", &["string?"], "json-item?"),
    ("serialize", &["item*"], "string"),
    // focus
    ("position", &[], "integer"),
    ("last", &[], "integer"),
    // dates
    ("current-dateTime", &[], "dateTime"),
    ("current-date", &[], "date"),
    ("current-time", &[], "time"),
    // errors
    ("error", &[], "item*"),
    ("error", &["atomic?"], "item*"),
    ("error", &["atomic?", "string"], "item*"),
    ("error", &["atomic?", "string", "item*"], "item*"),
    ("trace", &["item*", "string"], "item*"),
];

impl Default for Builtins {
    fn default() -> Self {
        let functions = SIGNATURES
            .iter()
            .map(|(name, params, return_ty)| {
                let signature = FunctionSignature {
                    params: params.iter().map(|p| parse_type(p)).collect(),
                    return_ty: parse_type(return_ty),
                    updating: false,
                };
                ((name.to_string(), params.len()), signature)
            })
            .collect();

        Builtins { functions }
    }
}

fn parse_type(source: &str) -> SequenceType {
    source.parse().unwrap_or_else(|_| SequenceType::item_star())
}

impl FunctionCatalogue for Builtins {
    fn lookup(&self, id: &FunctionIdentifier) -> Option<FunctionSignature> {
        if !is_builtin_namespace(&id.name) {
            return None;
        }
        self.functions
            .get(&(id.name.local.clone(), id.arity))
            .cloned()
    }
}

fn is_builtin_namespace(name: &Name) -> bool {
    match &name.namespace {
        None => true,
        Some(namespace) => BUILTIN_NAMESPACES.contains(&namespace.as_str()),
    }
}

/// Calls to `error` never return, so they are compatible with updating expressions.
pub fn is_error_function(id: &FunctionIdentifier) -> bool {
    is_builtin_namespace(&id.name) && id.name.local == "error"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Arity, AtomicType};

    #[test]
    fn test_lookup() {
        let builtins = Builtins::default();

        let count = builtins.lookup(&FunctionIdentifier::new("count", 1)).unwrap();
        assert_eq!(
            count.return_ty,
            SequenceType::new(AtomicType::Integer, Arity::ExactlyOne)
        );

        let qualified = Name::qualified("http://www.w3.org/2005/xpath-functions", "count");
        assert!(builtins
            .lookup(&FunctionIdentifier::new(qualified, 1))
            .is_some());

        assert!(builtins.lookup(&FunctionIdentifier::new("count", 2)).is_none());
        let foreign = Name::qualified("http://example.com", "count");
        assert!(builtins.lookup(&FunctionIdentifier::new(foreign, 1)).is_none());
    }

    #[test]
    fn test_signatures_parse() {
        for (name, params, return_ty) in SIGNATURES {
            for ty in params.iter().chain([return_ty]) {
                assert!(ty.parse::<SequenceType>().is_ok(), "{name}: {ty}");
            }
        }
    }
}
