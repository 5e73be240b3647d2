use std::collections::HashSet;

use anyhow::Result;

use super::{Context, ScopeId};
use crate::ast::*;
use crate::error::{Error, Reason, Span, WithErrorInfo};

/// Registers the type declarations of a prolog.
///
/// All names are registered before any definition is checked, so declarations
/// may refer to types declared after them.
pub fn declare_types(context: &mut Context, scope: ScopeId, declarations: &[&TypeDecl]) -> Result<()> {
    for decl in declarations {
        let types = &mut context.scope_mut(scope).types;
        if types.contains_key(&decl.name) {
            return Err(Error::new(Reason::DuplicateDeclaration {
                what: "type",
                name: decl.name.to_string(),
            })
            .with_span(decl.span)
            .into());
        }
        types.insert(decl.name.clone(), decl.definition.clone());
    }

    for decl in declarations {
        for member in decl.definition.members() {
            resolve_item_type(context, scope, member, decl.span)?;
        }
        ensure_acyclic(context, scope, decl)?;
    }
    Ok(())
}

/// Follows the base types of a derived type and fails if it leads back to a type already seen.
fn ensure_acyclic(context: &Context, scope: ScopeId, decl: &TypeDecl) -> Result<(), Error> {
    let mut seen = HashSet::from([&decl.name]);
    let mut current = &decl.definition;

    while let TypeDefinition::Derived {
        base: ItemType::Named(base),
    } = current
    {
        if !seen.insert(base) {
            return Err(Error::new(Reason::CyclicTypeDefinition {
                name: decl.name.clone(),
            })
            .with_span(decl.span));
        }
        match context.lookup_type(scope, base) {
            Some(definition) => current = definition,
            None => break,
        }
    }
    Ok(())
}

pub fn resolve_item_type(
    context: &Context,
    scope: ScopeId,
    item: &ItemType,
    span: Option<Span>,
) -> Result<(), Error> {
    if let Some(name) = item.referenced_name() {
        if context.lookup_type(scope, name).is_none() {
            return Err(Error::new(Reason::UnresolvedType { name: name.clone() }).with_span(span));
        }
    }
    Ok(())
}

/// Checks that a declared sequence type only mentions types in scope.
pub fn resolve_sequence_type(
    context: &Context,
    scope: ScopeId,
    ty: Option<&SequenceType>,
    span: Option<Span>,
) -> Result<Option<SequenceType>, Error> {
    match ty {
        Some(ty) => {
            resolve_item_type(context, scope, &ty.item, span)?;
            Ok(Some(ty.clone()))
        }
        None => Ok(None),
    }
}

pub fn type_of_literal(literal: &Literal) -> SequenceType {
    let atomic = match literal {
        Literal::Null => AtomicType::Null,
        Literal::Integer(_) => AtomicType::Integer,
        Literal::Decimal(_) => AtomicType::Decimal,
        Literal::Double(_) => AtomicType::Double,
        Literal::String(_) => AtomicType::String,
        Literal::Boolean(_) => AtomicType::Boolean,
    };
    SequenceType::new(atomic, Arity::ExactlyOne)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, definition: TypeDefinition) -> TypeDecl {
        TypeDecl {
            name: name.into(),
            definition,
            span: None,
        }
    }

    fn derived(base: &str) -> TypeDefinition {
        TypeDefinition::Derived {
            base: base.parse().unwrap(),
        }
    }

    #[test]
    fn test_forward_references() {
        let mut context = Context::default();
        let scope = context.new_scope(None);

        let person = decl(
            "person",
            TypeDefinition::Object {
                fields: vec![FieldDescriptor {
                    name: "address".to_string(),
                    ty: "address".parse().unwrap(),
                    required: true,
                }],
                closed: false,
            },
        );
        let address = decl("address", derived("string"));

        declare_types(&mut context, scope, &[&person, &address]).unwrap();
        assert!(context.lookup_type(scope, &"person".into()).is_some());
    }

    #[test]
    fn test_unknown_member() {
        let mut context = Context::default();
        let scope = context.new_scope(None);

        let list = decl(
            "list",
            TypeDefinition::Array {
                members: "missing".parse().unwrap(),
            },
        );
        let err = declare_types(&mut context, scope, &[&list]).unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert_eq!(
            err.reason,
            Reason::UnresolvedType {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn test_cyclic_derivation() {
        let mut context = Context::default();
        let scope = context.new_scope(None);

        let a = decl("a", derived("b"));
        let b = decl("b", derived("a"));
        let err = declare_types(&mut context, scope, &[&a, &b]).unwrap_err();
        assert_eq!(err.downcast::<Error>().unwrap().reason.code(), "XQST0054");

        let mut context = Context::default();
        let scope = context.new_scope(None);
        let c = decl("c", derived("d"));
        let d = decl("d", derived("integer"));
        declare_types(&mut context, scope, &[&c, &d]).unwrap();
    }

    #[test]
    fn test_duplicate_type() {
        let mut context = Context::default();
        let scope = context.new_scope(None);

        let a = decl("a", derived("string"));
        let err = declare_types(&mut context, scope, &[&a, &a]).unwrap_err();
        assert_eq!(err.downcast::<Error>().unwrap().reason.code(), "XQST0049");
    }
}
