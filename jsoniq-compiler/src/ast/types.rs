use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::Name;

/// Occurrence indicator of a sequence type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arity {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Arity {
    pub fn is_subtype_of(self, other: Arity) -> bool {
        use Arity::*;
        match (self, other) {
            (a, b) if a == b => true,
            (_, ZeroOrMore) => true,
            (ExactlyOne, _) => true,
            _ => false,
        }
    }

    pub fn allows_empty(self) -> bool {
        matches!(self, Arity::ZeroOrOne | Arity::ZeroOrMore)
    }

    fn symbol(self) -> &'static str {
        match self {
            Arity::ExactlyOne => "",
            Arity::ZeroOrOne => "?",
            Arity::ZeroOrMore => "*",
            Arity::OneOrMore => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, strum::Display, AsRefStr)]
pub enum AtomicType {
    #[strum(to_string = "anyAtomicType", serialize = "atomic")]
    AnyAtomic,
    #[strum(serialize = "string")]
    String,
    #[strum(serialize = "anyURI")]
    AnyUri,
    #[strum(serialize = "boolean")]
    Boolean,
    #[strum(serialize = "null")]
    Null,
    #[strum(serialize = "decimal")]
    Decimal,
    #[strum(serialize = "integer")]
    Integer,
    #[strum(serialize = "double")]
    Double,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "date")]
    Date,
    #[strum(serialize = "time")]
    Time,
    #[strum(serialize = "dateTime")]
    DateTime,
    #[strum(serialize = "duration")]
    Duration,
    #[strum(serialize = "base64Binary")]
    Base64Binary,
    #[strum(serialize = "hexBinary")]
    HexBinary,
}

impl AtomicType {
    pub fn is_subtype_of(self, other: AtomicType) -> bool {
        self == other
            || other == AtomicType::AnyAtomic
            || (self == AtomicType::Integer && other == AtomicType::Decimal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemType {
    Item,
    JsonItem,
    Object,
    Array,
    Function,
    Atomic(AtomicType),
    /// Reference to a type declared in some prolog. Must be resolved against the type catalogue.
    Named(Name),
}

impl ItemType {
    pub fn is_subtype_of(&self, other: &ItemType) -> bool {
        match (self, other) {
            (_, ItemType::Item) => true,
            (a, b) if a == b => true,
            (ItemType::Object | ItemType::Array, ItemType::JsonItem) => true,
            (ItemType::Atomic(a), ItemType::Atomic(b)) => a.is_subtype_of(*b),
            _ => false,
        }
    }

    /// Names of declared types this item type refers to.
    pub fn referenced_name(&self) -> Option<&Name> {
        match self {
            ItemType::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl From<AtomicType> for ItemType {
    fn from(atomic: AtomicType) -> Self {
        ItemType::Atomic(atomic)
    }
}

/// An item type paired with its occurrence indicator, such as `integer?`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SequenceType {
    pub item: ItemType,
    pub arity: Arity,
}

impl SequenceType {
    pub fn new<I: Into<ItemType>>(item: I, arity: Arity) -> Self {
        SequenceType {
            item: item.into(),
            arity,
        }
    }

    /// `item*`, the type of anything whose type was not declared.
    pub fn item_star() -> Self {
        SequenceType::new(ItemType::Item, Arity::ZeroOrMore)
    }

    pub fn integer() -> Self {
        SequenceType::new(AtomicType::Integer, Arity::ExactlyOne)
    }

    pub fn is_subtype_of(&self, other: &SequenceType) -> bool {
        self.item.is_subtype_of(&other.item) && self.arity.is_subtype_of(other.arity)
    }

    pub fn with_arity(&self, arity: Arity) -> Self {
        SequenceType {
            item: self.item.clone(),
            arity,
        }
    }
}

/// Body of a `declare type` declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDefinition {
    /// Atomic or user type restricted from a base type.
    Derived { base: ItemType },
    Object {
        fields: Vec<FieldDescriptor>,
        #[serde(default)]
        closed: bool,
    },
    Array { members: ItemType },
    Union { members: Vec<ItemType> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: ItemType,
    #[serde(default)]
    pub required: bool,
}

impl TypeDefinition {
    /// All item types this definition mentions.
    pub fn members(&self) -> Vec<&ItemType> {
        match self {
            TypeDefinition::Derived { base } => vec![base],
            TypeDefinition::Object { fields, .. } => fields.iter().map(|f| &f.ty).collect(),
            TypeDefinition::Array { members } => vec![members],
            TypeDefinition::Union { members } => members.iter().collect(),
        }
    }
}

impl FromStr for ItemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unprefixed = s.strip_prefix("xs:").unwrap_or(s);

        Ok(match unprefixed {
            "" => bail!("empty item type"),
            "item" => ItemType::Item,
            "json-item" => ItemType::JsonItem,
            "object" => ItemType::Object,
            "array" => ItemType::Array,
            "function" | "function(*)" => ItemType::Function,
            name => match AtomicType::from_str(name) {
                Ok(atomic) => ItemType::Atomic(atomic),
                Err(_) => ItemType::Named(Name::from(s)),
            },
        })
    }
}

impl FromStr for SequenceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (item, arity) = match s.chars().last() {
            Some('?') => (&s[..s.len() - 1], Arity::ZeroOrOne),
            Some('*') if s != "function(*)" => (&s[..s.len() - 1], Arity::ZeroOrMore),
            Some('+') => (&s[..s.len() - 1], Arity::OneOrMore),
            Some(_) => (s, Arity::ExactlyOne),
            None => return Err(anyhow!("empty sequence type")),
        };

        Ok(SequenceType {
            item: item.parse()?,
            arity,
        })
    }
}

impl Display for ItemType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Item => f.write_str("item"),
            ItemType::JsonItem => f.write_str("json-item"),
            ItemType::Object => f.write_str("object"),
            ItemType::Array => f.write_str("array"),
            ItemType::Function => f.write_str("function(*)"),
            ItemType::Atomic(atomic) => write!(f, "{atomic}"),
            ItemType::Named(name) => write!(f, "{name}"),
        }
    }
}

impl Display for SequenceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.item, self.arity.symbol())
    }
}

impl TryFrom<String> for SequenceType {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SequenceType> for String {
    fn from(ty: SequenceType) -> Self {
        ty.to_string()
    }
}

impl Serialize for ItemType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_print() {
        for source in ["integer?", "object*", "item+", "function(*)", "anyURI", "json-item*"] {
            let ty: SequenceType = source.parse().unwrap();
            assert_eq!(ty.to_string(), source);
        }

        let ty: SequenceType = "xs:double?".parse().unwrap();
        assert_eq!(ty, SequenceType::new(AtomicType::Double, Arity::ZeroOrOne));

        let ty: SequenceType = "Q{http://example.com/types}person*".parse().unwrap();
        assert_eq!(
            ty.item,
            ItemType::Named(Name::qualified("http://example.com/types", "person"))
        );
        assert_eq!(ty.arity, Arity::ZeroOrMore);

        assert!("".parse::<SequenceType>().is_err());
        assert!("?".parse::<SequenceType>().is_err());
    }

    #[test]
    fn test_arity_lattice() {
        use Arity::*;

        assert!(ExactlyOne.is_subtype_of(ZeroOrOne));
        assert!(ExactlyOne.is_subtype_of(OneOrMore));
        assert!(ZeroOrOne.is_subtype_of(ZeroOrMore));
        assert!(OneOrMore.is_subtype_of(ZeroOrMore));
        assert!(!ZeroOrOne.is_subtype_of(OneOrMore));
        assert!(!OneOrMore.is_subtype_of(ZeroOrOne));
        assert!(!ZeroOrMore.is_subtype_of(ExactlyOne));
    }

    #[test]
    fn test_item_type_lattice() {
        let integer: SequenceType = "integer".parse().unwrap();
        let decimal: SequenceType = "decimal?".parse().unwrap();
        let double: SequenceType = "double?".parse().unwrap();

        assert!(integer.is_subtype_of(&decimal));
        assert!(!decimal.is_subtype_of(&integer));
        assert!(!integer.is_subtype_of(&double));
        assert!(integer.is_subtype_of(&"atomic*".parse().unwrap()));
        assert!(ItemType::Object.is_subtype_of(&ItemType::JsonItem));
        assert!(!ItemType::Function.is_subtype_of(&ItemType::JsonItem));
        assert!(ItemType::Function.is_subtype_of(&ItemType::Item));
    }
}
