use std::fmt;

use crate::datatype::Value;
use crate::error::{GraftError, Result};
use crate::record::{AttributeMap, KeyTuple};

/// A combinable filter expression over record attributes: per-attribute
/// equality tests joined by AND, OR and NOT.
///
/// This is deliberately not a query language. The only leaf is exact
/// equality on a key-eligible value, which is all identity-by-attribute
/// matching needs.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Predicate {
    Equals { attribute: String, value: Value },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// An exact-equality test on one attribute. Only text and numeric
    /// values can be matched on; anything else is a configuration mistake.
    pub fn equals(attribute: &str, value: Value) -> Result<Predicate> {
        if !value.kind().key_eligible() {
            return Err(GraftError::Config(format!(
                "attribute '{}' holds a {} value, which cannot be matched on",
                attribute,
                value.kind()
            )));
        }
        Ok(Predicate::Equals {
            attribute: attribute.to_owned(),
            value,
        })
    }
    pub fn all_of(predicates: Vec<Predicate>) -> Result<Predicate> {
        if predicates.is_empty() {
            return Err(GraftError::Config(
                "refusing to build a predicate over no attributes, \
                 which would match everything"
                    .to_owned(),
            ));
        }
        Ok(Predicate::All(predicates))
    }
    pub fn any_of(predicates: Vec<Predicate>) -> Result<Predicate> {
        if predicates.is_empty() {
            return Err(GraftError::Config(
                "refusing to build a predicate over no attributes, \
                 which would match everything"
                    .to_owned(),
            ));
        }
        Ok(Predicate::Any(predicates))
    }
    pub fn negated(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// The conjunction of equality tests for a candidate's unique-key
    /// values. An empty map fails fast rather than matching everything.
    pub fn key_match(key_values: &AttributeMap) -> Result<Predicate> {
        if key_values.is_empty() {
            return Err(GraftError::Config(
                "no unique-key values given, nothing to match on".to_owned(),
            ));
        }
        let mut tests = Vec::with_capacity(key_values.len());
        // deterministic predicate shape regardless of map iteration order
        let mut names: Vec<&String> = key_values.keys().collect();
        names.sort_unstable();
        for name in names {
            tests.push(Predicate::equals(name, key_values[name].clone())?);
        }
        if tests.len() == 1 {
            Ok(tests.remove(0))
        } else {
            Predicate::all_of(tests)
        }
    }

    /// Evaluate against an attribute map. Equality is exact for both text
    /// and numeric values; a missing attribute never matches.
    pub fn matches(&self, attributes: &AttributeMap) -> bool {
        match self {
            Predicate::Equals { attribute, value } => {
                attributes.get(attribute) == Some(value)
            }
            Predicate::All(predicates) => predicates.iter().all(|p| p.matches(attributes)),
            Predicate::Any(predicates) => predicates.iter().any(|p| p.matches(attributes)),
            Predicate::Not(predicate) => !predicate.matches(attributes),
        }
    }

    /// When this predicate is exactly an equality conjunction over the
    /// declared unique-key attributes, produce the key tuple it matches,
    /// in declared key order. Lets the store answer key lookups from its
    /// key index instead of scanning.
    pub fn as_key_tuple(&self, key_attributes: Option<&[String]>) -> Option<KeyTuple> {
        let key_attributes = key_attributes?;
        let mut pairs = Vec::new();
        if !self.collect_equalities(&mut pairs) {
            return None;
        }
        if pairs.len() != key_attributes.len() {
            return None;
        }
        let mut values = Vec::with_capacity(key_attributes.len());
        for key_attribute in key_attributes {
            let (_, value) = pairs
                .iter()
                .find(|(name, _)| *name == key_attribute.as_str())?;
            values.push((*value).clone());
        }
        Some(KeyTuple::new(values))
    }

    fn collect_equalities<'a>(&'a self, out: &mut Vec<(&'a str, &'a Value)>) -> bool {
        match self {
            Predicate::Equals { attribute, value } => {
                out.push((attribute, value));
                true
            }
            Predicate::All(predicates) => {
                predicates.iter().all(|p| p.collect_equalities(out))
            }
            _ => false,
        }
    }
}

/// An optional ordering for query results: sort by one attribute's
/// value, records missing the attribute first. Ties keep identity order.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct SortKey {
    attribute: String,
    ascending: bool,
}

impl SortKey {
    pub fn ascending(attribute: &str) -> SortKey {
        SortKey {
            attribute: attribute.to_owned(),
            ascending: true,
        }
    }
    pub fn descending(attribute: &str) -> SortKey {
        SortKey {
            attribute: attribute.to_owned(),
            ascending: false,
        }
    }
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
    pub fn is_ascending(&self) -> bool {
        self.ascending
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Predicate::Equals { attribute, value } => write!(f, "{} = {}", attribute, value),
            Predicate::All(predicates) => {
                let parts: Vec<String> = predicates.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(" and "))
            }
            Predicate::Any(predicates) => {
                let parts: Vec<String> = predicates.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(" or "))
            }
            Predicate::Not(predicate) => write!(f, "not {}", predicate),
        }
    }
}
