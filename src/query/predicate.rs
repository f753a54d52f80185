//! Filter predicates.
//!
//! A predicate is either a single attribute comparison or an AND-compound of
//! subpredicates. Predicates are immutable values: combining two of them
//! always builds a new compound and never touches either operand.
//!
//! Construction is cheap and mostly unchecked. Operator/value mismatches are
//! reported by [`Predicate::validate`], which the executor runs when a spec
//! is compiled.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::BitAnd;

use regex::Regex;
use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use super::sort::{ComparisonMode, SortDescriptor};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// attribute == value
    Eq,
    /// attribute != value
    Ne,
    /// attribute > value
    Gt,
    /// attribute >= value
    Gte,
    /// attribute < value
    Lt,
    /// attribute <= value
    Lte,
    /// attribute is one of the values in an array
    In,
    /// substring, or element membership when the attribute is an array
    Contains,
    /// string prefix
    BeginsWith,
    /// string suffix
    EndsWith,
    /// `*` and `?` wildcard match over the whole string
    Like,
    /// regular expression match over the whole string
    Matches,
}

impl ComparisonOp {
    /// Returns the operator name for explain output
    pub fn op_name(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::In => "IN",
            ComparisonOp::Contains => "CONTAINS",
            ComparisonOp::BeginsWith => "BEGINSWITH",
            ComparisonOp::EndsWith => "ENDSWITH",
            ComparisonOp::Like => "LIKE",
            ComparisonOp::Matches => "MATCHES",
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, ComparisonOp::Eq)
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            ComparisonOp::Gt | ComparisonOp::Gte | ComparisonOp::Lt | ComparisonOp::Lte
        )
    }

    /// Operators that only make sense against a string operand
    pub fn requires_string(&self) -> bool {
        matches!(
            self,
            ComparisonOp::BeginsWith
                | ComparisonOp::EndsWith
                | ComparisonOp::Like
                | ComparisonOp::Matches
        )
    }
}

/// A single attribute comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub attribute: String,
    pub op: ComparisonOp,
    pub value: Value,
    pub mode: ComparisonMode,
}

impl Comparison {
    /// Checks the operator/value combination
    pub fn validate(&self) -> QueryResult<()> {
        if self.attribute.is_empty() {
            return Err(QueryError::UnsupportedPredicate(
                "comparison has an empty attribute name".into(),
            ));
        }

        let ok = match self.op {
            ComparisonOp::Eq | ComparisonOp::Ne => true,
            ComparisonOp::Gt | ComparisonOp::Gte | ComparisonOp::Lt | ComparisonOp::Lte => {
                self.value.is_number() || self.value.is_string()
            }
            ComparisonOp::In => self.value.is_array(),
            ComparisonOp::Contains => !self.value.is_null(),
            ComparisonOp::BeginsWith | ComparisonOp::EndsWith | ComparisonOp::Like => {
                self.value.is_string()
            }
            ComparisonOp::Matches => match self.value.as_str() {
                Some(pattern) => {
                    Regex::new(pattern).map_err(|e| {
                        QueryError::UnsupportedPredicate(format!(
                            "invalid pattern for '{}': {}",
                            self.attribute, e
                        ))
                    })?;
                    true
                }
                None => false,
            },
        };

        if ok {
            Ok(())
        } else {
            Err(QueryError::UnsupportedPredicate(format!(
                "operator {} cannot compare '{}' against {}",
                self.op.op_name(),
                self.attribute,
                self.value
            )))
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.attribute, self.op.op_name())?;
        if self.mode != ComparisonMode::Exact {
            write!(f, "[{}]", self.mode.as_str())?;
        }
        write!(f, " {}", self.value)
    }
}

/// Boolean filter expression over entity attributes
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison(Comparison),
    And(Vec<Predicate>),
}

impl Predicate {
    /// Creates a comparison leaf, rejecting an empty attribute name.
    ///
    /// Operator/value compatibility is checked later, at compile time.
    pub fn comparison(
        attribute: impl Into<String>,
        op: ComparisonOp,
        value: Value,
    ) -> QueryResult<Self> {
        let attribute = attribute.into();
        if attribute.is_empty() {
            return Err(QueryError::UnsupportedPredicate(
                "comparison requires an attribute name".into(),
            ));
        }
        Ok(Self::leaf(attribute, op, value, ComparisonMode::Exact))
    }

    fn leaf(attribute: impl Into<String>, op: ComparisonOp, value: Value, mode: ComparisonMode) -> Self {
        Predicate::Comparison(Comparison {
            attribute: attribute.into(),
            op,
            value,
            mode,
        })
    }

    /// Create an equality predicate
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(attribute, ComparisonOp::Eq, value.into(), ComparisonMode::Exact)
    }

    /// Create an inequality predicate
    pub fn ne(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(attribute, ComparisonOp::Ne, value.into(), ComparisonMode::Exact)
    }

    /// Create a range predicate (gt)
    pub fn gt(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(attribute, ComparisonOp::Gt, value.into(), ComparisonMode::Exact)
    }

    /// Create a range predicate (gte)
    pub fn gte(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(attribute, ComparisonOp::Gte, value.into(), ComparisonMode::Exact)
    }

    /// Create a range predicate (lt)
    pub fn lt(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(attribute, ComparisonOp::Lt, value.into(), ComparisonMode::Exact)
    }

    /// Create a range predicate (lte)
    pub fn lte(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(attribute, ComparisonOp::Lte, value.into(), ComparisonMode::Exact)
    }

    /// Create a membership predicate
    pub fn is_in(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        Self::leaf(
            attribute,
            ComparisonOp::In,
            Value::Array(values),
            ComparisonMode::Exact,
        )
    }

    /// Combines two predicates with AND.
    ///
    /// Either operand that is itself an AND-compound is flattened into the
    /// result, so `and(and(a, b), c)` and `and(a, and(b, c))` both produce
    /// `And[a, b, c]`.
    pub fn and(left: Predicate, right: Predicate) -> Predicate {
        let mut subpredicates = Vec::new();
        for operand in [left, right] {
            match operand {
                Predicate::And(parts) => subpredicates.extend(parts),
                leaf => subpredicates.push(leaf),
            }
        }
        Predicate::And(subpredicates)
    }

    /// Folds any number of predicates with [`Predicate::and`]
    pub fn and_all(predicates: impl IntoIterator<Item = Predicate>) -> Option<Predicate> {
        predicates.into_iter().reduce(Predicate::and)
    }

    /// Validates every comparison in the tree
    pub fn validate(&self) -> QueryResult<()> {
        match self {
            Predicate::Comparison(cmp) => cmp.validate(),
            Predicate::And(parts) => {
                if parts.is_empty() {
                    return Err(QueryError::UnsupportedPredicate(
                        "AND-compound without subpredicates".into(),
                    ));
                }
                parts.iter().try_for_each(Predicate::validate)
            }
        }
    }

    /// Returns the comparison if this is a leaf
    pub fn as_comparison(&self) -> Option<&Comparison> {
        match self {
            Predicate::Comparison(cmp) => Some(cmp),
            Predicate::And(_) => None,
        }
    }

    /// Returns true if this is an AND-compound
    pub fn is_compound(&self) -> bool {
        matches!(self, Predicate::And(_))
    }

    /// Returns the attribute/value pair of a single equality comparison.
    ///
    /// Anything else (compound, non-equality operator) is unsupported.
    pub fn equality_pair(&self) -> QueryResult<(&str, &Value)> {
        match self {
            Predicate::Comparison(cmp) if cmp.op.is_equality() => {
                cmp.validate()?;
                Ok((cmp.attribute.as_str(), &cmp.value))
            }
            Predicate::Comparison(cmp) => Err(QueryError::UnsupportedPredicate(format!(
                "expected an equality comparison, found {}",
                cmp.op.op_name()
            ))),
            Predicate::And(_) => Err(QueryError::UnsupportedPredicate(
                "expected a single equality comparison, found a compound predicate".into(),
            )),
        }
    }

    /// Attribute names referenced anywhere in the tree
    pub fn attributes(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_attributes(&mut names);
        names
    }

    fn collect_attributes<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Comparison(cmp) => {
                names.insert(cmp.attribute.as_str());
            }
            Predicate::And(parts) => parts.iter().for_each(|p| p.collect_attributes(names)),
        }
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        Predicate::and(self, rhs)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Comparison(cmp) => write!(f, "{}", cmp),
            Predicate::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    if part.is_compound() {
                        write!(f, "({})", part)?;
                    } else {
                        write!(f, "{}", part)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Statically named attribute with a comparison mode.
///
/// Entity definitions typically expose one constant per attribute:
///
/// ```
/// use livefetch::query::Attribute;
///
/// const NAME: Attribute = Attribute::new("name");
/// let predicate = NAME.equals("home");
/// assert_eq!(predicate.to_string(), "name == \"home\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attribute {
    name: &'static str,
    mode: ComparisonMode,
}

impl Attribute {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            mode: ComparisonMode::Exact,
        }
    }

    pub const fn with_mode(self, mode: ComparisonMode) -> Self {
        Self {
            name: self.name,
            mode,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    fn compare(&self, op: ComparisonOp, value: Value) -> Predicate {
        Predicate::leaf(self.name, op, value, self.mode)
    }

    pub fn equals(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Eq, value.into())
    }

    pub fn not_equals(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Ne, value.into())
    }

    pub fn gt(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Gt, value.into())
    }

    pub fn gte(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Gte, value.into())
    }

    pub fn lt(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Lt, value.into())
    }

    pub fn lte(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Lte, value.into())
    }

    pub fn is_in(&self, values: Vec<Value>) -> Predicate {
        self.compare(ComparisonOp::In, Value::Array(values))
    }

    pub fn contains(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Contains, value.into())
    }

    pub fn begins_with(&self, prefix: &str) -> Predicate {
        self.compare(ComparisonOp::BeginsWith, Value::from(prefix))
    }

    pub fn ends_with(&self, suffix: &str) -> Predicate {
        self.compare(ComparisonOp::EndsWith, Value::from(suffix))
    }

    pub fn like(&self, pattern: &str) -> Predicate {
        self.compare(ComparisonOp::Like, Value::from(pattern))
    }

    pub fn matches(&self, pattern: &str) -> Predicate {
        self.compare(ComparisonOp::Matches, Value::from(pattern))
    }

    /// Ascending sort on this attribute using its comparison mode
    pub fn ascending(&self) -> SortDescriptor {
        SortDescriptor::new(self.name, true, self.mode)
    }

    /// Descending sort on this attribute using its comparison mode
    pub fn descending(&self) -> SortDescriptor {
        SortDescriptor::new(self.name, false, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_predicate_types() {
        let eq = Predicate::eq("name", "Alice");
        assert!(eq.as_comparison().unwrap().op.is_equality());

        let gte = Predicate::gte("age", 18);
        assert!(gte.as_comparison().unwrap().op.is_range());
    }

    #[test]
    fn test_comparison_rejects_empty_attribute() {
        let err = Predicate::comparison("", ComparisonOp::Eq, json!(1)).unwrap_err();
        assert_eq!(err.code(), "LIVEFETCH_UNSUPPORTED_PREDICATE");
    }

    #[test]
    fn test_invalid_combination_is_deferred() {
        // Construction succeeds; validation fails.
        let p = Predicate::comparison("name", ComparisonOp::BeginsWith, json!(42)).unwrap();
        assert!(p.validate().is_err());

        let p = Predicate::comparison("age", ComparisonOp::In, json!(3)).unwrap();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let p = Attribute::new("name").matches("([a-z");
        assert!(matches!(
            p.validate(),
            Err(QueryError::UnsupportedPredicate(_))
        ));
    }

    #[test]
    fn test_and_flattens_both_sides() {
        let a = Predicate::eq("a", 1);
        let b = Predicate::eq("b", 2);
        let c = Predicate::eq("c", 3);

        let left = Predicate::and(Predicate::and(a.clone(), b.clone()), c.clone());
        let right = Predicate::and(a.clone(), Predicate::and(b.clone(), c.clone()));

        assert_eq!(left, right);
        assert_eq!(left, Predicate::And(vec![a, b, c]));
    }

    #[test]
    fn test_and_does_not_touch_operands() {
        let a = Predicate::eq("a", 1);
        let compound = Predicate::and(a.clone(), Predicate::eq("b", 2));
        let _ = Predicate::and(compound.clone(), Predicate::eq("c", 3));

        assert_eq!(a, Predicate::eq("a", 1));
        assert_eq!(
            compound,
            Predicate::And(vec![Predicate::eq("a", 1), Predicate::eq("b", 2)])
        );
    }

    #[test]
    fn test_bitand_operator() {
        let p = Predicate::gte("age", 18) & Predicate::eq("active", true);
        assert_eq!(p.to_string(), "age >= 18 AND active == true");
    }

    #[test]
    fn test_equality_pair() {
        let p = Predicate::eq("name", "home");
        let (attr, value) = p.equality_pair().unwrap();
        assert_eq!(attr, "name");
        assert_eq!(value, &json!("home"));

        let compound = Predicate::eq("a", 1) & Predicate::eq("b", 2);
        assert!(compound.equality_pair().is_err());
        assert!(Predicate::gt("a", 1).equality_pair().is_err());
    }

    #[test]
    fn test_attribute_helper_carries_mode() {
        const NAME: Attribute =
            Attribute::new("name").with_mode(ComparisonMode::CaseInsensitive);
        let p = NAME.begins_with("al");
        assert_eq!(p.to_string(), "name BEGINSWITH[c] \"al\"");
        assert_eq!(NAME.descending().mode, ComparisonMode::CaseInsensitive);
    }

    #[test]
    fn test_attributes_collected() {
        let p = Predicate::eq("a", 1) & Predicate::gt("b", 2) & Predicate::lt("a", 9);
        let attrs: Vec<_> = p.attributes().into_iter().collect();
        assert_eq!(attrs, vec!["a", "b"]);
    }
}
