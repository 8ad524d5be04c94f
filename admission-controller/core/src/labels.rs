use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, LazyLock},
};
use thiserror::Error;

/// Label names and values: at most 63 alphanumerics, `-`, `_` or `.`, starting
/// and ending with an alphanumeric.
static LABEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$")
        .expect("label name pattern must compile")
});

static DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("dns subdomain pattern must compile")
});

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

/// A single label selector requirement, as authored in cluster policy.
///
/// The operator is kept as written so that a malformed selector surfaces as a
/// [`SelectorError`] when it is evaluated rather than when it is decoded.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Expression {
    key: String,
    operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<BTreeSet<String>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of namespaces by their labels.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_labels: Option<Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_expressions: Option<Expressions>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("{0:?} is not a valid label selector operator")]
    InvalidOperator(String),

    #[error("label selector key must not be empty")]
    EmptyKey,

    #[error("{0:?} is not a valid label key")]
    InvalidKey(String),

    #[error("{value:?} is not a valid label value for key {key:?}")]
    InvalidValue { key: String, value: String },

    #[error("values must be specified for operator {operator:?} on key {key:?}")]
    MissingValues { key: String, operator: Operator },

    #[error("values must not be specified for operator {operator:?} on key {key:?}")]
    UnexpectedValues { key: String, operator: Operator },
}

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// Tests the selector against a label set. All terms must match; an empty
    /// selector matches everything.
    ///
    /// Every term is validated before any is evaluated, so a malformed selector
    /// fails regardless of the labels it is tested against.
    pub fn matches(&self, labels: &Labels) -> Result<bool, SelectorError> {
        let exprs = self
            .match_expressions
            .iter()
            .flatten()
            .map(|expr| expr.operator().map(|op| (expr, op)))
            .collect::<Result<Vec<_>, SelectorError>>()?;

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                validate_key(k)?;
                validate_value(k, v)?;
            }
            for (k, v) in match_labels.iter() {
                if labels.0.get(k) != Some(v) {
                    return Ok(false);
                }
            }
        }

        Ok(exprs
            .into_iter()
            .all(|(expr, op)| expr.matches(op, labels.as_ref())))
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Labels ===

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new<V>(key: impl Into<String>, operator: impl Into<String>, values: V) -> Self
    where
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        Self {
            key: key.into(),
            operator: operator.into(),
            values: if values.is_empty() { None } else { Some(values) },
        }
    }

    /// Validates the expression, returning its operator.
    fn operator(&self) -> Result<Operator, SelectorError> {
        validate_key(&self.key)?;
        for value in self.values.iter().flatten() {
            validate_value(&self.key, value)?;
        }

        let operator = self.operator.parse::<Operator>()?;
        let has_values = self.values.as_ref().is_some_and(|v| !v.is_empty());
        match operator {
            Operator::In | Operator::NotIn if !has_values => Err(SelectorError::MissingValues {
                key: self.key.clone(),
                operator,
            }),
            Operator::Exists | Operator::DoesNotExist if has_values => {
                Err(SelectorError::UnexpectedValues {
                    key: self.key.clone(),
                    operator,
                })
            }
            _ => Ok(operator),
        }
    }

    fn matches(&self, operator: Operator, labels: &Map) -> bool {
        let value = labels.get(&self.key);
        let listed = |v: &String| self.values.as_ref().is_some_and(|vs| vs.contains(v));
        match operator {
            Operator::In => value.is_some_and(listed),
            Operator::NotIn => !value.is_some_and(listed),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// Keys are qualified names: an optional DNS subdomain prefix followed by `/`
/// and a label name.
fn validate_key(key: &str) -> Result<(), SelectorError> {
    if key.is_empty() {
        return Err(SelectorError::EmptyKey);
    }

    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    let valid_prefix =
        prefix.map_or(true, |p| p.len() <= MAX_PREFIX_LEN && DNS_SUBDOMAIN.is_match(p));
    let valid_name = name.len() <= MAX_NAME_LEN && LABEL_NAME.is_match(name);
    if valid_prefix && valid_name {
        Ok(())
    } else {
        Err(SelectorError::InvalidKey(key.to_string()))
    }
}

fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() || (value.len() <= MAX_NAME_LEN && LABEL_NAME.is_match(value)) {
        return Ok(());
    }
    Err(SelectorError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

// === Operator ===

impl std::str::FromStr for Operator {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In" => Ok(Self::In),
            "NotIn" => Ok(Self::NotIn),
            "Exists" => Ok(Self::Exists),
            "DoesNotExist" => Ok(Self::DoesNotExist),
            _ => Err(SelectorError::InvalidOperator(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Labels::default(), true, "empty match"),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "bar"))),
                true,
                "exact label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "baz"))),
                false,
                "label value mismatch",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", "In", ["bar"]))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "expression match",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", "In", ["bar"]))),
                Labels::default(),
                false,
                "In requires the key",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", "NotIn", ["bar"]))),
                Labels::default(),
                true,
                "NotIn matches a missing key",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", "NotIn", ["bar"]))),
                Labels::from_iter(Some(("foo", "bar"))),
                false,
                "NotIn rejects a listed value",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", "Exists", None::<String>))),
                Labels::from_iter(Some(("foo", "anything"))),
                true,
                "Exists",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    "DoesNotExist",
                    None::<String>,
                ))),
                Labels::from_iter(Some(("foo", "anything"))),
                false,
                "DoesNotExist",
            ),
            (
                Selector {
                    match_labels: Some(maplit::btreemap! {
                        "team".to_string() => "a".to_string(),
                    }),
                    match_expressions: Some(vec![Expression::new("env", "In", ["prod"])]),
                },
                Labels::from_iter(vec![("team", "a"), ("env", "dev")]),
                false,
                "all terms must match",
            ),
        ] {
            assert_eq!(selector.matches(labels), Ok(*matches), "{}", msg);
        }
    }

    #[test]
    fn invalid_selectors() {
        let labels = Labels::from_iter(Some(("foo", "bar")));
        for (selector, err) in [
            (
                Selector::from_iter(Some(Expression::new("foo", "Equals", ["bar"]))),
                SelectorError::InvalidOperator("Equals".to_string()),
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", "In", None::<String>))),
                SelectorError::MissingValues {
                    key: "foo".to_string(),
                    operator: Operator::In,
                },
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", "Exists", ["bar"]))),
                SelectorError::UnexpectedValues {
                    key: "foo".to_string(),
                    operator: Operator::Exists,
                },
            ),
            (
                Selector::from_iter(Some(Expression::new("", "Exists", None::<String>))),
                SelectorError::EmptyKey,
            ),
            (
                Selector::from_iter(Some(("bad key!", "a"))),
                SelectorError::InvalidKey("bad key!".to_string()),
            ),
            (
                Selector::from_iter(Some(("foo", "-a"))),
                SelectorError::InvalidValue {
                    key: "foo".to_string(),
                    value: "-a".to_string(),
                },
            ),
            (
                Selector::from_iter(Some(Expression::new("team", "NotIn", ["a b"]))),
                SelectorError::InvalidValue {
                    key: "team".to_string(),
                    value: "a b".to_string(),
                },
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "Example.com/team",
                    "Exists",
                    None::<String>,
                ))),
                SelectorError::InvalidKey("Example.com/team".to_string()),
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "/team",
                    "Exists",
                    None::<String>,
                ))),
                SelectorError::InvalidKey("/team".to_string()),
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "a".repeat(64),
                    "Exists",
                    None::<String>,
                ))),
                SelectorError::InvalidKey("a".repeat(64)),
            ),
        ] {
            assert_eq!(selector.matches(&labels), Err(err));
        }
    }

    #[test]
    fn qualified_keys_and_empty_values_are_valid() {
        let selector = Selector::from_iter(vec![
            Expression::new("example.com/team", "In", ["a", "b.c_d-e"]),
            Expression::new("tier", "NotIn", [""]),
        ]);
        let labels = Labels::from_iter(vec![("example.com/team", "a"), ("tier", "web")]);
        assert_eq!(selector.matches(&labels), Ok(true));
    }

    #[test]
    fn invalid_expression_fails_even_when_labels_mismatch() {
        let selector = Selector {
            match_labels: Some(maplit::btreemap! {
                "foo".to_string() => "nope".to_string(),
            }),
            match_expressions: Some(vec![Expression::new("foo", "Bogus", ["bar"])]),
        };
        let labels = Labels::from_iter(Some(("foo", "bar")));
        assert!(selector.matches(&labels).is_err());
    }

    #[test]
    fn deserializes_kubernetes_selector() {
        let selector: Selector = serde_json::from_value(serde_json::json!({
            "matchLabels": { "team": "a" },
            "matchExpressions": [
                { "key": "env", "operator": "NotIn", "values": ["dev"] },
            ],
        }))
        .unwrap();
        let labels = Labels::from_iter(vec![("team", "a"), ("env", "prod")]);
        assert_eq!(selector.matches(&labels), Ok(true));
    }
}
