//! Query specifications and their evaluation.
//!
//! A [`QuerySpec`] is an immutable description of how to order, filter and
//! limit the children of a location. Builders validate every constraint
//! against the ones already present and return a new spec.

use std::cmp::Ordering;
use std::fmt;

use mockbase_core::{Error, Node, Path};
use mockbase_json_store::value_utils;

/// How children are ordered.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderBy {
    Key,
    /// A field of each child, as a `/` or `.` separated path.
    Child(Path),
    Value,
    Priority,
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBy::Key => write!(f, "key"),
            OrderBy::Child(_) => write!(f, "child"),
            OrderBy::Value => write!(f, "value"),
            OrderBy::Priority => write!(f, "priority"),
        }
    }
}

/// A range bound: an ordering value plus an optional tie-break key.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    pub value: Node,
    pub key: Option<String>,
}

impl Bound {
    pub fn new(value: impl Into<Node>) -> Self {
        Self {
            value: value.into(),
            key: None,
        }
    }

    pub fn with_key(value: impl Into<Node>, key: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            key: Some(key.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    First(usize),
    Last(usize),
}

/// Ordering, range and limit constraints of a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySpec {
    pub order_by: Option<OrderBy>,
    pub start_at: Option<Bound>,
    pub end_at: Option<Bound>,
    pub equal_to: Option<Bound>,
    pub limit: Option<Limit>,
}

impl QuerySpec {
    /// True when no constraint is set, as on a plain reference.
    pub fn is_empty(&self) -> bool {
        *self == QuerySpec::default()
    }

    pub fn is_limited(&self) -> bool {
        self.limit.is_some()
    }

    pub fn with_order(&self, order: OrderBy) -> Result<QuerySpec, Error> {
        if let Some(existing) = &self.order_by {
            return Err(Error::query(format!("Already ordered by {}.", existing)));
        }
        if order == OrderBy::Priority {
            return Err(Error::unsupported("orderByPriority"));
        }
        Ok(QuerySpec {
            order_by: Some(order),
            ..self.clone()
        })
    }

    pub fn with_start_at(&self, bound: Bound) -> Result<QuerySpec, Error> {
        if self.end_at.is_some() && self.is_limited() {
            return Err(Error::query("Already specified end at and limit."));
        }
        if self.equal_to.is_some() {
            return Err(Error::query("Already specified equal to."));
        }
        if self.start_at.is_some() {
            return Err(Error::query("Already specified start at."));
        }
        Ok(QuerySpec {
            start_at: Some(bound),
            ..self.clone()
        })
    }

    pub fn with_end_at(&self, bound: Bound) -> Result<QuerySpec, Error> {
        if self.end_at.is_some() {
            return Err(Error::query("Already specified end at."));
        }
        if self.equal_to.is_some() {
            return Err(Error::query("Already specified equal to."));
        }
        if self.start_at.is_some() && self.is_limited() {
            return Err(Error::query("Already specified start at and limit."));
        }
        Ok(QuerySpec {
            end_at: Some(bound),
            ..self.clone()
        })
    }

    pub fn with_equal_to(&self, bound: Bound) -> Result<QuerySpec, Error> {
        if self.end_at.is_some() {
            return Err(Error::query("Already specified end at."));
        }
        if self.start_at.is_some() {
            return Err(Error::query("Already specified start at."));
        }
        Ok(QuerySpec {
            equal_to: Some(bound),
            ..self.clone()
        })
    }

    pub fn with_limit(&self, limit: Limit) -> Result<QuerySpec, Error> {
        if self.start_at.is_some() && self.end_at.is_some() {
            return Err(Error::query("Already specified start/end at."));
        }
        match self.limit {
            Some(Limit::First(_)) => return Err(Error::query("Already limited to first.")),
            Some(Limit::Last(_)) => return Err(Error::query("Already limited to last.")),
            None => {}
        }
        if let Limit::First(0) | Limit::Last(0) = limit {
            return Err(Error::query("Limit must be a positive integer."));
        }
        Ok(QuerySpec {
            limit: Some(limit),
            ..self.clone()
        })
    }

    /// Ordered `(key, child)` pairs of `node` that satisfy this spec.
    pub fn evaluate(&self, node: &Node) -> Vec<(String, Node)> {
        let mut pairs = node.children();

        match &self.order_by {
            None | Some(OrderBy::Key) | Some(OrderBy::Priority) => {
                pairs.retain(|(key, _)| self.admits_key(key));
            }
            Some(order) => {
                let mut keyed: Vec<(Node, String, Node)> = pairs
                    .into_iter()
                    .map(|(key, child)| (ordering_value(order, &child), key, child))
                    .collect();
                // Stable: equal ordering values keep key order
                keyed.sort_by(|a, b| a.0.compare(&b.0));
                pairs = keyed
                    .into_iter()
                    .filter(|(value, key, _)| self.admits_value(value, key))
                    .map(|(_, key, child)| (key, child))
                    .collect();
            }
        }

        match self.limit {
            Some(Limit::First(n)) => pairs.truncate(n),
            Some(Limit::Last(n)) if pairs.len() > n => {
                pairs.drain(..pairs.len() - n);
            }
            _ => {}
        }
        pairs
    }

    fn admits_key(&self, key: &str) -> bool {
        let bound_text = |bound: &Option<Bound>| bound.as_ref().map(|b| b.value.to_key_string());
        if let Some(equal) = bound_text(&self.equal_to) {
            if key != equal {
                return false;
            }
        }
        if let Some(start) = bound_text(&self.start_at) {
            if key < start.as_str() {
                return false;
            }
        }
        if let Some(end) = bound_text(&self.end_at) {
            if key > end.as_str() {
                return false;
            }
        }
        true
    }

    fn admits_value(&self, value: &Node, key: &str) -> bool {
        if let Some(equal) = &self.equal_to {
            if value.compare(&equal.value) != Ordering::Equal {
                return false;
            }
            if equal.key.as_deref().is_some_and(|k| key != k) {
                return false;
            }
        }
        if let Some(start) = &self.start_at {
            match value.compare(&start.value) {
                Ordering::Less => return false,
                Ordering::Equal if start.key.as_deref().is_some_and(|k| key < k) => return false,
                _ => {}
            }
        }
        if let Some(end) = &self.end_at {
            match value.compare(&end.value) {
                Ordering::Greater => return false,
                Ordering::Equal if end.key.as_deref().is_some_and(|k| key > k) => return false,
                _ => {}
            }
        }
        true
    }
}

fn ordering_value(order: &OrderBy, child: &Node) -> Node {
    match order {
        OrderBy::Child(field) => value_utils::get(child, field).cloned().unwrap_or_default(),
        _ => child.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(pairs: &[(String, Node)]) -> Vec<&str> {
        pairs.iter().map(|(k, _)| k.as_str()).collect()
    }

    fn scores() -> Node {
        Node::from(json!({
            "carol": {"score": 7, "team": {"name": "x"}},
            "alice": {"score": 10, "team": {"name": "y"}},
            "bob": {"score": 7},
            "dave": {"team": {"name": "a"}}
        }))
    }

    #[test]
    fn default_order_is_by_key() {
        let spec = QuerySpec::default();
        assert!(spec.is_empty());
        assert_eq!(keys(&spec.evaluate(&scores())), ["alice", "bob", "carol", "dave"]);
    }

    #[test]
    fn order_by_child_puts_missing_first_and_keeps_key_order_on_ties() {
        let spec = QuerySpec::default()
            .with_order(OrderBy::Child(Path::parse_field("score")))
            .unwrap();
        assert_eq!(keys(&spec.evaluate(&scores())), ["dave", "bob", "carol", "alice"]);
    }

    #[test]
    fn order_by_nested_child_field() {
        let spec = QuerySpec::default()
            .with_order(OrderBy::Child(Path::parse_field("team.name")))
            .unwrap();
        assert_eq!(keys(&spec.evaluate(&scores())), ["bob", "dave", "carol", "alice"]);
    }

    #[test]
    fn order_by_value_across_kinds() {
        let node = Node::from(json!({"a": "x", "b": 3, "c": null, "d": true, "e": 1}));
        let spec = QuerySpec::default().with_order(OrderBy::Value).unwrap();
        assert_eq!(keys(&spec.evaluate(&node)), ["c", "d", "e", "b", "a"]);
    }

    #[test]
    fn key_ranges_compare_as_strings() {
        let node = Node::from(json!({"a": 1, "b": 2, "c": 3, "d": 4}));
        let spec = QuerySpec::default()
            .with_order(OrderBy::Key)
            .unwrap()
            .with_start_at(Bound::new("b"))
            .unwrap()
            .with_end_at(Bound::new("c"))
            .unwrap();
        assert_eq!(keys(&spec.evaluate(&node)), ["b", "c"]);

        let spec = QuerySpec::default().with_equal_to(Bound::new("d")).unwrap();
        assert_eq!(keys(&spec.evaluate(&node)), ["d"]);
    }

    #[test]
    fn child_ranges_with_tie_break_keys() {
        let spec = QuerySpec::default()
            .with_order(OrderBy::Child(Path::parse_field("score")))
            .unwrap()
            .with_start_at(Bound::with_key(7, "c"))
            .unwrap();
        assert_eq!(keys(&spec.evaluate(&scores())), ["carol", "alice"]);

        let spec = QuerySpec::default()
            .with_order(OrderBy::Child(Path::parse_field("score")))
            .unwrap()
            .with_end_at(Bound::with_key(7, "bob"))
            .unwrap();
        assert_eq!(keys(&spec.evaluate(&scores())), ["dave", "bob"]);
    }

    #[test]
    fn equal_to_value_with_key() {
        let spec = QuerySpec::default()
            .with_order(OrderBy::Child(Path::parse_field("score")))
            .unwrap()
            .with_equal_to(Bound::new(7))
            .unwrap();
        assert_eq!(keys(&spec.evaluate(&scores())), ["bob", "carol"]);

        let spec = QuerySpec::default()
            .with_order(OrderBy::Child(Path::parse_field("score")))
            .unwrap()
            .with_equal_to(Bound::with_key(7, "carol"))
            .unwrap();
        assert_eq!(keys(&spec.evaluate(&scores())), ["carol"]);
    }

    #[test]
    fn limits_apply_after_filtering() {
        let node = Node::from(json!({"a": 1, "b": 2, "c": 3, "d": 4}));
        let first = QuerySpec::default()
            .with_start_at(Bound::new("b"))
            .unwrap()
            .with_limit(Limit::First(2))
            .unwrap();
        assert_eq!(keys(&first.evaluate(&node)), ["b", "c"]);

        let last = QuerySpec::default().with_limit(Limit::Last(3)).unwrap();
        assert_eq!(keys(&last.evaluate(&node)), ["b", "c", "d"]);

        let more_than_available = QuerySpec::default().with_limit(Limit::Last(10)).unwrap();
        assert_eq!(more_than_available.evaluate(&node).len(), 4);
    }

    #[test]
    fn arrays_and_scalars() {
        let spec = QuerySpec::default();
        assert_eq!(keys(&spec.evaluate(&Node::from(json!(["x", "y"])))), ["0", "1"]);
        assert!(spec.evaluate(&Node::from(5)).is_empty());
        assert!(spec.evaluate(&Node::Null).is_empty());
    }

    #[test]
    fn second_ordering_is_rejected() {
        let spec = QuerySpec::default().with_order(OrderBy::Value).unwrap();
        let err = spec.with_order(OrderBy::Key).unwrap_err();
        assert_eq!(err.code(), "database/query");
        assert_eq!(err.to_string(), "Already ordered by value.");
    }

    #[test]
    fn priority_ordering_is_unsupported() {
        let err = QuerySpec::default().with_order(OrderBy::Priority).unwrap_err();
        assert_eq!(err.code(), "mock/unsupported");
        let ordered = QuerySpec::default().with_order(OrderBy::Key).unwrap();
        assert_eq!(
            ordered.with_order(OrderBy::Priority).unwrap_err().code(),
            "database/query"
        );
    }

    fn rejection(result: Result<QuerySpec, Error>) -> String {
        let err = result.unwrap_err();
        assert_eq!(err.code(), "database/query");
        err.to_string()
    }

    fn spec() -> QuerySpec {
        QuerySpec::default()
    }

    #[test]
    fn equal_to_excludes_range_bounds() {
        let equal = spec().with_equal_to(Bound::new(1)).unwrap();
        assert_eq!(
            rejection(equal.with_start_at(Bound::new(0))),
            "Already specified equal to."
        );
        assert_eq!(
            rejection(equal.with_end_at(Bound::new(2))),
            "Already specified equal to."
        );

        let start = spec().with_start_at(Bound::new(1)).unwrap();
        assert_eq!(
            rejection(start.with_equal_to(Bound::new(2))),
            "Already specified start at."
        );
        let end = spec().with_end_at(Bound::new(1)).unwrap();
        assert_eq!(
            rejection(end.with_equal_to(Bound::new(2))),
            "Already specified end at."
        );
    }

    #[test]
    fn bounds_are_set_once() {
        let start = spec().with_start_at(Bound::new(1)).unwrap();
        assert_eq!(
            rejection(start.with_start_at(Bound::new(2))),
            "Already specified start at."
        );
        let end = spec().with_end_at(Bound::new(1)).unwrap();
        assert_eq!(
            rejection(end.with_end_at(Bound::new(2))),
            "Already specified end at."
        );
    }

    #[test]
    fn limit_after_both_bounds_is_rejected() {
        let start_then_end = spec()
            .with_start_at(Bound::new(0))
            .unwrap()
            .with_end_at(Bound::new(1))
            .unwrap();
        let end_then_start = spec()
            .with_end_at(Bound::new(1))
            .unwrap()
            .with_start_at(Bound::new(0))
            .unwrap();
        for ranged in [start_then_end, end_then_start] {
            assert_eq!(
                rejection(ranged.with_limit(Limit::First(1))),
                "Already specified start/end at."
            );
            assert_eq!(
                rejection(ranged.with_limit(Limit::Last(1))),
                "Already specified start/end at."
            );
        }
    }

    #[test]
    fn second_bound_after_limit_is_rejected() {
        let start_then_limit = spec()
            .with_start_at(Bound::new(1))
            .unwrap()
            .with_limit(Limit::First(1))
            .unwrap();
        let limit_then_start = spec()
            .with_limit(Limit::Last(1))
            .unwrap()
            .with_start_at(Bound::new(1))
            .unwrap();
        for limited in [start_then_limit, limit_then_start] {
            assert_eq!(
                rejection(limited.with_end_at(Bound::new(2))),
                "Already specified start at and limit."
            );
        }

        let end_then_limit = spec()
            .with_end_at(Bound::new(1))
            .unwrap()
            .with_limit(Limit::Last(1))
            .unwrap();
        let limit_then_end = spec()
            .with_limit(Limit::First(1))
            .unwrap()
            .with_end_at(Bound::new(1))
            .unwrap();
        for limited in [end_then_limit, limit_then_end] {
            assert_eq!(
                rejection(limited.with_start_at(Bound::new(0))),
                "Already specified end at and limit."
            );
        }
    }

    #[test]
    fn one_bound_and_a_limit_are_allowed() {
        assert!(spec()
            .with_equal_to(Bound::new(1))
            .unwrap()
            .with_limit(Limit::First(1))
            .is_ok());
        assert!(spec()
            .with_limit(Limit::Last(2))
            .unwrap()
            .with_end_at(Bound::new(1))
            .is_ok());
    }

    #[test]
    fn limits_are_set_once_and_positive() {
        let first = spec().with_limit(Limit::First(1)).unwrap();
        assert_eq!(
            rejection(first.with_limit(Limit::Last(1))),
            "Already limited to first."
        );
        assert_eq!(
            rejection(first.with_limit(Limit::First(2))),
            "Already limited to first."
        );
        let last = spec().with_limit(Limit::Last(1)).unwrap();
        assert_eq!(
            rejection(last.with_limit(Limit::First(1))),
            "Already limited to last."
        );

        for zero in [Limit::First(0), Limit::Last(0)] {
            assert_eq!(
                rejection(spec().with_limit(zero)),
                "Limit must be a positive integer."
            );
        }
    }
}
