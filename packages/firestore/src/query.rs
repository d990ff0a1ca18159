//! Collection query constraints and their evaluation.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use mockbase_core::{Error, Node, Path};
use mockbase_json_store::value_utils;

use crate::paths::DATA_KEY;

/// Comparison used by a `where` filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WhereOp {
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
    ArrayContains,
    In,
}

impl WhereOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhereOp::Less => "<",
            WhereOp::LessOrEqual => "<=",
            WhereOp::Equal => "==",
            WhereOp::NotEqual => "!=",
            WhereOp::GreaterOrEqual => ">=",
            WhereOp::Greater => ">",
            WhereOp::ArrayContains => "array-contains",
            WhereOp::In => "in",
        }
    }
}

impl fmt::Display for WhereOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WhereOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(WhereOp::Less),
            "<=" => Ok(WhereOp::LessOrEqual),
            "==" => Ok(WhereOp::Equal),
            "!=" => Ok(WhereOp::NotEqual),
            ">=" => Ok(WhereOp::GreaterOrEqual),
            ">" => Ok(WhereOp::Greater),
            "array-contains" => Ok(WhereOp::ArrayContains),
            "in" => Ok(WhereOp::In),
            other => Err(Error::query(format!("Invalid query operator: {}", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: Path,
    pub op: WhereOp,
    pub value: Node,
}

impl Filter {
    fn matches(&self, data: &Node) -> bool {
        let Some(actual) = value_utils::get(data, &self.field) else {
            return false;
        };
        let ordered = |accept: fn(Ordering) -> bool| {
            comparable(actual, &self.value) && accept(actual.compare(&self.value))
        };
        match self.op {
            WhereOp::Less => ordered(Ordering::is_lt),
            WhereOp::LessOrEqual => ordered(Ordering::is_le),
            WhereOp::GreaterOrEqual => ordered(Ordering::is_ge),
            WhereOp::Greater => ordered(Ordering::is_gt),
            WhereOp::Equal => *actual == self.value,
            WhereOp::NotEqual => *actual != self.value,
            WhereOp::ArrayContains => {
                actual.is_array() && actual.children().iter().any(|(_, item)| *item == self.value)
            }
            WhereOp::In => self.value.children().iter().any(|(_, item)| item == actual),
        }
    }
}

/// Range filters only match values of the same kind.
fn comparable(a: &Node, b: &Node) -> bool {
    matches!(
        (a, b),
        (Node::Null, Node::Null)
            | (Node::Bool(_), Node::Bool(_))
            | (Node::Number(_), Node::Number(_))
            | (Node::String(_), Node::String(_))
    )
}

/// A query cursor: values matched positionally against the ordering.
#[derive(Clone, Debug, PartialEq)]
pub struct Cursor {
    pub values: Vec<Node>,
    pub inclusive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    First(usize),
    Last(usize),
}

/// Filters, ordering, cursors and limit of a collection query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryConstraints {
    pub filters: Vec<Filter>,
    pub order: Vec<(Path, Direction)>,
    pub start: Option<Cursor>,
    pub end: Option<Cursor>,
    pub limit: Option<Limit>,
}

impl QueryConstraints {
    pub fn is_empty(&self) -> bool {
        *self == QueryConstraints::default()
    }

    pub fn with_filter(&self, field: &str, op: WhereOp, value: Node) -> Result<Self, Error> {
        if op == WhereOp::In && !value.is_array() {
            return Err(Error::query("'in' filters require an array value."));
        }
        let mut next = self.clone();
        next.filters.push(Filter {
            field: Path::parse_field(field),
            op,
            value,
        });
        Ok(next)
    }

    pub fn with_order(&self, field: &str, direction: Direction) -> Result<Self, Error> {
        if self.start.is_some() || self.end.is_some() {
            return Err(Error::query("Order by must precede cursors."));
        }
        let mut next = self.clone();
        next.order.push((Path::parse_field(field), direction));
        Ok(next)
    }

    pub fn with_start(&self, values: Vec<Node>, inclusive: bool) -> Self {
        Self {
            start: Some(Cursor { values, inclusive }),
            ..self.clone()
        }
    }

    pub fn with_end(&self, values: Vec<Node>, inclusive: bool) -> Self {
        Self {
            end: Some(Cursor { values, inclusive }),
            ..self.clone()
        }
    }

    pub fn with_limit(&self, limit: Limit) -> Result<Self, Error> {
        if let Limit::First(0) | Limit::Last(0) = limit {
            return Err(Error::query("Limit must be a positive integer."));
        }
        Ok(Self {
            limit: Some(limit),
            ..self.clone()
        })
    }

    /// The matching `(id, data)` pairs of a collection node, in query order.
    ///
    /// Documents without data are skipped, then filters apply, then the
    /// ordering (by id when none is given), cursors and the limit.
    pub fn evaluate(&self, collection: &Node) -> Vec<(String, Node)> {
        let mut docs: Vec<(String, Node)> = collection
            .children()
            .into_iter()
            .filter_map(|(id, doc)| {
                let data = doc.get_child(DATA_KEY)?;
                data.is_map().then(|| (id, data.clone()))
            })
            .filter(|(_, data)| self.filters.iter().all(|f| f.matches(data)))
            .filter(|(_, data)| {
                self.order
                    .iter()
                    .all(|(field, _)| value_utils::has(data, field))
            })
            .collect();

        docs.sort_by(|a, b| self.compare_docs(a, b));

        if let Some(start) = &self.start {
            docs.retain(|doc| match self.compare_cursor(doc, start) {
                Ordering::Greater => true,
                Ordering::Equal => start.inclusive,
                Ordering::Less => false,
            });
        }
        if let Some(end) = &self.end {
            docs.retain(|doc| match self.compare_cursor(doc, end) {
                Ordering::Less => true,
                Ordering::Equal => end.inclusive,
                Ordering::Greater => false,
            });
        }

        match self.limit {
            Some(Limit::First(n)) => docs.truncate(n),
            Some(Limit::Last(n)) if docs.len() > n => {
                docs.drain(..docs.len() - n);
            }
            _ => {}
        }
        docs
    }

    fn field_value(data: &Node, field: &Path) -> Node {
        value_utils::get(data, field).cloned().unwrap_or_default()
    }

    fn compare_docs(&self, (a_id, a): &(String, Node), (b_id, b): &(String, Node)) -> Ordering {
        for (field, direction) in &self.order {
            let ordering = Self::field_value(a, field).compare(&Self::field_value(b, field));
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a_id.cmp(b_id)
    }

    /// Where a document sits relative to a cursor, in query order.
    fn compare_cursor(&self, (id, data): &(String, Node), cursor: &Cursor) -> Ordering {
        if self.order.is_empty() {
            return match cursor.values.first() {
                Some(value) => id.as_str().cmp(value.to_key_string().as_str()),
                None => Ordering::Equal,
            };
        }
        for ((field, direction), value) in self.order.iter().zip(&cursor.values) {
            let ordering = Self::field_value(data, field).compare(value);
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection() -> Node {
        Node::from(json!({
            "ada": {"data": {"age": 36, "tags": ["math"], "team": {"name": "x"}}},
            "bob": {"data": {"age": 30, "tags": ["art", "math"]}},
            "cy": {"data": {"age": 20, "team": {"name": "y"}}},
            "dee": {"data": {"name": "no age"}},
            "ghost": {"collections": {"posts": {}}}
        }))
    }

    fn ids(docs: &[(String, Node)]) -> Vec<&str> {
        docs.iter().map(|(id, _)| id.as_str()).collect()
    }

    #[test]
    fn documents_without_data_are_skipped() {
        let docs = QueryConstraints::default().evaluate(&collection());
        assert_eq!(ids(&docs), vec!["ada", "bob", "cy", "dee"]);
    }

    #[test]
    fn where_filters() {
        let base = QueryConstraints::default();
        let q = base.with_filter("age", WhereOp::Greater, Node::from(25i64)).unwrap();
        assert_eq!(ids(&q.evaluate(&collection())), vec!["ada", "bob"]);

        let q = base.with_filter("age", WhereOp::NotEqual, Node::from(30i64)).unwrap();
        assert_eq!(ids(&q.evaluate(&collection())), vec!["ada", "cy"]);

        let q = base
            .with_filter("tags", WhereOp::ArrayContains, Node::from("art"))
            .unwrap();
        assert_eq!(ids(&q.evaluate(&collection())), vec!["bob"]);

        let q = base
            .with_filter("team.name", WhereOp::In, Node::from(json!(["y", "z"])))
            .unwrap();
        assert_eq!(ids(&q.evaluate(&collection())), vec!["cy"]);

        let q = base.with_filter("age", WhereOp::Less, Node::from("zzz")).unwrap();
        assert!(q.evaluate(&collection()).is_empty());
    }

    #[test]
    fn in_requires_an_array() {
        let err = QueryConstraints::default()
            .with_filter("age", WhereOp::In, Node::from(1i64))
            .unwrap_err();
        assert_eq!(err.code(), "database/query");
    }

    #[test]
    fn ordering_excludes_missing_fields() {
        let q = QueryConstraints::default()
            .with_order("age", Direction::Desc)
            .unwrap();
        assert_eq!(ids(&q.evaluate(&collection())), vec!["ada", "bob", "cy"]);

        let q = QueryConstraints::default()
            .with_order("age", Direction::Asc)
            .unwrap();
        assert_eq!(ids(&q.evaluate(&collection())), vec!["cy", "bob", "ada"]);
    }

    #[test]
    fn cursors_follow_the_ordering() {
        let by_age = QueryConstraints::default()
            .with_order("age", Direction::Asc)
            .unwrap();
        let q = by_age.with_start(vec![Node::from(30i64)], true);
        assert_eq!(ids(&q.evaluate(&collection())), vec!["bob", "ada"]);
        let q = by_age.with_start(vec![Node::from(30i64)], false);
        assert_eq!(ids(&q.evaluate(&collection())), vec!["ada"]);
        let q = by_age.with_end(vec![Node::from(30i64)], false);
        assert_eq!(ids(&q.evaluate(&collection())), vec!["cy"]);

        let by_id = QueryConstraints::default().with_end(vec![Node::from("bob")], true);
        assert_eq!(ids(&by_id.evaluate(&collection())), vec!["ada", "bob"]);

        assert!(by_age
            .with_start(vec![Node::from(1i64)], true)
            .with_order("name", Direction::Asc)
            .is_err());
    }

    #[test]
    fn limits() {
        let q = QueryConstraints::default().with_limit(Limit::First(2)).unwrap();
        assert_eq!(ids(&q.evaluate(&collection())), vec!["ada", "bob"]);
        let q = QueryConstraints::default().with_limit(Limit::Last(2)).unwrap();
        assert_eq!(ids(&q.evaluate(&collection())), vec!["cy", "dee"]);
        assert!(QueryConstraints::default().with_limit(Limit::First(0)).is_err());
    }

    #[test]
    fn operators_parse() {
        for op in ["<", "<=", "==", "!=", ">=", ">", "array-contains", "in"] {
            assert_eq!(op.parse::<WhereOp>().unwrap().as_str(), op);
        }
        assert!("~=".parse::<WhereOp>().is_err());
    }
}
