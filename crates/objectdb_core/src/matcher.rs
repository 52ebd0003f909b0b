//! Query evaluation against documents.
//!
//! The matcher walks a parsed [`Query`] key by key. Each operator key
//! evaluates its sub-query under itself as the combinator and folds the
//! result into the enclosing level; each field key resolves its path and
//! compares the value found there according to the current combinator.
//!
//! ## Combination rules
//!
//! | Combinator | Fold | Leaf comparison |
//! |---|---|---|
//! | `$and` (default) | all | equality, regex test |
//! | `$or` | any | equality, regex test |
//! | `$not` | all, then negated | equality, shape-guarded |
//! | `$ne` | all | inequality, shape-guarded |
//! | `$gt` `$gte` `$lt` `$lte` | all | ordering, shape-guarded |
//! | `$in` `$nin` | all | membership |
//!
//! A shape-guarded comparison between values of different shapes yields no
//! information: the key is skipped rather than failed. A path that cannot be
//! resolved counts as a non-match for that key.
//!
//! `[]` segments fan out over a sequence; the key holds if any element
//! satisfies the rest of the path.

use objectdb_codec::{Condition, Document, Operand, Operator, PathSegment, Query, Value};
use std::cmp::Ordering;

/// Returns true if `doc` satisfies `query`.
#[must_use]
pub fn matches(query: &Query, doc: &Document) -> bool {
    eval(query, doc, Operator::And)
}

/// Returns `query` as a document predicate, e.g. for `Iterator::filter`.
pub fn matcher(query: &Query) -> impl Fn(&Document) -> bool + '_ {
    move |doc| matches(query, doc)
}

fn eval(query: &Query, doc: &Document, comb: Operator) -> bool {
    let disjunctive = comb.is_disjunctive();
    let mut result = !disjunctive;

    for condition in query.conditions() {
        let outcome = match condition {
            Condition::Operator { op, sub } => Some(eval(sub, doc, *op)),
            Condition::Field { path, operand } => field(doc, path.segments(), operand, comb),
        };
        match outcome {
            Some(true) if disjunctive => {
                result = true;
                break;
            }
            Some(false) if !disjunctive => {
                result = false;
                break;
            }
            _ => {}
        }
    }

    if comb == Operator::Not {
        !result
    } else {
        result
    }
}

/// Settles one key evaluated on its own under `comb`, as if it were the
/// only key of a sub-query.
fn conclude(comb: Operator, outcome: Option<bool>) -> bool {
    let held = outcome.unwrap_or(!comb.is_disjunctive());
    if comb == Operator::Not {
        !held
    } else {
        held
    }
}

fn fold(comb: Operator, mut results: impl Iterator<Item = bool>) -> bool {
    if comb.is_disjunctive() {
        results.any(|r| r)
    } else {
        results.all(|r| r)
    }
}

fn field(doc: &Document, segments: &[PathSegment], operand: &Operand, comb: Operator) -> Option<bool> {
    match segments.split_first() {
        Some((PathSegment::Key(key), rest)) => match doc.get(key) {
            Some(value) => descend(value, rest, operand, comb),
            None => missing(operand, comb),
        },
        _ => missing(operand, comb),
    }
}

fn descend(value: &Value, rest: &[PathSegment], operand: &Operand, comb: Operator) -> Option<bool> {
    match rest.split_first() {
        None => compare(value, operand, comb),
        Some((PathSegment::Key(key), tail)) => match value.as_object().and_then(|m| m.get(key)) {
            Some(inner) => descend(inner, tail, operand, comb),
            None => missing(operand, comb),
        },
        Some((PathSegment::Each, tail)) => match value.as_array() {
            Some(items) => Some(items.iter().any(|item| {
                descend(item, tail, operand, comb).unwrap_or(!comb.is_disjunctive())
            })),
            None => missing(operand, comb),
        },
    }
}

/// Outcome for a path that did not resolve.
fn missing(operand: &Operand, comb: Operator) -> Option<bool> {
    match operand {
        Operand::Operators(ops) => Some(fold(
            comb,
            ops.iter()
                .map(|(op, inner)| conclude(*op, missing(inner, *op))),
        )),
        _ => Some(false),
    }
}

/// Combinators whose leaf comparison skips mismatched shapes.
fn shape_guarded(comb: Operator) -> bool {
    matches!(
        comb,
        Operator::Not | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
    )
}

fn compare(value: &Value, operand: &Operand, comb: Operator) -> Option<bool> {
    match operand {
        Operand::Operators(ops) => Some(fold(
            comb,
            ops.iter()
                .map(|(op, inner)| conclude(*op, compare(value, inner, *op))),
        )),
        Operand::Regex(pattern) => {
            let hit = value.as_str().is_some_and(|s| pattern.is_match(s));
            Some(if comb == Operator::Ne { !hit } else { hit })
        }
        Operand::Nested(sub) => match value {
            Value::Object(map) => {
                let inner = if comb == Operator::Not {
                    Operator::And
                } else {
                    comb
                };
                Some(eval(sub, map, inner))
            }
            _ if shape_guarded(comb) => None,
            _ => Some(false),
        },
        Operand::Value(expected) => compare_value(value, expected, comb),
    }
}

fn compare_value(value: &Value, expected: &Value, comb: Operator) -> Option<bool> {
    match comb {
        Operator::And | Operator::Or => Some(value == expected),
        Operator::In => expected.as_array().map(|items| items.contains(value)),
        Operator::NotIn => expected.as_array().map(|items| !items.contains(value)),
        _ if value.shape() != expected.shape() => None,
        Operator::Not => Some(value == expected),
        Operator::Ne => Some(value != expected),
        Operator::Gt => order(value, expected).map(|o| o == Ordering::Greater),
        Operator::Gte => order(value, expected).map(|o| o != Ordering::Less),
        Operator::Lt => order(value, expected).map(|o| o == Ordering::Less),
        Operator::Lte => order(value, expected).map(|o| o != Ordering::Greater),
    }
}

fn order(value: &Value, expected: &Value) -> Option<Ordering> {
    value.compare(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value as JsonValue};

    fn doc(json: JsonValue) -> Document {
        match Value::from(json) {
            Value::Object(map) => map,
            other => panic!("not a document: {other:?}"),
        }
    }

    fn check(query: JsonValue, document: JsonValue) -> bool {
        matches(&Query::from_json(&query).unwrap(), &doc(document))
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(check(json!({}), json!({"a": 1})));
        assert!(check(json!({}), json!({})));
    }

    #[test]
    fn conjunction() {
        assert!(check(json!({"a": 1, "b": 2}), json!({"a": 1, "b": 2, "c": 3})));
        assert!(!check(json!({"a": 1, "b": 2}), json!({"a": 1, "b": 3})));
        assert!(!check(json!({"a": 1, "b": 2}), json!({"a": 1})));
    }

    #[test]
    fn equality_is_type_strict() {
        assert!(!check(json!({"a": "1"}), json!({"a": 1})));
        assert!(check(json!({"a": 1}), json!({"a": 1.0})));
        assert!(check(json!({"a": null}), json!({"a": null})));
        assert!(!check(json!({"a": null}), json!({})));
    }

    #[test]
    fn disjunction_short_circuits() {
        assert!(check(json!({"$or": {"a": 1, "b": 2}}), json!({"a": 1, "b": 99})));
        assert!(check(json!({"$or": {"a": 1, "b": 2}}), json!({"b": 2})));
        assert!(!check(json!({"$or": {"a": 1, "b": 2}}), json!({"a": 5, "b": 5})));
        assert!(!check(json!({"$or": {}}), json!({"a": 1})));
    }

    #[test]
    fn disjunction_skips_missing_paths() {
        assert!(check(json!({"$or": {"x.y": 1, "b": 2}}), json!({"b": 2})));
    }

    #[test]
    fn negation() {
        assert!(check(json!({"$not": {"a": 1}}), json!({"a": 2})));
        assert!(!check(json!({"$not": {"a": 1}}), json!({"a": 1})));
        assert!(check(json!({"$not": {"a": 1, "b": 2}}), json!({"a": 1, "b": 3})));
        assert!(check(json!({"$not": {"a": 1}}), json!({})));
    }

    #[test]
    fn shape_guard_skips_mismatches() {
        // "x" vs number: no information, so the negation sees an empty AND.
        assert!(!check(json!({"$not": {"a": "x"}}), json!({"a": 1})));
        assert!(check(json!({"$ne": {"a": "x"}}), json!({"a": 1})));
        assert!(check(json!({"$gt": {"a": "x"}}), json!({"a": 1})));
        assert!(check(json!({"$gt": {"a": 5}, "b": 1}), json!({"a": "text", "b": 1})));
    }

    #[test]
    fn ordering_operators() {
        let d = json!({"n": 5, "s": "m"});
        assert!(check(json!({"$gt": {"n": 4}}), d.clone()));
        assert!(!check(json!({"$gt": {"n": 5}}), d.clone()));
        assert!(check(json!({"$gte": {"n": 5}}), d.clone()));
        assert!(check(json!({"$lt": {"n": 5.5}}), d.clone()));
        assert!(!check(json!({"$lte": {"n": 4}}), d.clone()));
        assert!(check(json!({"$gt": {"s": "a"}}), d.clone()));
        assert!(!check(json!({"$lt": {"s": "a"}}), d));
    }

    #[test]
    fn ne_operator() {
        assert!(check(json!({"$ne": {"a": 2}}), json!({"a": 1})));
        assert!(!check(json!({"$ne": {"a": 1}}), json!({"a": 1})));
    }

    #[test]
    fn membership() {
        assert!(check(json!({"$in": {"s": ["a", "b"]}}), json!({"s": "b"})));
        assert!(!check(json!({"$in": {"s": ["a", "b"]}}), json!({"s": "c"})));
        assert!(check(json!({"$nin": {"s": ["a", "b"]}}), json!({"s": "c"})));
        assert!(!check(json!({"$nin": {"s": ["a"]}}), json!({"s": "a"})));
        assert!(!check(json!({"$in": {"s": [1]}}), json!({"s": "1"})));
    }

    #[test]
    fn field_level_operators() {
        let d = json!({"n": 3});
        assert!(check(json!({"n": {"$gt": 0}}), d.clone()));
        assert!(check(json!({"n": {"$gt": 0, "$lt": 5}}), d.clone()));
        assert!(!check(json!({"n": {"$gt": 0, "$lt": 2}}), d.clone()));
        assert!(check(json!({"n": {"$in": [1, 2, 3]}}), d.clone()));
        assert!(check(json!({"n": {"$not": {"$gt": 5}}}), d));
        assert!(check(json!({"m": {"$not": {"$gt": 5}}}), json!({})));
        assert!(!check(json!({"m": {"$gt": 5}}), json!({})));
    }

    #[test]
    fn nested_paths() {
        let d = json!({"a": {"b": {"c": 1}}, "s": "x"});
        assert!(check(json!({"a.b.c": 1}), d.clone()));
        assert!(!check(json!({"a.b.c": 2}), d.clone()));
        assert!(!check(json!({"a.x.c": 1}), d.clone()));
        assert!(!check(json!({"s.len": 1}), d));
    }

    #[test]
    fn nested_document_operand() {
        let d = json!({"a": {"b": 1, "c": 2}});
        assert!(check(json!({"a": {"b": 1}}), d.clone()));
        assert!(!check(json!({"a": {"b": 2}}), d.clone()));
        assert!(check(json!({"$gt": {"a": {"c": 1}}}), d.clone()));
        assert!(!check(json!({"a": {"b": 1}}), json!({"a": 5})));
    }

    #[test]
    fn array_traversal() {
        let d = json!({"items": [{"v": 1}, {"v": 2}]});
        assert!(check(json!({"items.[].v": 2}), d.clone()));
        assert!(!check(json!({"items.[].v": 3}), d.clone()));
        assert!(check(json!({"items[].v": {"$gt": 1}}), d.clone()));
        assert!(!check(json!({"items.[].v": {"$gt": 2}}), d.clone()));
        assert!(check(json!({"$not": {"items.[].v": 3}}), d.clone()));
        assert!(!check(json!({"items.[].v": 1}), json!({"items": 7})));
        assert!(!check(json!({"items.[].v": 1}), json!({"items": []})));
    }

    #[test]
    fn array_of_scalars() {
        let d = json!({"tags": ["red", "blue"]});
        assert!(check(json!({"tags.[]": "blue"}), d.clone()));
        assert!(!check(json!({"tags.[]": "green"}), d.clone()));
        assert!(check(json!({"tags": ["red", "blue"]}), d));
    }

    #[test]
    fn regex_operand() {
        let q = json!({"name": {"type": "regex", "pattern": "^al"}});
        assert!(check(q.clone(), json!({"name": "alice"})));
        assert!(!check(q.clone(), json!({"name": "bob"})));
        assert!(!check(q.clone(), json!({"name": 5})));
        let ne = json!({"$ne": {"name": {"type": "regex", "pattern": "^al"}}});
        assert!(check(ne, json!({"name": "bob"})));
        let or = json!({"$or": {"name": {"type": "regex", "pattern": "^b"}, "n": 1}});
        assert!(check(or, json!({"name": "bob", "n": 0})));
    }

    #[test]
    fn curried_form_filters() {
        let query = Query::from_json(&json!({"k": {"$gte": 2}})).unwrap();
        let docs: Vec<Document> = (0..5).map(|k| doc(json!({"k": k}))).collect();
        let hits = docs.iter().filter(|d| matcher(&query)(d)).count();
        assert_eq!(hits, 3);
    }

    proptest! {
        #[test]
        fn conjunction_law(a in -3i64..3, b in -3i64..3, qa in -3i64..3, qb in -3i64..3) {
            let hit = check(json!({"a": qa, "b": qb}), json!({"a": a, "b": b}));
            prop_assert_eq!(hit, a == qa && b == qb);
        }

        #[test]
        fn or_is_any(a in -3i64..3, b in -3i64..3, qa in -3i64..3, qb in -3i64..3) {
            let hit = check(json!({"$or": {"a": qa, "b": qb}}), json!({"a": a, "b": b}));
            prop_assert_eq!(hit, a == qa || b == qb);
        }

        #[test]
        fn not_negates_and(a in -3i64..3, qa in -3i64..3) {
            let plain = check(json!({"a": qa}), json!({"a": a}));
            let negated = check(json!({"$not": {"a": qa}}), json!({"a": a}));
            prop_assert_eq!(plain, !negated);
        }
    }
}
