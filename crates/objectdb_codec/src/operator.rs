//! Operator tags and their persisted tokens.
//!
//! Queries and change specs use `$`-prefixed tokens on the wire and in the
//! log. Inside the engine they are plain enum variants; the tables below are
//! the only place the two forms meet.

use std::fmt;

/// Prefix that marks a key as an operator token rather than a field.
pub const OPERATOR_PREFIX: char = '$';

/// Returns true if `key` is spelled like an operator token.
#[must_use]
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with(OPERATOR_PREFIX)
}

/// Query operators.
///
/// Every operator doubles as a combinator: its value is a sub-query whose
/// field conditions are evaluated under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// All conditions hold.
    And,
    /// At least one condition holds.
    Or,
    /// Not all conditions hold.
    Not,
    /// Field is greater than the operand.
    Gt,
    /// Field is greater than or equal to the operand.
    Gte,
    /// Field is less than the operand.
    Lt,
    /// Field is less than or equal to the operand.
    Lte,
    /// Field differs from the operand.
    Ne,
    /// Field is a member of the operand sequence.
    In,
    /// Field is not a member of the operand sequence.
    NotIn,
}

const QUERY_TOKENS: [(Operator, &str); 10] = [
    (Operator::And, "$and"),
    (Operator::Or, "$or"),
    (Operator::Not, "$not"),
    (Operator::Gt, "$gt"),
    (Operator::Gte, "$gte"),
    (Operator::Lt, "$lt"),
    (Operator::Lte, "$lte"),
    (Operator::Ne, "$ne"),
    (Operator::In, "$in"),
    (Operator::NotIn, "$nin"),
];

impl Operator {
    /// Returns the persisted token for this operator.
    #[must_use]
    pub fn token(self) -> &'static str {
        QUERY_TOKENS
            .iter()
            .find(|(op, _)| *op == self)
            .map_or("$?", |(_, token)| token)
    }

    /// Looks up an operator by its persisted token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        QUERY_TOKENS
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(op, _)| *op)
    }

    /// Returns true if conditions under this operator combine with OR.
    ///
    /// Every other operator combines its conditions with AND.
    #[must_use]
    pub fn is_disjunctive(self) -> bool {
        self == Operator::Or
    }

    /// Returns true if the operand of a field under this operator must be a
    /// sequence.
    #[must_use]
    pub fn takes_sequence(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Change-spec operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOperator {
    /// Replace the value at a path.
    Set,
    /// Remove the value at a path.
    Unset,
    /// Add to the number at a path.
    Increment,
    /// Multiply the number at a path.
    Multiply,
    /// Keep the smaller of current and operand.
    Min,
    /// Keep the larger of current and operand.
    Max,
    /// Move the value at a path to another path.
    Rename,
}

const UPDATE_TOKENS: [(UpdateOperator, &str); 7] = [
    (UpdateOperator::Set, "$set"),
    (UpdateOperator::Unset, "$unset"),
    (UpdateOperator::Increment, "$inc"),
    (UpdateOperator::Multiply, "$mul"),
    (UpdateOperator::Min, "$min"),
    (UpdateOperator::Max, "$max"),
    (UpdateOperator::Rename, "$rename"),
];

impl UpdateOperator {
    /// Returns the persisted token for this operator.
    #[must_use]
    pub fn token(self) -> &'static str {
        UPDATE_TOKENS
            .iter()
            .find(|(op, _)| *op == self)
            .map_or("$?", |(_, token)| token)
    }

    /// Looks up an operator by its persisted token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        UPDATE_TOKENS
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(op, _)| *op)
    }

    /// Returns true if this operator needs a numeric operand.
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            UpdateOperator::Increment
                | UpdateOperator::Multiply
                | UpdateOperator::Min
                | UpdateOperator::Max
        )
    }
}

impl fmt::Display for UpdateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
