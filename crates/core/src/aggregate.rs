//! Aggregate kinds replicated by the pipeline.
//!
//! The wire envelope keeps `aggregate_type` as a plain string so that a
//! publisher can introduce a new aggregate before every processor knows it.
//! [`AggregateType::parse`] is the single place where the string is
//! interpreted.

use std::fmt;

/// Aggregate type name for user events.
pub const AGGREGATE_USER: &str = "user";

/// Aggregate type name for payment events.
pub const AGGREGATE_PAYMENT: &str = "payment";

/// A domain entity kind whose mutations are tracked as discrete events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateType {
    User,
    Payment,
}

impl AggregateType {
    /// Parse the wire name, returning `None` for aggregate types this
    /// build does not know how to apply.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            AGGREGATE_USER => Some(Self::User),
            AGGREGATE_PAYMENT => Some(Self::Payment),
            _ => None,
        }
    }

    /// The wire / column name of this aggregate type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => AGGREGATE_USER,
            Self::Payment => AGGREGATE_PAYMENT,
        }
    }

    /// Position of this aggregate type in the apply order of a batch.
    ///
    /// Users come before payments because payments may reference users.
    /// Unknown aggregate types (see [`apply_rank_of`]) sort last.
    pub fn apply_rank(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Payment => 1,
        }
    }
}

/// Apply rank for a raw wire name; unknown names sort after every known type.
pub fn apply_rank_of(value: &str) -> u8 {
    AggregateType::parse(value).map_or(u8::MAX, AggregateType::apply_rank)
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
