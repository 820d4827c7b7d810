//! Routing patterns: binding expressions matched against event types.
//!
//! A pattern is a dot-delimited sequence of segments where
//! - a literal segment matches itself,
//! - `*` matches exactly one segment,
//! - `#` matches zero or more segments.
//!
//! `order.*` therefore matches `order.created` but neither `order` nor
//! `order.created.v2`, while `#` matches every type.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("routing pattern must be non-empty")]
    Empty,

    /// A dot-delimited segment was empty (`order..created`).
    #[error("routing pattern {0:?} contains an empty segment")]
    EmptySegment(String),

    /// A wildcard was mixed into a literal segment (`ord*r`).
    #[error("routing pattern {0:?} mixes a wildcard into a literal segment")]
    EmbeddedWildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    Single,
    /// `#`: zero or more segments.
    Multi,
}

/// A parsed, validated binding expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutingPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut segments = Vec::new();
        for part in pattern.split('.') {
            let segment = match part {
                "" => return Err(PatternError::EmptySegment(pattern.to_string())),
                "*" => Segment::Single,
                "#" => Segment::Multi,
                literal => {
                    if literal.contains('*') || literal.contains('#') {
                        return Err(PatternError::EmbeddedWildcard(pattern.to_string()));
                    }
                    Segment::Literal(literal.to_string())
                }
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern contains no wildcards (exact binding).
    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// True when the multi-segment wildcard, if present, is the final
    /// segment. Broker-side filters only support that placement.
    pub fn multi_wildcard_is_terminal(&self) -> bool {
        self.segments
            .iter()
            .enumerate()
            .all(|(i, s)| !matches!(s, Segment::Multi) || i == self.segments.len() - 1)
    }

    /// Match an event type against this pattern.
    pub fn matches(&self, event_type: &str) -> bool {
        let parts: Vec<&str> = event_type.split('.').collect();
        matches_from(&self.segments, &parts)
    }
}

fn matches_from(segments: &[Segment], parts: &[&str]) -> bool {
    match segments.split_first() {
        None => parts.is_empty(),
        Some((Segment::Literal(lit), rest)) => parts
            .split_first()
            .is_some_and(|(p, tail)| p == lit && matches_from(rest, tail)),
        Some((Segment::Single, rest)) => parts
            .split_first()
            .is_some_and(|(_, tail)| matches_from(rest, tail)),
        Some((Segment::Multi, rest)) => {
            // Zero or more segments: try every split point.
            (0..=parts.len()).any(|n| matches_from(rest, &parts[n..]))
        }
    }
}

impl FromStr for RoutingPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoutingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
