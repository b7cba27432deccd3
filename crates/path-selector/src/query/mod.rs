//! FABRID policy queries
//!
//! A query states which policy each hop of a path should apply. It is parsed
//! once and can then be evaluated against any number of hop chains.
//!
//! # Syntax
//!
//! | Form | Meaning |
//! |------|---------|
//! | `ISD-AS#IG,EG@L1000` | hop in scope must offer local policy 1000 |
//! | `ISD-AS#IG,EG@G7` | hop in scope must offer global policy 7 |
//! | `ISD-AS#IG,EG@0` | any hop in scope, no policy selected |
//! | `ISD-AS#IG,EG@REJECT` | never matches |
//! | `a # b` | `a` on this hop, then `b` on the following one |
//! | `a + b` | `a`, or else `b`, starting at the same hop |
//! | `{t ? a : b}` | `a` if `t` matches here, otherwise `b` |
//!
//! A zero ISD, AS or interface in a specifier matches anything.
//!
//! # Evaluation
//!
//! Evaluation walks the chain with a cursor. Every specifier consumes exactly
//! one hop; there is no notion of ISD ownership beyond the per-hop scope
//! check, so branches of `+` that cover overlapping hops simply follow the
//! cursor rules.

mod lexer;
mod parser;

use crate::hops::HopRecord;
use crate::{fmt_as, InterfaceId, PolicyId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Text of the query that matches any single hop without selecting a policy
pub const WILDCARD_QUERY: &str = "0-0#0,0@0";

/// Malformed query text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Query syntax error at offset {offset}: {message}")]
pub struct QuerySyntaxError {
    pub message: String,
    /// Byte offset into the query text
    pub offset: usize,
}

impl QuerySyntaxError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Which hops a specifier applies to (0 = any)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HopScope {
    pub isd: u16,
    pub asn: u64,
    pub ingress: InterfaceId,
    pub egress: InterfaceId,
}

impl HopScope {
    /// `0-0#0,0`
    pub const ANY: HopScope = HopScope {
        isd: 0,
        asn: 0,
        ingress: 0,
        egress: 0,
    };

    pub fn covers(&self, hop: &HopRecord) -> bool {
        (self.isd == 0 || self.isd == hop.isd_as.isd)
            && (self.asn == 0 || self.asn == hop.isd_as.asn)
            && (self.ingress == 0 || self.ingress == hop.ingress)
            && (self.egress == 0 || self.egress == hop.egress)
    }
}

impl fmt::Display for HopScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.isd)?;
        fmt_as(self.asn, f)?;
        write!(f, "#{},{}", self.ingress, self.egress)
    }
}

/// Policy part of a hop specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyAction {
    Require(PolicyId),
    Wildcard,
    Reject,
}

/// Parsed query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyQuery {
    /// Hop must offer `policy`; selects it
    Literal { scope: HopScope, policy: PolicyId },
    /// Any hop in scope; selects nothing
    Wildcard { scope: HopScope },
    /// Never matches
    Reject { scope: HopScope },
    /// One child per hop, in order
    Sequence(Vec<PolicyQuery>),
    /// First child that matches from the same hop
    Alternation(Vec<PolicyQuery>),
    /// `test` decides between `then` and `otherwise`, all from the same hop
    Conditional {
        test: Box<PolicyQuery>,
        then: Box<PolicyQuery>,
        otherwise: Box<PolicyQuery>,
    },
}

/// Per-hop policy selection, one slot per hop of the evaluated chain
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchList {
    pub selected: Vec<Option<PolicyId>>,
}

impl MatchList {
    /// All slots unselected
    pub fn empty(hops: usize) -> Self {
        Self {
            selected: vec![None; hops],
        }
    }

    /// Selected policy IDs in hop order, unselected hops skipped
    pub fn policies(&self) -> Vec<PolicyId> {
        self.selected.iter().flatten().copied().collect()
    }

    pub fn get(&self, hop: usize) -> Option<PolicyId> {
        self.selected.get(hop).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Result of evaluating a query against a hop chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Cursor after the last consumed hop (start cursor when unmatched)
    pub end_cursor: usize,
    pub match_list: MatchList,
}

impl MatchResult {
    /// True if the match consumed every hop of a chain of `hops` hops
    pub fn covers(&self, hops: usize) -> bool {
        self.matched && self.end_cursor == hops
    }
}

impl PolicyQuery {
    /// Parse query text
    pub fn parse(text: &str) -> Result<Self, QuerySyntaxError> {
        parser::parse(text)
    }

    /// `Wildcard` repeated once per hop
    pub fn wildcard_chain(hops: usize) -> Self {
        let wildcard = PolicyQuery::Wildcard {
            scope: HopScope::ANY,
        };
        match hops {
            1 => wildcard,
            n => PolicyQuery::Sequence(vec![wildcard; n]),
        }
    }

    /// Evaluate against `chain` starting at hop `cursor`
    pub fn evaluate(&self, chain: &[HopRecord], cursor: usize) -> MatchResult {
        let mut match_list = MatchList::empty(chain.len());

        match self.walk(chain, cursor, &mut match_list) {
            Some(end_cursor) => MatchResult {
                matched: true,
                end_cursor,
                match_list,
            },
            None => MatchResult {
                matched: false,
                end_cursor: cursor,
                match_list: MatchList::empty(chain.len()),
            },
        }
    }

    /// Returns the cursor after this node, or `None` if it does not match.
    /// Selections made by a failing node may be left in `list`; callers that
    /// continue after a failure work on a copy.
    fn walk(&self, chain: &[HopRecord], cursor: usize, list: &mut MatchList) -> Option<usize> {
        match self {
            PolicyQuery::Literal { scope, policy } => {
                let hop = chain.get(cursor)?;
                if !scope.covers(hop) || !hop.offers(policy) {
                    return None;
                }
                list.selected[cursor] = Some(*policy);
                Some(cursor + 1)
            }
            PolicyQuery::Wildcard { scope } => {
                let hop = chain.get(cursor)?;
                if !scope.covers(hop) {
                    return None;
                }
                list.selected[cursor] = None;
                Some(cursor + 1)
            }
            PolicyQuery::Reject { .. } => None,
            PolicyQuery::Sequence(steps) => steps
                .iter()
                .try_fold(cursor, |at, step| step.walk(chain, at, list)),
            PolicyQuery::Alternation(branches) => {
                for branch in branches {
                    let mut attempt = list.clone();
                    if let Some(end) = branch.walk(chain, cursor, &mut attempt) {
                        *list = attempt;
                        return Some(end);
                    }
                }
                None
            }
            PolicyQuery::Conditional {
                test,
                then,
                otherwise,
            } => {
                let mut scratch = list.clone();
                let branch = if test.walk(chain, cursor, &mut scratch).is_some() {
                    then
                } else {
                    otherwise
                };
                branch.walk(chain, cursor, list)
            }
        }
    }

    /// Write a sequence step, grouping compound steps
    fn fmt_step(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self, PolicyQuery::Alternation(_) | PolicyQuery::Sequence(_)) {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for PolicyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyQuery::Literal { scope, policy } => write!(f, "{}@{}", scope, policy),
            PolicyQuery::Wildcard { scope } => write!(f, "{}@0", scope),
            PolicyQuery::Reject { scope } => write!(f, "{}@REJECT", scope),
            PolicyQuery::Sequence(steps) => {
                for (i, step) in steps.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" # ")?;
                    }
                    step.fmt_step(f)?;
                }
                Ok(())
            }
            PolicyQuery::Alternation(branches) => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" + ")?;
                    }
                    if matches!(branch, PolicyQuery::Alternation(_)) {
                        write!(f, "({})", branch)?;
                    } else {
                        write!(f, "{}", branch)?;
                    }
                }
                Ok(())
            }
            PolicyQuery::Conditional {
                test,
                then,
                otherwise,
            } => write!(f, "{{{} ? {} : {}}}", test, then, otherwise),
        }
    }
}

impl FromStr for PolicyQuery {
    type Err = QuerySyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
