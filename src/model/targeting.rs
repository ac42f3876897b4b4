use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::TryParse;
use crate::Str;

/// Identifier of a node inside a campaign's targeting tree.
pub type NodeId = Str;

/// A campaign's targeting expression.
///
/// Nodes are stored in a flat lookup table and reference each other by id
/// (`And`/`Or` children, plus the `root` entry point). A reference to an id
/// absent from `nodes` is an evaluation error, not a silent `false` — see
/// [`crate::targeting`].
///
/// A node whose wire type is unrecognized lands in
/// [`TryParse::ParseFailed`](super::TryParse::ParseFailed); that is the
/// "unknown node" with fail-closed semantics.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetingTree {
    /// Id of the root node.
    pub root: NodeId,
    /// Lookup table of all nodes of this tree.
    #[serde(default)]
    pub nodes: HashMap<NodeId, TryParse<TargetingNode>>,
}

impl TargetingTree {
    /// A tree that matches everyone: a single `True` root.
    pub fn match_all() -> TargetingTree {
        let root: NodeId = "root".into();
        TargetingTree {
            root: root.clone(),
            nodes: HashMap::from([(root, TryParse::Parsed(TargetingNode::True))]),
        }
    }
}

/// One typed predicate (or combinator) of a targeting tree.
///
/// This is a closed set: new predicate kinds are added by extending this enum
/// and the exhaustive matches in [`crate::targeting`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum TargetingNode {
    /// Always matches.
    True,
    /// Matches iff every child matches. Must declare at least one child.
    And { children: Vec<NodeId> },
    /// Matches iff any child matches. A malformed child forces the whole `Or`
    /// to `false`, regardless of other children.
    Or { children: Vec<NodeId> },
    /// Matches iff any of `ids` equals the resolved country/region/city id
    /// (polarity per `kind`).
    Geo { ids: Vec<Str>, kind: MembershipKind },
    /// Customer-segment membership by segmentation id.
    Segment {
        segmentation_id: Str,
        kind: MembershipKind,
    },
    /// Product-segment membership by segmentation id.
    ProductSegment {
        segmentation_id: Str,
        kind: MembershipKind,
    },
    /// String match of `name` against the ids in the view-event payload.
    CategoryId { name: String, kind: StringMatchKind },
    /// Matches iff any view-event id is one of `values` (polarity per `kind`).
    CategoryIdIn {
        values: Vec<String>,
        kind: MembershipKind,
    },
    /// String match of `name` against the ids in the view-event payload.
    ProductId { name: String, kind: StringMatchKind },
    /// Matches iff the pass was triggered by the named custom operation.
    CustomOperation { name: Str },
    /// Matches iff the push-permission snapshot equals `expected`.
    PushPermission { expected: bool },
    /// Compares the resolved visit count against `value`.
    Visit { kind: VisitCompare, value: u64 },
}

/// Polarity of a membership predicate.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipKind {
    /// Matches when the member is present.
    In,
    /// Matches when the member is absent. Still fails closed when the backing
    /// data was never resolved.
    NotIn,
}

/// Kind of a string-matching predicate.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StringMatchKind {
    /// Any view-event id contains the needle as a substring.
    Contains,
    /// No view-event id contains the needle. Requires at least one id.
    NotContains,
    /// Any view-event id starts with the needle.
    StartsWith,
    /// Any view-event id ends with the needle.
    EndsWith,
}

/// Comparison operator of the visit-count predicate.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitCompare {
    Gte,
    Lte,
    Eq,
    Neq,
}
