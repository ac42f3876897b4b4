//! Targeting-tree evaluation.
//!
//! Evaluation is fail-closed throughout: "unknown" is treated as "does not
//! match," never as "match."
//!
//! Two kinds of failure are distinguished:
//!
//! - *Malformed targeting data* (a dangling node reference, an `And` without
//!   children, an unknown node type in a position where it cannot be
//!   contained) is a hard evaluation error. It is logged and surfaced as
//!   `false` from [`TargetingTree::check`] — deliberately not hidden behind a
//!   default.
//! - *Missing context* (a predicate's data was never resolved) silently makes
//!   that predicate evaluate to `false`.
//!
//! One deliberate asymmetry: an unknown node that is a direct child of an
//! `Or` forces the whole `Or` to `false` instead of being skipped, regardless
//! of other matching children — the unknown predicate could have widened the
//! audience, so the `Or` cannot be trusted.

use std::collections::HashSet;

use crate::{
    context::{DataRequirements, EvaluationContext},
    model::{MembershipKind, NodeId, StringMatchKind, TargetingNode, TargetingTree, TryParse,
            VisitCompare},
};

/// Nesting deeper than this aborts evaluation; it only occurs when the node
/// table contains a reference cycle.
const MAX_NODE_DEPTH: usize = 64;

/// Hard targeting-evaluation errors. All of them degrade to "campaign does
/// not match" at the [`TargetingTree::check`] boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetingError {
    /// A node referenced an id absent from the lookup table.
    #[error("targeting node `{0}` is not defined")]
    DanglingReference(NodeId),

    /// The node failed to parse (unknown type or malformed fields).
    #[error("targeting node `{0}` is malformed")]
    MalformedNode(NodeId),

    /// An `And` node declared no children.
    #[error("targeting node `{0}` declares no children")]
    NoChildren(NodeId),

    /// Node nesting exceeded [`MAX_NODE_DEPTH`]; the node table is cyclic.
    #[error("targeting tree is nested too deeply at node `{0}`")]
    NestingTooDeep(NodeId),
}

impl TargetingTree {
    /// Evaluate this tree against `ctx`.
    ///
    /// Malformed trees are logged and reported as not matching.
    pub fn check(&self, ctx: &EvaluationContext) -> bool {
        match self.check_node(&self.root, ctx, 0) {
            Ok(matched) => matched,
            Err(err) => {
                log::warn!(target: "inapp", root_node = self.root;
                    "targeting evaluation failed: {err}");
                false
            }
        }
    }

    /// Collect the external data this tree needs before [`check`][Self::check]
    /// can run validly.
    ///
    /// Malformed and dangling nodes contribute nothing (they never match, so
    /// they need no data).
    pub fn requirements(&self) -> DataRequirements {
        let mut requirements = DataRequirements::default();
        let mut visited = HashSet::new();
        self.collect_requirements(&self.root, &mut requirements, &mut visited);
        requirements
    }

    fn lookup(&self, id: &NodeId) -> Result<&TryParse<TargetingNode>, TargetingError> {
        self.nodes
            .get(id)
            .ok_or_else(|| TargetingError::DanglingReference(id.clone()))
    }

    fn check_node(
        &self,
        id: &NodeId,
        ctx: &EvaluationContext,
        depth: usize,
    ) -> Result<bool, TargetingError> {
        if depth >= MAX_NODE_DEPTH {
            return Err(TargetingError::NestingTooDeep(id.clone()));
        }

        let node = match self.lookup(id)? {
            TryParse::Parsed(node) => node,
            TryParse::ParseFailed(_) => return Err(TargetingError::MalformedNode(id.clone())),
        };

        match node {
            TargetingNode::True => Ok(true),

            TargetingNode::And { children } => {
                if children.is_empty() {
                    return Err(TargetingError::NoChildren(id.clone()));
                }
                for child in children {
                    if !self.check_node(child, ctx, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            TargetingNode::Or { children } => {
                // An unknown child forces the whole OR to false, even when
                // another child would match, so scan for unknowns before
                // short-circuiting on a true child.
                for child in children {
                    if let TryParse::ParseFailed(_) = self.lookup(child)? {
                        log::warn!(target: "inapp", node = id, child;
                            "OR contains an unknown node; forcing the OR to false");
                        return Ok(false);
                    }
                }
                for child in children {
                    if self.check_node(child, ctx, depth + 1)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            TargetingNode::Geo { ids, kind } => Ok(eval_membership(
                ctx.geo.as_ref().map(|geo| geo.matches_any(ids)),
                *kind,
            )),

            TargetingNode::Segment {
                segmentation_id,
                kind,
            } => Ok(eval_membership(
                ctx.segments.as_ref().map(|s| s.contains(segmentation_id)),
                *kind,
            )),

            TargetingNode::ProductSegment {
                segmentation_id,
                kind,
            } => Ok(eval_membership(
                ctx.product_segments
                    .as_ref()
                    .map(|s| s.contains(segmentation_id)),
                *kind,
            )),

            TargetingNode::CategoryId { name, kind } | TargetingNode::ProductId { name, kind } => {
                Ok(ctx
                    .view_ids()
                    .is_some_and(|ids| eval_string_match(ids, name, *kind)))
            }

            // An empty id list counts as missing context, so NOT_IN cannot
            // conclude vacuously true from an event that carried no ids.
            TargetingNode::CategoryIdIn { values, kind } => Ok(eval_membership(
                ctx.view_ids()
                    .filter(|ids| !ids.is_empty())
                    .map(|ids| ids.iter().any(|id| values.contains(id))),
                *kind,
            )),

            TargetingNode::CustomOperation { name } => {
                Ok(ctx.custom_operation() == Some(name))
            }

            TargetingNode::PushPermission { expected } => {
                Ok(ctx.push_permission.is_some_and(|p| p == *expected))
            }

            TargetingNode::Visit { kind, value } => Ok(ctx
                .visit_count
                .is_some_and(|count| match kind {
                    VisitCompare::Gte => count >= *value,
                    VisitCompare::Lte => count <= *value,
                    VisitCompare::Eq => count == *value,
                    VisitCompare::Neq => count != *value,
                })),
        }
    }

    fn collect_requirements(
        &self,
        id: &NodeId,
        requirements: &mut DataRequirements,
        visited: &mut HashSet<NodeId>,
    ) {
        if !visited.insert(id.clone()) {
            return;
        }
        let Some(TryParse::Parsed(node)) = self.nodes.get(id) else {
            return;
        };

        match node {
            TargetingNode::And { children } | TargetingNode::Or { children } => {
                for child in children {
                    self.collect_requirements(child, requirements, visited);
                }
            }
            TargetingNode::Geo { .. } => requirements.needs_geo = true,
            TargetingNode::Segment {
                segmentation_id, ..
            } => {
                requirements.segmentation_ids.insert(segmentation_id.clone());
            }
            TargetingNode::ProductSegment {
                segmentation_id, ..
            } => {
                requirements
                    .product_segmentation_ids
                    .insert(segmentation_id.clone());
            }
            TargetingNode::PushPermission { .. } => requirements.needs_push_permission = true,
            TargetingNode::Visit { .. } => requirements.needs_visit_count = true,
            TargetingNode::True
            | TargetingNode::CategoryId { .. }
            | TargetingNode::CategoryIdIn { .. }
            | TargetingNode::ProductId { .. }
            | TargetingNode::CustomOperation { .. } => {}
        }
    }
}

/// Apply IN/NOT_IN polarity. `present` is `None` when the backing data was
/// never resolved; unresolved never matches, regardless of polarity.
fn eval_membership(present: Option<bool>, kind: MembershipKind) -> bool {
    match (present, kind) {
        (Some(present), MembershipKind::In) => present,
        (Some(present), MembershipKind::NotIn) => !present,
        (None, _) => false,
    }
}

/// Match `needle` against every view-event id. The `Not*` kind only concludes
/// true after checking all ids, and fails closed on an empty id list.
fn eval_string_match(ids: &[String], needle: &str, kind: StringMatchKind) -> bool {
    match kind {
        StringMatchKind::Contains => ids.iter().any(|id| id.contains(needle)),
        StringMatchKind::NotContains => {
            !ids.is_empty() && ids.iter().all(|id| !id.contains(needle))
        }
        StringMatchKind::StartsWith => ids.iter().any(|id| id.starts_with(needle)),
        StringMatchKind::EndsWith => ids.iter().any(|id| id.ends_with(needle)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::context::{GeoResult, TriggerEvent};
    use crate::model::TargetingTree;

    fn tree(root: &str, nodes: &[(&str, serde_json::Value)]) -> TargetingTree {
        TargetingTree {
            root: root.into(),
            nodes: nodes
                .iter()
                .map(|(id, json)| {
                    let node: TryParse<TargetingNode> =
                        serde_json::from_value(json.clone()).unwrap();
                    ((*id).into(), node)
                })
                .collect(),
        }
    }

    fn ctx_with_segments(segments: &[&str]) -> EvaluationContext {
        EvaluationContext {
            segments: Some(segments.iter().map(|s| (*s).into()).collect()),
            ..EvaluationContext::default()
        }
    }

    #[test]
    fn true_node_matches() {
        let tree = tree("n1", &[("n1", serde_json::json!({"type": "TRUE"}))]);
        assert!(tree.check(&EvaluationContext::default()));
    }

    #[test]
    fn and_with_dangling_reference_is_false() {
        let tree = tree(
            "n1",
            &[
                ("n1", serde_json::json!({"type": "AND", "children": ["n2", "ghost"]})),
                ("n2", serde_json::json!({"type": "TRUE"})),
            ],
        );
        assert!(!tree.check(&EvaluationContext::default()));
    }

    #[test]
    fn and_without_children_is_false() {
        let tree = tree(
            "n1",
            &[("n1", serde_json::json!({"type": "AND", "children": []}))],
        );
        assert!(!tree.check(&EvaluationContext::default()));
    }

    #[test]
    fn or_with_unknown_child_is_false_despite_matching_sibling() {
        let _ = env_logger::builder().is_test(true).try_init();
        let tree = tree(
            "n1",
            &[
                ("n1", serde_json::json!({"type": "OR", "children": ["bad", "seg"]})),
                ("bad", serde_json::json!({"type": "WORMHOLE"})),
                (
                    "seg",
                    serde_json::json!({"type": "SEGMENT", "segmentationId": "s-1", "kind": "IN"}),
                ),
            ],
        );
        // The segment alone would match.
        assert!(!tree.check(&ctx_with_segments(&["s-1"])));
    }

    #[test]
    fn or_short_circuits_on_true_child() {
        let tree = tree(
            "n1",
            &[
                ("n1", serde_json::json!({"type": "OR", "children": ["seg", "t"]})),
                (
                    "seg",
                    serde_json::json!({"type": "SEGMENT", "segmentationId": "s-1", "kind": "IN"}),
                ),
                ("t", serde_json::json!({"type": "TRUE"})),
            ],
        );
        assert!(tree.check(&ctx_with_segments(&[])));
    }

    #[test]
    fn cyclic_tree_is_false_not_a_hang() {
        let _ = env_logger::builder().is_test(true).try_init();
        let tree = tree(
            "n1",
            &[
                ("n1", serde_json::json!({"type": "AND", "children": ["n2"]})),
                ("n2", serde_json::json!({"type": "OR", "children": ["n1"]})),
            ],
        );
        assert!(!tree.check(&EvaluationContext::default()));
    }

    #[test]
    fn segment_polarity() {
        let node = |kind: &str| {
            tree(
                "n1",
                &[(
                    "n1",
                    serde_json::json!({"type": "SEGMENT", "segmentationId": "s-1", "kind": kind}),
                )],
            )
        };
        assert!(node("IN").check(&ctx_with_segments(&["s-1"])));
        assert!(!node("IN").check(&ctx_with_segments(&["s-2"])));
        assert!(node("NOT_IN").check(&ctx_with_segments(&["s-2"])));
        assert!(!node("NOT_IN").check(&ctx_with_segments(&["s-1"])));
        // missing context fails closed for both polarities
        assert!(!node("IN").check(&EvaluationContext::default()));
        assert!(!node("NOT_IN").check(&EvaluationContext::default()));
    }

    #[test]
    fn geo_unresolved_is_false() {
        let tree = tree(
            "n1",
            &[(
                "n1",
                serde_json::json!({"type": "GEO", "ids": ["de"], "kind": "IN"}),
            )],
        );
        assert!(!tree.check(&EvaluationContext::default()));

        let ctx = EvaluationContext {
            geo: Some(GeoResult {
                country_id: Some("de".into()),
                ..GeoResult::default()
            }),
            ..EvaluationContext::default()
        };
        assert!(tree.check(&ctx));
    }

    #[test]
    fn product_id_string_matching() {
        let node = |kind: &str| {
            tree(
                "n1",
                &[(
                    "n1",
                    serde_json::json!({"type": "PRODUCT_ID", "name": "sku-42", "kind": kind}),
                )],
            )
        };
        let ctx = EvaluationContext::for_event(
            TriggerEvent::custom("view").with_view_ids(["sku-421", "sku-7"]),
        );

        assert!(node("CONTAINS").check(&ctx));
        assert!(!node("NOT_CONTAINS").check(&ctx));
        assert!(node("STARTS_WITH").check(&ctx));
        assert!(!node("ENDS_WITH").check(&ctx));

        let other = EvaluationContext::for_event(
            TriggerEvent::custom("view").with_view_ids(["sku-7", "sku-8"]),
        );
        assert!(node("NOT_CONTAINS").check(&other));

        // no view event at all: every kind fails closed
        let empty = EvaluationContext::default();
        assert!(!node("CONTAINS").check(&empty));
        assert!(!node("NOT_CONTAINS").check(&empty));
    }

    #[test]
    fn category_id_in_polarity() {
        let node = |kind: &str| {
            tree(
                "n1",
                &[(
                    "n1",
                    serde_json::json!({
                        "type": "CATEGORY_ID_IN", "values": ["shoes", "hats"], "kind": kind
                    }),
                )],
            )
        };
        let ctx =
            EvaluationContext::for_event(TriggerEvent::custom("view").with_view_ids(["shoes"]));
        assert!(node("IN").check(&ctx));
        assert!(!node("NOT_IN").check(&ctx));

        let ctx =
            EvaluationContext::for_event(TriggerEvent::custom("view").with_view_ids(["socks"]));
        assert!(!node("IN").check(&ctx));
        assert!(node("NOT_IN").check(&ctx));
    }

    #[test]
    fn category_id_in_fails_closed_without_view_ids() {
        let node = |kind: &str| {
            tree(
                "n1",
                &[(
                    "n1",
                    serde_json::json!({
                        "type": "CATEGORY_ID_IN", "values": ["shoes"], "kind": kind
                    }),
                )],
            )
        };

        // event with an empty id list: both polarities fail closed, same as
        // the NOT_CONTAINS string match
        let empty_ids = EvaluationContext::for_event(TriggerEvent::custom("view"));
        assert!(!node("IN").check(&empty_ids));
        assert!(!node("NOT_IN").check(&empty_ids));

        // no event at all
        let no_event = EvaluationContext::default();
        assert!(!node("IN").check(&no_event));
        assert!(!node("NOT_IN").check(&no_event));
    }

    #[test]
    fn custom_operation_matches_trigger() {
        let tree = tree(
            "n1",
            &[(
                "n1",
                serde_json::json!({"type": "CUSTOM_OPERATION", "name": "checkout"}),
            )],
        );
        assert!(tree.check(&EvaluationContext::for_event(TriggerEvent::custom("checkout"))));
        assert!(!tree.check(&EvaluationContext::for_event(TriggerEvent::custom("search"))));
        assert!(!tree.check(&EvaluationContext::for_event(TriggerEvent::app_start())));
    }

    #[test]
    fn visit_comparisons() {
        let node = |kind: &str| {
            tree(
                "n1",
                &[(
                    "n1",
                    serde_json::json!({"type": "VISIT", "kind": kind, "value": 3}),
                )],
            )
        };
        let ctx = |count: Option<u64>| EvaluationContext {
            visit_count: count,
            ..EvaluationContext::default()
        };

        assert!(node("GTE").check(&ctx(Some(3))));
        assert!(!node("GTE").check(&ctx(Some(2))));
        assert!(node("LTE").check(&ctx(Some(3))));
        assert!(!node("LTE").check(&ctx(Some(4))));
        assert!(node("EQ").check(&ctx(Some(3))));
        assert!(node("NEQ").check(&ctx(Some(4))));
        // no visit count recorded: fail closed
        assert!(!node("GTE").check(&ctx(None)));
    }

    #[test]
    fn push_permission_requires_snapshot() {
        let tree = tree(
            "n1",
            &[(
                "n1",
                serde_json::json!({"type": "PUSH_PERMISSION", "expected": true}),
            )],
        );
        let ctx = |p: Option<bool>| EvaluationContext {
            push_permission: p,
            ..EvaluationContext::default()
        };
        assert!(tree.check(&ctx(Some(true))));
        assert!(!tree.check(&ctx(Some(false))));
        assert!(!tree.check(&ctx(None)));
    }

    #[test]
    fn requirements_collects_across_nested_nodes() {
        let tree = tree(
            "n1",
            &[
                (
                    "n1",
                    serde_json::json!({"type": "AND", "children": ["geo", "or"]}),
                ),
                ("geo", serde_json::json!({"type": "GEO", "ids": ["de"], "kind": "IN"})),
                (
                    "or",
                    serde_json::json!({"type": "OR", "children": ["seg", "prod", "visit"]}),
                ),
                (
                    "seg",
                    serde_json::json!({"type": "SEGMENT", "segmentationId": "s-1", "kind": "IN"}),
                ),
                (
                    "prod",
                    serde_json::json!({
                        "type": "PRODUCT_SEGMENT", "segmentationId": "p-1", "kind": "NOT_IN"
                    }),
                ),
                ("visit", serde_json::json!({"type": "VISIT", "kind": "GTE", "value": 1})),
            ],
        );

        let req = tree.requirements();
        assert!(req.needs_geo);
        assert!(req.needs_visit_count);
        assert!(!req.needs_push_permission);
        assert_eq!(req.segmentation_ids, ["s-1".into()].into());
        assert_eq!(req.product_segmentation_ids, ["p-1".into()].into());
    }

    #[test]
    fn requirements_of_empty_tree_is_empty() {
        let tree = TargetingTree {
            root: "missing".into(),
            nodes: HashMap::new(),
        };
        assert!(tree.requirements().is_empty());
        // and evaluation of the dangling root fails closed
        assert!(!tree.check(&EvaluationContext::default()));
    }
}
