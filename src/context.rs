//! Per-pass evaluation context and the data requirements that feed it.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::Str;

/// The signal that starts a selection pass: application start or a named
/// custom business event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    /// Category/product identifiers from the view-event payload. String
    /// targeting predicates match against these.
    #[serde(default)]
    pub view_ids: Vec<String>,
    /// Structured payload as submitted by the host application. Opaque to
    /// this crate; carried through to telemetry consumers.
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
}

impl TriggerEvent {
    /// The application-start event.
    pub fn app_start() -> TriggerEvent {
        TriggerEvent {
            kind: TriggerKind::AppStart,
            view_ids: Vec::new(),
            payload: HashMap::new(),
        }
    }

    /// A named custom business event.
    pub fn custom(name: impl Into<Str>) -> TriggerEvent {
        TriggerEvent {
            kind: TriggerKind::Custom(name.into()),
            view_ids: Vec::new(),
            payload: HashMap::new(),
        }
    }

    /// Attach view-event ids (e.g., ids of the products on screen).
    pub fn with_view_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.view_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Name of the custom operation, if this is a custom event.
    pub fn custom_operation(&self) -> Option<&Str> {
        match &self.kind {
            TriggerKind::AppStart => None,
            TriggerKind::Custom(name) => Some(name),
        }
    }
}

/// Trigger key used for selection: all campaigns competing in one pass share
/// this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    AppStart,
    Custom(Str),
}

/// Resolved geolocation of the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoResult {
    pub country_id: Option<Str>,
    pub region_id: Option<Str>,
    pub city_id: Option<Str>,
}

impl GeoResult {
    /// Return `true` if any of `ids` equals the resolved country, region or
    /// city id.
    pub(crate) fn matches_any(&self, ids: &[Str]) -> bool {
        [&self.country_id, &self.region_id, &self.city_id]
            .into_iter()
            .flatten()
            .any(|own| ids.contains(own))
    }
}

/// Set of segmentation ids the customer is a member of.
pub type MembershipSet = HashSet<Str>;

/// External data a set of targeting trees needs before evaluation.
///
/// Built by [`TargetingTree::requirements`](crate::model::TargetingTree::requirements)
/// and satisfied by [`DependencyResolver`](crate::resolver::DependencyResolver).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRequirements {
    pub needs_geo: bool,
    pub segmentation_ids: BTreeSet<Str>,
    pub product_segmentation_ids: BTreeSet<Str>,
    pub needs_push_permission: bool,
    pub needs_visit_count: bool,
}

impl DataRequirements {
    /// Union with another requirement set.
    pub fn merge(&mut self, other: DataRequirements) {
        self.needs_geo |= other.needs_geo;
        self.segmentation_ids.extend(other.segmentation_ids);
        self.product_segmentation_ids
            .extend(other.product_segmentation_ids);
        self.needs_push_permission |= other.needs_push_permission;
        self.needs_visit_count |= other.needs_visit_count;
    }

    /// Return `true` if nothing needs resolving.
    pub fn is_empty(&self) -> bool {
        *self == DataRequirements::default()
    }
}

/// Snapshot of customer/session data one selection pass evaluates against.
///
/// Built incrementally by the resolver; read-only once targeting evaluation
/// starts. `None` fields were never resolved (or their fetch failed) and make
/// dependent predicates fail closed.
#[derive(Debug, Default)]
pub struct EvaluationContext {
    /// The event that triggered this pass.
    pub event: Option<TriggerEvent>,
    pub geo: Option<GeoResult>,
    pub segments: Option<MembershipSet>,
    pub product_segments: Option<MembershipSet>,
    pub visit_count: Option<u64>,
    pub push_permission: Option<bool>,
    /// Per-pass completion flags; a slot already attempted this pass is never
    /// re-fetched, even if the attempt failed.
    pub(crate) resolved: ResolvedSlots,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ResolvedSlots {
    pub(crate) geo: bool,
    pub(crate) segments: bool,
    pub(crate) product_segments: bool,
    pub(crate) local: bool,
}

impl EvaluationContext {
    /// Fresh context for handling `event`.
    pub fn for_event(event: TriggerEvent) -> EvaluationContext {
        EvaluationContext {
            event: Some(event),
            ..EvaluationContext::default()
        }
    }

    /// Name of the custom operation that triggered the pass, if any.
    pub fn custom_operation(&self) -> Option<&Str> {
        self.event.as_ref()?.custom_operation()
    }

    /// View-event ids, or `None` if there is no triggering event (missing
    /// context, not an empty payload).
    pub(crate) fn view_ids(&self) -> Option<&[String]> {
        self.event.as_ref().map(|event| event.view_ids.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_matches_any_level() {
        let geo = GeoResult {
            country_id: Some("de".into()),
            region_id: Some("de-by".into()),
            city_id: None,
        };
        assert!(geo.matches_any(&["de".into()]));
        assert!(geo.matches_any(&["fr".into(), "de-by".into()]));
        assert!(!geo.matches_any(&["fr".into()]));
        assert!(!geo.matches_any(&[]));
    }

    #[test]
    fn requirements_merge_is_a_union() {
        let mut a = DataRequirements {
            needs_geo: true,
            segmentation_ids: ["s1".into()].into(),
            ..DataRequirements::default()
        };
        let b = DataRequirements {
            segmentation_ids: ["s2".into()].into(),
            needs_visit_count: true,
            ..DataRequirements::default()
        };
        a.merge(b);
        assert!(a.needs_geo);
        assert!(a.needs_visit_count);
        assert_eq!(a.segmentation_ids.len(), 2);
        assert!(!a.is_empty());
        assert!(DataRequirements::default().is_empty());
    }
}
