use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::TargetingTree;
use crate::{context::TriggerEvent, Str};

/// A single in-app campaign definition.
///
/// Materialized once per configuration download and immutable for the
/// duration of a selection pass. Content is opaque to this crate; rendering
/// belongs to the host SDK.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Str,
    /// Targeting expression deciding eligibility for the current context.
    pub targeting: TargetingTree,
    /// How often this campaign may be shown.
    pub frequency: FrequencyPolicy,
    /// Priority campaigns win schedule-bucket ties and bypass global display
    /// caps (but never the presentation lock).
    #[serde(default)]
    pub priority: bool,
    /// Presentation delay in milliseconds. Kept as a raw JSON value: a
    /// missing or non-numeric delay means "present immediately".
    #[serde(default)]
    pub delay: Option<serde_json::Value>,
    /// Which trigger events this campaign responds to.
    #[serde(default)]
    pub trigger: TriggerFilter,
    /// Minimum host SDK version able to render this campaign.
    #[serde(default)]
    pub min_sdk_version: Option<semver::Version>,
    /// Maximum host SDK version able to render this campaign.
    #[serde(default)]
    pub max_sdk_version: Option<semver::Version>,
    /// Opaque content reference handed to the renderer.
    #[serde(default)]
    pub content: ContentRef,
}

impl Campaign {
    /// Presentation delay. A missing or unparsable delay defaults to zero.
    pub fn delay_duration(&self) -> Duration {
        let millis = self
            .delay
            .as_ref()
            .and_then(|v| v.as_u64())
            .unwrap_or_default();
        Duration::from_millis(millis)
    }

    /// Return `true` if the host SDK version falls inside the campaign's
    /// supported range. An unparsable host version fails closed.
    pub(crate) fn supports_sdk_version(&self, version: Option<&semver::Version>) -> bool {
        if self.min_sdk_version.is_none() && self.max_sdk_version.is_none() {
            return true;
        }
        let Some(version) = version else {
            return false;
        };
        if self.min_sdk_version.as_ref().is_some_and(|min| version < min) {
            return false;
        }
        if self.max_sdk_version.as_ref().is_some_and(|max| version > max) {
            return false;
        }
        true
    }
}

/// Opaque campaign content (layout, image URLs, web content...). This crate
/// only passes it through to the renderer.
#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Default,
    PartialEq,
    derive_more::From,
    derive_more::Into,
)]
#[serde(transparent)]
pub struct ContentRef(pub serde_json::Value);

/// Display-frequency policy of a single campaign.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum FrequencyPolicy {
    /// Show at most once per `scope`.
    Once { scope: OnceScope },
    /// Show at most once per `count * unit` interval. A non-positive `count`
    /// makes the campaign permanently ineligible.
    Periodic { unit: PeriodUnit, count: i64 },
}

#[allow(missing_docs)]
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnceScope {
    Lifetime,
    Session,
}

#[allow(missing_docs)]
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodUnit {
    Minutes,
    Hours,
    Days,
}

impl PeriodUnit {
    /// `count` units as a duration.
    pub(crate) fn duration(self, count: i64) -> chrono::Duration {
        match self {
            PeriodUnit::Minutes => chrono::Duration::minutes(count),
            PeriodUnit::Hours => chrono::Duration::hours(count),
            PeriodUnit::Days => chrono::Duration::days(count),
        }
    }
}

/// Which trigger events a campaign responds to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFilter {
    /// Respond to the application-start event.
    #[serde(default = "default_true")]
    pub on_app_start: bool,
    /// Respond to these named custom business events.
    #[serde(default)]
    pub custom_operations: Vec<Str>,
}

fn default_true() -> bool {
    true
}

impl Default for TriggerFilter {
    fn default() -> TriggerFilter {
        TriggerFilter {
            on_app_start: true,
            custom_operations: Vec::new(),
        }
    }
}

impl TriggerFilter {
    /// Return `true` if `event` should start a selection pass for this
    /// campaign.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match event.custom_operation() {
            None => self.on_app_start,
            Some(name) => self.custom_operations.iter().any(|op| op == name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TriggerEvent;

    fn campaign_json(extra: &str) -> Campaign {
        serde_json::from_str(&format!(
            r#"{{
                "id": "c-1",
                "targeting": {{"root": "n1", "nodes": {{"n1": {{"type": "TRUE"}}}}}},
                "frequency": {{"type": "ONCE", "scope": "LIFETIME"}}
                {extra}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn missing_delay_defaults_to_zero() {
        let campaign = campaign_json("");
        assert_eq!(campaign.delay_duration(), Duration::ZERO);
    }

    #[test]
    fn unparsable_delay_defaults_to_zero() {
        let campaign = campaign_json(r#", "delay": "soon""#);
        assert_eq!(campaign.delay_duration(), Duration::ZERO);
    }

    #[test]
    fn numeric_delay_is_milliseconds() {
        let campaign = campaign_json(r#", "delay": 1500"#);
        assert_eq!(campaign.delay_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn sdk_version_gate() {
        let campaign = campaign_json(r#", "minSdkVersion": "2.1.0", "maxSdkVersion": "3.0.0""#);
        let v = |s: &str| semver::Version::parse(s).unwrap();
        assert!(campaign.supports_sdk_version(Some(&v("2.1.0"))));
        assert!(campaign.supports_sdk_version(Some(&v("2.9.9"))));
        assert!(!campaign.supports_sdk_version(Some(&v("2.0.9"))));
        assert!(!campaign.supports_sdk_version(Some(&v("3.0.1"))));
        // unparsable host version fails closed
        assert!(!campaign.supports_sdk_version(None));
        // unconstrained campaign does not care
        assert!(campaign_json("").supports_sdk_version(None));
    }

    #[test]
    fn default_trigger_filter_is_app_start_only() {
        let filter = TriggerFilter::default();
        assert!(filter.matches(&TriggerEvent::app_start()));
        assert!(!filter.matches(&TriggerEvent::custom("checkout")));
    }

    #[test]
    fn custom_operation_trigger() {
        let filter = TriggerFilter {
            on_app_start: false,
            custom_operations: vec!["checkout".into()],
        };
        assert!(filter.matches(&TriggerEvent::custom("checkout")));
        assert!(!filter.matches(&TriggerEvent::custom("search")));
        assert!(!filter.matches(&TriggerEvent::app_start()));
    }
}
