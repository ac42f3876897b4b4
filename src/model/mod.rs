//! Wire models for the downloaded campaign configuration.
//!
//! Everything here is deserialized once per configuration download and is
//! immutable afterwards. Individual campaigns and targeting nodes are wrapped
//! in [`TryParse`] so that one malformed entry does not poison the rest of the
//! configuration.

mod campaign;
mod experiment;
mod targeting;

pub use campaign::{
    Campaign, ContentRef, FrequencyPolicy, OnceScope, PeriodUnit, TriggerFilter,
};
pub use experiment::{BucketRange, Experiment, Variant, VariantScope};
pub use targeting::{
    MembershipKind, NodeId, StringMatchKind, TargetingNode, TargetingTree, VisitCompare,
};

use serde::{Deserialize, Serialize};

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// `TryParse` allows a subfield to fail parsing without failing the parsing of
/// the whole structure.
///
/// A campaign with an unrecognized frequency policy still leaves the other
/// campaigns servable; a targeting node of an unknown type becomes the
/// "unknown node" that targeting evaluation treats fail-closed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed; the raw value is kept for diagnostics.
    ParseFailed(serde_json::Value),
}

impl<T> TryParse<T> {
    /// Return the parsed value, if any.
    pub fn parsed(&self) -> Option<&T> {
        match self {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// Response format of the campaign configuration endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    /// When the configuration was generated by the server.
    pub created_at: Timestamp,
    /// Campaigns in server-defined order. Order is significant: selection
    /// always walks campaigns in this order.
    pub campaigns: Vec<TryParse<Campaign>>,
    /// Active experiments used to pre-filter campaigns.
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    /// Global display policy.
    #[serde(default)]
    pub settings: DisplaySettings,
}

/// Global display caps applying across all campaigns.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    /// Maximum number of campaign displays per session. Absent means
    /// unlimited.
    #[serde(default)]
    pub max_per_session: Option<u32>,
    /// Maximum number of campaign displays per calendar day. Absent means
    /// unlimited.
    #[serde(default)]
    pub max_per_day: Option<u32>,
    /// Minimum spacing between a state change (last display) and the next
    /// display, in seconds.
    #[serde(default)]
    pub min_display_interval_secs: Option<i64>,
}

impl DisplaySettings {
    /// Minimum inter-display spacing as a duration, if configured.
    pub(crate) fn min_display_interval(&self) -> Option<chrono::Duration> {
        self.min_display_interval_secs.map(chrono::Duration::seconds)
    }
}
