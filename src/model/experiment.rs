use serde::{Deserialize, Serialize};

use crate::Str;

/// An A/B experiment pre-filtering campaigns.
///
/// The device's bucket (see [`crate::bucketer`]) selects a variant; the
/// variant's scope names the campaigns hidden from that device. The
/// configuration loader (external to this crate) guarantees that variant
/// ranges fully and disjointly cover `[0, 100)`; this crate only computes
/// membership.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: Str,
    /// Salt mixed into the device id when computing the bucket, keeping
    /// variant assignment independent across experiments.
    pub salt: String,
    pub variants: Vec<Variant>,
}

/// One experiment variant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Bucket interval of this variant.
    pub range: BucketRange,
    /// Campaigns hidden from devices bucketed into this variant.
    pub excludes: VariantScope,
}

/// Half-open bucket interval over `[0, 100)`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub struct BucketRange {
    pub start: u32,
    pub end: u32,
}

impl BucketRange {
    pub(crate) fn contains(&self, bucket: u32) -> bool {
        self.start <= bucket && bucket < self.end
    }
}

/// Which campaigns a variant hides.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(
    tag = "kind",
    content = "campaignIds",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum VariantScope {
    /// Hide every campaign (a control group sees nothing).
    AllCampaigns,
    /// Hide the named campaigns only.
    Campaigns(Vec<Str>),
}
