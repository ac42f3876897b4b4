//! Exposure telemetry.
//!
//! Downstream systems track campaign exposure regardless of whether the
//! campaign's content could ultimately be rendered, so the pipeline emits one
//! event per targeted-eligible campaign, not only for the winner.

use serde::Serialize;

use crate::{context::TriggerKind, model::Timestamp, SdkMetadata, Str};

/// A campaign whose targeting matched during a selection pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureEvent {
    /// The matched campaign.
    pub campaign_id: Str,
    /// The trigger that started the pass.
    pub trigger: TriggerKind,
    /// `true` for the single winning campaign of the pass.
    pub selected: bool,
    /// When the pass evaluated the campaign.
    pub timestamp: Timestamp,
    /// SDK language and version metadata.
    pub meta_data: EventMetaData,
}

/// Receives exposure events for delivery to the host analytics storage.
pub trait ExposureSink: Send + Sync {
    fn record(&self, event: ExposureEvent);
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetaData {
    pub sdk_name: &'static str,
    pub sdk_version: &'static str,
    pub core_version: &'static str,
}

impl From<&SdkMetadata> for EventMetaData {
    fn from(sdk: &SdkMetadata) -> EventMetaData {
        EventMetaData {
            sdk_name: sdk.name,
            sdk_version: sdk.version,
            core_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn serializes_camel_case() {
        let event = ExposureEvent {
            campaign_id: "c-1".into(),
            trigger: TriggerKind::Custom("checkout".into()),
            selected: true,
            timestamp: Utc::now(),
            meta_data: (&SdkMetadata {
                name: "ios",
                version: "2.3.0",
            })
                .into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["campaignId"], "c-1");
        assert_eq!(json["trigger"]["type"], "CUSTOM");
        assert_eq!(json["trigger"]["name"], "checkout");
        assert_eq!(json["metaData"]["sdkVersion"], "2.3.0");
    }
}
