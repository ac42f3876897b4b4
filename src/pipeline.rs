//! The campaign selection pipeline.
//!
//! Orchestrates one selection pass: experiment filter, static filters,
//! single-shot dependency resolution, in-order targeting evaluation with full
//! exposure telemetry, and frequency validation of the ordered candidates.
//!
//! Selection is deterministic: given the same configuration, device id and
//! event, candidates are always evaluated in configuration order, never
//! concurrently or reordered.

use std::{collections::HashSet, sync::Arc};

use uuid::Uuid;

use crate::{
    bucketer::Bucketer,
    context::{DataRequirements, EvaluationContext, TriggerEvent},
    events::{EventMetaData, ExposureEvent},
    frequency::FrequencyValidator,
    model::{Campaign, Timestamp, VariantScope},
    resolver::DependencyResolver,
    scheduler::PresentationLock,
    Configuration, SdkMetadata, Str,
};

/// Result of one selection pass.
#[derive(Debug)]
pub struct Selection {
    /// The single winning campaign, if any.
    pub winner: Option<Arc<Campaign>>,
    /// One event per targeted-eligible campaign (winner included), in
    /// evaluation order.
    pub exposures: Vec<ExposureEvent>,
}

/// Runs selection passes for one device.
pub struct CampaignSelectionPipeline {
    bucketer: Box<dyn Bucketer + Send + Sync>,
    resolver: DependencyResolver,
    state: Arc<dyn crate::providers::PersistentState>,
    device_id: Uuid,
    sdk: SdkMetadata,
    lock: PresentationLock,
}

impl CampaignSelectionPipeline {
    pub fn new(
        bucketer: Box<dyn Bucketer + Send + Sync>,
        resolver: DependencyResolver,
        state: Arc<dyn crate::providers::PersistentState>,
        device_id: Uuid,
        sdk: SdkMetadata,
        lock: PresentationLock,
    ) -> CampaignSelectionPipeline {
        CampaignSelectionPipeline {
            bucketer,
            resolver,
            state,
            device_id,
            sdk,
            lock,
        }
    }

    /// Run one selection pass for `event` against `config`.
    ///
    /// `ctx` carries resolved data across calls; pass a fresh context per
    /// trigger event, or reuse one to mark a continuation of the same
    /// trigger-event handling.
    pub async fn select(
        &self,
        event: &TriggerEvent,
        config: &Configuration,
        ctx: &mut EvaluationContext,
        now: Timestamp,
    ) -> Selection {
        let exclusions = self.experiment_exclusions(config);
        let shown = self.state.shown_campaign_ids();
        let sdk_version = self.sdk.semver();

        let candidates: Vec<&Campaign> = config
            .campaigns()
            .filter(|c| c.trigger.matches(event))
            .filter(|c| !exclusions.contains(&c.id))
            .filter(|c| c.supports_sdk_version(sdk_version.as_ref()))
            .filter(|c| !shown.contains(&c.id))
            .collect();

        // Resolve the union of every surviving campaign's requirements
        // exactly once before any targeting runs.
        let mut requirements = DataRequirements::default();
        for campaign in &candidates {
            requirements.merge(campaign.targeting.requirements());
        }
        self.resolver.resolve(&requirements, ctx).await;

        let settings = &config.response.settings;
        let meta_data = EventMetaData::from(&self.sdk);
        let mut winner: Option<Arc<Campaign>> = None;
        let mut exposures = Vec::new();

        // Selection stops at the first candidate passing both targeting and
        // frequency, but targeting evaluation continues for the exposure
        // side channel, reusing the already-resolved context.
        for campaign in candidates {
            if !campaign.targeting.check(ctx) {
                continue;
            }

            let mut selected = false;
            if winner.is_none() {
                let history = self.state.display_history(&campaign.id);
                let session = self.state.session_state();
                if FrequencyValidator.is_eligible(
                    campaign, &history, &session, settings, &self.lock, now,
                ) {
                    log::debug!(target: "inapp", campaign_id = campaign.id;
                        "campaign selected for presentation");
                    winner = Some(Arc::new(campaign.clone()));
                    selected = true;
                } else {
                    log::trace!(target: "inapp", campaign_id = campaign.id;
                        "campaign matched targeting but failed frequency validation");
                }
            }

            exposures.push(ExposureEvent {
                campaign_id: campaign.id.clone(),
                trigger: event.kind.clone(),
                selected,
                timestamp: now,
                meta_data,
            });
        }

        Selection { winner, exposures }
    }

    /// Campaigns hidden from this device by experiment variant assignment.
    ///
    /// A device whose bucket is outside every variant's range is excluded
    /// from that experiment's effects entirely.
    fn experiment_exclusions(&self, config: &Configuration) -> Exclusions {
        let mut exclusions = Exclusions::default();
        for experiment in &config.response.experiments {
            let bucket = self.bucketer.bucket(&self.device_id, &experiment.salt);
            let Some(variant) = experiment
                .variants
                .iter()
                .find(|v| v.range.contains(bucket))
            else {
                log::debug!(target: "inapp", experiment_id = experiment.id, bucket;
                    "device bucket outside every variant; experiment not applied");
                continue;
            };
            match &variant.excludes {
                VariantScope::AllCampaigns => exclusions.all = true,
                VariantScope::Campaigns(ids) => exclusions.ids.extend(ids.iter().cloned()),
            }
        }
        exclusions
    }
}

#[derive(Debug, Default)]
struct Exclusions {
    all: bool,
    ids: HashSet<Str>,
}

impl Exclusions {
    fn contains(&self, campaign_id: &Str) -> bool {
        self.all || self.ids.contains(campaign_id)
    }
}
