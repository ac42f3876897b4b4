//! The event-loop manager tying the pipeline and the scheduler together.
//!
//! A single worker task owns all pipeline passes for the device, so no two
//! passes ever run concurrently against the same state. Events submitted
//! before the configuration is ready stay queued and replay strictly in
//! submission order once [`CampaignManager::notify_configuration_ready`] is
//! called.

use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::{
    bucketer::Sha256Bucketer,
    configuration_store::ConfigurationStore,
    context::{EvaluationContext, TriggerEvent},
    events::ExposureSink,
    model::Timestamp,
    pipeline::CampaignSelectionPipeline,
    providers::{
        GeoLookup, PersistentState, PresentationProbe, ProductSegmentationLookup, Renderer,
        SegmentationLookup,
    },
    resolver::DependencyResolver,
    scheduler::{PresentationLock, PresentationScheduler},
    SdkMetadata,
};

/// Static configuration of a [`CampaignManager`].
#[derive(Debug, Clone)]
pub struct CampaignManagerConfig {
    /// Stable device identifier used for experiment bucketing.
    pub device_id: Uuid,
    /// Host SDK name and version.
    pub sdk_metadata: SdkMetadata,
    /// Bound on a single dependency fetch.
    ///
    /// Defaults to [`DependencyResolver::DEFAULT_FETCH_TIMEOUT`].
    pub fetch_timeout: Duration,
}

impl CampaignManagerConfig {
    pub fn new(device_id: Uuid, sdk_metadata: SdkMetadata) -> CampaignManagerConfig {
        CampaignManagerConfig {
            device_id,
            sdk_metadata,
            fetch_timeout: DependencyResolver::DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Update the dependency fetch timeout.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> CampaignManagerConfig {
        self.fetch_timeout = fetch_timeout;
        self
    }
}

/// External collaborators a [`CampaignManager`] is wired to.
pub struct CampaignManagerServices {
    pub geo: Arc<dyn GeoLookup>,
    pub segmentation: Arc<dyn SegmentationLookup>,
    pub product_segmentation: Arc<dyn ProductSegmentationLookup>,
    pub state: Arc<dyn PersistentState>,
    pub renderer: Arc<dyn Renderer>,
    pub probe: Arc<dyn PresentationProbe>,
    /// Receives exposure telemetry. When absent, exposures are only logged.
    pub exposure_sink: Option<Arc<dyn ExposureSink>>,
}

/// Entry point of the campaign decision core.
///
/// Results surface only through the renderer being invoked (or not);
/// [`submit_event`][Self::submit_event] is fire-and-forget.
pub struct CampaignManager {
    events_tx: mpsc::UnboundedSender<TriggerEvent>,
    config_ready: watch::Sender<bool>,
    scheduler: PresentationScheduler,
    state: Arc<dyn PersistentState>,
    worker: tokio::task::JoinHandle<()>,
}

impl CampaignManager {
    /// Start the manager's worker task.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        config: CampaignManagerConfig,
        services: CampaignManagerServices,
        store: Arc<ConfigurationStore>,
    ) -> CampaignManager {
        let lock = PresentationLock::new();

        let scheduler = PresentationScheduler::new(
            services.renderer,
            services.probe,
            Arc::clone(&services.state),
            Arc::clone(&store),
            lock.clone(),
        );

        let resolver = DependencyResolver::new(
            services.geo,
            services.segmentation,
            services.product_segmentation,
            Arc::clone(&services.state),
        )
        .with_fetch_timeout(config.fetch_timeout);

        let pipeline = CampaignSelectionPipeline::new(
            Box::new(Sha256Bucketer),
            resolver,
            Arc::clone(&services.state),
            config.device_id,
            config.sdk_metadata,
            lock,
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (config_ready, ready_rx) = watch::channel(false);

        let worker = tokio::spawn(worker_loop(
            events_rx,
            ready_rx,
            pipeline,
            scheduler.clone(),
            store,
            services.exposure_sink,
        ));

        CampaignManager {
            events_tx,
            config_ready,
            scheduler,
            state: services.state,
            worker,
        }
    }

    /// Submit a trigger event. Fire-and-forget: the pass runs on the worker
    /// task, in submission order.
    pub fn submit_event(&self, event: TriggerEvent) {
        if self.events_tx.send(event).is_err() {
            log::warn!(target: "inapp", "event worker has shut down; dropping event");
        }
    }

    /// Release events buffered while configuration was still downloading.
    pub fn notify_configuration_ready(&self) {
        let _ = self.config_ready.send(true);
    }

    /// Reset session bookkeeping at a session boundary and drop any pending
    /// presentations scheduled for the previous session.
    pub fn new_session(&self, now: Timestamp) {
        self.scheduler.invalidate_all();
        self.state.reset_session(now);
    }

    /// The presentation scheduler, e.g., for invalidating pending buckets
    /// when the application moves to the background.
    pub fn scheduler(&self) -> &PresentationScheduler {
        &self.scheduler
    }

    /// Stop the worker task. Pending events are dropped.
    pub fn shutdown(self) {
        self.scheduler.invalidate_all();
        self.worker.abort();
    }
}

async fn worker_loop(
    mut events_rx: mpsc::UnboundedReceiver<TriggerEvent>,
    mut ready_rx: watch::Receiver<bool>,
    pipeline: CampaignSelectionPipeline,
    scheduler: PresentationScheduler,
    store: Arc<ConfigurationStore>,
    exposure_sink: Option<Arc<dyn ExposureSink>>,
) {
    while let Some(event) = events_rx.recv().await {
        // Gate on configuration readiness. Later events stay queued in the
        // channel, so replay preserves submission order.
        let ready = *ready_rx.borrow();
        if !ready && ready_rx.wait_for(|ready| *ready).await.is_err() {
            return;
        }

        let Some(config) = store.get_configuration() else {
            log::warn!(target: "inapp",
                "configuration marked ready but no snapshot is stored; dropping event");
            continue;
        };

        let now = chrono::Utc::now();
        let mut ctx = EvaluationContext::for_event(event.clone());
        let selection = pipeline.select(&event, &config, &mut ctx, now).await;

        for exposure in selection.exposures {
            match &exposure_sink {
                Some(sink) => sink.record(exposure),
                None => {
                    log::debug!(target: "inapp",
                        campaign_id = exposure.campaign_id,
                        selected = exposure.selected;
                        "campaign exposure");
                }
            }
        }

        if let Some(winner) = selection.winner {
            scheduler.schedule_for_presentation(winner, now);
        }
    }
}
