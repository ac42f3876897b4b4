//! Delay-aware, priority-ordered presentation scheduling.
//!
//! Winning campaigns are bucketed by their target presentation instant; a
//! one-shot timer per bucket re-validates candidates at fire time (state may
//! have changed since scheduling) and hands at most one of them to the
//! renderer. The [`PresentationLock`] guarantees a single in-flight
//! presentation across all buckets and passes.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    configuration_store::ConfigurationStore,
    frequency::{DisplayHistory, FrequencyValidator},
    model::{Campaign, Timestamp},
    providers::{PersistentState, PresentationProbe, Renderer},
    Str,
};

/// Process-wide "is a campaign currently on screen" flag.
///
/// Set by the scheduler immediately before handing off to the renderer and
/// cleared when the renderer completes the [`PresentationTicket`]. At most
/// one holder at any time; attempts to present while held are rejected, not
/// queued.
#[derive(Debug, Clone, Default)]
pub struct PresentationLock(Arc<AtomicBool>);

impl PresentationLock {
    pub fn new() -> PresentationLock {
        PresentationLock::default()
    }

    /// Return `true` if a presentation is currently in flight.
    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handed to the renderer together with the winning campaign. The renderer
/// must call [`shown`][Self::shown] when the campaign appears on screen, and
/// then complete the ticket exactly once with either
/// [`dismissed`][Self::dismissed] or [`failed`][Self::failed].
///
/// Completion releases the presentation lock on every path; a ticket dropped
/// without completion releases it too, so a buggy renderer cannot deadlock
/// all future campaigns.
pub struct PresentationTicket {
    campaign_id: Str,
    state: Arc<dyn PersistentState>,
    lock: PresentationLock,
    completed: bool,
}

impl PresentationTicket {
    /// The campaign appeared on screen.
    pub fn shown(&self) {
        log::debug!(target: "inapp", campaign_id = self.campaign_id; "campaign shown");
    }

    /// The user dismissed the campaign. Records the display and performs
    /// post-display bookkeeping.
    pub fn dismissed(mut self) {
        self.complete(true);
    }

    /// Rendering failed. Releases the lock without recording a display; retry
    /// policy belongs to the renderer.
    pub fn failed(mut self) {
        log::warn!(target: "inapp", campaign_id = self.campaign_id; "renderer reported an error");
        self.complete(false);
    }

    fn complete(&mut self, record_display: bool) {
        if self.completed {
            return;
        }
        self.completed = true;

        if record_display {
            let now = chrono::Utc::now();
            self.state.record_display(&self.campaign_id, now);

            let mut history = self.state.display_history(&self.campaign_id);
            history.prune(now, DisplayHistory::default_retention());
            self.state.set_display_history(&self.campaign_id, history);

            self.state.record_session_display(now);
        }

        self.lock.release();
    }
}

impl Drop for PresentationTicket {
    fn drop(&mut self) {
        if !self.completed {
            log::warn!(target: "inapp", campaign_id = self.campaign_id;
                "presentation ticket dropped without completion; releasing the lock");
            self.completed = true;
            self.lock.release();
        }
    }
}

/// Schedules validated winning campaigns for on-screen presentation.
#[derive(Clone)]
pub struct PresentationScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    renderer: Arc<dyn Renderer>,
    probe: Arc<dyn PresentationProbe>,
    state: Arc<dyn PersistentState>,
    store: Arc<ConfigurationStore>,
    lock: PresentationLock,
    /// Pending campaigns, keyed by target presentation instant (unix millis).
    buckets: Mutex<HashMap<i64, Bucket>>,
}

struct Bucket {
    campaigns: Vec<Arc<Campaign>>,
    timer: tokio::task::JoinHandle<()>,
}

impl PresentationScheduler {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        probe: Arc<dyn PresentationProbe>,
        state: Arc<dyn PersistentState>,
        store: Arc<ConfigurationStore>,
        lock: PresentationLock,
    ) -> PresentationScheduler {
        PresentationScheduler {
            inner: Arc::new(SchedulerInner {
                renderer,
                probe,
                state,
                store,
                lock,
                buckets: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Schedule `campaign` for presentation at `now` plus its configured
    /// delay. Campaigns landing on the same instant share a bucket and
    /// compete at fire time.
    ///
    /// Must be called within a tokio runtime.
    pub fn schedule_for_presentation(&self, campaign: Arc<Campaign>, now: Timestamp) {
        let delay = campaign.delay_duration();
        let target = now + chrono::Duration::from_std(delay).unwrap_or_default();
        let key = target.timestamp_millis();

        let mut buckets = self.inner.lock_buckets();
        if let Some(bucket) = buckets.get_mut(&key) {
            log::trace!(target: "inapp", campaign_id = campaign.id, key;
                "joining existing presentation bucket");
            bucket.campaigns.push(campaign);
            return;
        }

        log::trace!(target: "inapp", campaign_id = campaign.id, key;
            "arming presentation bucket");
        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(key);
        });
        buckets.insert(
            key,
            Bucket {
                campaigns: vec![campaign],
                timer,
            },
        );
    }

    /// Suppress every pending bucket (e.g., the application moved to the
    /// background). No side effects for already-fired buckets.
    pub fn invalidate_all(&self) {
        let buckets = std::mem::take(&mut *self.inner.lock_buckets());
        for (key, bucket) in buckets {
            log::debug!(target: "inapp", key, campaigns = bucket.campaigns.len();
                "invalidating presentation bucket");
            bucket.timer.abort();
        }
    }

    /// The shared presentation lock.
    pub fn lock(&self) -> &PresentationLock {
        &self.inner.lock
    }
}

impl SchedulerInner {
    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Bucket>> {
        self.buckets
            .lock()
            .expect("thread holding scheduler lock should not panic")
    }

    /// Evaluate and consume the bucket at `key`.
    fn fire(&self, key: i64) {
        // The whole bucket is consumed regardless of the outcome.
        let Some(bucket) = self.lock_buckets().remove(&key) else {
            return;
        };

        if !self.probe.can_present() {
            log::debug!(target: "inapp", key, campaigns = bucket.campaigns.len();
                "application cannot present; dropping bucket");
            return;
        }

        // Priority first; ties keep insertion order (stable sort).
        let mut candidates = bucket.campaigns;
        candidates.sort_by_key(|c| !c.priority);

        let now = chrono::Utc::now();
        let settings = self
            .store
            .get_configuration()
            .map(|config| config.response.settings.clone())
            .unwrap_or_default();

        let winner = candidates.into_iter().find(|campaign| {
            let history = self.state.display_history(&campaign.id);
            let session = self.state.session_state();
            FrequencyValidator.is_eligible(
                campaign, &history, &session, &settings, &self.lock, now,
            )
        });

        let Some(campaign) = winner else {
            log::debug!(target: "inapp", key;
                "no campaign in bucket is still eligible at fire time");
            return;
        };

        if !self.lock.try_acquire() {
            log::debug!(target: "inapp", campaign_id = campaign.id;
                "another presentation started before hand-off; dropping campaign");
            return;
        }

        log::debug!(target: "inapp", campaign_id = campaign.id;
            "handing campaign to the renderer");
        let ticket = PresentationTicket {
            campaign_id: campaign.id.clone(),
            state: Arc::clone(&self.state),
            lock: self.lock.clone(),
            completed: false,
        };
        self.renderer.present(campaign, ticket);
    }
}
