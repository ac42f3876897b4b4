//! Interfaces of the external collaborators this core consumes.
//!
//! Network transport, on-device persistence and rendering all live outside
//! this crate; the pipeline and scheduler only talk to these traits.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    context::{GeoResult, MembershipSet},
    frequency::{DisplayHistory, SessionState},
    model::{Campaign, Timestamp},
    scheduler::PresentationTicket,
    Result, Str,
};

/// Resolves the device's geolocation.
///
/// Failure propagates as "requirement unresolved": dependent predicates fail
/// closed, the pipeline continues.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn resolve(&self) -> Result<GeoResult>;
}

/// Checks which of the given customer segmentations the customer belongs to.
#[async_trait]
pub trait SegmentationLookup: Send + Sync {
    async fn check(&self, segmentation_ids: &[Str]) -> Result<MembershipSet>;
}

/// Checks which of the given product segmentations match.
#[async_trait]
pub trait ProductSegmentationLookup: Send + Sync {
    async fn check(&self, segmentation_ids: &[Str]) -> Result<MembershipSet>;
}

/// Externally persisted, crash-consistent device state.
///
/// All reads reflect the latest writes; this crate performs every mutation
/// from its single pipeline/scheduler context.
pub trait PersistentState: Send + Sync {
    /// Ids of campaigns that were ever shown on this device.
    fn shown_campaign_ids(&self) -> HashSet<Str>;

    /// Display timestamps of one campaign.
    fn display_history(&self, campaign_id: &Str) -> DisplayHistory;

    /// Replace the display history of one campaign (used for pruning).
    fn set_display_history(&self, campaign_id: &Str, history: DisplayHistory);

    /// Append a display timestamp for one campaign.
    fn record_display(&self, campaign_id: &Str, at: Timestamp);

    /// Current session bookkeeping.
    fn session_state(&self) -> SessionState;

    /// Bump session/day display counters and the last-state-change timestamp.
    fn record_session_display(&self, at: Timestamp);

    /// Reset session bookkeeping at a session boundary.
    fn reset_session(&self, at: Timestamp);

    /// Number of visits (app opens) recorded for this device, if known.
    fn visit_count(&self) -> Option<u64>;

    /// Push-permission snapshot, if known.
    fn push_permission(&self) -> Option<bool>;
}

/// Renders a winning campaign on screen.
///
/// The renderer must eventually complete the ticket exactly once: either
/// `shown` followed by `dismissed`, or `failed`.
pub trait Renderer: Send + Sync {
    fn present(&self, campaign: Arc<Campaign>, ticket: PresentationTicket);
}

/// Synchronous fire-time check whether the application is able to present
/// (e.g., is in the foreground).
pub trait PresentationProbe: Send + Sync {
    fn can_present(&self) -> bool;
}

/// In-memory [`PersistentState`], suitable for tests and previews.
#[derive(Debug, Default)]
pub struct InMemoryState {
    inner: Mutex<InMemoryStateInner>,
}

#[derive(Debug)]
struct InMemoryStateInner {
    histories: HashMap<Str, DisplayHistory>,
    session: SessionState,
    visit_count: Option<u64>,
    push_permission: Option<bool>,
}

impl Default for InMemoryStateInner {
    fn default() -> InMemoryStateInner {
        InMemoryStateInner {
            histories: HashMap::new(),
            session: SessionState::new(chrono::Utc::now()),
            visit_count: None,
            push_permission: None,
        }
    }
}

impl InMemoryState {
    pub fn new() -> InMemoryState {
        InMemoryState::default()
    }

    pub fn set_visit_count(&self, count: u64) {
        self.lock().visit_count = Some(count);
    }

    pub fn set_push_permission(&self, granted: bool) {
        self.lock().push_permission = Some(granted);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryStateInner> {
        self.inner
            .lock()
            .expect("thread holding state lock should not panic")
    }
}

impl PersistentState for InMemoryState {
    fn shown_campaign_ids(&self) -> HashSet<Str> {
        self.lock()
            .histories
            .iter()
            .filter(|(_, history)| !history.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn display_history(&self, campaign_id: &Str) -> DisplayHistory {
        self.lock()
            .histories
            .get(campaign_id)
            .cloned()
            .unwrap_or_default()
    }

    fn set_display_history(&self, campaign_id: &Str, history: DisplayHistory) {
        self.lock().histories.insert(campaign_id.clone(), history);
    }

    fn record_display(&self, campaign_id: &Str, at: Timestamp) {
        self.lock()
            .histories
            .entry(campaign_id.clone())
            .or_default()
            .record(at);
    }

    fn session_state(&self) -> SessionState {
        self.lock().session.clone()
    }

    fn record_session_display(&self, at: Timestamp) {
        let mut inner = self.lock();
        inner.session.session_display_count += 1;
        inner.session.today_display_count += 1;
        inner.session.last_state_change = Some(at);
    }

    fn reset_session(&self, at: Timestamp) {
        let mut inner = self.lock();
        let today_display_count = inner.session.today_display_count;
        inner.session = SessionState::new(at);
        // daily counter survives session boundaries within the same day
        inner.session.today_display_count = today_display_count;
    }

    fn visit_count(&self) -> Option<u64> {
        self.lock().visit_count
    }

    fn push_permission(&self) -> Option<bool> {
        self.lock().push_permission
    }
}
