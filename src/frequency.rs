//! Display-frequency and global-cap validation.

use serde::{Deserialize, Serialize};

use crate::{
    model::{Campaign, DisplaySettings, FrequencyPolicy, OnceScope, Timestamp},
    scheduler::PresentationLock,
};

/// Ordered list of display timestamps for one campaign.
///
/// The caller prunes the history to a bounded retention window after each
/// display; see [`DisplayHistory::prune`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, derive_more::From)]
#[serde(transparent)]
pub struct DisplayHistory(Vec<Timestamp>);

impl DisplayHistory {
    /// How far back display timestamps are retained.
    pub fn default_retention() -> chrono::Duration {
        chrono::Duration::days(2)
    }

    pub fn new(timestamps: Vec<Timestamp>) -> DisplayHistory {
        DisplayHistory(timestamps)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Most recent display, if any.
    pub fn last_shown(&self) -> Option<Timestamp> {
        self.0.iter().max().copied()
    }

    /// Append a display timestamp.
    pub fn record(&mut self, at: Timestamp) {
        self.0.push(at);
    }

    /// Drop timestamps older than `retention` before `now`.
    pub fn prune(&mut self, now: Timestamp, retention: chrono::Duration) {
        let cutoff = now - retention;
        self.0.retain(|t| *t >= cutoff);
    }

    fn any_at_or_after(&self, instant: Timestamp) -> bool {
        self.0.iter().any(|t| *t >= instant)
    }
}

/// Mutable per-session display bookkeeping, owned by the persistent state
/// collaborator and reset at session boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// When the current session started.
    pub session_start: Timestamp,
    /// Campaign displays in the current session.
    pub session_display_count: u32,
    /// Campaign displays today.
    pub today_display_count: u32,
    /// When campaign display state last changed (usually the last display).
    pub last_state_change: Option<Timestamp>,
}

impl SessionState {
    /// Fresh state for a session starting at `now`.
    pub fn new(now: Timestamp) -> SessionState {
        SessionState {
            session_start: now,
            session_display_count: 0,
            today_display_count: 0,
            last_state_change: None,
        }
    }
}

/// Validates per-campaign frequency policy and global display caps.
///
/// Pure with respect to its inputs: calling [`is_eligible`][Self::is_eligible]
/// twice with unchanged state returns the same result.
pub struct FrequencyValidator;

impl FrequencyValidator {
    /// Return `true` if `campaign` may be displayed now.
    ///
    /// A priority campaign bypasses the session/day caps and the minimum
    /// inter-display spacing, but never the presentation lock.
    pub fn is_eligible(
        &self,
        campaign: &Campaign,
        history: &DisplayHistory,
        session: &SessionState,
        settings: &DisplaySettings,
        lock: &PresentationLock,
        now: Timestamp,
    ) -> bool {
        if lock.is_held() {
            log::trace!(target: "inapp", campaign_id = campaign.id;
                "campaign ineligible: another presentation is in flight");
            return false;
        }

        if !campaign.priority && !self.passes_global_caps(campaign, session, settings, now) {
            return false;
        }

        campaign.frequency.allows(history, session, now)
    }

    fn passes_global_caps(
        &self,
        campaign: &Campaign,
        session: &SessionState,
        settings: &DisplaySettings,
        now: Timestamp,
    ) -> bool {
        if settings
            .max_per_session
            .is_some_and(|max| session.session_display_count >= max)
        {
            log::trace!(target: "inapp", campaign_id = campaign.id;
                "campaign ineligible: session display cap reached");
            return false;
        }

        if settings
            .max_per_day
            .is_some_and(|max| session.today_display_count >= max)
        {
            log::trace!(target: "inapp", campaign_id = campaign.id;
                "campaign ineligible: daily display cap reached");
            return false;
        }

        if let (Some(min_interval), Some(last_change)) =
            (settings.min_display_interval(), session.last_state_change)
        {
            if now - last_change < min_interval {
                log::trace!(target: "inapp", campaign_id = campaign.id;
                    "campaign ineligible: minimum display spacing not elapsed");
                return false;
            }
        }

        true
    }
}

impl FrequencyPolicy {
    /// Return `true` if this policy allows another display now.
    fn allows(&self, history: &DisplayHistory, session: &SessionState, now: Timestamp) -> bool {
        match *self {
            FrequencyPolicy::Once {
                scope: OnceScope::Lifetime,
            } => history.is_empty(),

            // A display recorded at or after session start blocks the
            // campaign. This includes future-dated markers: some hosts
            // persist session markers with a future timestamp, and those must
            // keep blocking.
            FrequencyPolicy::Once {
                scope: OnceScope::Session,
            } => !history.any_at_or_after(session.session_start),

            FrequencyPolicy::Periodic { unit, count } => {
                if count <= 0 {
                    return false;
                }
                match history.last_shown() {
                    None => true,
                    Some(last) => now > last + unit.duration(count),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::model::{PeriodUnit, TargetingTree};

    fn campaign(frequency: FrequencyPolicy, priority: bool) -> Campaign {
        Campaign {
            id: "c-1".into(),
            targeting: TargetingTree::match_all(),
            frequency,
            priority,
            delay: None,
            trigger: Default::default(),
            min_sdk_version: None,
            max_sdk_version: None,
            content: Default::default(),
        }
    }

    fn once_lifetime() -> FrequencyPolicy {
        FrequencyPolicy::Once {
            scope: OnceScope::Lifetime,
        }
    }

    #[test]
    fn once_lifetime_blocks_after_first_display() {
        let now = Utc::now();
        let campaign = campaign(once_lifetime(), false);
        let session = SessionState::new(now - Duration::minutes(5));
        let settings = DisplaySettings::default();
        let lock = PresentationLock::new();

        let mut history = DisplayHistory::default();
        assert!(FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));

        history.record(now - Duration::days(30));
        assert!(!FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));
    }

    #[test]
    fn once_session_blocks_on_display_after_session_start() {
        let now = Utc::now();
        let campaign = campaign(
            FrequencyPolicy::Once {
                scope: OnceScope::Session,
            },
            false,
        );
        let session = SessionState::new(now - Duration::minutes(10));
        let settings = DisplaySettings::default();
        let lock = PresentationLock::new();

        // shown last session only
        let history = DisplayHistory::new(vec![now - Duration::hours(5)]);
        assert!(FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));

        // shown this session
        let history = DisplayHistory::new(vec![now - Duration::minutes(1)]);
        assert!(!FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));

        // future-dated marker blocks as well
        let history = DisplayHistory::new(vec![now + Duration::hours(1)]);
        assert!(!FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));
    }

    #[test]
    fn periodic_days_respects_interval() {
        let now = Utc::now();
        let campaign = campaign(
            FrequencyPolicy::Periodic {
                unit: PeriodUnit::Days,
                count: 1,
            },
            false,
        );
        let session = SessionState::new(now - Duration::minutes(10));
        let settings = DisplaySettings::default();
        let lock = PresentationLock::new();

        assert!(FrequencyValidator.is_eligible(
            &campaign,
            &DisplayHistory::default(),
            &session,
            &settings,
            &lock,
            now
        ));

        let history = DisplayHistory::new(vec![now - Duration::hours(25)]);
        assert!(FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));

        let history = DisplayHistory::new(vec![now - Duration::hours(1)]);
        assert!(!FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));
    }

    #[test]
    fn periodic_with_non_positive_count_never_eligible() {
        let now = Utc::now();
        let campaign = campaign(
            FrequencyPolicy::Periodic {
                unit: PeriodUnit::Hours,
                count: 0,
            },
            false,
        );
        let session = SessionState::new(now);
        assert!(!FrequencyValidator.is_eligible(
            &campaign,
            &DisplayHistory::default(),
            &session,
            &DisplaySettings::default(),
            &PresentationLock::new(),
            now
        ));
    }

    #[test]
    fn session_cap_gates_non_priority() {
        let now = Utc::now();
        let campaign = campaign(once_lifetime(), false);
        let mut session = SessionState::new(now - Duration::minutes(10));
        session.session_display_count = 3;
        let settings = DisplaySettings {
            max_per_session: Some(3),
            ..Default::default()
        };
        assert!(!FrequencyValidator.is_eligible(
            &campaign,
            &DisplayHistory::default(),
            &session,
            &settings,
            &PresentationLock::new(),
            now
        ));
    }

    #[test]
    fn priority_bypasses_caps_but_not_lock() {
        let now = Utc::now();
        let campaign = campaign(once_lifetime(), true);
        let mut session = SessionState::new(now - Duration::minutes(10));
        session.session_display_count = 99;
        session.today_display_count = 99;
        session.last_state_change = Some(now - Duration::seconds(1));
        let settings = DisplaySettings {
            max_per_session: Some(1),
            max_per_day: Some(1),
            min_display_interval_secs: Some(3600),
        };

        let lock = PresentationLock::new();
        assert!(FrequencyValidator.is_eligible(
            &campaign,
            &DisplayHistory::default(),
            &session,
            &settings,
            &lock,
            now
        ));

        assert!(lock.try_acquire());
        assert!(!FrequencyValidator.is_eligible(
            &campaign,
            &DisplayHistory::default(),
            &session,
            &settings,
            &lock,
            now
        ));
    }

    #[test]
    fn min_display_interval_gates_non_priority() {
        let now = Utc::now();
        let campaign = campaign(once_lifetime(), false);
        let mut session = SessionState::new(now - Duration::hours(1));
        session.last_state_change = Some(now - Duration::seconds(30));
        let settings = DisplaySettings {
            min_display_interval_secs: Some(60),
            ..Default::default()
        };
        let lock = PresentationLock::new();
        let history = DisplayHistory::default();

        assert!(!FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));

        session.last_state_change = Some(now - Duration::seconds(120));
        assert!(FrequencyValidator.is_eligible(
            &campaign, &history, &session, &settings, &lock, now
        ));
    }

    #[test]
    fn is_eligible_is_idempotent() {
        let now = Utc::now();
        let campaign = campaign(once_lifetime(), false);
        let session = SessionState::new(now - Duration::minutes(10));
        let settings = DisplaySettings::default();
        let lock = PresentationLock::new();
        let history = DisplayHistory::new(vec![now - Duration::days(1)]);

        let first =
            FrequencyValidator.is_eligible(&campaign, &history, &session, &settings, &lock, now);
        let second =
            FrequencyValidator.is_eligible(&campaign, &history, &session, &settings, &lock, now);
        assert_eq!(first, second);
    }

    #[test]
    fn prune_drops_old_timestamps() {
        let now = Utc::now();
        let mut history = DisplayHistory::new(vec![
            now - Duration::days(3),
            now - Duration::hours(12),
            now - Duration::minutes(1),
        ]);
        history.prune(now, DisplayHistory::default_retention());
        assert_eq!(history, DisplayHistory::new(vec![
            now - Duration::hours(12),
            now - Duration::minutes(1),
        ]));
    }
}
