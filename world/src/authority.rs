//! Entity authority model and replica smoothing.
//!
//! Exactly one participant, the one that spawned an entity, may mutate its
//! canonical state. Every other participant runs the same logic locally but
//! only mirrors what the authority publishes. Mutating entity methods consult
//! [`AuthorityModel::permits`] instead of comparing participants themselves.

use std::time::Duration;

use duel_defence_core::{ParticipantId, ReplicatedState};

/// Identity of the local participant and the match's master.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AuthorityModel {
    local: ParticipantId,
    master: ParticipantId,
}

impl AuthorityModel {
    /// Creates a model for the local participant.
    #[must_use]
    pub const fn new(local: ParticipantId, master: ParticipantId) -> Self {
        Self { local, master }
    }

    /// Participant running this simulation.
    #[must_use]
    pub const fn local(&self) -> ParticipantId {
        self.local
    }

    /// Participant coordinating match-wide decisions.
    #[must_use]
    pub const fn master(&self) -> ParticipantId {
        self.master
    }

    /// Reports whether the local participant is the master.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.local == self.master
    }

    /// Creates the record for an entity whose authority is `authority`.
    #[must_use]
    pub fn record_for(&self, authority: ParticipantId) -> AuthorityRecord {
        AuthorityRecord {
            authority,
            is_authority: authority == self.local,
            last_published: None,
            since_publish: Duration::ZERO,
        }
    }

    /// Reports whether the local participant may mutate the entity behind `record`.
    #[must_use]
    pub fn permits(&self, record: &AuthorityRecord) -> bool {
        record.is_authority && record.authority == self.local
    }
}

/// Per-entity authority flag plus the publication cache.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AuthorityRecord {
    authority: ParticipantId,
    is_authority: bool,
    last_published: Option<ReplicatedState>,
    since_publish: Duration,
}

impl AuthorityRecord {
    /// Participant authoritative for the entity. Fixed for the entity's lifetime.
    #[must_use]
    pub const fn authority(&self) -> ParticipantId {
        self.authority
    }

    /// Whether the local participant owns the canonical state.
    #[must_use]
    pub const fn is_authority(&self) -> bool {
        self.is_authority
    }

    /// State most recently published by, or received from, the authority.
    #[must_use]
    pub const fn last_published(&self) -> Option<ReplicatedState> {
        self.last_published
    }

    /// Accumulates time since the last publication and reports whether one is due.
    pub(crate) fn publish_due(&mut self, dt: Duration, period: Duration) -> bool {
        if !self.is_authority {
            return false;
        }
        self.since_publish = self.since_publish.saturating_add(dt);
        if self.since_publish < period {
            return false;
        }
        self.since_publish = if period.is_zero() {
            Duration::ZERO
        } else {
            self.since_publish.saturating_sub(period).min(period)
        };
        true
    }

    /// Caches the state that was published or received.
    pub(crate) fn remember(&mut self, state: ReplicatedState) {
        self.last_published = Some(state);
    }
}

/// Moves a displayed value toward the latest snapshot at a constant rate.
///
/// The rate is recomputed on every snapshot as `delta / publish_period`, so
/// the displayed value reaches the snapshot exactly when the next one is
/// expected. The displayed value never overshoots its target, which keeps it
/// from moving backward while successive snapshots are non-decreasing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSmoother {
    displayed: f32,
    target: f32,
    rate: f32,
}

impl ProgressSmoother {
    /// Creates a smoother resting at `initial`.
    #[must_use]
    pub const fn new(initial: f32) -> Self {
        Self {
            displayed: initial,
            target: initial,
            rate: 0.0,
        }
    }

    /// Value currently shown to the observer.
    #[must_use]
    pub const fn displayed(&self) -> f32 {
        self.displayed
    }

    /// Value of the most recent snapshot.
    #[must_use]
    pub const fn target(&self) -> f32 {
        self.target
    }

    /// Retargets the smoother at a freshly received snapshot.
    pub fn receive(&mut self, target: f32, publish_period: Duration) {
        self.target = target;
        let period = publish_period.as_secs_f32();
        if target < self.displayed || period <= 0.0 {
            self.displayed = target;
            self.rate = 0.0;
            return;
        }
        self.rate = (target - self.displayed) / period;
    }

    /// Advances the displayed value by `dt` and returns it.
    pub fn advance(&mut self, dt: Duration) -> f32 {
        if self.displayed < self.target {
            let step = self.rate * dt.as_secs_f32();
            self.displayed = (self.displayed + step).min(self.target);
        }
        self.displayed
    }
}

/// Edge-triggered effects produced by applying replicated discrete fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplicaEffects {
    /// Previous and current health when health decreased.
    pub damaged: Option<(u32, u32)>,
    /// New value of the special flag when it flipped.
    pub special: Option<bool>,
    /// New value of the damageable flag when it flipped.
    pub damageable: Option<bool>,
}

impl ReplicaEffects {
    /// Reports whether nothing observable changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.damaged.is_none() && self.special.is_none() && self.damageable.is_none()
    }
}
