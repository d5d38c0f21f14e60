//! Master-side progression from one wave to the next.

use std::time::Duration;

use duel_defence_core::{Event, Invocation, Procedure, TargetScope};
use duel_defence_world::{authority::AuthorityModel, timers::TimerQueue};
use log::{debug, info};

use crate::WaveCompleted;

const DEFAULT_INTER_WAVE_DELAY: Duration = Duration::from_secs(5);

/// Tunables for the wave director.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectorConfig {
    /// Pause between a wave finishing and the next wave starting.
    pub inter_wave_delay: Duration,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            inter_wave_delay: DEFAULT_INTER_WAVE_DELAY,
        }
    }
}

/// Issues replicated `StartWave` invocations on behalf of the master.
///
/// Directors on non-master participants stay silent; they only execute the
/// invocations they receive.
#[derive(Debug)]
pub struct WaveDirector {
    authority: AuthorityModel,
    config: DirectorConfig,
    wave_count: usize,
    timers: TimerQueue<usize>,
    exhausted: bool,
}

impl WaveDirector {
    /// Creates a director for a table of `wave_count` waves.
    #[must_use]
    pub fn new(authority: AuthorityModel, config: DirectorConfig, wave_count: usize) -> Self {
        Self {
            authority,
            config,
            wave_count,
            timers: TimerQueue::new(),
            exhausted: wave_count == 0,
        }
    }

    /// Reports whether the last wave of the table has completed.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Announces the first wave to every participant.
    pub fn begin(&mut self, out: &mut Vec<Invocation>) {
        if !self.authority.is_master() || self.wave_count == 0 {
            return;
        }
        info!("master opening the match with wave 0");
        out.push(self.start_wave(0));
    }

    /// Advances pending inter-wave delays and reacts to a local completion.
    pub fn handle(
        &mut self,
        events: &[Event],
        completed: Option<WaveCompleted>,
        out: &mut Vec<Invocation>,
    ) {
        if !self.authority.is_master() {
            return;
        }

        let dt = events
            .iter()
            .filter_map(|event| match event {
                Event::TimeAdvanced { dt } => Some(*dt),
                _ => None,
            })
            .fold(Duration::ZERO, Duration::saturating_add);
        for (_, index) in self.timers.advance(dt) {
            out.push(self.start_wave(index));
        }

        let Some(completed) = completed else {
            return;
        };
        let next = completed.wave.saturating_add(1);
        if next >= self.wave_count {
            info!("wave table exhausted after wave {}", completed.wave);
            self.exhausted = true;
            return;
        }

        debug!(
            "wave {} completed, wave {next} starts in {:?}",
            completed.wave, self.config.inter_wave_delay
        );
        let _ = self.timers.schedule(self.config.inter_wave_delay, next);
    }

    fn start_wave(&self, index: usize) -> Invocation {
        Invocation::new(
            self.authority.local(),
            TargetScope::All,
            Procedure::StartWave { index },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WaveRun;
    use duel_defence_core::ParticipantId;

    const HOST: ParticipantId = ParticipantId::new(1);
    const GUEST: ParticipantId = ParticipantId::new(2);

    fn frame(millis: u64) -> [Event; 1] {
        [Event::TimeAdvanced {
            dt: Duration::from_millis(millis),
        }]
    }

    fn completed(wave: usize) -> Option<WaveCompleted> {
        Some(WaveCompleted {
            wave,
            run: WaveRun(1),
        })
    }

    #[test]
    fn master_starts_next_wave_after_delay() {
        let mut director = WaveDirector::new(
            AuthorityModel::new(HOST, HOST),
            DirectorConfig {
                inter_wave_delay: Duration::from_secs(1),
            },
            3,
        );
        let mut out = Vec::new();

        director.begin(&mut out);
        director.handle(&frame(100), completed(0), &mut out);
        director.handle(&frame(600), None, &mut out);
        assert_eq!(out.len(), 1);

        director.handle(&frame(400), None, &mut out);
        assert_eq!(
            out,
            vec![
                Invocation::new(HOST, TargetScope::All, Procedure::StartWave { index: 0 }),
                Invocation::new(HOST, TargetScope::All, Procedure::StartWave { index: 1 }),
            ]
        );
        assert!(!director.is_exhausted());
    }

    #[test]
    fn last_completion_exhausts_the_table() {
        let mut director =
            WaveDirector::new(AuthorityModel::new(HOST, HOST), DirectorConfig::default(), 2);
        let mut out = Vec::new();

        director.handle(&frame(16), completed(1), &mut out);
        director.handle(&frame(60_000), None, &mut out);

        assert!(out.is_empty());
        assert!(director.is_exhausted());
    }

    #[test]
    fn non_master_never_issues_invocations() {
        let mut director =
            WaveDirector::new(AuthorityModel::new(GUEST, HOST), DirectorConfig::default(), 3);
        let mut out = Vec::new();

        director.begin(&mut out);
        director.handle(&frame(16), completed(0), &mut out);
        director.handle(&frame(60_000), None, &mut out);

        assert!(out.is_empty());
    }
}
