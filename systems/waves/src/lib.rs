#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic wave scheduler that turns the wave table into spawn commands.
//!
//! Every participant runs a [`WaveScheduler`] against the board it attacks,
//! so the units it spawns are authoritative on that participant. Only the
//! master runs a [`WaveDirector`], which turns wave completions into
//! replicated `StartWave` invocations for the next wave.

mod director;

use std::time::Duration;

use duel_defence_core::{Command, Event, WaveError, WaveSpec, WaveTable};
use log::{debug, info, warn};

pub use director::{DirectorConfig, WaveDirector};

/// Identifier of one `init_wave` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaveRun(u64);

impl WaveRun {
    /// Retrieves the numeric representation of the run.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Phase the scheduler is currently in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveState {
    /// No wave has been started.
    Idle,
    /// A wave was started and its first spawn is due on the next frame.
    Spawning {
        /// Index of the running wave.
        wave: usize,
        /// Spawns left to issue.
        remaining: u32,
    },
    /// Waiting for the interval between two spawns to elapse.
    WaitingInterval {
        /// Index of the running wave.
        wave: usize,
        /// Spawns left to issue.
        remaining: u32,
    },
    /// The most recent wave issued all of its spawns.
    Finished {
        /// Index of the finished wave.
        wave: usize,
    },
}

/// Completion signal raised once per finished run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveCompleted {
    /// Index of the finished wave.
    pub wave: usize,
    /// Run that finished.
    pub run: WaveRun,
}

/// Pure system that emits unit spawn commands for the active wave.
#[derive(Debug)]
pub struct WaveScheduler {
    table: WaveTable,
    state: WaveState,
    accumulator: Duration,
    run: WaveRun,
}

impl WaveScheduler {
    /// Creates an idle scheduler over the provided wave table.
    #[must_use]
    pub fn new(table: WaveTable) -> Self {
        Self {
            table,
            state: WaveState::Idle,
            accumulator: Duration::ZERO,
            run: WaveRun(0),
        }
    }

    /// Current phase of the scheduler.
    #[must_use]
    pub const fn state(&self) -> WaveState {
        self.state
    }

    /// Most recently started run.
    #[must_use]
    pub const fn current_run(&self) -> WaveRun {
        self.run
    }

    /// Number of waves in the table.
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.table.len()
    }

    /// Starts the wave at `index`, cancelling any wave still in progress.
    ///
    /// The cancelled run never reports completion.
    pub fn init_wave(&mut self, index: usize) -> Result<WaveRun, WaveError> {
        let Some(spec) = self.table.get(index) else {
            return Err(WaveError::OutOfRange {
                index,
                len: self.table.len(),
            });
        };

        if let WaveState::Spawning { wave, remaining }
        | WaveState::WaitingInterval { wave, remaining } = self.state
        {
            debug!("cancelling wave {wave} with {remaining} spawns left");
        }

        self.run = WaveRun(self.run.0.wrapping_add(1));
        self.accumulator = Duration::ZERO;
        self.state = WaveState::Spawning {
            wave: index,
            remaining: spec.count,
        };
        info!("wave {index} started as run {}", self.run.0);
        Ok(self.run)
    }

    /// Consumes frame events and emits spawn commands for elapsed intervals.
    ///
    /// The first spawn of a wave is issued on the first frame after
    /// `init_wave`; later spawns follow one per elapsed interval. Returns the
    /// completion signal on the frame the last spawn is issued.
    pub fn handle(&mut self, events: &[Event], out: &mut Vec<Command>) -> Option<WaveCompleted> {
        let elapsed = elapsed(events)?;

        let (wave, mut remaining) = match self.state {
            WaveState::Spawning { wave, remaining } => {
                self.accumulator = Duration::ZERO;
                let spec = self.spec(wave)?;
                if remaining == 0 {
                    (wave, 0)
                } else {
                    emit(spec, out);
                    (wave, remaining - 1)
                }
            }
            WaveState::WaitingInterval { wave, remaining } => {
                self.accumulator = self.accumulator.saturating_add(elapsed);
                (wave, remaining)
            }
            WaveState::Idle | WaveState::Finished { .. } => return None,
        };

        let spec = self.spec(wave)?;
        while remaining > 0 && self.accumulator >= spec.interval {
            self.accumulator -= spec.interval;
            emit(spec, out);
            remaining -= 1;
        }

        if remaining > 0 {
            self.state = WaveState::WaitingInterval { wave, remaining };
            return None;
        }

        self.state = WaveState::Finished { wave };
        self.accumulator = Duration::ZERO;
        info!("wave {wave} finished spawning");
        Some(WaveCompleted {
            wave,
            run: self.run,
        })
    }

    fn spec(&mut self, wave: usize) -> Option<WaveSpec> {
        let spec = self.table.get(wave).copied();
        if spec.is_none() {
            warn!("wave {wave} vanished from the table, scheduler reset");
            self.state = WaveState::Idle;
        }
        spec
    }
}

fn elapsed(events: &[Event]) -> Option<Duration> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::TimeAdvanced { dt } => Some(*dt),
            _ => None,
        })
        .reduce(Duration::saturating_add)
}

fn emit(spec: WaveSpec, out: &mut Vec<Command>) {
    out.push(Command::SpawnUnit {
        kind: spec.unit,
        path_index: None,
    });
}
