//! Headless two-participant match driven over the loopback transport.

use std::{collections::BTreeMap, fmt, time::Duration};

use anyhow::{bail, Context, Result};
use duel_defence_core::{
    BoardId, Command, Event, Invocation, ParticipantId, StructureTarget, Transport,
};
use duel_defence_system_replication::{dispatch, Inbound, Publisher};
use duel_defence_system_tower_combat::TowerCombat;
use duel_defence_system_tower_targeting::TowerTargeting;
use duel_defence_system_waves::{DirectorConfig, WaveDirector, WaveScheduler, WaveState};
use duel_defence_world::{authority::AuthorityModel, query, BoardConfig, BoardRegistry};
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{config::MatchConfig, transport::LoopbackTransport};

pub(crate) const HOST: ParticipantId = ParticipantId::new(1);
pub(crate) const GUEST: ParticipantId = ParticipantId::new(2);

const SEATS: [(ParticipantId, BoardId); 2] = [(HOST, BoardId::new(0)), (GUEST, BoardId::new(1))];

/// Why the match stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EndReason {
    /// A board ran out of lives.
    Defeat,
    /// Every wave was spawned and no unit remains on the field.
    WavesCleared,
    /// The simulated time limit was reached.
    TimeLimit,
}

/// Result of a finished match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MatchOutcome {
    pub(crate) winner: Option<ParticipantId>,
    pub(crate) reason: EndReason,
    pub(crate) elapsed: Duration,
    pub(crate) frames: u64,
    pub(crate) lives: Vec<(BoardId, u32)>,
    pub(crate) invocations: u64,
    pub(crate) bytes: u64,
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.winner {
            Some(winner) => write!(f, "participant {} wins", winner.get())?,
            None => write!(f, "draw")?,
        }
        write!(
            f,
            " ({:?} after {:.1}s, {} frames)",
            self.reason,
            self.elapsed.as_secs_f32(),
            self.frames
        )?;
        for (board, lives) in &self.lives {
            write!(f, "; board {} lives {lives}", board.get())?;
        }
        write!(
            f,
            "; {} invocations, {} bytes on the wire",
            self.invocations, self.bytes
        )
    }
}

struct Participant {
    local: ParticipantId,
    target: BoardId,
    registry: BoardRegistry,
    scheduler: WaveScheduler,
    director: WaveDirector,
    targeting: TowerTargeting,
    combat: TowerCombat,
    publisher: Publisher,
    targets: Vec<StructureTarget>,
    commands: Vec<Command>,
    outbound: Vec<Invocation>,
}

impl Participant {
    fn new(local: ParticipantId, config: &MatchConfig, seeds: &[u64; 2]) -> Result<Self> {
        let authority = AuthorityModel::new(local, HOST);
        let mut registry = BoardRegistry::new(authority);
        for ((owner, board), seed) in SEATS.iter().zip(seeds) {
            registry
                .create(
                    *board,
                    *owner,
                    &config.map,
                    config.catalog.clone(),
                    BoardConfig {
                        starting_lives: config.starting_lives,
                        publish_period: config.publish_period,
                        rng_seed: *seed,
                    },
                )
                .with_context(|| format!("board {} failed to initialize", board.get()))?;
        }

        let home = registry
            .board_of(local)
            .context("participant has no home board")?;
        let target = registry
            .opponent_of(home)
            .context("participant has no opponent board")?;

        Ok(Self {
            local,
            target,
            registry,
            scheduler: WaveScheduler::new(config.waves.clone()),
            director: WaveDirector::new(
                authority,
                DirectorConfig {
                    inter_wave_delay: config.inter_wave_delay,
                },
                config.waves.len(),
            ),
            targeting: TowerTargeting::new(),
            combat: TowerCombat::new(),
            publisher: Publisher::new(),
            targets: Vec::new(),
            commands: Vec::new(),
            outbound: Vec::new(),
        })
    }

    fn home(&self) -> Result<BoardId> {
        self.registry
            .board_of(self.local)
            .context("participant has no home board")
    }

    fn build(&mut self, config: &MatchConfig) -> Result<()> {
        let home = self.home()?;
        let mut events = Vec::new();
        for placement in config
            .placements
            .iter()
            .filter(|placement| placement.applies_to(self.local))
        {
            let _ = self.registry.apply(
                home,
                Command::PlaceStructure {
                    kind: placement.kind,
                    cell: placement.cell,
                },
                &mut events,
            );
            if let Some(Event::PlacementRejected { cell, reason, .. }) = events.last() {
                bail!(
                    "participant {} cannot build at {cell:?}: {reason:?}",
                    self.local.get()
                );
            }
        }

        if let Some(board) = self.registry.board(home) {
            self.publisher.handle(board, &events, &mut self.outbound);
        }
        self.director.begin(&mut self.outbound);
        Ok(())
    }

    fn frame(&mut self, dt: Duration, transport: &mut LoopbackTransport) -> Result<Vec<BoardId>> {
        let mut events: BTreeMap<BoardId, Vec<Event>> = BTreeMap::new();

        let inbound = transport
            .receive(self.local)
            .context("failed to decode an inbound invocation")?;
        for invocation in inbound {
            match dispatch(&invocation) {
                Inbound::Board { board, command } => {
                    let _ = self
                        .registry
                        .apply(board, command, events.entry(board).or_default());
                }
                Inbound::StartWave { index } => {
                    if let Err(error) = self.scheduler.init_wave(index) {
                        warn!("participant {:?} cannot start wave: {error}", self.local);
                    }
                }
            }
        }

        let boards: Vec<BoardId> = self.registry.ids().collect();
        for board in &boards {
            let _ = self.registry.apply(
                *board,
                Command::Tick { dt },
                events.entry(*board).or_default(),
            );
        }

        let attacked = events.entry(self.target).or_default();
        let completed = self.scheduler.handle(attacked, &mut self.commands);
        self.director.handle(attacked, completed, &mut self.outbound);
        for command in self.commands.drain(..) {
            let _ = self.registry.apply(self.target, command, attacked);
        }

        for board in &boards {
            let Some(state) = self.registry.board(*board) else {
                continue;
            };
            self.targeting.handle(
                query::structures(state),
                query::units(state),
                &mut self.targets,
            );
            self.combat.handle(
                query::structure_cooldowns(state),
                &self.targets,
                &mut self.commands,
            );
            let board_events = events.entry(*board).or_default();
            for command in self.commands.drain(..) {
                let _ = self.registry.apply(*board, command, board_events);
            }
        }

        let mut defeated = Vec::new();
        for (board, board_events) in &events {
            if let Some(state) = self.registry.board(*board) {
                self.publisher
                    .handle(state, board_events, &mut self.outbound);
            }
            defeated.extend(board_events.iter().filter_map(|event| match event {
                Event::BoardDefeated { board } => Some(*board),
                _ => None,
            }));
        }
        Ok(defeated)
    }

    fn flush(&mut self, transport: &mut LoopbackTransport) -> Result<u64> {
        let mut sent = 0;
        for invocation in self.outbound.drain(..) {
            transport
                .invoke(&invocation)
                .with_context(|| format!("failed to send {}", invocation.procedure.name()))?;
            sent += 1;
        }
        Ok(sent)
    }

    fn is_idle(&self) -> bool {
        matches!(
            self.scheduler.state(),
            WaveState::Idle | WaveState::Finished { .. }
        ) && self
            .registry
            .boards()
            .all(|board| query::units(board).active_count() == 0)
    }
}

/// Two participants sharing a loopback transport.
pub(crate) struct Match {
    tick: Duration,
    participants: Vec<Participant>,
    transport: LoopbackTransport,
    elapsed: Duration,
    frames: u64,
    invocations: u64,
}

impl Match {
    /// Creates both participants and builds their configured structures.
    pub(crate) fn new(config: &MatchConfig) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let seeds = [rng.gen::<u64>(), rng.gen::<u64>()];

        let mut transport = LoopbackTransport::new(HOST, &[HOST, GUEST]);
        let mut participants = Vec::with_capacity(SEATS.len());
        let mut invocations = 0;
        for (local, _) in SEATS {
            let mut participant = Participant::new(local, config, &seeds)?;
            participant.build(config)?;
            invocations += participant.flush(&mut transport)?;
            participants.push(participant);
        }

        info!(
            "match ready: {} waves, seed {}, tick {:?}",
            config.waves.len(),
            config.seed,
            config.tick
        );
        Ok(Self {
            tick: config.tick,
            participants,
            transport,
            elapsed: Duration::ZERO,
            frames: 0,
            invocations,
        })
    }

    /// Runs frames until a board falls, the waves are cleared, or `limit` passes.
    pub(crate) fn run(mut self, limit: Duration) -> Result<MatchOutcome> {
        loop {
            let mut defeated = Vec::new();
            for participant in &mut self.participants {
                defeated.extend(participant.frame(self.tick, &mut self.transport)?);
                self.invocations += participant.flush(&mut self.transport)?;
            }
            self.elapsed = self.elapsed.saturating_add(self.tick);
            self.frames += 1;

            if let Some(board) = defeated.first() {
                info!("board {} has fallen", board.get());
                let winner = SEATS
                    .iter()
                    .find(|(_, seat)| seat != board)
                    .map(|(owner, _)| *owner);
                return Ok(self.outcome(winner, EndReason::Defeat));
            }

            let exhausted = self
                .participants
                .iter()
                .any(|participant| participant.director.is_exhausted());
            if exhausted && self.participants.iter().all(Participant::is_idle) {
                let winner = self.leader();
                return Ok(self.outcome(winner, EndReason::WavesCleared));
            }

            if self.elapsed >= limit {
                let winner = self.leader();
                return Ok(self.outcome(winner, EndReason::TimeLimit));
            }

            if self.frames % 200 == 0 {
                debug!("frame {} at {:?}", self.frames, self.elapsed);
            }
        }
    }

    fn lives(&self) -> Vec<(BoardId, u32)> {
        let Some(master) = self.participants.iter().find(|p| p.local == HOST) else {
            return Vec::new();
        };
        master
            .registry
            .boards()
            .map(|board| (query::board_id(board), query::lives(board)))
            .collect()
    }

    fn leader(&self) -> Option<ParticipantId> {
        let lives = self.lives();
        let best = lives.iter().map(|(_, lives)| *lives).max()?;
        let mut leaders = lives.iter().filter(|(_, lives)| *lives == best);
        let (board, _) = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        SEATS
            .iter()
            .find(|(_, seat)| seat == board)
            .map(|(owner, _)| *owner)
    }

    fn outcome(&self, winner: Option<ParticipantId>, reason: EndReason) -> MatchOutcome {
        let outcome = MatchOutcome {
            winner,
            reason,
            elapsed: self.elapsed,
            frames: self.frames,
            lives: self.lives(),
            invocations: self.invocations,
            bytes: self.transport.delivered_bytes(),
        };
        info!("match over: {outcome}");
        outcome
    }
}
