use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use duel_defence_core::{
    BoardId, Catalog, Command, Event, ParticipantId, UnitKind, UnitStats, WaveSpec, WaveTable,
};
use duel_defence_system_waves::{WaveCompleted, WaveScheduler};
use duel_defence_world::{
    self as world, authority::AuthorityModel, grid::TileMap, query, Board, BoardConfig,
};

const HOST: ParticipantId = ParticipantId::new(1);
const GUEST: ParticipantId = ParticipantId::new(2);

#[test]
fn wave_units_enter_the_opponent_board_under_local_authority() {
    let mut board = opponent_board(7);
    let mut scheduler = WaveScheduler::new(table());
    let run = scheduler.init_wave(0).expect("wave exists");

    let (events, completions) = drive(&mut board, &mut scheduler, 12);

    let spawned: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::EntitySpawned {
                entity, payload, ..
            } => Some((*entity, *payload)),
            _ => None,
        })
        .collect();
    assert_eq!(spawned.len(), 3);
    for (entity, payload) in spawned {
        assert_eq!(entity.spawner(), HOST);
        assert_eq!(payload.authority, HOST);
        assert_eq!(payload.owner_board, BoardId::new(1));
    }
    assert_eq!(completions, vec![WaveCompleted { wave: 0, run }]);
    assert_eq!(query::units(&board).active_count(), 3);
}

#[test]
fn wave_replay_is_deterministic_for_a_seed() {
    let fingerprint = |seed| {
        let mut board = opponent_board(seed);
        let mut scheduler = WaveScheduler::new(table());
        let _ = scheduler.init_wave(0).expect("wave exists");
        let (events, _) = drive(&mut board, &mut scheduler, 40);

        let mut hasher = DefaultHasher::new();
        for event in &events {
            format!("{event:?}").hash(&mut hasher);
        }
        hasher.finish()
    };

    assert_eq!(fingerprint(11), fingerprint(11));
}

fn drive(
    board: &mut Board,
    scheduler: &mut WaveScheduler,
    frames: usize,
) -> (Vec<Event>, Vec<WaveCompleted>) {
    let mut history = Vec::new();
    let mut completions = Vec::new();
    let mut commands = Vec::new();

    for _ in 0..frames {
        let mut events = Vec::new();
        world::apply(
            board,
            Command::Tick {
                dt: Duration::from_millis(500),
            },
            &mut events,
        );
        if let Some(done) = scheduler.handle(&events, &mut commands) {
            completions.push(done);
        }
        for command in commands.drain(..) {
            world::apply(board, command, &mut events);
        }
        history.append(&mut events);
    }

    (history, completions)
}

fn opponent_board(seed: u64) -> Board {
    Board::new(
        BoardId::new(1),
        GUEST,
        &TileMap::from_rows(["S#.", ".#S", ".#.", ".G."]),
        Catalog::new().with_unit(
            UnitKind::new(0),
            UnitStats {
                health: 4,
                speed: 0.5,
                leak_damage: 1,
                bounty: 1,
            },
        ),
        BoardConfig {
            rng_seed: seed,
            ..BoardConfig::default()
        },
        AuthorityModel::new(HOST, HOST),
    )
    .expect("valid board")
}

fn table() -> WaveTable {
    WaveTable::new(vec![WaveSpec {
        count: 3,
        interval: Duration::from_secs(1),
        unit: UnitKind::new(0),
    }])
}
