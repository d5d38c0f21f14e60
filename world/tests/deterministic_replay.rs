use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use duel_defence_core::{
    BoardId, Catalog, CellCoord, Command, EntityId, Event, ParticipantId, RemovalCause,
    StructureKind, StructureStats, TargetingPolicy, UnitKind, UnitStats,
};
use duel_defence_world::{
    self as world, authority::AuthorityModel, grid::TileMap, query, Board, BoardConfig,
};

const HOST: ParticipantId = ParticipantId::new(1);
const TICK: Duration = Duration::from_millis(100);

#[test]
fn deterministic_replay_produces_identical_runs() {
    let first = replay(7);
    let second = replay(7);

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert!(
        first.events.iter().any(|record| record.starts_with("StructureFired")),
        "scripted run never fired a structure"
    );
}

#[test]
fn every_unit_is_either_killed_or_leaked_exactly_once() {
    let outcome = replay(21);
    let mut spawned = Vec::new();
    let mut departed = Vec::new();

    for event in &outcome.raw {
        match event {
            Event::EntitySpawned { entity, prefab, .. }
                if prefab.entity_kind() == duel_defence_core::EntityKind::Unit =>
            {
                spawned.push(*entity);
            }
            Event::EntityRemoved { removal } => departed.push((removal.entity, removal.cause)),
            Event::EntitiesRemoved { removals } => {
                departed.extend(removals.iter().map(|removal| (removal.entity, removal.cause)));
            }
            _ => {}
        }
    }

    assert_eq!(spawned.len(), 4);
    for unit in &spawned {
        let exits: Vec<RemovalCause> = departed
            .iter()
            .filter(|(entity, _)| entity == unit)
            .map(|(_, cause)| *cause)
            .collect();
        assert_eq!(exits.len(), 1, "unit {unit:?} left {} times", exits.len());
        assert!(matches!(exits[0], RemovalCause::Killed | RemovalCause::Leaked));
    }
}

fn replay(seed: u64) -> ReplayOutcome {
    let mut board = Board::new(
        BoardId::new(0),
        HOST,
        &TileMap::from_rows(["S####.", "....#.", "..G##."]),
        catalog(),
        BoardConfig {
            starting_lives: 10,
            publish_period: Duration::from_millis(200),
            rng_seed: seed,
        },
        AuthorityModel::new(HOST, HOST),
    )
    .expect("valid board");

    let mut raw = Vec::new();
    for command in scripted_commands() {
        world::apply(&mut board, command, &mut raw);
    }

    for _ in 0..120 {
        world::apply(&mut board, Command::Tick { dt: TICK }, &mut raw);
        for (structure, target) in closest_targets(&board) {
            world::apply(
                &mut board,
                Command::FireStructure { structure, target },
                &mut raw,
            );
        }
    }

    ReplayOutcome {
        events: raw.iter().map(|event| format!("{event:?}")).collect(),
        lives: query::lives(&board),
        raw,
    }
}

fn closest_targets(board: &Board) -> Vec<(EntityId, EntityId)> {
    query::structures(board)
        .iter()
        .filter_map(|structure| {
            let radius = match structure.body() {
                world::entity::Body::Structure(state) => state.stats().radius,
                world::entity::Body::Unit(_) => return None,
            };
            query::units(board)
                .closest(structure.position(), radius)
                .map(|unit| (structure.id(), unit.id()))
        })
        .collect()
}

fn scripted_commands() -> Vec<Command> {
    let mut commands = vec![
        Command::PlaceStructure {
            kind: StructureKind::new(0),
            cell: CellCoord::new(3, 1),
        },
        Command::PlaceStructure {
            kind: StructureKind::new(0),
            cell: CellCoord::new(5, 1),
        },
    ];
    commands.extend((0..4).map(|_| Command::SpawnUnit {
        kind: UnitKind::new(0),
        path_index: None,
    }));
    commands
}

fn catalog() -> Catalog {
    Catalog::new()
        .with_unit(
            UnitKind::new(0),
            UnitStats {
                health: 12,
                speed: 0.75,
                leak_damage: 2,
                bounty: 1,
            },
        )
        .with_structure(
            StructureKind::new(0),
            StructureStats {
                health: 40,
                damage: 5,
                cooldown: Duration::from_millis(700),
                radius: 1.5,
                cost: 10,
                targeting: TargetingPolicy::Closest,
            },
        )
}

#[derive(Clone, Debug, PartialEq)]
struct ReplayOutcome {
    events: Vec<String>,
    lives: u32,
    raw: Vec<Event>,
}

impl ReplayOutcome {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.events.hash(&mut hasher);
        self.lives.hash(&mut hasher);
        hasher.finish()
    }
}
