//! Match configuration loaded from TOML.

use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use anyhow::{bail, ensure, Context, Result};
use duel_defence_core::{
    Catalog, CellCoord, ParticipantId, StructureKind, StructureStats, TargetingPolicy, UnitKind,
    UnitStats, WaveSpec, WaveTable,
};
use duel_defence_world::grid::TileMap;
use serde::Deserialize;

const DEFAULT_MATCH: &str = include_str!("../assets/default_match.toml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MatchFile {
    map: Vec<String>,
    #[serde(rename = "match")]
    settings: Settings,
    #[serde(default)]
    units: BTreeMap<String, UnitEntry>,
    #[serde(default)]
    structures: BTreeMap<String, StructureEntry>,
    #[serde(default)]
    waves: Vec<WaveEntry>,
    #[serde(default)]
    structures_placed: Vec<PlacementEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Settings {
    seed: u64,
    tick_rate: u32,
    starting_lives: u32,
    publish_period_ms: u64,
    inter_wave_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitEntry {
    health: u32,
    speed: f32,
    leak_damage: u32,
    #[serde(default)]
    bounty: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StructureEntry {
    health: u32,
    damage: u32,
    cooldown_ms: u64,
    radius: f32,
    #[serde(default)]
    cost: u32,
    targeting: Targeting,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Targeting {
    Closest,
    MostProgressed,
}

impl From<Targeting> for TargetingPolicy {
    fn from(value: Targeting) -> Self {
        match value {
            Targeting::Closest => Self::Closest,
            Targeting::MostProgressed => Self::MostProgressed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WaveEntry {
    unit: String,
    count: u32,
    interval_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlacementEntry {
    participant: Option<u32>,
    kind: String,
    column: u32,
    row: u32,
}

/// Structure a participant builds on its own board before the first wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Placement {
    /// Participant placing the structure, or every participant when `None`.
    pub(crate) participant: Option<ParticipantId>,
    /// Catalog kind of the structure.
    pub(crate) kind: StructureKind,
    /// Cell on the participant's board.
    pub(crate) cell: CellCoord,
}

impl Placement {
    /// Reports whether `participant` builds this structure.
    #[must_use]
    pub(crate) fn applies_to(&self, participant: ParticipantId) -> bool {
        self.participant.map_or(true, |owner| owner == participant)
    }
}

/// Validated match configuration.
#[derive(Clone, Debug)]
pub(crate) struct MatchConfig {
    pub(crate) map: TileMap,
    pub(crate) seed: u64,
    pub(crate) tick: Duration,
    pub(crate) starting_lives: u32,
    pub(crate) publish_period: Duration,
    pub(crate) inter_wave_delay: Duration,
    pub(crate) catalog: Catalog,
    pub(crate) waves: WaveTable,
    pub(crate) placements: Vec<Placement>,
}

impl MatchConfig {
    /// Loads the configuration at `path`, or the built-in match when `None`.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::parse(DEFAULT_MATCH).context("built-in match configuration is invalid");
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read match configuration at {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("invalid match configuration in {}", path.display()))
    }

    /// Parses and validates TOML match configuration contents.
    pub(crate) fn parse(contents: &str) -> Result<Self> {
        let file: MatchFile =
            toml::from_str(contents).context("failed to parse match configuration toml")?;
        let settings = &file.settings;
        ensure!(settings.tick_rate > 0, "tick_rate must be positive");
        ensure!(settings.starting_lives > 0, "starting_lives must be positive");
        ensure!(!file.units.is_empty(), "configuration defines no units");

        let mut catalog = Catalog::new();
        let mut unit_kinds = BTreeMap::new();
        for (index, (name, entry)) in file.units.iter().enumerate() {
            ensure!(
                entry.speed.is_finite() && entry.speed > 0.0,
                "unit `{name}` must have a positive speed"
            );
            let kind = UnitKind::new(kind_index(index, name)?);
            let _ = unit_kinds.insert(name.as_str(), kind);
            catalog = catalog.with_unit(
                kind,
                UnitStats {
                    health: entry.health,
                    speed: entry.speed,
                    leak_damage: entry.leak_damage,
                    bounty: entry.bounty,
                },
            );
        }

        let mut structure_kinds = BTreeMap::new();
        for (index, (name, entry)) in file.structures.iter().enumerate() {
            let kind = StructureKind::new(kind_index(index, name)?);
            let _ = structure_kinds.insert(name.as_str(), kind);
            catalog = catalog.with_structure(
                kind,
                StructureStats {
                    health: entry.health,
                    damage: entry.damage,
                    cooldown: Duration::from_millis(entry.cooldown_ms),
                    radius: entry.radius,
                    cost: entry.cost,
                    targeting: entry.targeting.into(),
                },
            );
        }

        let mut waves = Vec::with_capacity(file.waves.len());
        for (index, wave) in file.waves.iter().enumerate() {
            let Some(unit) = unit_kinds.get(wave.unit.as_str()) else {
                bail!("wave {index} references unknown unit `{}`", wave.unit);
            };
            waves.push(WaveSpec {
                count: wave.count,
                interval: Duration::from_millis(wave.interval_ms),
                unit: *unit,
            });
        }

        let mut placements = Vec::with_capacity(file.structures_placed.len());
        for entry in &file.structures_placed {
            let Some(kind) = structure_kinds.get(entry.kind.as_str()) else {
                bail!("placement references unknown structure `{}`", entry.kind);
            };
            placements.push(Placement {
                participant: entry.participant.map(ParticipantId::new),
                kind: *kind,
                cell: CellCoord::new(entry.column, entry.row),
            });
        }

        Ok(Self {
            map: TileMap::from_rows(file.map),
            seed: settings.seed,
            tick: Duration::from_secs(1) / settings.tick_rate,
            starting_lives: settings.starting_lives,
            publish_period: Duration::from_millis(settings.publish_period_ms),
            inter_wave_delay: Duration::from_millis(settings.inter_wave_delay_ms),
            catalog,
            waves: WaveTable::new(waves),
            placements,
        })
    }
}

fn kind_index(index: usize, name: &str) -> Result<u16> {
    u16::try_from(index).with_context(|| format!("too many kinds to register `{name}`"))
}
