#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless two-team skirmish.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use skirmish_core::{
    AgentTemplate, Event, ItemId, Order, PixelPos, SimulationConfig, TeamColor, TeamId, TilePos,
};
use skirmish_system_brain::BehaviorKind;
use skirmish_system_scheduler::Scheduler;
use skirmish_world::{query, terrain::Terrain};
use tracing_subscriber::EnvFilter;

const ARENA: [&str; 14] = [
    "........................",
    "........................",
    ".......\"\"\"......#.......",
    ".......\"\"\"......#.......",
    "...........#....#.......",
    "...........#............",
    "........................",
    "........................",
    "............#...........",
    ".......#....#...\"\"\".....",
    ".......#........\"\"\".....",
    "........................",
    "........................",
    "........................",
];

const SQUAD_ROWS: [i32; 5] = [2, 4, 6, 8, 10];
const SQUAD_BEHAVIORS: [BehaviorKind; 5] = [
    BehaviorKind::Standard,
    BehaviorKind::Standard,
    BehaviorKind::RandomWalk,
    BehaviorKind::Standard,
    BehaviorKind::Standard,
];

#[derive(Parser, Debug)]
#[command(name = "skirmish", version, about = "Run a headless two-team skirmish")]
struct Cli {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured random-walk seed.
    #[arg(long)]
    seed: Option<u64>,

    /// ASCII terrain layout (`.` floor, `"` brush, `#` rock) replacing the built-in arena.
    #[arg(long)]
    layout: Option<PathBuf>,
}

/// Entry point for the skirmish command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.population.seed = seed;
    }
    let terrain = load_terrain(cli.layout.as_deref())?;
    tracing::info!(
        columns = terrain.columns(),
        rows = terrain.rows(),
        seed = config.population.seed,
        ticks = cli.ticks,
        "starting skirmish"
    );

    let mut scheduler = Scheduler::new(&config, terrain);
    let mut events = Vec::new();
    let (red, blue) = populate(&mut scheduler, &config, &mut events)?;
    send_red_forward(&mut scheduler, &mut events)?;
    events.clear();

    for _ in 0..cli.ticks {
        scheduler.tick(&mut events);
        log_events(&events);
        events.clear();
        if survivors(&scheduler, red) == 0 || survivors(&scheduler, blue) == 0 {
            tracing::info!(tick = scheduler.tick_count(), "skirmish decided");
            break;
        }
    }

    let stats = scheduler.stats();
    for (id, team) in query::teams(scheduler.world()) {
        tracing::info!(
            team = team.name(),
            id = id.get(),
            survivors = team.members().len(),
            "final standing"
        );
    }
    tracing::info!(
        ticks = scheduler.tick_count(),
        navigation_successes = stats.successes,
        navigation_failures = stats.failures,
        "simulation finished"
    );
    Ok(())
}

fn load_terrain(path: Option<&Path>) -> Result<Terrain> {
    let Some(path) = path else {
        return Terrain::from_layout(&ARENA).context("built-in arena is malformed");
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read layout from {}", path.display()))?;
    let rows: Vec<&str> = contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    Terrain::from_layout(rows.as_slice()).with_context(|| format!("invalid layout in {}", path.display()))
}

fn populate(
    scheduler: &mut Scheduler,
    config: &SimulationConfig,
    events: &mut Vec<Event>,
) -> Result<(TeamId, TeamId)> {
    let red = scheduler
        .create_team("red", TeamColor::from_rgb(200, 40, 40), events)
        .context("red team was not created")?;
    let blue = scheduler
        .create_team("blue", TeamColor::from_rgb(40, 40, 200), events)
        .context("blue team was not created")?;

    let geometry = query::geometry(scheduler.world());
    let template = AgentTemplate::gnome(config.grid.tile_size);
    for (team, column) in [(red, 1), (blue, geometry.columns() - 2)] {
        for (row, behavior) in SQUAD_ROWS.into_iter().zip(SQUAD_BEHAVIORS) {
            let tile = TilePos::new(column, row);
            if let Err(reason) = scheduler.spawn(team, tile, template, behavior, events) {
                tracing::warn!(team = team.get(), ?tile, %reason, "skipping squad member");
            }
        }
    }

    let centre = TilePos::new(geometry.columns() / 2, geometry.rows() / 2);
    for (offset, item) in [(-1, 1), (0, 2), (1, 3)] {
        let tile = TilePos::new(centre.column() + offset, centre.row());
        scheduler.place_item(ItemId::new(item), tile, events);
    }
    Ok((red, blue))
}

fn send_red_forward(scheduler: &mut Scheduler, events: &mut Vec<Event>) -> Result<()> {
    let geometry = query::geometry(scheduler.world());
    let selected = scheduler.select(
        PixelPos::new(0, 0),
        PixelPos::new(geometry.pixel_width() / 4, geometry.pixel_height() - 1),
    );
    if selected.is_empty() {
        return Ok(());
    }
    tracing::info!(agents = selected.len(), "ordering red squad forward");
    scheduler
        .issue(
            Order::GroupMoveTo {
                agents: selected,
                destination: PixelPos::new(geometry.pixel_width() / 3, geometry.pixel_height() / 2),
            },
            events,
        )
        .context("group move order was refused")
}

fn survivors(scheduler: &Scheduler, team: TeamId) -> usize {
    query::team(scheduler.world(), team).map_or(0, |team| team.members().len())
}

fn log_events(events: &[Event]) {
    for event in events {
        match event {
            Event::AttackLanded {
                attacker,
                target,
                dealt,
                remaining,
            } => tracing::debug!(
                attacker = attacker.get(),
                target = target.get(),
                dealt,
                remaining,
                "attack landed"
            ),
            Event::LabelChanged {
                agent,
                label: Some(text),
            } => tracing::debug!(agent = agent.get(), text = text.as_str(), "agent speaks"),
            other => tracing::trace!(?other, "event"),
        }
    }
}
