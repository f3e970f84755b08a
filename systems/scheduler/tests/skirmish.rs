use skirmish_core::{AgentTemplate, Event, Order, PixelPos, SimulationConfig, TeamColor, TilePos};
use skirmish_system_brain::BehaviorKind;
use skirmish_system_scheduler::Scheduler;
use skirmish_world::{query, terrain::Terrain};

fn assert_occupancy_matches_footprint(scheduler: &Scheduler) {
    let world = scheduler.world();
    let index = query::spatial_index(world);
    for snapshot in query::agent_view(world).iter() {
        let radii = query::agent(world, snapshot.id).expect("agent").radii();
        let mut expected = index.footprint(snapshot.pixel, radii).expect("legal footprint");
        let mut actual = index
            .occupied_cells(snapshot.id)
            .expect("indexed agent")
            .to_vec();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected, "occupancy drifted for {:?}", snapshot.id);
    }
}

#[test]
fn opposing_teams_fight_until_someone_falls() {
    let mut scheduler = Scheduler::new(&SimulationConfig::default(), Terrain::open(12, 8));
    let mut events = Vec::new();
    let red = scheduler
        .create_team("red", TeamColor::from_rgb(200, 40, 40), &mut events)
        .expect("red");
    let blue = scheduler
        .create_team("blue", TeamColor::from_rgb(40, 40, 200), &mut events)
        .expect("blue");

    let brute = AgentTemplate::gnome(32).with_damage(15);
    for row in [2, 3, 4] {
        let _ = scheduler
            .spawn(red, TilePos::new(2, row), brute, BehaviorKind::Standard, &mut events)
            .expect("red spawn");
        let _ = scheduler
            .spawn(
                blue,
                TilePos::new(6, row),
                AgentTemplate::gnome(32),
                BehaviorKind::Standard,
                &mut events,
            )
            .expect("blue spawn");
    }

    let mut log = Vec::new();
    for _ in 0..1500 {
        scheduler.tick(&mut log);
        assert_occupancy_matches_footprint(&scheduler);
        if log
            .iter()
            .any(|event| matches!(event, Event::AgentDespawned { .. }))
        {
            break;
        }
    }

    let despawned: Vec<_> = log
        .iter()
        .filter_map(|event| match event {
            Event::AgentDespawned { agent } => Some(*agent),
            _ => None,
        })
        .collect();
    assert!(!despawned.is_empty(), "nobody died within the time limit");
    for agent in despawned {
        assert!(scheduler.brain(agent).is_none());
        assert!(query::agent(scheduler.world(), agent).is_none());
        for (_, team) in query::teams(scheduler.world()) {
            assert!(!team.members().contains(&agent));
            assert!(!team.observes(agent));
        }
    }
    assert!(log
        .iter()
        .any(|event| matches!(event, Event::AttackLanded { .. })));
}

#[test]
fn move_order_threads_through_a_gap_in_the_wall() {
    let layout = [
        "............",
        ".....#......",
        ".....#......",
        "............",
        "............",
        ".....#......",
        ".....#......",
    ];
    let terrain = Terrain::from_layout(&layout).expect("layout");
    let mut scheduler = Scheduler::new(&SimulationConfig::default(), terrain);
    let mut events = Vec::new();
    let team = scheduler
        .create_team("red", TeamColor::from_rgb(200, 40, 40), &mut events)
        .expect("team");
    let agent = scheduler
        .spawn(
            team,
            TilePos::new(1, 2),
            AgentTemplate::gnome(32),
            BehaviorKind::Player,
            &mut events,
        )
        .expect("spawn");

    let destination = PixelPos::new(9 * 32 + 16, 2 * 32 + 16);
    scheduler
        .issue(Order::MoveTo { agent, destination }, &mut events)
        .expect("order");
    assert!(scheduler
        .brain(agent)
        .and_then(|brain| brain.navigator())
        .is_some_and(|navigator| navigator.is_forced()));

    for _ in 0..600 {
        scheduler.tick(&mut events);
        if scheduler
            .brain(agent)
            .is_some_and(|brain| brain.navigator().is_none())
        {
            break;
        }
    }

    let entry = query::agent(scheduler.world(), agent).expect("agent");
    assert!(entry.radii().contains(entry.pixel(), destination));
    assert_eq!(scheduler.stats().successes, 1);
    assert_eq!(scheduler.stats().failures, 0);
}
