//! Multi-peer games over the in-process transport

use std::sync::{Arc, Mutex};

use domino_trust::clock::{Clock, ManualClock, Millis};
use domino_trust::auth::MessageAuthenticator;
use domino_trust::crypto::LocalIdentity;
use domino_trust::network::LoopbackHub;
use domino_trust::protocol::{Action, Destination, Envelope, MoveUpdate, Outbound, Payload};
use domino_trust::scoreboard::MemoryScoreStore;
use domino_trust::world::{ControlInput, PlayerState, World, WorldConfig, WorldEvent};

const NAMES: [&str; 4] = ["alice", "bob", "carol", "dave"];
const START: Millis = 50_000;

/// Clock running a fixed distance ahead of a shared base clock
struct SkewedClock {
    base: ManualClock,
    skew: Millis,
}

impl Clock for SkewedClock {
    fn now_ms(&self) -> Millis {
        self.base.now_ms() + self.skew
    }
}

fn new_world(seed: u8, clock: Arc<dyn Clock>) -> World {
    World::new(
        LocalIdentity::from_secret([seed; 32]).unwrap(),
        WorldConfig::default(),
        clock,
        Box::new(MemoryScoreStore::new()),
    )
}

/// `n` connected worlds on one clock, none of them playing yet
fn connected(clock: &ManualClock, n: usize) -> LoopbackHub {
    let mut hub = LoopbackHub::new();
    for seed in 0..n {
        hub.add(new_world(seed as u8 + 1, Arc::new(clock.clone())));
    }
    assert!(hub.connect_all());
    hub
}

fn begin_all(hub: &mut LoopbackHub) {
    for i in 0..hub.len() {
        hub.world_mut(i).begin(NAMES[i]);
        assert!(hub.run_until_idle());
    }
}

fn id(hub: &LoopbackHub, i: usize) -> String {
    hub.world(i).local_id().to_string()
}

fn control(hub: &mut LoopbackHub, i: usize, input: ControlInput) {
    hub.world_mut(i).control(input);
    assert!(hub.run_until_idle());
}

fn advance(hub: &mut LoopbackHub, clock: &ManualClock, ms: Millis) {
    clock.advance(ms);
    assert!(hub.tick());
}

#[test]
fn test_players_learned_through_sync() {
    let clock = ManualClock::new(START);
    let mut hub = LoopbackHub::new();
    for seed in 1..=3 {
        let w = hub.add(new_world(seed, Arc::new(clock.clone())));
        // JOIN broadcasts go out before any key is known and get dropped
        hub.world_mut(w).begin(NAMES[w]);
    }
    assert!(hub.connect_all());

    for i in 0..3 {
        assert_eq!(hub.world(i).players().count(), 3);
        assert_eq!(hub.world(i).living_count(), 3);
    }
    let bob = id(&hub, 1);
    assert_eq!(hub.world(0).player(&bob).unwrap().name, "bob");
}

#[test]
fn test_late_joiner_learns_existing_players() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 2);
    begin_all(&mut hub);

    let carol = hub.add(new_world(3, Arc::new(clock.clone())));
    hub.world_mut(carol).connect();
    hub.world_mut(carol).begin("carol");
    assert!(hub.run_until_idle());

    let carol_id = id(&hub, carol);
    for i in 0..2 {
        let other = id(&hub, i);
        assert!(hub.world(carol).knows_key(&other));
        assert!(hub.world(carol).is_synchronized(&other));
        assert!(hub.world(carol).player(&other).is_some());
        assert!(hub.world(i).player(&carol_id).is_some());
    }
}

#[test]
fn test_skewed_clocks_are_translated() {
    let base = ManualClock::new(START);
    let mut hub = LoopbackHub::new();
    let a = hub.add(new_world(1, Arc::new(base.clone())));
    let b = hub.add(new_world(
        2,
        Arc::new(SkewedClock {
            base: base.clone(),
            skew: 250,
        }),
    ));
    hub.world_mut(a).begin("alice");
    hub.world_mut(b).begin("bob");
    assert!(hub.connect_all());

    let (a_id, b_id) = (id(&hub, a), id(&hub, b));
    assert_eq!(hub.world(a).clock_offset(&b_id), Some(250));
    assert_eq!(hub.world(b).clock_offset(&a_id), Some(-250));

    // Bob's join time arrives in Alice's clock
    assert_eq!(hub.world(a).player(&b_id).unwrap().last_order, START);
    assert_eq!(hub.world(b).player(&a_id).unwrap().last_order, START + 250);

    // Motion keeps flowing after the offsets are committed
    hub.world_mut(b).control(ControlInput::MoveRight);
    assert!(hub.run_until_idle());
    assert_eq!(hub.world(a).player(&b_id).unwrap().velocity, 1);
}

#[test]
fn test_push_ends_game_and_admits_score() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 4);
    begin_all(&mut hub);

    let ended = Arc::new(Mutex::new(0));
    for i in 0..4 {
        let counter = Arc::clone(&ended);
        hub.world_mut(i)
            .subscribe(WorldEvent::GameEnd, move |_| *counter.lock().unwrap() += 1);
    }

    // Walk alice to the push trigger and stop there
    control(&mut hub, 0, ControlInput::MoveLeft);
    advance(&mut hub, &clock, 1_700);
    control(&mut hub, 0, ControlInput::Release);
    advance(&mut hub, &clock, 100);

    let alice = id(&hub, 0);
    let me = hub.world(0).local_player().unwrap();
    assert_eq!(me.velocity, 0);
    assert!((me.position + 1.8).abs() < 1e-6);
    for i in 1..4 {
        let seen = hub.world(i).player(&alice).unwrap();
        assert_eq!(seen.velocity, 0);
        assert!((seen.position + 1.8).abs() < 1e-6);
    }

    control(&mut hub, 0, ControlInput::Interact);

    for i in 0..4 {
        let w = hub.world(i);
        assert!(w.game_ended(), "peer {} missed the push", i);
        assert_eq!(w.player(&alice).unwrap().state, PlayerState::Push);
        for j in 1..4 {
            assert_eq!(w.player(&id(&hub, j)).unwrap().state, PlayerState::Lose);
        }
        assert!(w.open_trial(&alice).is_none());
    }

    // Three of four participants must witness; all four do
    for i in 0..4 {
        let board = hub.world(i).leaderboard();
        assert_eq!(board.len(), 1, "peer {} did not admit the record", i);
        assert_eq!(board[0].name, "alice");
        assert_eq!(board[0].participants, 4);
        assert_eq!(board[0].dominoes, 0);
    }

    let collapse = hub.world(0).config().collapse_duration(0);
    advance(&mut hub, &clock, collapse - 1);
    assert_eq!(*ended.lock().unwrap(), 0);
    advance(&mut hub, &clock, 1);
    assert_eq!(*ended.lock().unwrap(), 4);
    assert_eq!(
        hub.world(0).local_player().unwrap().state,
        PlayerState::Normal
    );
}

/// Walk alice to the push trigger. Her final stop never reaches `blind`,
/// who keeps seeing her walk left.
fn walk_alice_to_trigger(hub: &mut LoopbackHub, clock: &ManualClock, blind: &'static [usize]) {
    control(hub, 0, ControlInput::MoveLeft);
    advance(hub, clock, 1_700);
    control(hub, 0, ControlInput::Release);

    hub.set_filter(Box::new(move |from, to, message| {
        let stop = matches!(
            message,
            Outbound::Envelope(e) if e.action == Action::Move && e.data.contains("\"velocity\":0")
        );
        !(from == 0 && stop && blind.contains(&to))
    }));
    advance(hub, clock, 100);
    hub.clear_filter();
}

#[test]
fn test_push_survives_one_denial() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 4);
    begin_all(&mut hub);

    walk_alice_to_trigger(&mut hub, &clock, &[3]);
    let alice = id(&hub, 0);
    assert_eq!(hub.world(3).player(&alice).unwrap().velocity, -1);

    control(&mut hub, 0, ControlInput::Interact);

    // bob, carol and alice herself outvote dave
    for i in 0..4 {
        let w = hub.world(i);
        assert!(w.game_ended(), "peer {} missed the push", i);
        assert_eq!(w.player(&alice).unwrap().state, PlayerState::Push);
        assert!(w.open_trial(&alice).is_none());
    }
}

#[test]
fn test_push_dropped_on_majority_denial() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 3);
    begin_all(&mut hub);

    walk_alice_to_trigger(&mut hub, &clock, &[1, 2]);
    control(&mut hub, 0, ControlInput::Interact);
    advance(&mut hub, &clock, 400);

    let alice = id(&hub, 0);
    for i in 0..3 {
        let w = hub.world(i);
        assert!(!w.game_ended(), "peer {} applied a denied push", i);
        assert!(w.open_trial(&alice).is_none());
        assert_eq!(w.domino_count(), 0);
        assert_eq!(w.living_count(), 3);
        for j in 0..3 {
            assert_eq!(w.player(&id(&hub, j)).unwrap().state, PlayerState::Normal);
        }
    }
}

#[test]
fn test_out_of_range_velocity_dropped() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 2);
    begin_all(&mut hub);
    advance(&mut hub, &clock, 100);

    // A correctly signed MOVE from bob with an absurd velocity
    let bob_identity = LocalIdentity::from_secret([2; 32]).unwrap();
    let mut bob_keys = MessageAuthenticator::new(bob_identity, 1_000);
    let now = clock.now_ms();
    let huge = Payload::Move(MoveUpdate {
        time: now,
        position: 0.0,
        velocity: i32::MIN,
    });
    let envelope = bob_keys.send(Destination::All, &huge, now).unwrap();
    hub.world_mut(0).handle_envelope(&envelope);

    let bob = id(&hub, 1);
    assert_eq!(hub.world(0).player(&bob).unwrap().velocity, 0);

    // Placing a domino afterwards still goes through
    let put = bob_keys.send(Destination::All, &Payload::Put, now).unwrap();
    hub.world_mut(0).handle_envelope(&put);
    assert_eq!(hub.world(0).domino_count(), 1);
    assert_eq!(hub.world(0).player(&bob).unwrap().velocity, 0);
}

#[test]
fn test_push_away_from_trigger_places_domino() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 3);
    begin_all(&mut hub);

    control(&mut hub, 1, ControlInput::Interact);

    for i in 0..3 {
        assert!(!hub.world(i).game_ended());
        assert_eq!(hub.world(i).domino_count(), 1);
    }
}

#[test]
fn test_attack_kills_player_in_range() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 3);

    // carol stays at the origin, out of reach
    hub.world_mut(2).begin("carol");
    hub.world_mut(0).begin("alice");
    assert!(hub.run_until_idle());

    // alice builds a pile of three so bob enters at 4.8
    for _ in 0..3 {
        control(&mut hub, 0, ControlInput::Interact);
        advance(&mut hub, &clock, 500);
    }
    assert_eq!(hub.world(1).domino_count(), 3);
    hub.world_mut(1).begin("bob");
    assert!(hub.run_until_idle());

    let bob = id(&hub, 1);
    assert!((hub.world(0).player(&bob).unwrap().position - 4.8).abs() < 1e-9);

    // Tap right five times to reach dash speed
    for _ in 0..4 {
        control(&mut hub, 0, ControlInput::MoveRight);
        control(&mut hub, 0, ControlInput::Release);
    }
    control(&mut hub, 0, ControlInput::MoveRight);
    assert_eq!(hub.world(0).local_player().unwrap().velocity, 5);

    let exits = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3 {
        let log = Arc::clone(&exits);
        hub.world_mut(i).subscribe(WorldEvent::PlayerExit, move |p| {
            log.lock().unwrap().push(p.unwrap().name.clone());
        });
    }

    control(&mut hub, 0, ControlInput::Interact);
    let alice = id(&hub, 0);
    for i in 0..3 {
        let seen = hub.world(i).player(&alice).unwrap();
        assert_eq!(seen.state, PlayerState::Attack);
        assert_eq!(seen.velocity, 8);
    }

    // Strike lands 3.2 further right plus half a body: 4.9
    advance(&mut hub, &clock, 400);

    let carol = id(&hub, 2);
    for i in 0..3 {
        let w = hub.world(i);
        assert_eq!(w.player(&bob).unwrap().state, PlayerState::Dead);
        assert!(w.player(&carol).unwrap().state.is_alive());
        assert_eq!(w.living_count(), 2);
        assert_eq!(w.player(&alice).unwrap().velocity, 1);
    }
    assert_eq!(*exits.lock().unwrap(), vec!["bob", "bob", "bob"]);
}

#[test]
fn test_desynced_player_is_expelled() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 3);
    begin_all(&mut hub);

    // bob's move start never reaches the others
    hub.set_filter(Box::new(|from, _, message| {
        !(from == 1 && matches!(message, Outbound::Envelope(e) if e.action == Action::Move))
    }));
    control(&mut hub, 1, ControlInput::MoveRight);
    hub.clear_filter();

    advance(&mut hub, &clock, 1_000);
    control(&mut hub, 1, ControlInput::Release);
    // The stop reports bob 1.1 from where the others expect him
    advance(&mut hub, &clock, 100);

    let bob = id(&hub, 1);
    for i in 0..3 {
        let w = hub.world(i);
        assert_eq!(w.player(&bob).unwrap().state, PlayerState::Dead, "peer {}", i);
        assert_eq!(w.living_count(), 2);
    }
}

#[test]
fn test_small_drift_is_tolerated() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 3);
    begin_all(&mut hub);

    hub.set_filter(Box::new(|from, _, message| {
        !(from == 1 && matches!(message, Outbound::Envelope(e) if e.action == Action::Move))
    }));
    control(&mut hub, 1, ControlInput::MoveRight);
    hub.clear_filter();

    advance(&mut hub, &clock, 200);
    control(&mut hub, 1, ControlInput::Release);
    advance(&mut hub, &clock, 100);

    for i in 0..3 {
        assert_eq!(hub.world(i).living_count(), 3);
    }
}

#[test]
fn test_replayed_and_forged_envelopes_dropped() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 2);
    begin_all(&mut hub);

    let captured: Arc<Mutex<Vec<Envelope>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    hub.set_filter(Box::new(move |from, _, message| {
        if let Outbound::Envelope(e) = message {
            if from == 0 && e.action == Action::Move {
                sink.lock().unwrap().push(e.clone());
            }
        }
        true
    }));

    control(&mut hub, 0, ControlInput::MoveRight);
    control(&mut hub, 0, ControlInput::Release);
    advance(&mut hub, &clock, 100);
    hub.clear_filter();

    let alice = id(&hub, 0);
    assert_eq!(hub.world(1).player(&alice).unwrap().velocity, 0);

    let start_move = captured.lock().unwrap()[0].clone();
    assert!(start_move.data.contains("\"velocity\":1"));

    // Replaying the start is rejected
    hub.world_mut(1).handle_envelope(&start_move);
    assert_eq!(hub.world(1).player(&alice).unwrap().velocity, 0);

    // Rewriting the payload breaks the signature, even with a newer stamp
    let (json, stamp) = start_move.split_data().unwrap();
    let mut forged = start_move.clone();
    forged.data = format!(
        "{}@{}",
        json.replace("\"velocity\":1", "\"velocity\":6"),
        stamp + 10_000
    );
    hub.world_mut(1).handle_envelope(&forged);
    assert_eq!(hub.world(1).player(&alice).unwrap().velocity, 0);

    // Claiming bob's id with alice's signature
    let bob = id(&hub, 1);
    let mut spoofed = start_move.clone();
    spoofed.sender_id = bob.clone();
    spoofed.data = format!("{}@{}", json, stamp + 20_000);
    hub.world_mut(0).handle_envelope(&spoofed);
    assert_eq!(hub.world(0).player(&bob).unwrap().velocity, 0);
}

#[test]
fn test_exit_reaches_every_peer() {
    let clock = ManualClock::new(START);
    let mut hub = connected(&clock, 3);
    begin_all(&mut hub);

    control(&mut hub, 2, ControlInput::Leave);

    let carol = id(&hub, 2);
    for i in 0..3 {
        assert_eq!(
            hub.world(i).player(&carol).unwrap().state,
            PlayerState::Dead
        );
        assert_eq!(hub.world(i).living_count(), 2);
    }

    // A dead player's input has no effect
    control(&mut hub, 2, ControlInput::MoveRight);
    assert_eq!(hub.world(0).player(&carol).unwrap().velocity, 0);
}
