use punchline_core::model::Completion;
use punchline_core::roster::{BackendSpec, Roster, Shaping};
use punchline_core::storage::Store;
use punchline_core::{CompetitionError, Ledger, Voter, VoterSession};

struct Fixture {
    store: Store,
    ledger: Ledger,
    game_id: String,
    /// Result ids for A, B, C in that order; positions are C=0, A=1, B=2.
    ids: [i64; 3],
}

fn fixture() -> Fixture {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let roster = Roster::new(vec![
        BackendSpec::new("A", "vendor/a", Shaping::Default),
        BackendSpec::new("B", "vendor/b", Shaping::Default),
        BackendSpec::new("C", "vendor/c", Shaping::Default),
    ])
    .unwrap();

    let (sugg, slots) = store.create_suggestion("coffee", &roster).unwrap();
    for (slot, text, latency) in [(&slots[0], "hot", 1.0), (&slots[1], "hot", 3.0), (&slots[2], "black", 2.0)] {
        store
            .complete_result(
                slot.id,
                &Completion {
                    text: text.into(),
                    latency_secs: latency,
                    completion_tokens: 4,
                    ..Default::default()
                },
            )
            .unwrap();
    }
    let ids = [slots[0].id, slots[1].id, slots[2].id];
    let game = store
        .create_game(sugg.id, &[ids[2], ids[0], ids[1]])
        .unwrap();

    Fixture {
        ledger: Ledger::new(store.clone()),
        store,
        game_id: game.id,
        ids,
    }
}

fn voter() -> Voter {
    Voter::new("192.0.2.7", &VoterSession::issue())
}

fn wins(ledger: &Ledger, name: &str) -> (u64, u64) {
    let row = ledger
        .leaderboard()
        .unwrap()
        .into_iter()
        .find(|r| r.backend_name == name)
        .unwrap();
    (row.win_count, row.appearance_count)
}

#[test]
fn tied_group_wins_once_per_backend() {
    let f = fixture();
    let receipt = f
        .ledger
        .vote(&f.game_id, &[f.ids[1], f.ids[0]], &voter())
        .unwrap();

    // A is shown before B, so A's row is stored as the winner.
    assert_eq!(receipt.winning_result_id, f.ids[0]);
    assert_eq!(receipt.winning_text, "hot");
    assert_eq!(receipt.credited_backends, vec!["A", "B"]);
    assert_eq!(receipt.previous_winner, None);

    assert_eq!(wins(&f.ledger, "A"), (1, 1));
    assert_eq!(wins(&f.ledger, "B"), (1, 1));
    assert_eq!(wins(&f.ledger, "C"), (0, 1));

    let board = f.ledger.leaderboard().unwrap();
    assert_eq!(board[2].backend_name, "C");
    assert_eq!(board[0].backend_name, "A");
    assert!((board[0].win_rate - 1.0).abs() < 1e-9);
    assert!((board[0].avg_latency_secs - 1.0).abs() < 1e-9);
}

#[test]
fn single_id_of_a_tied_group_still_credits_the_group() {
    let f = fixture();
    let receipt = f.ledger.vote(&f.game_id, &[f.ids[1]], &voter()).unwrap();
    assert_eq!(wins(&f.ledger, "A"), (1, 1));
    assert_eq!(wins(&f.ledger, "B"), (1, 1));

    // B alone was sent, but A is the group member shown first.
    assert_eq!(receipt.winning_result_id, f.ids[0]);
    assert_eq!(receipt.credited_backends, vec!["A", "B"]);
    let game = f.store.get_game(&f.game_id).unwrap().unwrap();
    assert_eq!(game.winning_result_id, Some(f.ids[0]));
}

#[test]
fn revote_replaces_the_winner() {
    let f = fixture();
    f.ledger.vote(&f.game_id, &[f.ids[0]], &voter()).unwrap();
    let receipt = f.ledger.vote(&f.game_id, &[f.ids[2]], &voter()).unwrap();
    assert_eq!(receipt.previous_winner, Some(f.ids[0]));

    assert_eq!(wins(&f.ledger, "A"), (0, 1));
    assert_eq!(wins(&f.ledger, "C"), (1, 1));
    let game = f.store.get_game(&f.game_id).unwrap().unwrap();
    assert_eq!(game.winning_result_id, Some(f.ids[2]));
}

#[test]
fn mixed_text_groups_and_strangers_are_rejected() {
    let f = fixture();
    let err = f
        .ledger
        .vote(&f.game_id, &[f.ids[0], f.ids[2]], &voter())
        .unwrap_err();
    assert!(matches!(err, CompetitionError::InvalidInput(_)));

    let err = f.ledger.vote(&f.game_id, &[9999], &voter()).unwrap_err();
    assert!(matches!(err, CompetitionError::InvalidInput(_)));

    let err = f.ledger.vote(&f.game_id, &[], &voter()).unwrap_err();
    assert!(matches!(err, CompetitionError::InvalidInput(_)));

    let game = f.store.get_game(&f.game_id).unwrap().unwrap();
    assert_eq!(game.winning_result_id, None);
}

#[test]
fn unknown_game_is_not_found_and_writes_nothing() {
    let f = fixture();
    let err = f.ledger.vote("missing", &[f.ids[0]], &voter()).unwrap_err();
    assert!(matches!(err, CompetitionError::NotFound { kind: "game", .. }));

    let conn = f.store.conn.lock().unwrap();
    let voted: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM games WHERE winning_result_id IS NOT NULL",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(voted, 0);
}
