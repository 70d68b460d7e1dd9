use super::super::config::EngineConfig;
use super::super::game::Mark;
use super::super::identity::MemoryIdentityStore;
use super::super::intent::Intent;
use super::super::player::PlayerHandle;
use super::super::session_manager::SessionManager;
use super::super::transport::{Mailbox, MailboxMessage};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (SessionManager, Arc<Mailbox>, PlayerHandle, PlayerHandle) {
    let mailbox = Arc::new(Mailbox::new());
    let mgr = SessionManager::new(EngineConfig::default(), mailbox.clone(), Arc::new(MemoryIdentityStore::new()));
    (mgr, mailbox, PlayerHandle::new(10, "Alice"), PlayerHandle::new(20, "Bob"))
}

async fn play_until_symbol(mgr: &SessionManager, a: &PlayerHandle, b: &PlayerHandle, mark: Mark) {
    mgr.handle(b.clone(), Intent::JoinWaiting).await;
    mgr.handle(a.clone(), Intent::IssueChallenge { target: b.id }).await;
    mgr.handle(b.clone(), Intent::ConfirmChallenge).await;
    mgr.handle(a.clone(), Intent::ChooseSymbol { mark }).await;
}

fn boards(mailbox: &Mailbox, player: u64) -> Vec<MailboxMessage> {
    mailbox
        .messages_for(player)
        .into_iter()
        .filter(|m| m.text == "Your move." || m.text == "Opponent's move.")
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_board_is_sent_once_then_edited() {
    let (mgr, mailbox, alice, bob) = setup();
    play_until_symbol(&mgr, &alice, &bob, Mark::Mark2).await;

    let a = boards(&mailbox, alice.id);
    let b = boards(&mailbox, bob.id);
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].text, "Your move.");
    assert_eq!(b[0].text, "Opponent's move.");
    assert_eq!(a[0].choices.len(), 3);

    mgr.handle(alice.clone(), Intent::MakeMove { cell: 8 }).await;
    mgr.handle(bob.clone(), Intent::MakeMove { cell: 0 }).await;

    let a = boards(&mailbox, alice.id);
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].edits, 2);
    assert_eq!(a[0].text, "Your move.");
    assert_eq!(a[0].choices[2][2].label, Mark::Mark2.symbol());
    assert_eq!(a[0].choices[0][0].label, Mark::Mark1.symbol());
}

#[tokio::test(start_paused = true)]
async fn test_symbols_announced_to_both() {
    let (mgr, mailbox, alice, bob) = setup();
    play_until_symbol(&mgr, &alice, &bob, Mark::Mark2).await;

    assert!(mailbox.sent_to(alice.id).iter().any(|t| t == "Your symbol is \u{2B55}."));
    assert!(mailbox.sent_to(bob.id).iter().any(|t| t == "Your symbol is \u{274C}."));
}

#[tokio::test(start_paused = true)]
async fn test_countdown_removed_when_move_arrives_in_time() {
    let (mgr, mailbox, alice, bob) = setup();
    play_until_symbol(&mgr, &alice, &bob, Mark::Mark1).await;

    tokio::time::sleep(Duration::from_millis(13_500)).await;
    let countdown = mailbox
        .messages_for(alice.id)
        .into_iter()
        .find(|m| m.text.starts_with("You have"))
        .unwrap();
    assert_eq!(countdown.text, "You have 6 seconds left!");

    mgr.handle(alice.clone(), Intent::MakeMove { cell: 4 }).await;
    assert!(mailbox.get(countdown.handle).is_none());

    // no further ticks from the cancelled countdown
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(mailbox.messages_for(alice.id).iter().all(|m| !m.text.starts_with("You have")));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_announced_to_both_players() {
    let (mgr, mailbox, alice, bob) = setup();
    play_until_symbol(&mgr, &alice, &bob, Mark::Mark1).await;

    tokio::time::sleep(Duration::from_secs(21)).await;
    assert!(mailbox.sent_to(alice.id).iter().any(|t| t.starts_with("Time is up!")));
    assert!(mailbox.sent_to(bob.id).iter().any(|t| t.starts_with("Your opponent did not move in time.")));
    assert_eq!(boards(&mailbox, bob.id)[0].text, "Your move.");
}

#[tokio::test(start_paused = true)]
async fn test_win_announced_with_winner_name() {
    let (mgr, mailbox, alice, bob) = setup();
    play_until_symbol(&mgr, &alice, &bob, Mark::Mark1).await;
    for (player, cell) in [(&alice, 0), (&bob, 3), (&alice, 1), (&bob, 4), (&alice, 2)] {
        mgr.handle(player.clone(), Intent::MakeMove { cell }).await;
    }

    for id in [alice.id, bob.id] {
        let sent = mailbox.sent_to(id);
        let n = sent.len();
        assert!(sent[n - 2].starts_with("Alice wins!"));
        assert_eq!(sent[n - 1], "You are back in the main menu.");
        assert!(mgr.session_of(id).is_none());
    }
}
