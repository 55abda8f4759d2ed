#![allow(non_snake_case)]
mod support;

use std::sync::atomic::Ordering;
use support::{
    MockAuthority,
    authenticated_harness,
};
use twentyone::{
    authority::AuthorityError,
    round::{
        Completion,
        RoundError,
        RoundEvent,
        RoundGuardError,
        RoundPhase,
    },
    session::SessionPhase,
    test_helpers,
    types::{
        RoundId,
        RoundStatus,
    },
};

#[tokio::test]
async fn hit__applies_the_updated_round() {
    let mock = MockAuthority::start().await;
    let mut h = authenticated_harness(&mock);
    mock.enqueue_start(201, test_helpers::active_round_json(1));
    mock.enqueue_hit(
        200,
        test_helpers::round_json(
            1,
            "ACTIVE",
            serde_json::json!([
                test_helpers::card_json(serde_json::json!(10), "Hearts"),
                test_helpers::card_json(serde_json::json!(4), "Spades"),
                test_helpers::card_json(serde_json::json!(5), "Clubs"),
            ]),
            serde_json::json!([
                test_helpers::card_json(serde_json::json!("K"), "Clubs"),
                test_helpers::card_json(serde_json::json!(9), "Diamonds"),
            ]),
            19,
            19,
        ),
    );
    h.rounds.start(&h.authority, 50, None).await.unwrap();

    h.rounds.hit(&h.authority).await.unwrap();

    assert_eq!(h.rounds.phase(), RoundPhase::Active);
    let round = h.rounds.round().unwrap();
    assert_eq!(round.player_cards.len(), 3);
    assert_eq!(round.player_score, 19);
    assert_eq!(round.bet, 50);
}

#[tokio::test]
async fn hit__bust_resolves_the_round() {
    let mock = MockAuthority::start().await;
    let mut h = authenticated_harness(&mock);
    mock.enqueue_start(201, test_helpers::active_round_json(1));
    mock.enqueue_hit(200, test_helpers::resolved_round_json(1, "DEALER_WON"));
    h.rounds.start(&h.authority, 50, None).await.unwrap();
    h.pump_round_events().await;

    h.rounds.hit(&h.authority).await.unwrap();

    assert_eq!(h.rounds.phase(), RoundPhase::Resolved);
    assert!(h.rounds.round().unwrap().status.is_terminal());
    // Terminal rounds accept no further actions.
    let err = h.rounds.hit(&h.authority).await.unwrap_err();
    assert!(matches!(
        err,
        RoundError::Guard(RoundGuardError::NoActiveRound)
    ));
}

#[tokio::test]
async fn hit__without_an_active_round_sends_nothing() {
    let mock = MockAuthority::start().await;
    let mut h = authenticated_harness(&mock);

    for _ in 0..3 {
        let err = h.rounds.hit(&h.authority).await.unwrap_err();
        assert!(matches!(
            err,
            RoundError::Guard(RoundGuardError::NoActiveRound)
        ));
    }

    assert_eq!(mock.counts().hit.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn hit__rapid_second_press_sends_exactly_one_request() {
    let mock = MockAuthority::start().await;
    let mut h = authenticated_harness(&mock);
    mock.enqueue_start(201, test_helpers::active_round_json(1));
    mock.enqueue_hit(200, test_helpers::resolved_round_json(1, "DEALER_WON"));
    h.rounds.start(&h.authority, 50, None).await.unwrap();

    // given the first hit is in flight
    let (ticket, round) = h.rounds.begin_hit().unwrap();

    // when the user mashes the key before the response lands
    let err = h.rounds.hit(&h.authority).await.unwrap_err();
    assert!(matches!(
        err,
        RoundError::Guard(RoundGuardError::ActionInFlight)
    ));

    // then only the original request ever went out
    let result = h.authority.hit(&round).await;
    h.rounds.complete_hit(ticket, result).unwrap();
    assert_eq!(mock.counts().hit.load(Ordering::SeqCst), 1);
    assert_eq!(h.rounds.phase(), RoundPhase::Resolved);
}

#[tokio::test]
async fn hit__response_for_a_superseded_round_is_discarded() {
    let mock = MockAuthority::start().await;
    let mut h = authenticated_harness(&mock);
    mock.enqueue_start(201, test_helpers::active_round_json(1));
    mock.enqueue_start(201, test_helpers::active_round_json(2));
    mock.enqueue_hit(200, test_helpers::resolved_round_json(1, "PLAYER_WON"));
    h.rounds.start(&h.authority, 10, None).await.unwrap();

    // given a hit against round 1 still in flight when the round is
    // abandoned and round 2 begins
    let (stale_ticket, old_round) = h.rounds.begin_hit().unwrap();
    h.rounds.discard();
    h.rounds.start(&h.authority, 20, None).await.unwrap();

    // when the old response finally lands
    let result = h.authority.hit(&old_round).await;
    let outcome = h.rounds.complete_hit(stale_ticket, result).unwrap();

    // then round 2 is untouched
    assert_eq!(outcome, Completion::Stale);
    assert_eq!(h.rounds.round().map(|r| r.id), Some(RoundId(2)));
    assert_eq!(h.rounds.round().map(|r| r.status), Some(RoundStatus::Active));
    assert_eq!(h.rounds.phase(), RoundPhase::Active);
}

#[tokio::test]
async fn stand__resolves_and_refreshes_the_profile_exactly_once() {
    let mock = MockAuthority::start().await;
    let mut h = authenticated_harness(&mock);
    mock.enqueue_start(201, test_helpers::active_round_json(1));
    mock.enqueue_stand(200, test_helpers::resolved_round_json(1, "DEALER_WON"));
    h.rounds.start(&h.authority, 50, None).await.unwrap();
    h.pump_round_events().await;
    let fetches_before = mock.counts().profile.load(Ordering::SeqCst);

    h.rounds.stand(&h.authority).await.unwrap();
    let events = h.pump_round_events().await;

    assert_eq!(h.rounds.phase(), RoundPhase::Resolved);
    assert_eq!(
        events,
        vec![RoundEvent::Resolved {
            id: RoundId(1),
            status: RoundStatus::DealerWon
        }]
    );
    assert_eq!(
        mock.counts().profile.load(Ordering::SeqCst),
        fetches_before + 1
    );
}

#[tokio::test]
async fn stand__live_response_is_rejected_and_the_round_survives() {
    let mock = MockAuthority::start().await;
    let mut h = authenticated_harness(&mock);
    mock.enqueue_start(201, test_helpers::active_round_json(1));
    mock.enqueue_stand(200, test_helpers::active_round_json(1));
    h.rounds.start(&h.authority, 50, None).await.unwrap();
    let before = h.rounds.round().cloned();

    let err = h.rounds.stand(&h.authority).await.unwrap_err();

    assert!(matches!(
        err,
        RoundError::Authority(AuthorityError::Unavailable { .. })
    ));
    assert_eq!(h.rounds.phase(), RoundPhase::Active);
    assert_eq!(h.rounds.round().cloned(), before);
}

#[tokio::test]
async fn unauthorized__response_ends_session_and_discards_the_round() {
    let mock = MockAuthority::start().await;
    let mut h = authenticated_harness(&mock);
    mock.enqueue_start(201, test_helpers::active_round_json(1));
    h.rounds.start(&h.authority, 50, None).await.unwrap();

    // given the authority stops accepting the credential
    mock.revoke_token();

    // when the next action bounces
    let err = h.rounds.hit(&h.authority).await.unwrap_err();
    let RoundError::Authority(authority_err) = err else {
        panic!("expected an authority error");
    };
    assert!(authority_err.is_unauthorized());

    // then the application-level reaction clears everything
    h.session.handle_unauthorized(None);
    h.rounds.discard();
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
    assert!(h.session.credentials().get().is_none());
    assert!(h.rounds.round().is_none());
    assert_eq!(h.rounds.phase(), RoundPhase::NoRound);
}
