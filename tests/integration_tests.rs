//! Integration tests for the tete-a-tete chat relay
//!
//! These tests drive the full dispatcher with parsed text messages and check
//! the replies users receive and the resulting engine and storage state:
//! - Pairing, relaying, leaving and re-pairing
//! - Ratings after a stopped chat
//! - Link moderation and ghost-bans
//! - Premium preference matching
//! - Admin commands
//! - Concurrent request handling

mod fixtures;

use chrono::Duration;
use fixtures::{start_time, TestSystem, OWNER};
use futures::future::join_all;
use tete_a_tete::config::ModerationSettings;
use tete_a_tete::service::chat::replies;
use tete_a_tete::storage::ProfileStore;
use tete_a_tete::transport::{InboundMessage, MessageContent};
use tete_a_tete::types::Gender;

#[tokio::test]
async fn test_find_pairs_two_strangers() {
    let sys = TestSystem::new();

    sys.say(1, "/find").await;
    assert_eq!(sys.transport.last_to(1).as_deref(), Some(replies::SEARCHING));
    assert!(sys.engine.is_waiting(1).await);

    sys.say(2, "/find").await;
    assert_eq!(sys.transport.last_to(1).as_deref(), Some(replies::CONNECTED));
    assert_eq!(sys.transport.last_to(2).as_deref(), Some(replies::CONNECTED));
    assert_eq!(sys.engine.partner_of(1).await, Some(2));
    assert_eq!(sys.engine.partner_of(2).await, Some(1));
    assert!(!sys.engine.is_waiting(1).await);

    let stats = sys.engine.stats().await;
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.users_waiting, 0);
}

#[tokio::test]
async fn test_repeated_find_is_informational() {
    let sys = TestSystem::new();

    sys.say(1, "/find").await;
    sys.say(1, "/find").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::ALREADY_SEARCHING)
    );
    assert_eq!(sys.engine.stats().await.users_waiting, 1);

    sys.say(2, "/find").await;
    sys.say(2, "/find").await;
    assert_eq!(
        sys.transport.last_to(2).as_deref(),
        Some(replies::ALREADY_CHATTING)
    );
}

#[tokio::test]
async fn test_text_is_relayed_and_logged() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;

    sys.say(1, "hi there").await;
    sys.say(2, "hello!").await;

    assert_eq!(sys.transport.last_to(2).as_deref(), Some("hi there"));
    assert_eq!(sys.transport.last_to(1).as_deref(), Some("hello!"));

    let logs = sys.store.logs().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!((logs[0].user_id, logs[0].partner_id), (1, 2));
    assert_eq!(logs[0].content, "hi there");
    assert_eq!(logs[0].timestamp, start_time().timestamp());
}

#[tokio::test]
async fn test_text_from_unpaired_user_is_rejected() {
    let sys = TestSystem::new();

    sys.say(1, "anyone here?").await;
    assert_eq!(sys.transport.messages_to(1), vec![replies::USE_FIND]);
    assert!(sys.store.logs().unwrap().is_empty());
}

#[tokio::test]
async fn test_media_is_not_relayed() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.transport.clear();

    sys.service
        .handle(InboundMessage::new(
            1,
            MessageContent::Unsupported {
                kind: "sticker".to_string(),
            },
        ))
        .await
        .unwrap();

    assert_eq!(sys.transport.messages_to(1), vec![replies::TEXT_ONLY]);
    assert!(sys.transport.messages_to(2).is_empty());
}

#[tokio::test]
async fn test_stop_opens_mutual_ratings() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.transport.clear();

    sys.say(1, "/stop").await;
    assert_eq!(
        sys.transport.messages_to(2),
        vec![replies::PARTNER_DISCONNECTED, replies::RATE_PROMPT]
    );
    assert_eq!(sys.transport.messages_to(1), vec![replies::RATE_PROMPT]);
    assert_eq!(sys.engine.partner_of(1).await, None);
    assert_eq!(sys.engine.partner_of(2).await, None);

    sys.say(1, "/rate 4").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some("Thanks! You rated your partner 4⭐")
    );
    let rated = sys.store.get_profile(2).await.unwrap().unwrap();
    assert_eq!((rated.rating_sum, rated.rating_count), (4, 1));

    // The obligation is one-shot
    sys.say(1, "/rate 5").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::NOTHING_TO_RATE)
    );

    sys.say(2, "/rate 2").await;
    let rated = sys.store.get_profile(1).await.unwrap().unwrap();
    assert_eq!((rated.rating_sum, rated.rating_count), (2, 1));
}

#[tokio::test]
async fn test_out_of_range_score_keeps_obligation() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.say(1, "/stop").await;

    sys.say(1, "/rate 6").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::INVALID_SCORE)
    );
    sys.say(1, "/rate 0").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::INVALID_SCORE)
    );
    sys.say(1, "/rate five").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some("Please enter a number from 1 to 5.")
    );

    sys.say(1, "/rate 3").await;
    let rated = sys.store.get_profile(2).await.unwrap().unwrap();
    assert_eq!((rated.rating_sum, rated.rating_count), (3, 1));
}

#[tokio::test]
async fn test_rate_without_chat() {
    let sys = TestSystem::new();
    sys.say(7, "/rate 5").await;
    assert_eq!(
        sys.transport.last_to(7).as_deref(),
        Some(replies::NOTHING_TO_RATE)
    );
}

#[tokio::test]
async fn test_stop_while_searching_and_idle() {
    let sys = TestSystem::new();

    sys.say(1, "/find").await;
    sys.say(1, "/stop").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::STOPPED_SEARCHING)
    );
    assert!(!sys.engine.is_waiting(1).await);

    sys.say(1, "/stop").await;
    assert_eq!(sys.transport.last_to(1).as_deref(), Some(replies::IDLE));
}

#[tokio::test]
async fn test_next_requeues_partner_and_rescans() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.transport.clear();

    // 2 is back in the pool and is the only viable waiter
    sys.say(1, "/next").await;
    assert_eq!(
        sys.transport.messages_to(2),
        vec![replies::PARTNER_LEFT, replies::CONNECTED]
    );
    assert_eq!(sys.transport.messages_to(1), vec![replies::CONNECTED]);
    assert_eq!(sys.engine.partner_of(1).await, Some(2));
    assert_eq!(sys.engine.stats().await.users_waiting, 0);
}

#[tokio::test]
async fn test_next_reenqueues_ghost_banned_partner() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.say(2, "join t.me/somechannel").await;
    sys.transport.clear();

    // The banned partner waits but cannot be selected until the ban lapses
    sys.say(1, "/next").await;
    assert_eq!(sys.transport.messages_to(1), vec![replies::SEARCHING]);
    assert!(sys.engine.is_waiting(2).await);
    sys.say(1, "/stop").await;

    sys.clock.advance(Duration::days(3) + Duration::seconds(1));
    sys.say(3, "/find").await;
    assert_eq!(sys.engine.partner_of(3).await, Some(2));
}

#[tokio::test]
async fn test_next_with_avoidance_skips_partner_just_left() {
    let sys = TestSystem::avoiding_rematch();
    sys.pair(1, 2).await;
    sys.transport.clear();

    sys.say(1, "/next").await;
    assert_eq!(sys.transport.messages_to(2), vec![replies::PARTNER_LEFT]);
    assert_eq!(sys.transport.messages_to(1), vec![replies::SEARCHING]);
    assert!(sys.engine.is_waiting(1).await);
    assert!(sys.engine.is_waiting(2).await);

    // A newcomer takes the earliest waiter
    sys.say(3, "/find").await;
    assert_eq!(sys.engine.partner_of(3).await, Some(2));
    assert!(sys.engine.is_waiting(1).await);
}

#[tokio::test]
async fn test_next_pairs_with_waiting_user() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.say(3, "/find").await;

    sys.say(1, "/next").await;
    assert_eq!(sys.engine.partner_of(1).await, Some(3));
    assert!(sys.engine.is_waiting(2).await);
    assert_eq!(sys.transport.last_to(3).as_deref(), Some(replies::CONNECTED));
}

#[tokio::test]
async fn test_link_from_unrated_user_ghost_bans() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.transport.clear();

    sys.say(1, "join t.me/somechannel").await;
    assert_eq!(sys.transport.messages_to(1), vec![replies::NOT_DELIVERED]);
    assert!(sys.transport.messages_to(2).is_empty());
    assert!(sys.store.logs().unwrap().is_empty());

    let reports = sys.store.reports().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].reporter, None);
    assert_eq!(reports[0].reported, 1);

    let profile = sys.store.get_profile(1).await.unwrap().unwrap();
    assert_eq!(
        profile.ghost_ban_until,
        (start_time() + Duration::days(3)).timestamp()
    );

    // Banned users cannot search and are never candidates
    sys.say(1, "/stop").await;
    sys.say(1, "/find").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::UNAVAILABLE)
    );
    assert!(!sys.engine.is_waiting(1).await);

    sys.say(3, "/find").await;
    assert_eq!(sys.transport.last_to(3).as_deref(), Some(replies::SEARCHING));

    // Once the ban elapses both become possible again
    sys.clock.advance(Duration::days(3) + Duration::minutes(1));
    sys.say(1, "/find").await;
    assert_eq!(sys.engine.partner_of(1).await, Some(3));
}

#[tokio::test]
async fn test_link_allowed_for_premium_and_top_rated() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;

    sys.say(1, "/premium").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::PREMIUM_ACTIVATED)
    );
    sys.say(1, "see https://example.com").await;
    assert_eq!(
        sys.transport.last_to(2).as_deref(),
        Some("see https://example.com")
    );

    sys.store.record_rating(2, 5).await.unwrap();
    sys.store.record_rating(2, 5).await.unwrap();
    sys.say(2, "www.example.org").await;
    assert_eq!(sys.transport.last_to(1).as_deref(), Some("www.example.org"));
    assert!(sys.store.reports().unwrap().is_empty());
}

#[tokio::test]
async fn test_link_block_without_escalation() {
    let sys = TestSystem::with_moderation(ModerationSettings {
        escalate_links_to_ban: false,
        blocked_terms: vec!["casino".to_string()],
        ..ModerationSettings::default()
    });
    sys.pair(1, 2).await;
    sys.transport.clear();

    sys.say(1, "http://spam.example").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some("⚠️ Message not delivered: links are not allowed")
    );

    sys.say(2, "best CASINO ever").await;
    assert_eq!(
        sys.transport.last_to(2).as_deref(),
        Some("⚠️ Message not delivered: blocked term")
    );

    assert_eq!(sys.transport.count(), 2);
    let profile = sys.store.get_profile(1).await.unwrap().unwrap();
    assert_eq!(profile.ghost_ban_until, 0);
    assert_eq!(sys.engine.partner_of(1).await, Some(2));
}

#[tokio::test]
async fn test_premium_requester_prefers_matching_gender() {
    let sys = TestSystem::avoiding_rematch();

    sys.say(11, "/setgender male").await;
    sys.say(12, "/setgender f").await;
    sys.store.record_rating(11, 5).await.unwrap();
    sys.store.record_rating(12, 4).await.unwrap();

    // After 12 skips, the pool holds 11 then 12
    sys.pair(11, 12).await;
    sys.say(12, "/next").await;
    assert!(sys.engine.is_waiting(11).await);
    assert!(sys.engine.is_waiting(12).await);

    sys.say(10, "/premium").await;
    sys.say(10, "/setpref female").await;
    assert_eq!(
        sys.transport.last_to(10).as_deref(),
        Some("Preference set to female.")
    );

    // 11 scores 5 / 2 = 2.5 (wrong gender), 12 scores 4
    sys.say(10, "/find").await;
    assert_eq!(sys.engine.partner_of(10).await, Some(12));

    // A non-premium newcomer takes the earliest waiter regardless of rating
    sys.say(13, "/find").await;
    assert_eq!(sys.engine.partner_of(13).await, Some(11));
}

#[tokio::test]
async fn test_profile_commands() {
    let sys = TestSystem::new();

    sys.say(1, "/setgender robot").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some("Gender must be one of: male, female, other")
    );

    sys.say(1, "/setgender o").await;
    sys.say(1, "/setpref any").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::PREFERENCE_CLEARED)
    );

    let profile = sys.store.get_profile(1).await.unwrap().unwrap();
    assert_eq!(profile.gender, Some(Gender::Other));
    assert_eq!(profile.preferred_gender, None);

    sys.say(1, "/myrating").await;
    assert_eq!(sys.transport.last_to(1).as_deref(), Some(replies::NO_RATINGS));

    sys.store.record_rating(1, 5).await.unwrap();
    sys.store.record_rating(1, 4).await.unwrap();
    sys.say(1, "/myrating").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some("⭐ Your rating: 4.50 from 2 ratings")
    );
}

#[tokio::test]
async fn test_reports() {
    let sys = TestSystem::new();

    sys.say(1, "report 2").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::REPORT_FILED)
    );
    sys.say(3, "/report 2").await;
    assert_eq!(sys.store.report_count(2).await.unwrap(), 2);

    sys.say(1, "report 1").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some("You cannot report yourself.")
    );
    assert_eq!(sys.store.reports().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_commands_require_owner() {
    let sys = TestSystem::new();

    for command in ["/admin", "/ban 5", "/unban 5", "/stats", "/logs 5"] {
        sys.say(1, command).await;
        assert_eq!(
            sys.transport.last_to(1).as_deref(),
            Some(replies::OWNER_ONLY),
            "{command}"
        );
    }
    let profile = sys.store.get_profile(5).await.unwrap();
    assert!(profile.map_or(true, |p| p.ghost_ban_until == 0));

    sys.say(OWNER, "/admin").await;
    assert_eq!(
        sys.transport.last_to(OWNER).as_deref(),
        Some(replies::ADMIN_HELP)
    );
}

#[tokio::test]
async fn test_admin_ban_and_unban() {
    let sys = TestSystem::new();

    sys.say(5, "/find").await;
    sys.say(OWNER, "/ban 5").await;
    assert!(sys
        .transport
        .last_to(OWNER)
        .unwrap()
        .starts_with("User 5 is banned until"));

    // The waiting snapshot now carries the ban, so 5 is skipped
    sys.say(6, "/find").await;
    assert_eq!(sys.engine.partner_of(6).await, None);
    assert!(sys.engine.is_waiting(6).await);

    sys.say(OWNER, "/unban 5").await;
    assert_eq!(
        sys.transport.last_to(OWNER).as_deref(),
        Some("User 5 is no longer banned.")
    );

    sys.say(7, "/find").await;
    assert_eq!(sys.engine.partner_of(7).await, Some(5));
}

#[tokio::test]
async fn test_admin_stats_and_logs() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.say(1, "first line").await;
    sys.say(2, "second line").await;
    sys.say(3, "/find").await;

    sys.say(OWNER, "/stats").await;
    let stats = sys.transport.last_to(OWNER).unwrap();
    assert!(stats.contains("Users: 3"), "{stats}");
    assert!(stats.contains("Waiting: 1"), "{stats}");
    assert!(stats.contains("Active chats: 1"), "{stats}");
    assert!(stats.contains("Chat lines: 2"), "{stats}");

    sys.say(OWNER, "/logs 1").await;
    let logs = sys.transport.last_to(OWNER).unwrap();
    assert!(logs.starts_with("Last 2 line(s) for user 1:"), "{logs}");
    assert!(logs.contains("1 -> 2: first line"), "{logs}");
    assert!(logs.contains("2 -> 1: second line"), "{logs}");

    sys.say(OWNER, "/logs 42").await;
    assert_eq!(
        sys.transport.last_to(OWNER).as_deref(),
        Some("No chat lines for user 42.")
    );
}

#[tokio::test]
async fn test_delivery_failure_is_reported_and_logged() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.transport.set_unreachable(2);

    sys.say(1, "are you still there?").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::DELIVERY_FAILED)
    );
    assert_eq!(sys.store.logs().unwrap().len(), 1);
    assert_eq!(sys.engine.partner_of(1).await, Some(2));
}

#[tokio::test]
async fn test_storage_outage_leaves_state_untouched() {
    let sys = TestSystem::new();
    sys.pair(1, 2).await;
    sys.store.set_unavailable(true);

    sys.say(1, "/next").await;
    assert_eq!(
        sys.transport.last_to(1).as_deref(),
        Some(replies::GENERIC_FAILURE)
    );
    assert_eq!(sys.engine.partner_of(1).await, Some(2));

    sys.store.set_unavailable(false);
    sys.transport.clear();
    sys.say(1, "/next").await;
    assert_eq!(
        sys.transport.messages_to(2),
        vec![replies::PARTNER_LEFT, replies::CONNECTED]
    );
    assert_eq!(sys.engine.partner_of(1).await, Some(2));
}

#[tokio::test]
async fn test_concurrent_finds_form_symmetric_pairs() {
    let sys = TestSystem::new();

    join_all((1..=40).map(|user| sys.say(user, "/find"))).await;

    let stats = sys.engine.stats().await;
    assert_eq!(stats.active_sessions, 20);
    assert_eq!(stats.users_waiting, 0);

    for user in 1..=40 {
        let partner = sys.engine.partner_of(user).await.expect("paired");
        assert_ne!(partner, user);
        assert_eq!(sys.engine.partner_of(partner).await, Some(user));
        assert!(!sys.engine.is_waiting(user).await);
    }
}

#[tokio::test]
async fn test_command_metrics_are_recorded() {
    let sys = TestSystem::new();
    sys.say(1, "/find").await;
    sys.say(1, "/rate 9").await;

    let text = tete_a_tete::metrics::health::encode_metrics(&sys.metrics).unwrap();
    assert!(text.contains("tete_a_tete_"));
    assert_eq!(sys.metrics.matching().searches_started_total.get(), 1);
}
