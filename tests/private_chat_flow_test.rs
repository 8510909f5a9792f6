//! End-to-end lifecycle tests against a real PostgreSQL instance.
//!
//! Run with a database available:
//!   DATABASE_URL=postgres://... cargo test -- --ignored

mod common;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

use private_chat_service::config::Config;
use private_chat_service::error::AppError;
use private_chat_service::models::message::MessageScheme;
use private_chat_service::services::burn_sweeper;
use private_chat_service::services::encryption::MessageCodec;
use private_chat_service::services::message_service::{MessageService, NewMessage};
use private_chat_service::services::session_service::SessionService;
use private_chat_service::services::unread_service::UnreadService;
use private_chat_service::websocket::ConnectionRegistry;

fn test_config() -> Config {
    Config {
        database_url: common::test_database_url(),
        port: 0,
        master_key: [3u8; 32],
        max_plaintext_chars: 500,
        max_ciphertext_bytes: 2000,
        burn_sweep_interval: Duration::from_secs(30),
        fetch_batch_limit: 50,
    }
}

fn system_message(content: &str) -> NewMessage {
    NewMessage {
        scheme: MessageScheme::System,
        content: content.into(),
        is_burn_after_reading: false,
        burn_at: None,
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn canonical_session_is_unique_under_concurrent_first_contact() {
    let pool = common::setup_pool().await;
    let alice = common::create_user(&pool, "alice").await;
    let bob = common::create_user(&pool, "bob").await;

    let (left, right) = tokio::join!(
        tokio::spawn({
            let pool = pool.clone();
            async move { SessionService::get_or_create(&pool, alice, bob).await }
        }),
        tokio::spawn({
            let pool = pool.clone();
            async move { SessionService::get_or_create(&pool, bob, alice).await }
        }),
    );

    let left = left.unwrap().unwrap();
    let right = right.unwrap().unwrap();
    assert_eq!(left.id, right.id);
    assert!(left.user_low < left.user_high);

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM chat_sessions WHERE user_low = $1 AND user_high = $2",
    )
    .bind(alice.min(bob))
    .bind(alice.max(bob))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn session_rejects_self_and_unknown_identities() {
    let pool = common::setup_pool().await;
    let alice = common::create_user(&pool, "alice").await;

    assert!(matches!(
        SessionService::get_or_create(&pool, alice, alice).await,
        Err(AppError::SelfSession)
    ));
    assert!(matches!(
        SessionService::get_or_create(&pool, alice, i64::MAX).await,
        Err(AppError::IdentityNotFound)
    ));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn plaintext_round_trip_with_read_side_effect() {
    let pool = common::setup_pool().await;
    let config = test_config();
    let codec = MessageCodec::new(config.master_key);
    let registry = ConnectionRegistry::new();
    let alice = common::create_user(&pool, "alice").await;
    let bob = common::create_user(&pool, "bob").await;

    let sent = MessageService::send(
        &pool,
        &codec,
        &registry,
        &config,
        alice,
        bob,
        system_message("hello"),
    )
    .await
    .unwrap();
    assert_eq!(sent.content.as_deref(), Some("hello"));

    // Ciphertext at rest is not the plaintext.
    let stored = MessageService::get(&pool, sent.id).await.unwrap();
    assert_ne!(stored.ciphertext.as_deref(), Some("hello".as_bytes()));

    assert_eq!(UnreadService::unread_count(&pool, bob).await.unwrap(), 1);

    let session = SessionService::find(&pool, bob, alice).await.unwrap().unwrap();
    let fetched = MessageService::fetch_since(&pool, &codec, &registry, &session, bob, None, 50)
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].content.as_deref(), Some("hello"));
    assert!(fetched[0].is_read, "fetch must mark the receiver's copy read");
    assert_eq!(UnreadService::unread_count(&pool, bob).await.unwrap(), 0);

    // Cursor past the last id: nothing new.
    let again = MessageService::fetch_since(
        &pool,
        &codec,
        &registry,
        &session,
        bob,
        Some(fetched[0].id),
        50,
    )
    .await
    .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn fetch_never_marks_the_senders_own_messages_read() {
    let pool = common::setup_pool().await;
    let config = test_config();
    let codec = MessageCodec::new(config.master_key);
    let registry = ConnectionRegistry::new();
    let alice = common::create_user(&pool, "alice").await;
    let bob = common::create_user(&pool, "bob").await;

    let sent = MessageService::send(
        &pool,
        &codec,
        &registry,
        &config,
        alice,
        bob,
        system_message("hello"),
    )
    .await
    .unwrap();

    // The sender polling its own conversation must not consume bob's unread.
    let session = SessionService::find(&pool, alice, bob).await.unwrap().unwrap();
    let fetched = MessageService::fetch_since(&pool, &codec, &registry, &session, alice, None, 50)
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert!(!fetched[0].is_read);

    let stored = MessageService::get(&pool, sent.id).await.unwrap();
    assert!(!stored.is_read);
    assert_eq!(UnreadService::unread_count(&pool, bob).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn burn_after_reading_destroys_on_first_read_only() {
    let pool = common::setup_pool().await;
    let config = test_config();
    let codec = MessageCodec::new(config.master_key);
    let registry = ConnectionRegistry::new();
    let alice = common::create_user(&pool, "alice").await;
    let bob = common::create_user(&pool, "bob").await;

    let sent = MessageService::send(
        &pool,
        &codec,
        &registry,
        &config,
        alice,
        bob,
        NewMessage {
            scheme: MessageScheme::System,
            content: "secret".into(),
            is_burn_after_reading: true,
            burn_at: None,
        },
    )
    .await
    .unwrap();

    let before = MessageService::get(&pool, sent.id).await.unwrap();
    assert!(before.ciphertext.is_some());
    assert!(before.destroyed_at.is_none());

    let outcome = MessageService::mark_read(&pool, &registry, sent.id)
        .await
        .unwrap()
        .expect("first read must transition");
    assert!(outcome.destroyed_at.is_some());

    let after = MessageService::get(&pool, sent.id).await.unwrap();
    assert!(after.ciphertext.is_none());
    assert!(after.nonce.is_none());
    assert!(after.destroyed_at.is_some());
    assert!(after.is_read);

    // Idempotent: the second call is a no-op and read_at is unchanged.
    assert!(MessageService::mark_read(&pool, &registry, sent.id)
        .await
        .unwrap()
        .is_none());
    let later = MessageService::get(&pool, sent.id).await.unwrap();
    assert_eq!(later.read_at, after.read_at);
    assert_eq!(later.destroyed_at, after.destroyed_at);

    // Explicit decrypt of a destroyed message reports destruction, not a
    // cipher failure.
    assert!(matches!(
        MessageService::system_content(&codec, &later),
        Err(AppError::AlreadyDestroyed)
    ));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn scheduled_destruction_happens_via_the_sweep() {
    let pool = common::setup_pool().await;
    let config = test_config();
    let codec = MessageCodec::new(config.master_key);
    let registry = ConnectionRegistry::new();
    let alice = common::create_user(&pool, "alice").await;
    let bob = common::create_user(&pool, "bob").await;

    assert!(matches!(
        MessageService::send(
            &pool,
            &codec,
            &registry,
            &config,
            alice,
            bob,
            NewMessage {
                scheme: MessageScheme::System,
                content: "too late".into(),
                is_burn_after_reading: false,
                burn_at: Some(Utc::now() - ChronoDuration::seconds(1)),
            },
        )
        .await,
        Err(AppError::InvalidScheduleTime)
    ));

    let sent = MessageService::send(
        &pool,
        &codec,
        &registry,
        &config,
        alice,
        bob,
        NewMessage {
            scheme: MessageScheme::System,
            content: "short lived".into(),
            is_burn_after_reading: false,
            burn_at: Some(Utc::now() + ChronoDuration::milliseconds(300)),
        },
    )
    .await
    .unwrap();

    // Before the deadline the payload is present and a sweep leaves it.
    burn_sweeper::run_sweep(&pool, &registry).await.unwrap();
    let before = MessageService::get(&pool, sent.id).await.unwrap();
    assert!(before.ciphertext.is_some());

    tokio::time::sleep(Duration::from_millis(600)).await;
    burn_sweeper::run_sweep(&pool, &registry).await.unwrap();

    let after = MessageService::get(&pool, sent.id).await.unwrap();
    assert!(after.ciphertext.is_none());
    assert!(after.destroyed_at.is_some());
    assert!(!after.is_read, "scheduled destroy ignores read state");

    // Destruction does not imply read: the message still counts as unread.
    assert_eq!(UnreadService::unread_count(&pool, bob).await.unwrap(), 1);

    // A second sweep finds nothing left to do.
    let again = MessageService::get(&pool, sent.id).await.unwrap();
    assert_eq!(again.destroyed_at, after.destroyed_at);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn mark_all_read_returns_the_prior_count_and_burns() {
    let pool = common::setup_pool().await;
    let config = test_config();
    let codec = MessageCodec::new(config.master_key);
    let registry = ConnectionRegistry::new();
    let alice = common::create_user(&pool, "alice").await;
    let bob = common::create_user(&pool, "bob").await;

    for content in ["one", "two"] {
        MessageService::send(
            &pool,
            &codec,
            &registry,
            &config,
            alice,
            bob,
            system_message(content),
        )
        .await
        .unwrap();
    }
    let burn = MessageService::send(
        &pool,
        &codec,
        &registry,
        &config,
        alice,
        bob,
        NewMessage {
            scheme: MessageScheme::System,
            content: "three".into(),
            is_burn_after_reading: true,
            burn_at: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(UnreadService::unread_count(&pool, bob).await.unwrap(), 3);

    let updated = UnreadService::mark_all_read(&pool, &registry, bob)
        .await
        .unwrap();
    assert_eq!(updated, 3);
    assert_eq!(UnreadService::unread_count(&pool, bob).await.unwrap(), 0);

    let burned = MessageService::get(&pool, burn.id).await.unwrap();
    assert!(burned.destroyed_at.is_some());

    // Second pass: nothing left.
    assert_eq!(
        UnreadService::mark_all_read(&pool, &registry, bob)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn opaque_payloads_are_stored_verbatim() {
    let pool = common::setup_pool().await;
    let config = test_config();
    let codec = MessageCodec::new(config.master_key);
    let registry = ConnectionRegistry::new();
    let alice = common::create_user(&pool, "alice").await;
    let bob = common::create_user(&pool, "bob").await;

    let raw: Vec<u8> = (0..=255).collect();
    let encoded = STANDARD.encode(&raw);

    let sent = MessageService::send(
        &pool,
        &codec,
        &registry,
        &config,
        alice,
        bob,
        NewMessage {
            scheme: MessageScheme::Custom,
            content: encoded.clone(),
            is_burn_after_reading: false,
            burn_at: None,
        },
    )
    .await
    .unwrap();

    let stored = MessageService::get(&pool, sent.id).await.unwrap();
    assert_eq!(stored.ciphertext.as_deref(), Some(raw.as_slice()));
    assert!(stored.nonce.is_none(), "the core never re-encrypts custom payloads");

    let session = SessionService::find(&pool, bob, alice).await.unwrap().unwrap();
    let fetched = MessageService::fetch_since(&pool, &codec, &registry, &session, bob, None, 50)
        .await
        .unwrap();
    assert_eq!(fetched.last().unwrap().content.as_deref(), Some(encoded.as_str()));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn unread_summary_reflects_sessions_and_previews() {
    let pool = common::setup_pool().await;
    let config = test_config();
    let codec = MessageCodec::new(config.master_key);
    let registry = ConnectionRegistry::new();
    let alice = common::create_user(&pool, "alice").await;
    let bob = common::create_user(&pool, "bob").await;
    let carol = common::create_user(&pool, "carol").await;

    MessageService::send(
        &pool,
        &codec,
        &registry,
        &config,
        alice,
        bob,
        system_message("hi from alice"),
    )
    .await
    .unwrap();
    MessageService::send(
        &pool,
        &codec,
        &registry,
        &config,
        carol,
        bob,
        system_message("hi from carol"),
    )
    .await
    .unwrap();

    let overviews = SessionService::sessions_overview(&pool, &codec, bob)
        .await
        .unwrap();
    assert_eq!(overviews.len(), 2);
    // Most recent activity first.
    assert_eq!(overviews[0].peer_id, carol);
    assert_eq!(overviews[0].unread_count, 1);
    assert_eq!(overviews[0].preview.as_deref(), Some("hi from carol"));
    assert_eq!(overviews[1].peer_id, alice);

    assert_eq!(UnreadService::unread_count(&pool, bob).await.unwrap(), 2);
}
