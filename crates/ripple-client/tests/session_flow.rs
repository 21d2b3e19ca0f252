//! End-to-end session flow against the in-memory backend: two users
//! sign up, chat in the same conversation, exchange an attachment, and
//! part ways cleanly.

use anyhow::Result;

use ripple_backend::Backend;
use ripple_client::{ClientConfig, RippleClient, SendOutcome, SuggestionState};
use ripple_shared::{DeliveryState, FilePayload, PresenceStatus};
use ripple_sync::SyncUpdate;

fn small_png(name: &str) -> FilePayload {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        32,
        32,
        image::Rgb([200, 100, 50]),
    ));
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    FilePayload {
        bytes: out.into(),
        file_name: name.to_string(),
        mime_type: "image/png".into(),
    }
}

async fn next_snapshot(
    updates: &mut tokio::sync::mpsc::Receiver<SyncUpdate>,
) -> Vec<ripple_shared::Message> {
    match updates.recv().await.expect("update") {
        SyncUpdate::Snapshot(view) => view,
        SyncUpdate::Lost(e) => panic!("feed lost: {e}"),
    }
}

#[tokio::test]
async fn two_users_chat_and_share_an_attachment() -> Result<()> {
    let backend = Backend::in_memory();

    let alice = RippleClient::sign_up(
        backend.clone(),
        ClientConfig::default(),
        "Alice",
        "alice@example.com",
        "correct horse",
    )
    .await?;
    let bob = RippleClient::sign_up(
        backend.clone(),
        ClientConfig::default(),
        "Bob",
        "bob@example.com",
        "battery staple",
    )
    .await?;

    // Both sides derive the same 1:1 conversation id.
    let (alice_chat, mut alice_updates) =
        alice.conversation_with(&bob.session().profile).await?;
    let (bob_chat, mut bob_updates) =
        bob.conversation_with(&alice.session().profile).await?;
    assert_eq!(alice_chat.id(), bob_chat.id());
    next_snapshot(&mut alice_updates).await;
    next_snapshot(&mut bob_updates).await;

    // Alice sees Bob online.
    let bob_presence = alice.watch_presence(bob.session().user_id());
    assert_eq!(*bob_presence.borrow(), PresenceStatus::Online);

    // Alice sends a text; her own view shows it optimistically first.
    alice_chat.send_text("hey Bob!").await?;
    let view = next_snapshot(&mut alice_updates).await;
    assert_eq!(view[0].delivery_state, DeliveryState::Pending);
    let view = next_snapshot(&mut alice_updates).await;
    assert_eq!(view[0].delivery_state, DeliveryState::Sent);

    // Bob's live feed picks it up.
    let view = next_snapshot(&mut bob_updates).await;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].text.as_deref(), Some("hey Bob!"));
    assert_eq!(view[0].sender_name.as_deref(), Some("Alice"));

    // Bob replies with a photo.
    let send = bob_chat
        .send_attachment(small_png("coffee.png"), Some("this place?".into()))
        .await?;
    let outcome = send.outcome().await?;
    assert!(matches!(outcome, SendOutcome::Sent(_)));

    // Both sides converge on two ordered messages.
    let view = loop {
        let view = next_snapshot(&mut alice_updates).await;
        if view.len() == 2 {
            break view;
        }
    };
    let attachment = view[1].attachment.as_ref().expect("attachment");
    assert_eq!(attachment.file_name, "coffee.png");
    assert!(attachment.url.contains(alice_chat.id().as_str()));

    // A conversation document exists for both participants.
    assert_eq!(alice.conversations().await?.len(), 1);
    assert_eq!(bob.conversations().await?.len(), 1);

    // Bob leaves; Alice observes him go offline.
    bob_chat.detach().await;
    bob.sign_out().await?;
    assert_eq!(*bob_presence.borrow(), PresenceStatus::Offline);

    alice_chat.detach().await;
    alice.sign_out().await?;
    Ok(())
}

#[tokio::test]
async fn guest_can_read_and_write_but_gets_no_suggestions() -> Result<()> {
    let backend = Backend::in_memory();

    let host = RippleClient::sign_up(
        backend.clone(),
        ClientConfig::default(),
        "Host",
        "host@example.com",
        "secret",
    )
    .await?;
    let guest = RippleClient::guest(backend.clone(), ClientConfig::default(), Some("Visitor"))
        .await?;

    let (host_chat, mut host_updates) = host
        .group("general", "General", vec![guest.session().user_id().clone()])
        .await?;
    let (guest_chat, mut guest_updates) = guest
        .group("general", "General", vec![host.session().user_id().clone()])
        .await?;
    next_snapshot(&mut host_updates).await;
    next_snapshot(&mut guest_updates).await;

    host_chat.send_text("welcome!").await?;
    let view = next_snapshot(&mut guest_updates).await;
    assert_eq!(view[0].text.as_deref(), Some("welcome!"));

    // Policy: an inbound message never triggers suggestions for guests.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(*guest_chat.suggestions().borrow(), SuggestionState::default());

    guest_chat.send_text("thanks for having me").await?;
    let view = loop {
        let view = next_snapshot(&mut host_updates).await;
        if view.len() == 2 && view[1].delivery_state == DeliveryState::Sent {
            break view;
        }
    };
    assert_eq!(view[1].sender_name.as_deref(), Some("Visitor"));

    guest.sign_out().await?;
    host.sign_out().await?;
    Ok(())
}
