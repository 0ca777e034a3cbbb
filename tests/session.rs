mod common;

use common::{mocks::FakeTransport, GUILD, VOICE};
use discmusic::{
    audio::{ConnectionState, VoiceSession},
    voice::JoinOptions,
    MusicError,
};
use pretty_assertions::assert_eq;
use serenity::model::id::ChannelId;

fn session(transport: std::sync::Arc<FakeTransport>) -> VoiceSession {
    VoiceSession::new(GUILD, VOICE, transport, JoinOptions::default())
}

#[tokio::test]
async fn test_leave_is_idempotent() {
    let (transport, _plays) = FakeTransport::new();
    let mut session = session(transport.clone());

    session.leave().await.unwrap();
    assert_eq!(transport.leaves(), 0);

    session.join().await.unwrap();
    session.leave().await.unwrap();
    session.leave().await.unwrap();

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(!session.is_connected());
    assert_eq!(transport.leaves(), 1);
}

#[tokio::test]
async fn test_join_same_channel_is_noop() {
    let (transport, _plays) = FakeTransport::new();
    let mut session = session(transport.clone());

    session.join().await.unwrap();
    session.join().await.unwrap();

    assert_eq!(transport.joins(), 1);
    assert_eq!(session.state(), ConnectionState::Connected { channel_id: VOICE });
}

#[tokio::test]
async fn test_join_new_channel_reconnects() {
    let (transport, _plays) = FakeTransport::new();
    let mut session = session(transport.clone());

    session.join().await.unwrap();
    session.set_channel(ChannelId::new(99));
    session.join().await.unwrap();

    assert_eq!(transport.joins(), 2);
    assert_eq!(transport.last_channel(), Some(ChannelId::new(99)));
    assert_eq!(
        session.state(),
        ConnectionState::Connected {
            channel_id: ChannelId::new(99)
        }
    );
}

#[tokio::test]
async fn test_join_failure_is_not_retried() {
    let (transport, _plays) = FakeTransport::new();
    transport.fail_join(true);
    let mut session = session(transport.clone());

    let result = session.join().await;

    assert_eq!(result, Err(MusicError::VoiceConnect("timeout".to_string())));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(transport.joins(), 0);
}

#[tokio::test]
async fn test_rejoins_after_connection_drop() {
    let (transport, _plays) = FakeTransport::new();
    let mut session = session(transport.clone());

    session.join().await.unwrap();
    transport.drop_connection(GUILD);
    assert!(!session.is_connected());

    session.join().await.unwrap();
    assert!(session.is_connected());
    assert_eq!(transport.joins(), 2);
}
