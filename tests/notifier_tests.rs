//! Push-channel notifier against a mock backend.

mod mock_servers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use voxbridge::core::intent::ConversationSink;
use voxbridge::core::live::{FunctionResponse, LiveError};
use voxbridge::core::notifier::{
    AnnouncementMode, Announcer, Notification, Notifier, NotifierConfig, NotifierResult,
    PlaybackControl, ReconnectionConfig, SpeechSynthesizer,
};

use mock_servers::{MockPushServer, wait_until};

/// Records pause/resume and announcements into one ordered log.
#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
}

impl Recorder {
    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl PlaybackControl for Recorder {
    fn pause(&self) {
        self.log.lock().push("pause".to_string());
    }

    fn resume(&self) {
        self.log.lock().push("resume".to_string());
    }
}

#[async_trait]
impl ConversationSink for Recorder {
    async fn send_tool_response(&self, _responses: Vec<FunctionResponse>) -> Result<(), LiveError> {
        Ok(())
    }

    async fn send_update(&self, text: &str) -> Result<(), LiveError> {
        self.log.lock().push(format!("update:{text}"));
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for Recorder {
    async fn speak(&self, text: &str) -> NotifierResult<()> {
        self.log.lock().push(format!("speak:{text}"));
        Ok(())
    }
}

fn config(server: &MockPushServer, mode: AnnouncementMode) -> NotifierConfig {
    NotifierConfig {
        push_url: server.base_url().to_string(),
        client_id: "kiosk".to_string(),
        mode,
        reconnection: ReconnectionConfig {
            initial_delay_ms: 50,
            max_delay_ms: 200,
            jitter: false,
            ..Default::default()
        },
    }
}

async fn next(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Notification>) -> Notification {
    timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("notification within 3s")
        .expect("notifier channel open")
}

#[tokio::test]
async fn test_model_input_announcement_pauses_playback() {
    let server = MockPushServer::start().await;
    let recorder = Arc::new(Recorder::default());

    let (notifier, mut rx) = Notifier::spawn(
        config(&server, AnnouncementMode::ModelInput),
        Announcer::ModelInput(recorder.clone()),
        recorder.clone(),
        CancellationToken::new(),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(2), || server.connections() == 1).await);
    assert_eq!(server.paths(), vec!["/ws/kiosk".to_string()]);

    server.push(json!({
        "text": "Found 3 pizza places",
        "type": "request_processed",
        "action": "SEARCH"
    }));

    let notification = next(&mut rx).await;
    assert_eq!(notification.text, "Found 3 pizza places");
    assert_eq!(notification.kind.as_deref(), Some("request_processed"));
    assert_eq!(notification.action.as_deref(), Some("SEARCH"));
    assert_eq!(
        recorder.log(),
        vec!["pause", "update:Found 3 pizza places", "resume"]
    );
    assert_eq!(notifier.delivered(), 1);

    notifier.stop();
    timeout(Duration::from_secs(2), notifier.join())
        .await
        .expect("notifier stops");
}

#[tokio::test]
async fn test_speech_announcement_and_legacy_shape() {
    let server = MockPushServer::start().await;
    let recorder = Arc::new(Recorder::default());

    let (notifier, mut rx) = Notifier::spawn(
        config(&server, AnnouncementMode::Speech),
        Announcer::Speech(recorder.clone()),
        recorder.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(2), || server.connections() == 1).await);

    server.push_raw("not a notification");
    server.push(json!({"message": "Your order is placed"}));

    let notification = next(&mut rx).await;
    assert_eq!(notification.text, "Your order is placed");
    assert_eq!(
        recorder.log(),
        vec!["pause", "speak:Your order is placed", "resume"]
    );

    notifier.stop();
}

#[tokio::test]
async fn test_reconnects_after_drop() {
    let server = MockPushServer::start().await;
    let recorder = Arc::new(Recorder::default());

    let (notifier, mut rx) = Notifier::spawn(
        config(&server, AnnouncementMode::ModelInput),
        Announcer::ModelInput(recorder.clone()),
        recorder.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(2), || server.connections() == 1).await);

    server.drop_connection();
    assert!(wait_until(Duration::from_secs(2), || server.connections() == 2).await);

    server.push(json!({"message": "back online"}));
    assert_eq!(next(&mut rx).await.text, "back online");

    notifier.stop();
}

#[tokio::test]
async fn test_shutdown_token_stops_listener() {
    let server = MockPushServer::start().await;
    let recorder = Arc::new(Recorder::default());
    let token = CancellationToken::new();

    let (notifier, _rx) = Notifier::spawn(
        config(&server, AnnouncementMode::ModelInput),
        Announcer::ModelInput(recorder.clone()),
        recorder,
        token.clone(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(2), || server.connections() == 1).await);

    token.cancel();
    assert!(wait_until(Duration::from_secs(2), || notifier.is_finished()).await);
}

#[tokio::test]
async fn test_invalid_push_url_rejected() {
    let recorder = Arc::new(Recorder::default());
    let result = Notifier::spawn(
        NotifierConfig {
            push_url: "ftp://backend".to_string(),
            ..Default::default()
        },
        Announcer::ModelInput(recorder.clone()),
        recorder,
        CancellationToken::new(),
    );
    assert!(result.is_err());
}
