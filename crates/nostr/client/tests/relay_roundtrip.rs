//! End-to-end tests of the WebSocket adapter against an in-process relay.

use futures::{SinkExt, StreamExt};
use nostr::{Event, EventTemplate, finalize_event, generate_secret_key};
use nostr_client::{
    ClientMessage, Filter, Outcome, RelayConfig, RelayMessage, RelayOutcome, RelayPool,
    WsConnector,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Store events and answer REQs
    Accept,
    /// Answer every EVENT with OK false
    Reject,
    /// Read messages and never answer
    Silent,
}

#[derive(Clone)]
struct TestRelay {
    addr: SocketAddr,
    events: Arc<Mutex<Vec<Event>>>,
}

impl TestRelay {
    async fn start(mode: Mode) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay = Self {
            addr: listener.local_addr().unwrap(),
            events: Arc::new(Mutex::new(Vec::new())),
        };

        let events = Arc::clone(&relay.events);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, mode, Arc::clone(&events)));
            }
        });

        relay
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn stored(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

async fn serve(stream: TcpStream, mode: Mode, events: Arc<Mutex<Vec<Event>>>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        if mode == Mode::Silent {
            continue;
        }

        let replies = match ClientMessage::from_json(text.as_str()) {
            Ok(ClientMessage::Event(event)) => {
                let accepted = mode == Mode::Accept;
                if accepted {
                    events.lock().unwrap().push(event.clone());
                }
                vec![RelayMessage::Ok {
                    event_id: event.id,
                    success: accepted,
                    message: if accepted { "" } else { "blocked: test" }.to_string(),
                }]
            }
            Ok(ClientMessage::Req {
                subscription_id,
                filters,
            }) => {
                let stored = events.lock().unwrap().clone();
                let mut replies: Vec<RelayMessage> = stored
                    .into_iter()
                    .filter(|event| filters.iter().any(|f| f.matches(event)))
                    .map(|event| RelayMessage::Event {
                        subscription_id: subscription_id.clone(),
                        event,
                    })
                    .collect();
                replies.push(RelayMessage::Eose { subscription_id });
                replies
            }
            Ok(ClientMessage::Close { .. }) => Vec::new(),
            Err(e) => vec![RelayMessage::Notice {
                message: e.to_string(),
            }],
        };

        for reply in replies {
            if ws.send(Message::Text(reply.to_json().into())).await.is_err() {
                return;
            }
        }
    }
}

/// A URL on which nothing is listening.
async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

fn definition() -> Event {
    let template = EventTemplate::new(30009, "")
        .tag(["d", "bravery"])
        .tag(["name", "Medal of Bravery"]);
    finalize_event(&template, &generate_secret_key()).unwrap()
}

fn fast_pool() -> RelayPool {
    RelayPool::new(WsConnector::new(RelayConfig {
        connect_timeout: Duration::from_secs(2),
        ack_timeout: Duration::from_millis(300),
    }))
}

#[tokio::test]
async fn test_publish_then_race_read() {
    let relay = TestRelay::start(Mode::Accept).await;
    let pool = fast_pool();
    let event = definition();

    let outcomes = pool
        .broadcast_publish(&[relay.url()], event.clone())
        .await
        .unwrap();
    assert_eq!(
        outcomes,
        vec![RelayOutcome::new(relay.url(), Outcome::Completed(true))]
    );
    assert_eq!(relay.stored(), vec![event.clone()]);

    let filter = Filter::new()
        .kinds([30009])
        .authors([event.pubkey.clone()])
        .identifiers(["bravery"]);
    let found = pool
        .race_first(&[dead_url().await, relay.url()], vec![filter])
        .await
        .unwrap();
    assert_eq!(found, Some(event));
}

#[tokio::test]
async fn test_broadcast_reports_each_relay_in_order() {
    let accepting = TestRelay::start(Mode::Accept).await;
    let rejecting = TestRelay::start(Mode::Reject).await;
    let relays = vec![accepting.url(), dead_url().await, rejecting.url()];

    let outcomes = fast_pool()
        .broadcast_publish(&relays, definition())
        .await
        .unwrap();

    let summary: Vec<(bool, Option<bool>)> = outcomes
        .iter()
        .map(|o| (o.connected(), o.result().copied()))
        .collect();
    assert_eq!(
        summary,
        vec![(true, Some(true)), (false, None), (true, None)]
    );
    assert_eq!(outcomes[2].outcome, Outcome::Failed);
    assert!(rejecting.stored().is_empty());
}

#[tokio::test]
async fn test_silent_relay_times_out() {
    let silent = TestRelay::start(Mode::Silent).await;
    let pool = fast_pool();

    let outcomes = pool
        .broadcast_publish(&[silent.url()], definition())
        .await
        .unwrap();
    assert_eq!(outcomes[0].outcome, Outcome::Failed);

    let found = pool
        .race_query(&[silent.url()], vec![Filter::new().kinds([30009])])
        .await
        .unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn test_empty_result_is_not_found() {
    let relay = TestRelay::start(Mode::Accept).await;

    let found = fast_pool()
        .race_query(&[relay.url()], vec![Filter::new().kinds([8])])
        .await
        .unwrap();
    assert_eq!(found, None);
}
