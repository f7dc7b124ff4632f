// Feed client reconnect behavior against a local websocket server: the
// full subscription set is re-asserted after a reconnect, and parsed
// frames keep flowing on the new connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{ SinkExt, StreamExt };
use tokio::net::TcpListener;
use tokio::sync::{ mpsc, Notify };
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use mintwatch::events::EventBus;
use mintwatch::feed::{ spawn_feed_client, FeedConfig, FeedMessage };

fn test_feed_config(url: String) -> FeedConfig {
    FeedConfig {
        url,
        reconnect_delay: Duration::from_millis(50),
        max_reconnect_attempts: 10,
        heartbeat: Duration::from_secs(30),
        connect_timeout: Duration::from_secs(5),
    }
}

async fn recv_text(
    rx: &mut mpsc::UnboundedReceiver<(usize, String)>,
) -> Option<(usize, String)> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_reconnect_reasserts_subscriptions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    // Server: connection 0 is dropped after its first frame; connection
    // 1 stays up and reports every text frame it sees.
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<(usize, String)>();
    tokio::spawn(async move {
        for conn in 0..2usize {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            if conn == 0 {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    let _ = frames_tx.send((conn, text));
                }
                let _ = ws.close(None).await;
                continue;
            }

            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(text) => {
                        let _ = frames_tx.send((conn, text));
                    }
                    Message::Ping(data) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    let (feed_tx, _feed_rx) = mpsc::channel::<FeedMessage>(64);
    let shutdown = Arc::new(Notify::new());
    let (handle, _task) = spawn_feed_client(
        test_feed_config(url),
        feed_tx,
        EventBus::default(),
        shutdown.clone(),
    );

    handle
        .subscribe(vec!["A".to_string(), "B".to_string(), "C".to_string()])
        .await;

    // Connection 0 sees the new-token subscription, then gets cut.
    let (conn, frame) = recv_text(&mut frames_rx).await.expect("first frame");
    assert_eq!(conn, 0);
    assert!(frame.contains("subscribeNewToken"));

    // After the reconnect, the client re-asserts everything before it
    // is ready: the new-token stream and all three trade keys at once.
    let mut saw_new_token = false;
    let mut trade_keys: Option<String> = None;
    while trade_keys.is_none() {
        let (conn, frame) = recv_text(&mut frames_rx).await.expect("reconnect frame");
        assert_eq!(conn, 1);
        if frame.contains("subscribeNewToken") {
            saw_new_token = true;
        } else if frame.contains("subscribeTokenTrade") {
            trade_keys = Some(frame);
        }
    }
    assert!(saw_new_token);
    let keys = trade_keys.unwrap();
    for mint in ["\"A\"", "\"B\"", "\"C\""] {
        assert!(keys.contains(mint), "missing {} in {}", mint, keys);
    }

    // The subscription set itself never changed across the reconnect.
    let mut mints = handle.subscribed_mints();
    mints.sort();
    assert_eq!(mints, vec!["A", "B", "C"]);

    // Ready flag flips once the re-assert completes.
    let mut connected = false;
    for _ in 0..50 {
        if handle.is_connected() {
            connected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(connected);

    shutdown.notify_waiters();
}

#[tokio::test]
async fn test_unsubscribe_sends_frame_and_shrinks_set() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<(usize, String)>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    let _ = frames_tx.send((0, text));
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let (feed_tx, _feed_rx) = mpsc::channel::<FeedMessage>(64);
    let shutdown = Arc::new(Notify::new());
    let (handle, _task) = spawn_feed_client(
        test_feed_config(url),
        feed_tx,
        EventBus::default(),
        shutdown.clone(),
    );

    // Wait for the connection handshake frame.
    let (_, frame) = recv_text(&mut frames_rx).await.expect("handshake");
    assert!(frame.contains("subscribeNewToken"));

    handle.subscribe(vec!["A".to_string(), "B".to_string()]).await;
    let (_, frame) = recv_text(&mut frames_rx).await.expect("subscribe frame");
    assert!(frame.contains("subscribeTokenTrade"));

    handle.unsubscribe(vec!["A".to_string()]).await;
    let (_, frame) = recv_text(&mut frames_rx).await.expect("unsubscribe frame");
    assert!(frame.contains("unsubscribeTokenTrade"));
    assert!(frame.contains("\"A\""));

    assert_eq!(handle.subscribed_mints(), vec!["B".to_string()]);

    // Repeated unsubscribe for a gone mint sends nothing; the next
    // frame the server sees is the fresh subscribe below.
    handle.unsubscribe(vec!["A".to_string()]).await;
    handle.subscribe(vec!["D".to_string()]).await;
    let (_, frame) = recv_text(&mut frames_rx).await.expect("subscribe frame");
    assert!(frame.contains("subscribeTokenTrade"));
    assert!(frame.contains("\"D\""));

    shutdown.notify_waiters();
}

#[tokio::test]
async fn test_frames_parsed_and_forwarded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // Consume the handshake frame, then push one of each kind.
        let _ = ws.next().await;
        let create = r#"{"txType":"create","mint":"FwdMint1111111111111111111111pump","symbol":"FWD","name":"Forward","vSolInBondingCurve":30.0,"vTokensInBondingCurve":1000000.0}"#;
        let trade = r#"{"txType":"buy","mint":"FwdMint1111111111111111111111pump","signature":"sig-0123456789","traderPublicKey":"w1","tokenAmount":10.0,"priceSol":0.1}"#;
        let noise = r#"{"txType":"migrate"}"#;
        for frame in [create, trade, noise] {
            ws.send(Message::Text(frame.to_string())).await.unwrap();
        }
        // Hold the connection open.
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    let (feed_tx, mut feed_rx) = mpsc::channel::<FeedMessage>(64);
    let shutdown = Arc::new(Notify::new());
    let (_handle, _task) = spawn_feed_client(
        test_feed_config(url),
        feed_tx,
        EventBus::default(),
        shutdown.clone(),
    );

    let first = tokio::time::timeout(Duration::from_secs(5), feed_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        FeedMessage::NewToken(token) => {
            assert_eq!(token.symbol, "FWD");
            assert!(token.price.is_some());
        }
        other => panic!("expected NewToken first, got {:?}", other),
    }

    let second = tokio::time::timeout(Duration::from_secs(5), feed_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match second {
        FeedMessage::Trade(trade) => {
            assert_eq!(trade.side, "buy");
            assert_eq!(trade.amount, 10.0);
        }
        other => panic!("expected Trade second, got {:?}", other),
    }

    // The unknown frame was dropped, not forwarded.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), feed_rx.recv())
            .await
            .is_err()
    );

    shutdown.notify_waiters();
}
