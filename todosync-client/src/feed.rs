//! WebSocket live feed: dial with backoff, subscribe, forward each full
//! snapshot frame to the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use todosync_core::{ClientMessage, RemoteError, ServerMessage, UserId};

use crate::remote::{Subscription, TaskFeed};

const FEED_CHANNEL_CAPACITY: usize = 32;

pub(crate) async fn connect(ws_url: &str, owner_id: &UserId) -> Result<TaskFeed, RemoteError> {
    let mut stream = dial(ws_url).await?;

    let subscribe = ClientMessage::Subscribe {
        owner_id: owner_id.clone(),
    };
    let payload = serde_json::to_string(&subscribe)
        .map_err(|e| RemoteError::Rejected(format!("subscribe encode: {}", e)))?;
    stream
        .send(Message::Text(payload))
        .await
        .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

    let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
    let cancelled = Arc::new(AtomicBool::new(false));
    let reader_cancelled = cancelled.clone();

    let handle = tokio::spawn(async move {
        let (mut write, mut read) = stream.split();
        while let Some(frame) = read.next().await {
            if reader_cancelled.load(Ordering::Relaxed) {
                break;
            }
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::Snapshot { tasks }) => {
                        if tx.send(tasks).await.is_err() {
                            break;
                        }
                    }
                    Ok(ServerMessage::Error { message }) => {
                        tracing::warn!("feed reported error: {}", message);
                    }
                    Ok(ServerMessage::Pong) => {}
                    Err(e) => {
                        tracing::warn!("ignoring unparseable feed frame: {}", e);
                    }
                },
                Ok(Message::Ping(data)) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("feed closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("feed read error: {}", e);
                    break;
                }
            }
        }
        // Dropping tx tells the engine the feed is down.
    });

    Ok(TaskFeed::new(rx, Subscription::new(cancelled, handle)))
}

async fn dial(
    ws_url: &str,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, RemoteError> {
    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_millis(2000),
        max_elapsed_time: Some(Duration::from_secs(10)),
        randomization_factor: 0.1,
        ..Default::default()
    };

    let url = ws_url.to_string();
    let operation = || async {
        match connect_async(&url).await {
            Ok((stream, _)) => Ok(stream),
            Err(e) => {
                tracing::debug!("feed dial failed: {}", e);
                Err(backoff::Error::transient(e))
            }
        }
    };

    retry(backoff, operation)
        .await
        .map_err(|e| RemoteError::Unavailable(e.to_string()))
}
