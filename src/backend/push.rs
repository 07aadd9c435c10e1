//! WebSocket push channel
//!
//! The channel pings the backend on a fixed period. Any incoming frame, pongs
//! included, proves the link alive; a channel silent for longer than the
//! keepalive timeout fails so the listener reconnects.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{
    interval, sleep_until, timeout, timeout_at, Instant, Interval, MissedTickBehavior,
};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::http::HttpTransport;
use super::protocol::RegisterMessage;
use super::transport::{PushChannel, PushConnector, TransportError};
use crate::config::BackendConfig;

/// Negotiates the push URL over HTTP, then opens and registers a WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    http: Arc<HttpTransport>,
    device_id: u64,
    connect_timeout: Duration,
    keepalive_interval: Duration,
    keepalive_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(http: Arc<HttpTransport>, config: &BackendConfig) -> Self {
        Self {
            http,
            device_id: config.device_id,
            connect_timeout: config.request_timeout(),
            keepalive_interval: config.keepalive_interval(),
            keepalive_timeout: config.keepalive_timeout(),
        }
    }

    async fn bounded<T, F>(&self, step: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        timeout(self.connect_timeout, step)
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
    }
}

#[async_trait]
impl PushConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        let url = self.bounded(self.http.negotiate_push_url()).await?;
        let (mut stream, _) = self
            .bounded(async { connect_async(url.as_str()).await.map_err(TransportError::from) })
            .await?;

        let register = serde_json::to_string(&RegisterMessage::new(self.device_id))?;
        let frame = Message::Text(register.into());
        self.bounded(async { stream.send(frame).await.map_err(TransportError::from) })
            .await?;
        info!(device_id = self.device_id, "registered on push channel");

        let mut keepalive = interval(self.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Box::new(WebSocketChannel {
            stream,
            keepalive,
            idle_limit: self.keepalive_timeout,
            last_seen: Instant::now(),
        }))
    }
}

struct WebSocketChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    keepalive: Interval,
    idle_limit: Duration,
    /// Arrival of the latest frame of any kind
    last_seen: Instant,
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let deadline = self.last_seen + self.idle_limit;
            tokio::select! {
                frame = self.stream.next() => {
                    let frame = frame?;
                    self.last_seen = Instant::now();
                    match frame {
                        Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "push channel closed by backend");
                            return None;
                        }
                        // pings are answered by tungstenite on the next read
                        Ok(_) => continue,
                        Err(e) => return Some(Err(e.into())),
                    }
                }
                _ = self.keepalive.tick() => {
                    let ping = self.stream.send(Message::Ping(Default::default()));
                    match timeout_at(deadline, ping).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Some(Err(e.into())),
                        Err(_) => return Some(Err(TransportError::Timeout(self.idle_limit))),
                    }
                }
                _ = sleep_until(deadline) => {
                    warn!(
                        silent_secs = self.idle_limit.as_secs(),
                        "push channel stopped answering"
                    );
                    return Some(Err(TransportError::Timeout(self.idle_limit)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::sleep;
    use tokio_tungstenite::accept_async;

    use crate::testing::serve_http;

    fn config(origin: &str) -> BackendConfig {
        BackendConfig {
            api_origin: origin.to_string(),
            device_id: 4,
            request_timeout_secs: 1,
            keepalive_interval_ms: 50,
            keepalive_timeout_secs: 1,
            ..BackendConfig::default()
        }
    }

    /// Negotiate endpoint pointing at a fresh WebSocket listener
    async fn negotiating() -> (BackendConfig, TcpListener) {
        let ws = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", http.local_addr().unwrap());
        let body = format!(r#"{{"url":"ws://{}"}}"#, ws.local_addr().unwrap());
        tokio::spawn(serve_http(http, 200, body.into_bytes(), 1));
        (config(&origin), ws)
    }

    fn connector(config: &BackendConfig) -> WebSocketConnector {
        let http = Arc::new(HttpTransport::new(config).unwrap());
        WebSocketConnector::new(http, config)
    }

    #[tokio::test]
    async fn test_connect_gives_up_on_silent_backend() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = config(&format!("http://{}", listener.local_addr().unwrap()));
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            sleep(Duration::from_secs(60)).await;
        });

        let start = Instant::now();
        let result = connector(&config).connect().await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_silent_channel_times_out() {
        let (config, ws) = negotiating().await;
        tokio::spawn(async move {
            let (socket, _) = ws.accept().await.unwrap();
            let mut stream = accept_async(socket).await.unwrap();
            stream.next().await;
            // stop reading so pings go unanswered
            let _hold = stream;
            sleep(Duration::from_secs(60)).await;
        });

        let mut channel = connector(&config).connect().await.unwrap();
        let start = Instant::now();
        let frame = timeout(Duration::from_secs(5), channel.recv()).await.unwrap();

        assert!(matches!(frame, Some(Err(TransportError::Timeout(_)))));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_client_pings_and_registers() {
        let (config, ws) = negotiating().await;
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (socket, _) = ws.accept().await.unwrap();
            let mut stream = accept_async(socket).await.unwrap();
            let register = stream.next().await.unwrap().unwrap();
            let ping = stream.next().await.unwrap().unwrap();
            let _ = tx.send((register, ping));
            sleep(Duration::from_secs(60)).await;
        });

        let mut channel = connector(&config).connect().await.unwrap();
        let recv = tokio::spawn(async move { channel.recv().await.is_some() });
        let (register, ping) = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();

        assert_eq!(
            register,
            Message::Text(r#"{"action":"register","clientId":4}"#.into())
        );
        assert!(ping.is_ping());
        recv.abort();
    }

    #[tokio::test]
    async fn test_answered_pings_keep_channel_open() {
        let (config, ws) = negotiating().await;
        tokio::spawn(async move {
            let (socket, _) = ws.accept().await.unwrap();
            let mut stream = accept_async(socket).await.unwrap();
            let until = Instant::now() + Duration::from_millis(2500);
            loop {
                tokio::select! {
                    _ = stream.next() => {}
                    _ = sleep_until(until) => break,
                }
            }
            stream
                .send(Message::Text(r#"{"type":"new_message","id":1}"#.into()))
                .await
                .unwrap();
            sleep(Duration::from_secs(60)).await;
        });

        let mut channel = connector(&config).connect().await.unwrap();
        let start = Instant::now();
        let frame = timeout(Duration::from_secs(5), channel.recv()).await.unwrap();

        assert_eq!(frame.unwrap().unwrap(), r#"{"type":"new_message","id":1}"#);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
