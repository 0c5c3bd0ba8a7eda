use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::{future, pin_mut, StreamExt};
use futures_channel::mpsc::UnboundedSender;
use log::{error, info, warn};
use reqwest::header::HeaderValue;
use sdk::PushFrame;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Receiver of a connection's frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Called once per established socket, before or while its first frames
    /// arrive.
    async fn on_connected(&self);

    async fn on_frame(&self, frame: PushFrame);
}

/// Text frames are plain JSON, binary frames gzip compressed JSON. Control
/// frames yield `None`.
pub fn decode_message(message: Message) -> Result<Option<PushFrame>> {
    let frame = match message {
        Message::Text(text) => serde_json::from_str(&text)?,
        Message::Binary(data) => {
            let mut decoder = GzDecoder::new(Cursor::new(&data));
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            serde_json::from_slice(&decompressed)?
        }
        _ => return Ok(None),
    };
    Ok(Some(frame))
}

pub fn encode_frame(frame: &PushFrame) -> Result<Message> {
    let bytes = serde_json::to_vec(frame)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&bytes)?;
    Ok(Message::Binary(encoder.finish()?))
}

/// The single outbound push socket.
pub struct PushConnection {
    url: String,
    token: Option<String>,
    sink: Mutex<Option<UnboundedSender<Message>>>,
}

impl PushConnection {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        PushConnection {
            url: url.into(),
            token,
            sink: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    /// Connects and pumps frames into `frames` until the socket closes.
    pub async fn connect(&self, frames: Arc<dyn FrameSink>) -> Result<()> {
        if self.is_connected() {
            warn!("already connected");
            return Ok(());
        }

        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            request.headers_mut().insert(
                "Authorization",
                HeaderValue::try_from(format!("Bearer {}", token))?,
            );
        }
        let (ws_stream, _) = connect_async(request).await?;
        info!("push connected: {}", self.url);

        let (sender, receiver) = futures_channel::mpsc::unbounded();
        *self.sink.lock().unwrap() = Some(sender.clone());

        let heartbeat = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let message = match encode_frame(&PushFrame::heartbeat()) {
                    Ok(message) => message,
                    Err(err) => {
                        error!("failed to encode heartbeat: {:?}", err);
                        continue;
                    }
                };
                if sender.unbounded_send(message).is_err() {
                    break;
                }
            }
        });

        let connected = frames.clone();
        tokio::spawn(async move { connected.on_connected().await });

        let (sink, stream) = ws_stream.split();
        let send = receiver.map(Ok).forward(sink);
        let receive = stream.for_each(|message| {
            let frames = frames.clone();
            async move {
                let message = match message {
                    Ok(m) => m,
                    Err(err) => {
                        error!("socket error : {}", err);
                        return;
                    }
                };
                match decode_message(message) {
                    Ok(Some(frame)) => frames.on_frame(frame).await,
                    Ok(None) => {}
                    Err(err) => warn!("failed to decode push frame: {:?}", err),
                }
            }
        });
        pin_mut!(send, receive);
        future::select(send, receive).await;

        heartbeat.abort();
        *self.sink.lock().unwrap() = None;
        info!("push disconnected");
        Ok(())
    }

    pub fn send(&self, frame: &PushFrame) -> Result<()> {
        let sink = self.sink.lock().unwrap();
        let sender = sink.as_ref().ok_or(anyhow!("not connected"))?;
        sender.unbounded_send(encode_frame(frame)?)?;
        Ok(())
    }
}
