//! QR code scanning
//!
//! Decoding is done by an external engine bound to a camera. The client only
//! starts it, waits for the first decoded text, stops it, and opens the
//! verification page for that text.

use std::future::Future;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::api::ValidationError;
use crate::navigator::{Navigator, verification_url};
use crate::view::Notice;

const SCAN_EVENT_BUFFER: usize = 64;

pub const CAMERA_FAILED_MESSAGE: &str = "Camera access failed. Please check permissions.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

/// Which camera to use
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
}

/// Decoder tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub fps: u32,
    /// Side of the square scan region in pixels
    pub qrbox: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { fps: 10, qrbox: 250 }
    }
}

/// Output of a running decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Decoded(String),
    /// Per-frame decode failure (no code in view, blur, ...)
    Error(String),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("failed to stop scanner: {0}")]
    Stop(String),
}

/// A barcode/QR decoder bound to a live camera stream.
pub trait ScanEngine: Send {
    fn start(
        &mut self,
        camera: &CameraConstraints,
        config: &ScanConfig,
    ) -> impl Future<Output = Result<mpsc::Receiver<ScanEvent>, ScanError>> + Send;

    fn stop(&mut self) -> impl Future<Output = Result<(), ScanError>> + Send;
}

/// Engine that receives decoded text line by line from a reader, e.g. the
/// output of an external decoder piped into `medguard scan`.
pub struct LineFeedEngine<R> {
    reader: Option<R>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl<R> LineFeedEngine<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            task: None,
        }
    }
}

impl<R> ScanEngine for LineFeedEngine<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn start(
        &mut self,
        camera: &CameraConstraints,
        config: &ScanConfig,
    ) -> Result<mpsc::Receiver<ScanEvent>, ScanError> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| ScanError::CameraUnavailable("scanner already started".into()))?;
        debug!(?camera, ?config, "line feed scanner started");

        let (tx, rx) = mpsc::channel(SCAN_EVENT_BUFFER);
        self.task = Some(tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let event = match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => ScanEvent::Decoded(line.trim().to_string()),
                    Ok(None) => break,
                    Err(e) => ScanEvent::Error(e.to_string()),
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }));
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), ScanError> {
        match self.task.take() {
            Some(task) => {
                task.abort();
                Ok(())
            }
            None => Err(ScanError::Stop("scanner not running".into())),
        }
    }
}

/// How a scan attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A code was decoded and its verification page opened
    Opened(Url),
    /// The engine could not start; the notice explains why
    Failed(Notice),
    /// The engine stopped without decoding anything
    Stopped,
}

/// Run the engine until the first decoded text, then stop it and open the
/// verification page for that text in a new tab.
pub async fn scan_and_open<E: ScanEngine>(
    engine: &mut E,
    navigator: &dyn Navigator,
    base: &Url,
) -> ScanOutcome {
    let mut events = match engine
        .start(&CameraConstraints::default(), &ScanConfig::default())
        .await
    {
        Ok(rx) => rx,
        Err(e) => {
            warn!("Unable to start scanning: {}", e);
            return ScanOutcome::Failed(Notice::error(CAMERA_FAILED_MESSAGE));
        }
    };

    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Error(e) => trace!("scan error ignored: {}", e),
            ScanEvent::Decoded(text) => {
                if let Err(e) = engine.stop().await {
                    warn!("Stop failed: {}", e);
                }
                let Some(url) = verification_url(base, &text) else {
                    return ScanOutcome::Failed(Notice::error(
                        ValidationError::EmptyBatchNumber.to_string(),
                    ));
                };
                if let Err(e) = navigator.open_in_new_tab(url.as_str()) {
                    warn!("Failed to open {}: {}", url, e);
                }
                return ScanOutcome::Opened(url);
            }
        }
    }
    ScanOutcome::Stopped
}
