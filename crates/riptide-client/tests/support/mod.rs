#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use riptide_client::{ClientResult, Connection, PushClientConfig, SessionFetcher, Transport};
use riptide_events::ContentId;
use riptide_torrent_core::{SessionStatus, SessionSummary};
use tokio::sync::mpsc;
use tokio::time::Instant;

enum Step {
    Fail,
    Open(mpsc::UnboundedReceiver<String>),
}

/// Scripted transport: each connect consumes the next step, failing once
/// the script runs out.
#[derive(Default)]
pub struct FakeTransport {
    steps: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<Instant>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_failure(&self) {
        self.steps.lock().expect("steps").push_back(Step::Fail);
    }

    /// Queue a successful open; frames sent on the returned channel are
    /// delivered in order and dropping it closes the connection.
    pub fn push_open(&self) -> mpsc::UnboundedSender<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.steps
            .lock()
            .expect("steps")
            .push_back(Step::Open(receiver));
        sender
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().expect("attempts").clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().expect("attempts").len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _config: &PushClientConfig) -> Result<Box<dyn Connection>> {
        self.attempts.lock().expect("attempts").push(Instant::now());
        let step = self.steps.lock().expect("steps").pop_front();
        match step {
            Some(Step::Open(frames)) => Ok(Box::new(FakeConnection { frames })),
            Some(Step::Fail) | None => Err(anyhow!("connection refused")),
        }
    }
}

struct FakeConnection {
    frames: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        Ok(self.frames.recv().await)
    }
}

/// Fetcher returning whatever rows the test last installed.
#[derive(Default)]
pub struct FakeFetcher {
    rows: Mutex<Vec<SessionSummary>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn with_rows(rows: Vec<SessionSummary>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_rows(&self, rows: Vec<SessionSummary>) {
        *self.rows.lock().expect("rows") = rows;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFetcher for FakeFetcher {
    async fn fetch_all(&self) -> ClientResult<Vec<SessionSummary>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().expect("rows").clone())
    }
}

pub fn id(fill: char) -> ContentId {
    ContentId::parse_hex(&fill.to_string().repeat(40)).expect("id")
}

pub fn row(fill: char, status: SessionStatus) -> SessionSummary {
    SessionSummary {
        content_id: id(fill),
        name: format!("row-{fill}"),
        status,
        destination: "/downloads".into(),
        category_id: None,
        total_size: 1_000,
        downloaded: 0,
        uploaded: 0,
        download_rate: 0,
        upload_rate: 0,
        fraction_complete: 0.0,
        peer_count: 0,
        eta_seconds: None,
        added_at: Utc::now(),
        completed_at: None,
        external_id: None,
        files: Vec::new(),
    }
}

pub fn config() -> PushClientConfig {
    PushClientConfig::new("ws://127.0.0.1:9/v1/events/ws").expect("config")
}
