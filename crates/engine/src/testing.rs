//! Scripted feed used by the engine tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use common::{Error, MonitorKey, Result};

use crate::feed::{FeedConnector, FeedMessage, FeedSession};

/// What one connect attempt does.
pub(crate) enum Script {
    /// The connect attempt fails.
    Fail,
    /// Deliver the steps, then the feed closes the session.
    Session(Vec<Step>),
    /// Deliver the steps, then stay open and silent.
    Open(Vec<Step>),
}

pub(crate) enum Step {
    Message(FeedMessage),
    Error,
}

pub(crate) fn candles(closes: &[f64]) -> Step {
    Step::Message(FeedMessage::Candles(closes.to_vec()))
}

/// Connector that plays one `Script` per connect attempt. Once the scripts
/// run out every further session stays open and silent.
#[derive(Default)]
pub(crate) struct ScriptedFeed {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl ScriptedFeed {
    pub(crate) fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    pub(crate) fn idle() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedConnector for ScriptedFeed {
    async fn connect(&self, _key: &MonitorKey) -> Result<Box<dyn FeedSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Open(Vec::new()));

        let (steps, hang) = match script {
            Script::Fail => return Err(Error::WebSocket("connection refused".into())),
            Script::Session(steps) => (steps, false),
            Script::Open(steps) => (steps, true),
        };

        Ok(Box::new(ScriptedSession {
            steps: steps.into(),
            hang,
            closes: self.closes.clone(),
        }))
    }
}

struct ScriptedSession {
    steps: VecDeque<Step>,
    hang: bool,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl FeedSession for ScriptedSession {
    async fn next_message(&mut self) -> Option<Result<FeedMessage>> {
        match self.steps.pop_front() {
            Some(Step::Message(msg)) => Some(Ok(msg)),
            Some(Step::Error) => Some(Err(Error::WebSocket("connection reset".into()))),
            None if self.hang => std::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `cond` until it holds. Panics after a minute of (possibly paused) time.
pub(crate) async fn eventually<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    while !cond().await {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
