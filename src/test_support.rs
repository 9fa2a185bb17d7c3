// Test support utilities for both unit and integration tests

use crate::playback::transport::{LocalEngine, RemoteTransport, TransportError, TransportOp};
use crate::sleep_timer::Clock;
use crate::time::Millis;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// A call received by [`MockTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCall {
    Play,
    Pause,
    Seek(Millis),
    Stop,
    GetPosition,
}

#[derive(Debug, Default)]
struct MockTransportState {
    calls: Vec<TransportCall>,
    position: Option<Millis>,
    stop_position: Option<Millis>,
    failing: HashSet<TransportOp>,
    position_delay: Option<Duration>,
    stop_delay: Option<Duration>,
}

/// Mock cast receiver for testing
///
/// Records every call, answers polls from a settable position, and can be
/// told to fail operations or hold seeks open until released.
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockTransportState>,
    seek_gate: Semaphore,
    gate_seeks: AtomicBool,
    seeks_in_progress: AtomicUsize,
    max_concurrent_seeks: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport {
            state: Mutex::new(MockTransportState::default()),
            seek_gate: Semaphore::new(0),
            gate_seeks: AtomicBool::new(false),
            seeks_in_progress: AtomicUsize::new(0),
            max_concurrent_seeks: AtomicUsize::new(0),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&self, position: Millis) {
        self.state.lock().unwrap().position = Some(position);
    }

    /// What `stop()` reports; `None` means the receiver does not know
    pub fn set_stop_position(&self, position: Option<Millis>) {
        self.state.lock().unwrap().stop_position = position;
    }

    pub fn fail(&self, op: TransportOp) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn recover(&self, op: TransportOp) {
        self.state.lock().unwrap().failing.remove(&op);
    }

    /// Delay every `get_position` answer
    pub fn set_position_delay(&self, delay: Duration) {
        self.state.lock().unwrap().position_delay = Some(delay);
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        self.state.lock().unwrap().stop_delay = Some(delay);
    }

    /// Make seeks wait for [`release_seek`](Self::release_seek)
    pub fn hold_seeks(&self) {
        self.gate_seeks.store(true, Ordering::SeqCst);
    }

    pub fn release_seek(&self) {
        self.seek_gate.add_permits(1);
    }

    pub fn seeks_in_progress(&self) -> usize {
        self.seeks_in_progress.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_seeks(&self) -> usize {
        self.max_concurrent_seeks.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn seeks(&self) -> Vec<Millis> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Seek(target) => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == TransportCall::GetPosition)
            .count()
    }

    fn record(&self, call: TransportCall, op: TransportOp) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing.contains(&op) {
            return Err(TransportError::Network(format!("mock {} failure", op)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteTransport for MockTransport {
    async fn play(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Play, TransportOp::Play)
    }

    async fn pause(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Pause, TransportOp::Pause)
    }

    async fn seek(&self, position: Millis) -> Result<(), TransportError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(TransportCall::Seek(position));
        let running = self.seeks_in_progress.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_seeks.fetch_max(running, Ordering::SeqCst);

        if self.gate_seeks.load(Ordering::SeqCst) {
            if let Ok(permit) = self.seek_gate.acquire().await {
                permit.forget();
            }
        }
        self.seeks_in_progress.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        if state.failing.contains(&TransportOp::Seek) {
            return Err(TransportError::Network("mock seek failure".to_string()));
        }
        state.position = Some(position);
        Ok(())
    }

    async fn stop(&self) -> Result<Option<Millis>, TransportError> {
        let delay = self.state.lock().unwrap().stop_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(TransportCall::Stop, TransportOp::Stop)?;
        Ok(self.state.lock().unwrap().stop_position)
    }

    async fn get_position(&self) -> Result<Option<Millis>, TransportError> {
        let delay = self.state.lock().unwrap().position_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(TransportCall::GetPosition, TransportOp::GetPosition)?;
        Ok(self.state.lock().unwrap().position)
    }
}

/// A call received by [`MockEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCall {
    Play,
    Pause,
    Seek(Millis),
}

/// Mock local decoder that only records what it was told
#[derive(Debug, Default)]
pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl LocalEngine for MockEngine {
    fn play(&self) {
        self.calls.lock().unwrap().push(EngineCall::Play);
    }

    fn pause(&self) {
        self.calls.lock().unwrap().push(EngineCall::Pause);
    }

    fn seek(&self, position: Millis) {
        self.calls.lock().unwrap().push(EngineCall::Seek(position));
    }
}

/// Wall clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_epoch_ms: i64) -> Self {
        ManualClock {
            now_ms: AtomicI64::new(now_epoch_ms),
        }
    }

    pub fn advance(&self, by: Millis) {
        let by = i64::try_from(by.as_u64()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
