//! Test doubles for the backend transport.

use crate::transport::{Endpoint, Method, Request, Response, Transport};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, Semaphore};

/// Records every request and answers from a script.
///
/// Unscripted requests get `200 {}`. A held transport parks requests until
/// [`MockTransport::release`], which lets tests mutate state while a flush is
/// in flight.
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<Request>>,
    standing: Mutex<HashMap<(Method, Endpoint), Response>>,
    queued: Mutex<HashMap<(Method, Endpoint), VecDeque<Response>>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    arrived: Notify,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every matching request with `response`.
    pub fn respond(&self, method: Method, endpoint: Endpoint, response: Response) {
        lock(&self.standing).insert((method, endpoint), response);
    }

    /// Answer the next matching request with `response`, ahead of any
    /// standing answer.
    pub fn respond_once(&self, method: Method, endpoint: Endpoint, response: Response) {
        lock(&self.queued)
            .entry((method, endpoint))
            .or_default()
            .push_back(response);
    }

    /// Fail every request below HTTP.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Park requests until [`MockTransport::release`].
    pub fn hold(&self) {
        *lock(&self.gate) = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.close();
        }
    }

    /// Resolves once a request has reached the transport.
    pub async fn wait_for_request(&self) {
        self.arrived.notified().await;
    }

    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    pub fn requests_to(&self, method: Method, endpoint: Endpoint) -> Vec<Request> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.endpoint == endpoint)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let key = (request.method, request.endpoint);
        lock(&self.requests).push(request);
        self.arrived.notify_one();

        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            // Closed on release
            let _ = gate.acquire().await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::transport("mock transport offline"));
        }

        if let Some(response) = lock(&self.queued).get_mut(&key).and_then(VecDeque::pop_front) {
            return Ok(response);
        }
        Ok(lock(&self.standing)
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Response::new(200, "{}")))
    }
}
