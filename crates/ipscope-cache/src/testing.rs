//! Test doubles for the network and lookup ports.

use async_trait::async_trait;
use ipscope_core::ports::{Fetcher, IpLookup};
use ipscope_core::{Error, IpSnapshot, Request, ResponseSnapshot, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Scripted network with per-URL responses and call counting.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, std::result::Result<ResponseSnapshot, String>>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: ResponseSnapshot) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(response));
    }

    pub fn fail(&self, url: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Err("connection refused".to_string()));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold every fetch until the returned semaphore is given permits.
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| called.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::Network(e.to_string()))?;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", url)));
        }

        match self.routes.lock().unwrap().get(&url) {
            Some(Ok(response)) => Ok(response.clone().with_url(url)),
            Some(Err(reason)) => Err(Error::Network(reason.clone())),
            None => Ok(ResponseSnapshot::new(404, "not found").with_url(url)),
        }
    }
}

/// Lookup returning queued snapshots, repeating the last one.
#[derive(Default)]
pub struct MockLookup {
    queue: Mutex<VecDeque<Result<IpSnapshot>>>,
    last: Mutex<Option<IpSnapshot>>,
    calls: AtomicUsize,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, snapshot: IpSnapshot) {
        self.queue.lock().unwrap().push_back(Ok(snapshot));
    }

    pub fn push_error(&self, error: Error) {
        self.queue.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpLookup for MockLookup {
    async fn lookup(&self) -> Result<IpSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last.lock().unwrap() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::Network("no scripted lookup".to_string())),
        }
    }

    async fn current_ip(&self) -> Result<String> {
        Ok(self.lookup().await?.ip)
    }
}
