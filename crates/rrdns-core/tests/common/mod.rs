//! Test doubles and common utilities for reconciliation contract tests
//!
//! The doubles wrap the in-memory backend so contract tests see real set
//! semantics while counting every call the reconciler makes.

#![allow(dead_code)]

use rrdns_core::backend::{MemoryZoneBackend, ZoneTable};
use rrdns_core::error::{Error, Result};
use rrdns_core::record::{ProbeTarget, RecordFamily};
use rrdns_core::traits::{Prober, ZoneBackend};
use rrdns_core::{ReconcileEvent, ReconcileOptions, Reconciler};
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid IP literal")
}

pub fn set(addrs: &[&str]) -> BTreeSet<IpAddr> {
    addrs.iter().map(|a| ip(a)).collect()
}

/// A ZoneBackend over shared memory zones that counts calls and can be
/// told to refuse specific addresses
#[derive(Clone)]
pub struct CountingBackend {
    inner: MemoryZoneBackend,
    zone_checks: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
    add_calls: Arc<AtomicUsize>,
    remove_calls: Arc<AtomicUsize>,
    failing: Arc<Mutex<HashSet<IpAddr>>>,
    fail_lists: Arc<Mutex<HashSet<String>>>,
    fail_family_lists: Arc<Mutex<HashSet<(String, RecordFamily)>>>,
}

impl CountingBackend {
    /// Backend holding the given (empty) zones
    pub fn with_zones(zones: &[&str]) -> Self {
        let mut table = ZoneTable::new();
        for zone in zones {
            table.add_zone(zone);
        }
        Self {
            inner: MemoryZoneBackend::from_table(table),
            zone_checks: Arc::new(AtomicUsize::new(0)),
            list_calls: Arc::new(AtomicUsize::new(0)),
            add_calls: Arc::new(AtomicUsize::new(0)),
            remove_calls: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(Mutex::new(HashSet::new())),
            fail_lists: Arc::new(Mutex::new(HashSet::new())),
            fail_family_lists: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a handle that shares zones and counters with `other`
    pub fn sharing_counters_with(other: &Self) -> Self {
        other.clone()
    }

    /// Publish addresses without touching the counters
    pub async fn seed(&self, zone: &str, name: &str, addrs: &[&str]) {
        self.inner
            .seed(zone, name, addrs.iter().map(|a| ip(a)), 300)
            .await
            .expect("seed succeeds");
    }

    /// Published addresses, read without touching the counters
    pub async fn published(&self, zone: &str, name: &str, family: RecordFamily) -> BTreeSet<IpAddr> {
        self.inner
            .list_records(zone, name, family)
            .await
            .expect("zone exists")
    }

    pub async fn ttl_of(&self, zone: &str, name: &str, address: &str) -> Option<u32> {
        self.inner.ttl_of(zone, name, ip(address)).await
    }

    /// Refuse add/remove for this address
    pub fn fail_on(&self, address: &str) {
        self.failing.lock().unwrap().insert(ip(address));
    }

    /// Refuse list_records for this record name
    pub fn fail_list_for(&self, name: &str) {
        self.fail_lists.lock().unwrap().insert(name.to_string());
    }

    /// Refuse list_records for one family of this record name
    pub fn fail_list_family(&self, name: &str, family: RecordFamily) {
        self.fail_family_lists
            .lock()
            .unwrap()
            .insert((name.to_string(), family));
    }

    pub fn zone_checks(&self) -> usize {
        self.zone_checks.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    /// add_record plus remove_record calls
    pub fn mutation_count(&self) -> usize {
        self.add_calls() + self.remove_calls()
    }

    fn check_failing(&self, address: IpAddr) -> Result<()> {
        if self.failing.lock().unwrap().contains(&address) {
            return Err(Error::backend(format!("refused {address}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ZoneBackend for CountingBackend {
    async fn zone_exists(&self, zone: &str) -> Result<bool> {
        self.zone_checks.fetch_add(1, Ordering::SeqCst);
        self.inner.zone_exists(zone).await
    }

    async fn list_records(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
    ) -> Result<BTreeSet<IpAddr>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.lock().unwrap().contains(name)
            || self
                .fail_family_lists
                .lock()
                .unwrap()
                .contains(&(name.to_string(), family))
        {
            return Err(Error::backend(format!("list refused for {name}")));
        }
        self.inner.list_records(zone, name, family).await
    }

    async fn add_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
        ttl: u32,
    ) -> Result<()> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(address)?;
        self.inner.add_record(zone, name, family, address, ttl).await
    }

    async fn remove_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
    ) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(address)?;
        self.inner.remove_record(zone, name, family, address).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

/// A Prober that answers from a fixed list and counts calls
#[derive(Clone)]
pub struct ScriptedProber {
    /// `None` means every address is healthy
    healthy: Option<Arc<HashSet<IpAddr>>>,
    calls: Arc<AtomicUsize>,
    targets: Arc<Mutex<Vec<ProbeTarget>>>,
}

impl ScriptedProber {
    /// Every address answers
    pub fn all_healthy() -> Self {
        Self {
            healthy: None,
            calls: Arc::new(AtomicUsize::new(0)),
            targets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Only `addrs` answer
    pub fn healthy(addrs: &[&str]) -> Self {
        Self {
            healthy: Some(Arc::new(addrs.iter().map(|a| ip(a)).collect())),
            ..Self::all_healthy()
        }
    }

    /// Create a handle that shares counters with `other`
    pub fn sharing_counters_with(other: &Self) -> Self {
        other.clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Targets seen, in call order
    pub fn targets(&self) -> Vec<ProbeTarget> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, address: IpAddr, target: &ProbeTarget, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.clone());
        match &self.healthy {
            None => true,
            Some(healthy) => healthy.contains(&address),
        }
    }

    fn prober_name(&self) -> &'static str {
        "scripted"
    }
}

/// A healthy Prober that takes `delay` per call and records the peak
/// number of calls in flight
#[derive(Clone)]
pub struct SlowProber {
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl SlowProber {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Prober for SlowProber {
    async fn probe(&self, _address: IpAddr, _target: &ProbeTarget, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        true
    }

    fn prober_name(&self) -> &'static str {
        "slow"
    }
}

/// Reconciler over a backend double and any prober
pub fn reconciler_with<P>(
    backend: &CountingBackend,
    prober: P,
    options: ReconcileOptions,
) -> (Reconciler, mpsc::Receiver<ReconcileEvent>)
where
    P: Prober + 'static,
{
    Reconciler::new(
        Box::new(CountingBackend::sharing_counters_with(backend)),
        Box::new(prober),
        options,
    )
    .expect("reconciler construction succeeds")
}

/// Reconciler over shared test doubles
pub fn reconciler(
    backend: &CountingBackend,
    prober: &ScriptedProber,
    options: ReconcileOptions,
) -> (Reconciler, mpsc::Receiver<ReconcileEvent>) {
    Reconciler::new(
        Box::new(CountingBackend::sharing_counters_with(backend)),
        Box::new(ScriptedProber::sharing_counters_with(prober)),
        options,
    )
    .expect("reconciler construction succeeds")
}

/// Drain every event emitted so far
pub fn drain(rx: &mut mpsc::Receiver<ReconcileEvent>) -> Vec<ReconcileEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
