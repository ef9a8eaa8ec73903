//! Concurrent store of discovered devices keyed by MAC.
//!
//! Reads share the lock; every mutation takes it exclusively, so creation is an
//! atomic insert-if-absent and concurrent duplicate frames yield one creation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::device::{Device, MacKey};

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<MacKey, Device>>,
    /// Bumped by `clear` under the write lock.
    generation: AtomicU64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MacKey, Device>> {
        self.devices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MacKey, Device>> {
        self.devices.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert the constructed device unless the MAC is already present.
    /// Returns the stored device and whether this call created it.
    pub fn upsert<F>(&self, mac: &MacKey, constructor: F) -> (Device, bool)
    where
        F: FnOnce() -> Device,
    {
        let mut devices = self.write();
        if let Some(existing) = devices.get(mac) {
            return (existing.clone(), false);
        }
        let device = constructor();
        devices.insert(mac.clone(), device.clone());
        (device, true)
    }

    /// `upsert` for a writer bound to one generation of the registry. Returns
    /// `None` without inserting once `clear` has moved past `generation`.
    pub fn upsert_in<F>(&self, generation: u64, mac: &MacKey, constructor: F) -> Option<(Device, bool)>
    where
        F: FnOnce() -> Device,
    {
        let mut devices = self.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            return None;
        }
        if let Some(existing) = devices.get(mac) {
            return Some((existing.clone(), false));
        }
        let device = constructor();
        devices.insert(mac.clone(), device.clone());
        Some((device, true))
    }

    /// Upgrade a stored device's identity when `observed` came from a more
    /// trusted discovery method. Returns true if the identity changed.
    pub fn refine(&self, observed: &Device) -> bool {
        let mut devices = self.write();
        match devices.get_mut(&observed.mac) {
            Some(existing) if observed.method > existing.method => {
                existing.adopt_identity(observed);
                true
            }
            _ => false,
        }
    }

    /// Record activity. `last_seen` only moves forward; brand and model are
    /// never touched here. Returns false if the MAC is unknown.
    pub fn touch(
        &self,
        mac: &MacKey,
        seen_at: DateTime<Utc>,
        ip_address: Option<&str>,
        signal_strength: Option<i8>,
    ) -> bool {
        let mut devices = self.write();
        let Some(device) = devices.get_mut(mac) else {
            return false;
        };
        device.last_seen = device.last_seen.max(seen_at);
        if let Some(ip) = ip_address
            && !ip.is_empty()
        {
            device.ip_address = Some(ip.to_string());
        }
        if signal_strength.is_some() {
            device.signal_strength = signal_strength;
        }
        true
    }

    /// Remove every device idle for longer than `ttl`.
    pub fn sweep(&self, ttl: Duration) -> Vec<Device> {
        self.sweep_at(Utc::now(), ttl)
    }

    pub fn sweep_at(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<Device> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut devices = self.write();
        let expired: Vec<MacKey> = devices
            .iter()
            .filter(|(_, device)| now.signed_duration_since(device.last_seen) > ttl)
            .map(|(mac, _)| mac.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|mac| devices.remove(&mac))
            .collect()
    }

    pub fn clear(&self) {
        let mut devices = self.write();
        devices.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn get(&self, mac: &MacKey) -> Option<Device> {
        self.read().get(mac).cloned()
    }

    pub fn contains(&self, mac: &MacKey) -> bool {
        self.read().contains_key(mac)
    }

    /// All devices, oldest discovery first.
    pub fn snapshot(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.read().values().cloned().collect();
        devices.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then(a.mac.cmp(&b.mac)));
        devices
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
