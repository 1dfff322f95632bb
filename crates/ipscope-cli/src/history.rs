//! Rolling history of observed addresses.

use chrono::{DateTime, Utc};
use ipscope_core::{IpSnapshot, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub snapshot: IpSnapshot,
    /// When this address was first observed.
    pub timestamp: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Address history persisted as a JSON file.
///
/// One entry per address, most recently seen first.
#[derive(Debug)]
pub struct IpHistory {
    path: PathBuf,
    limit: usize,
    entries: Vec<HistoryEntry>,
}

impl IpHistory {
    /// Load the history at `path`. A missing file is an empty history.
    pub fn load(path: impl Into<PathBuf>, limit: usize) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read(&path)?;
            serde_json::from_slice(&raw)?
        } else {
            Vec::new()
        };
        let mut history = Self {
            path,
            limit,
            entries,
        };
        history.normalize();
        Ok(history)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record an observation. Returns whether the address is new to the
    /// history.
    ///
    /// A known address keeps its first-seen timestamp and takes the newer
    /// snapshot's fields.
    pub fn record(&mut self, snapshot: &IpSnapshot, now: DateTime<Utc>) -> bool {
        let is_new = match self.entries.iter_mut().find(|e| e.snapshot.ip == snapshot.ip) {
            Some(entry) => {
                merge(&mut entry.snapshot, snapshot);
                entry.last_seen = now;
                false
            }
            None => {
                self.entries.push(HistoryEntry {
                    snapshot: snapshot.clone(),
                    timestamp: now,
                    last_seen: now,
                });
                true
            }
        };
        self.normalize();
        is_new
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn normalize(&mut self) {
        self.entries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        self.entries.truncate(self.limit);
    }
}

/// Overlay the fields `newer` carries onto `entry`.
fn merge(entry: &mut IpSnapshot, newer: &IpSnapshot) {
    let fields = [
        (&mut entry.hostname, &newer.hostname),
        (&mut entry.org, &newer.org),
        (&mut entry.city, &newer.city),
        (&mut entry.region, &newer.region),
        (&mut entry.country, &newer.country),
    ];
    for (current, update) in fields {
        if update.is_some() {
            current.clone_from(update);
        }
    }
    for (key, value) in &newer.extra {
        entry.extra.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(ip: &str, city: Option<&str>) -> IpSnapshot {
        let mut s = IpSnapshot::new(ip);
        s.city = city.map(String::from);
        s
    }

    #[test]
    fn test_record_dedupes_and_merges() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = IpHistory::load(dir.path().join("history.json"), 50).unwrap();
        let t0 = Utc::now();

        assert!(history.record(&snapshot("203.0.113.7", None), t0));
        assert!(history.record(&snapshot("198.51.100.9", None), t0 + Duration::seconds(1)));
        assert!(!history.record(
            &snapshot("203.0.113.7", Some("Lisbon")),
            t0 + Duration::seconds(2)
        ));

        assert_eq!(history.entries().len(), 2);
        let latest = history.latest().unwrap();
        assert_eq!(latest.snapshot.ip, "203.0.113.7");
        assert_eq!(latest.snapshot.city.as_deref(), Some("Lisbon"));
        assert_eq!(latest.timestamp, t0);
        assert_eq!(latest.last_seen, t0 + Duration::seconds(2));
    }

    #[test]
    fn test_merge_keeps_fields_missing_from_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = IpHistory::load(dir.path().join("history.json"), 50).unwrap();
        let t0 = Utc::now();

        history.record(&snapshot("203.0.113.7", Some("Lisbon")), t0);
        history.record(&snapshot("203.0.113.7", None), t0 + Duration::seconds(1));

        assert_eq!(
            history.latest().unwrap().snapshot.city.as_deref(),
            Some("Lisbon")
        );
    }

    #[test]
    fn test_limit_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = IpHistory::load(dir.path().join("history.json"), 3).unwrap();
        let t0 = Utc::now();

        for i in 0..5 {
            history.record(
                &snapshot(&format!("192.0.2.{}", i), None),
                t0 + Duration::seconds(i),
            );
        }

        let ips: Vec<&str> = history
            .entries()
            .iter()
            .map(|e| e.snapshot.ip.as_str())
            .collect();
        assert_eq!(ips, vec!["192.0.2.4", "192.0.2.3", "192.0.2.2"]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let mut history = IpHistory::load(&path, 50).unwrap();
        history.record(&snapshot("203.0.113.7", Some("Lisbon")), Utc::now());
        history.save().unwrap();

        let reloaded = IpHistory::load(&path, 50).unwrap();
        assert_eq!(reloaded.entries(), history.entries());

        let mut cleared = reloaded;
        cleared.clear();
        cleared.save().unwrap();
        assert!(IpHistory::load(&path, 50).unwrap().is_empty());
    }
}
