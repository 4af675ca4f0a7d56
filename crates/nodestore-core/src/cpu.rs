use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Available CPU shares per core label (`"0"`, `"1"`, ...).
///
/// Counts are signed: `sub` does not clamp, so a label can go below zero
/// when more shares are handed out than the node has. A negative count is
/// kept and reported as-is; it marks the core as over-committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CpuMap(BTreeMap<String, i64>);

impl CpuMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per core, labelled by index, each holding `weight` shares.
    pub fn with_cores(cores: u32, weight: i64) -> Self {
        Self(
            (0..cores)
                .map(|core| (core.to_string(), weight))
                .collect(),
        )
    }

    /// Increase each label in `other` by its value, creating missing labels.
    /// Counts saturate at the `i64` bounds.
    pub fn add(&mut self, other: &CpuMap) {
        for (label, shares) in &other.0 {
            let entry = self.0.entry(label.clone()).or_insert(0);
            *entry = entry.saturating_add(*shares);
        }
    }

    /// Decrease each label in `other` by its value. Missing labels start at
    /// zero. Results below zero are kept.
    pub fn sub(&mut self, other: &CpuMap) {
        for (label, shares) in &other.0 {
            let entry = self.0.entry(label.clone()).or_insert(0);
            *entry = entry.saturating_sub(*shares);
        }
    }

    pub fn insert(&mut self, label: impl Into<String>, shares: i64) {
        self.0.insert(label.into(), shares);
    }

    pub fn get(&self, label: &str) -> Option<i64> {
        self.0.get(label).copied()
    }

    /// Sum of all shares.
    pub fn total(&self) -> i64 {
        self.0.values().fold(0i64, |sum, shares| sum.saturating_add(*shares))
    }

    /// Labels whose count dropped below zero.
    pub fn overcommitted(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, shares)| **shares < 0)
            .map(|(label, _)| label.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(label, shares)| (label.as_str(), *shares))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for CpuMap {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for CpuMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(label, shares)| format!("{}:{}", label, shares))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Parses the `Display` form, `label:shares` pairs joined by commas.
impl FromStr for CpuMap {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cpu = CpuMap::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (label, shares) = pair.split_once(':').ok_or_else(|| {
                StoreError::validation(format!("expected label:shares, got {:?}", pair))
            })?;
            let shares = shares.trim().parse::<i64>().map_err(|e| {
                StoreError::validation(format!("bad share count in {:?}: {}", pair, e))
            })?;
            cpu.insert(label.trim(), shares);
        }
        if cpu.is_empty() {
            return Err(StoreError::validation("empty cpu map"));
        }
        Ok(cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, i64)]) -> CpuMap {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_with_cores() {
        let cpu = CpuMap::with_cores(4, 10);
        assert_eq!(cpu.len(), 4);
        assert_eq!(cpu.get("0"), Some(10));
        assert_eq!(cpu.get("3"), Some(10));
        assert_eq!(cpu.get("4"), None);
        assert_eq!(cpu.total(), 40);
    }

    #[test]
    fn test_add_creates_missing_labels() {
        let mut cpu = map(&[("0", 10)]);
        cpu.add(&map(&[("0", 5), ("1", 3)]));
        assert_eq!(cpu.get("0"), Some(15));
        assert_eq!(cpu.get("1"), Some(3));
    }

    #[test]
    fn test_add_then_sub_restores_original() {
        let original = map(&[("0", 10), ("1", 10), ("2", 7)]);
        let delta = map(&[("0", 4), ("2", 7)]);

        let mut cpu = original.clone();
        cpu.add(&delta);
        cpu.sub(&delta);
        assert_eq!(cpu, original);

        let mut cpu = original.clone();
        cpu.sub(&delta);
        cpu.add(&delta);
        assert_eq!(cpu, original);
    }

    #[test]
    fn test_sub_below_zero_is_kept() {
        let mut cpu = map(&[("0", 3), ("1", 10)]);
        cpu.sub(&map(&[("0", 5)]));
        assert_eq!(cpu.get("0"), Some(-2));
        assert_eq!(cpu.get("1"), Some(10));
        assert_eq!(cpu.overcommitted(), vec!["0"]);
    }

    #[test]
    fn test_sub_missing_label_goes_negative() {
        let mut cpu = map(&[("0", 10)]);
        cpu.sub(&map(&[("7", 2)]));
        assert_eq!(cpu.get("7"), Some(-2));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let cpu = map(&[("0", 10), ("1", 5)]);
        let json = serde_json::to_string(&cpu).unwrap();
        assert_eq!(json, r#"{"0":10,"1":5}"#);
        let parsed: CpuMap = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cpu);
    }

    #[test]
    fn test_display() {
        let cpu = map(&[("0", 10), ("1", -1)]);
        assert_eq!(cpu.to_string(), "0:10,1:-1");
    }

    #[test]
    fn test_parse_display_form() {
        let cpu: CpuMap = "0:5, 3:-2".parse().unwrap();
        assert_eq!(cpu, map(&[("0", 5), ("3", -2)]));
        assert_eq!(cpu.to_string().parse::<CpuMap>().unwrap(), cpu);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<CpuMap>().is_err());
        assert!("0".parse::<CpuMap>().is_err());
        assert!("0:many".parse::<CpuMap>().is_err());
    }

    #[test]
    fn test_add_and_sub_saturate() {
        let mut cpu = map(&[("0", 10), ("1", -10)]);
        cpu.add(&map(&[("0", i64::MAX)]));
        cpu.sub(&map(&[("1", i64::MAX)]));
        assert_eq!(cpu.get("0"), Some(i64::MAX));
        assert_eq!(cpu.get("1"), Some(i64::MIN));

        let parsed: CpuMap = "0:9223372036854775807".parse().unwrap();
        cpu.add(&parsed);
        assert_eq!(cpu.get("0"), Some(i64::MAX));
    }
}
