mod denylist;

pub use denylist::{DENYLIST, SEVERITY_OVERRIDES};

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use sysinfo::{ProcessRefreshKind, RefreshKind, System};

use crate::session::now_ms;

/// Classification of a single denylist match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

/// Coarse classification of a whole scan, derived from the worst match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    None,
    Medium,
    High,
    Critical,
}

/// Point-in-time snapshot of one scan. Field names follow the diagnostic
/// wire format consumed by the desktop shell (final JSON line on stdout).
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub platform: String,
    pub process_count: usize,
    pub banned: Vec<String>,
    pub critical_violations: Vec<String>,
    pub high_severity_violations: Vec<String>,
    pub threat_level: ThreatLevel,
    pub count: usize,
    pub timestamp: u64,
    pub fuzzy_mode: bool,
    pub should_terminate: bool,
}

/// Normalize a process name for comparison: lowercase, with the Windows
/// executable suffix applied consistently on both sides of the match.
fn normalize(name: &str, windows: bool) -> String {
    let lower = name.to_lowercase();
    if windows {
        if lower.ends_with(".exe") {
            lower
        } else {
            format!("{lower}.exe")
        }
    } else {
        lower.strip_suffix(".exe").map(str::to_string).unwrap_or(lower)
    }
}

fn severity_of(name: &str) -> Severity {
    let key = name.strip_suffix(".exe").unwrap_or(name);
    SEVERITY_OVERRIDES
        .iter()
        .find(|(entry, _)| *entry == key)
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Medium)
}

/// Enumerate local process names, normalized. Enumeration trouble degrades
/// to an empty set rather than propagating; a scan that reports nothing is
/// easier to reason about downstream than one that dies mid-session.
fn list_processes(windows: bool) -> HashSet<String> {
    let sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new()),
    );
    sys.processes()
        .values()
        .map(|p| normalize(p.name(), windows))
        .collect()
}

/// Scan the local machine's process list against the denylist.
pub fn scan(fuzzy: bool) -> ScanResult {
    let windows = cfg!(windows);
    let processes = list_processes(windows);
    scan_processes(&processes, fuzzy, windows, std::env::consts::OS, now_ms())
}

/// Core matching and classification, factored out so tests can supply an
/// explicit process set instead of the live machine's.
pub fn scan_processes(
    processes: &HashSet<String>,
    fuzzy: bool,
    windows: bool,
    platform: &str,
    timestamp: u64,
) -> ScanResult {
    let mut banned: BTreeSet<String> = BTreeSet::new();

    for entry in DENYLIST {
        let entry = normalize(entry, windows);
        if processes.contains(&entry) {
            banned.insert(entry);
        } else if fuzzy && entry.len() > 3 {
            // Substring containment, guarded against short tokens that
            // would match half the process table
            if processes.iter().any(|running| running.contains(&entry)) {
                banned.insert(entry);
            }
        }
    }

    let mut critical_violations: BTreeSet<String> = BTreeSet::new();
    let mut high_severity_violations: BTreeSet<String> = BTreeSet::new();
    for name in &banned {
        match severity_of(name) {
            Severity::Critical => {
                critical_violations.insert(name.clone());
            }
            Severity::High => {
                high_severity_violations.insert(name.clone());
            }
            Severity::Medium => {}
        }
    }

    let threat_level = if !critical_violations.is_empty() {
        ThreatLevel::Critical
    } else if !high_severity_violations.is_empty() {
        ThreatLevel::High
    } else if !banned.is_empty() {
        ThreatLevel::Medium
    } else {
        ThreatLevel::None
    };

    // Any denylist match is grounds for termination; severity affects
    // classification only, not the terminate decision.
    let should_terminate = !banned.is_empty();

    if should_terminate {
        tracing::warn!(
            banned = ?banned,
            ?threat_level,
            "Denylisted process detected"
        );
    }

    ScanResult {
        platform: platform.to_string(),
        process_count: processes.len(),
        count: banned.len(),
        banned: banned.into_iter().collect(),
        critical_violations: critical_violations.into_iter().collect(),
        high_severity_violations: high_severity_violations.into_iter().collect(),
        threat_level,
        timestamp,
        fuzzy_mode: fuzzy,
        should_terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn process_set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_empty_process_set_is_clean() {
        let result = scan_processes(&HashSet::new(), false, false, "linux", NOW);
        assert_eq!(result.threat_level, ThreatLevel::None);
        assert!(!result.should_terminate);
        assert!(result.banned.is_empty());
        assert_eq!(result.count, 0);
    }

    #[test]
    fn test_zoom_classifies_high_and_terminates() {
        let result = scan_processes(&process_set(&["zoom", "bash", "cargo"]), false, false, "linux", NOW);
        assert_eq!(result.banned, vec!["zoom"]);
        assert_eq!(result.high_severity_violations, vec!["zoom"]);
        assert_eq!(result.threat_level, ThreatLevel::High);
        assert!(result.should_terminate);
    }

    #[test]
    fn test_critical_outranks_high() {
        let result = scan_processes(
            &process_set(&["zoom", "teamviewer"]),
            false,
            false,
            "linux",
            NOW,
        );
        assert_eq!(result.threat_level, ThreatLevel::Critical);
        assert_eq!(result.critical_violations, vec!["teamviewer"]);
        assert_eq!(result.high_severity_violations, vec!["zoom"]);
    }

    #[test]
    fn test_unmapped_match_defaults_to_medium_and_still_terminates() {
        let result = scan_processes(&process_set(&["postman"]), false, false, "linux", NOW);
        assert_eq!(result.threat_level, ThreatLevel::Medium);
        assert!(result.critical_violations.is_empty());
        assert!(result.high_severity_violations.is_empty());
        assert!(result.should_terminate);
    }

    #[test]
    fn test_windows_suffix_applied_to_both_sides() {
        let observed = process_set(&["Discord.exe", "svchost.exe"])
            .iter()
            .map(|n| normalize(n, true))
            .collect();
        let result = scan_processes(&observed, false, true, "windows", NOW);
        assert_eq!(result.banned, vec!["discord.exe"]);
        assert_eq!(result.high_severity_violations, vec!["discord.exe"]);
        assert_eq!(result.threat_level, ThreatLevel::High);
    }

    #[test]
    fn test_exact_match_misses_variant_names() {
        let result = scan_processes(&process_set(&["zoom-helper"]), false, false, "linux", NOW);
        assert!(result.banned.is_empty());
        assert_eq!(result.threat_level, ThreatLevel::None);
    }

    #[test]
    fn test_fuzzy_mode_matches_by_containment() {
        let result = scan_processes(&process_set(&["zoom-helper"]), true, false, "linux", NOW);
        assert_eq!(result.banned, vec!["zoom"]);
        assert!(result.fuzzy_mode);
    }

    #[test]
    fn test_fuzzy_guard_skips_short_tokens() {
        // "obs" is only 3 chars; fuzzy containment must not fire on it
        let result = scan_processes(&process_set(&["jobs-daemon"]), true, false, "linux", NOW);
        assert!(result.banned.is_empty());
    }

    #[test]
    fn test_result_serializes_with_wire_field_names() {
        let result = scan_processes(&process_set(&["zoom"]), false, false, "linux", NOW);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["threat_level"], "high");
        assert_eq!(json["should_terminate"], true);
        assert_eq!(json["process_count"], 1);
        assert_eq!(json["banned"][0], "zoom");
    }
}
