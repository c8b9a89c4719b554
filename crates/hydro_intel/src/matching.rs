//! Cross-category matching heuristics
//!
//! Multibeam files are grouped by destination container. Error files and
//! export logs each pick one SBET by majority vote over several weak
//! heuristics (name similarity, same directory, overlapping times), and an
//! SBET with both companions is voted onto a container. SVP files go to every
//! container still missing one of their casts.

use crate::config::IntelConfig;
use crate::project::{ContainerHandle, ProjectState};
use crate::registry::{CategoryRegistry, MultibeamRegistry, Registries};
use crate::types::{path_key, NavigationMeta, SvpMeta, TrackedFile};
use indexmap::IndexMap;
use similar::TextDiff;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};

const SECONDS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// Vote tally
// ============================================================================

/// Insertion-ordered vote counter
///
/// The winner is the candidate with the most votes; ties go to whichever
/// candidate received its first vote earliest.
#[derive(Debug, Clone)]
pub struct VoteTally<K: Hash + Eq> {
    votes: IndexMap<K, usize>,
}

impl<K: Hash + Eq> VoteTally<K> {
    pub fn new() -> Self {
        Self {
            votes: IndexMap::new(),
        }
    }

    pub fn vote(&mut self, candidate: K) {
        *self.votes.entry(candidate).or_insert(0) += 1;
    }

    pub fn count(&self, candidate: &K) -> usize {
        self.votes.get(candidate).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn winner(&self) -> Option<&K> {
        let mut best: Option<(&K, usize)> = None;
        for (candidate, &count) in &self.votes {
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((candidate, count));
            }
        }
        best.map(|(candidate, _)| candidate)
    }

    pub fn into_winner(mut self) -> Option<K> {
        let winner_idx = {
            let winner = self.winner()?;
            self.votes.get_index_of(winner)?
        };
        self.votes.swap_remove_index(winner_idx).map(|(k, _)| k)
    }
}

impl<K: Hash + Eq> Default for VoteTally<K> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Heuristics
// ============================================================================

/// Similarity ratio in [0, 1], `2 * matches / (len(a) + len(b))`
pub fn name_similarity(a: &str, b: &str) -> f64 {
    TextDiff::from_chars(a, b).ratio() as f64
}

/// Index of the candidate most similar to `target`, if any reaches `cutoff`
pub fn best_name_match<S: AsRef<str>>(candidates: &[S], target: &str, cutoff: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let score = name_similarity(candidate.as_ref(), target);
        if score >= cutoff && best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
    }
    best.map(|(idx, _)| idx)
}

fn same_directory(a: &str, b: &str) -> bool {
    Path::new(a).parent() == Path::new(b).parent()
}

/// Start within tolerance and end strictly within tolerance
fn times_close(a: (f64, f64), b: (f64, f64), tolerance: f64) -> bool {
    (a.0 - b.0).abs() <= tolerance && (a.1 - b.1).abs() < tolerance
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultibeamMatches {
    /// destination → member paths in start time order
    pub groups: IndexMap<String, Vec<String>>,
    pub unmatched: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanionMatches {
    /// companion → sbet
    pub matches: BTreeMap<String, String>,
    pub unmatched: BTreeMap<String, String>,
}

/// One SBET ready for import, with its companions
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationImport {
    pub sbet: String,
    pub error_file: String,
    pub log_file: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationMatches {
    /// container → SBET imports, SBETs in registry order
    pub groups: IndexMap<String, Vec<NavigationImport>>,
    /// sbet → container
    pub sbet_to_container: BTreeMap<String, String>,
    pub unmatched: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvpMatches {
    /// container → SVP files still contributing at least one cast
    pub groups: IndexMap<String, Vec<String>>,
    pub unmatched: BTreeMap<String, String>,
}

// ============================================================================
// Matching engine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingEngine {
    name_cutoff: f64,
    time_tolerance: f64,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::from_config(&IntelConfig::default())
    }
}

impl MatchingEngine {
    pub fn from_config(config: &IntelConfig) -> Self {
        Self {
            name_cutoff: config.name_match_cutoff,
            time_tolerance: config.time_match_tolerance_secs,
        }
    }

    /// Group multibeam files by the container they convert into
    pub fn match_multibeam(
        &self,
        registry: &MultibeamRegistry,
        project: &dyn ProjectState,
    ) -> MultibeamMatches {
        let mut files: Vec<_> = registry.files().collect();
        files.sort_by_key(|f| f.meta.start_time);

        let project_folder = project.project_folder();
        let mut new_destinations: BTreeMap<String, String> = BTreeMap::new();
        let mut result = MultibeamMatches::default();

        for file in files {
            let meta = &file.meta;
            let existing =
                project.container_by_serial(meta.primary_serial, meta.secondary_serial, meta.start_time);

            let destination = match existing {
                Some(container) => {
                    if project.container_line_set(&container).contains(&file.file_name) {
                        result.unmatched.insert(
                            file.path.clone(),
                            format!("Already converted into {}", container.path),
                        );
                        continue;
                    }
                    container.path
                }
                None => {
                    let key = format!(
                        "{}_{}_{}",
                        meta.model,
                        meta.primary_serial,
                        meta.start_time.format("%m_%d_%Y")
                    );
                    new_destinations
                        .entry(key.clone())
                        .or_insert_with(|| {
                            let base = project_folder
                                .clone()
                                .unwrap_or_else(|| PathBuf::from(file.directory()));
                            path_key(&base.join(&key))
                        })
                        .clone()
                }
            };
            result
                .groups
                .entry(destination)
                .or_default()
                .push(file.path.clone());
        }
        result
    }

    /// Pick one SBET for each error file
    pub fn match_error_files(&self, registries: &Registries) -> CompanionMatches {
        let sbets: Vec<_> = registries.navigation.files().collect();
        let sbet_names: Vec<&str> = sbets.iter().map(|s| s.file_name.as_str()).collect();
        let mut result = CompanionMatches::default();

        for error in registries.nav_error.files() {
            let mut tally = VoteTally::new();
            if let Some(idx) = best_name_match(&sbet_names, &error.file_name, self.name_cutoff) {
                tally.vote(sbets[idx].path.clone());
            }
            for sbet in &sbets {
                if same_directory(&sbet.path, &error.path) {
                    tally.vote(sbet.path.clone());
                }
            }
            let error_times = (error.meta.weekly_seconds_start, error.meta.weekly_seconds_end);
            for sbet in &sbets {
                let sbet_times = (sbet.meta.weekly_seconds_start, sbet.meta.weekly_seconds_end);
                if times_close(sbet_times, error_times, self.time_tolerance) {
                    tally.vote(sbet.path.clone());
                }
            }

            match tally.into_winner() {
                Some(sbet) => {
                    result.matches.insert(error.path.clone(), sbet);
                }
                None => {
                    result.unmatched.insert(
                        error.path.clone(),
                        "Unable to match error file to an SBET by file name, file location or start/end time"
                            .to_string(),
                    );
                }
            }
        }
        result
    }

    /// Pick one SBET for each export log
    pub fn match_log_files(&self, registries: &Registries) -> CompanionMatches {
        let sbets: Vec<_> = registries.navigation.files().collect();
        let sbet_names: Vec<&str> = sbets.iter().map(|s| s.file_name.as_str()).collect();
        let mut result = CompanionMatches::default();

        for log in registries.nav_log.files() {
            let mut tally = VoteTally::new();
            if let Some(idx) = best_name_match(&sbet_names, &log.file_name, self.name_cutoff) {
                tally.vote(sbets[idx].path.clone());
            }
            for sbet in &sbets {
                if same_directory(&sbet.path, &log.path) {
                    tally.vote(sbet.path.clone());
                }
            }
            if let Some(idx) =
                best_name_match(&sbet_names, &log.meta.exported_sbet_file, self.name_cutoff)
            {
                tally.vote(sbets[idx].path.clone());
            }

            match tally.into_winner() {
                Some(sbet) => {
                    result.matches.insert(log.path.clone(), sbet);
                }
                None => {
                    result.unmatched.insert(
                        log.path.clone(),
                        "Unable to match export log to an SBET by file name, file location or exported file name"
                            .to_string(),
                    );
                }
            }
        }
        result
    }

    /// Vote each fully paired SBET onto a container
    ///
    /// Uses the companion links already stored in `registries`.
    pub fn match_navigation(
        &self,
        registries: &Registries,
        project: &dyn ProjectState,
    ) -> NavigationMatches {
        let containers = project.containers();
        let mut result = NavigationMatches::default();

        for sbet in registries.navigation.files() {
            let errors = registries.nav_error.companions_of(&sbet.path);
            let logs = registries.nav_log.companions_of(&sbet.path);
            let missing = match (errors.len(), logs.len()) {
                (0, 0) => Some("SBET has no matching error file or export log".to_string()),
                (0, _) => Some("SBET has no matching error file".to_string()),
                (_, 0) => Some("SBET has no matching export log".to_string()),
                (1, 1) => None,
                (e, l) => Some(format!(
                    "SBET is claimed by {} error files and {} export logs, expected one of each",
                    e, l
                )),
            };
            if let Some(reason) = missing {
                result.unmatched.insert(sbet.path.clone(), reason);
                continue;
            }

            if containers.is_empty() {
                result.unmatched.insert(
                    sbet.path.clone(),
                    "No converted containers in the project to import navigation into".to_string(),
                );
                continue;
            }
            if let Some(holder) = containers
                .iter()
                .find(|c| c.imported_sbets.contains(&sbet.file_name))
            {
                result.unmatched.insert(
                    sbet.path.clone(),
                    format!("SBET already imported into {}", holder.path),
                );
                continue;
            }

            match self.vote_container(sbet, &containers) {
                Some(container) => {
                    result
                        .sbet_to_container
                        .insert(sbet.path.clone(), container.clone());
                    result.groups.entry(container).or_default().push(NavigationImport {
                        sbet: sbet.path.clone(),
                        error_file: errors[0].clone(),
                        log_file: logs[0].clone(),
                    });
                }
                None => {
                    result.unmatched.insert(
                        sbet.path.clone(),
                        "Unable to match SBET to a container by GPS day, serial number or sonar model"
                            .to_string(),
                    );
                }
            }
        }
        result
    }

    fn vote_container(
        &self,
        sbet: &TrackedFile<NavigationMeta>,
        containers: &[ContainerHandle],
    ) -> Option<String> {
        let sbet_weekday = (sbet.meta.weekly_seconds_start / SECONDS_PER_DAY).floor() as i64;
        let lowered_path = sbet.path.to_lowercase();
        let mut tally = VoteTally::new();

        for container in containers {
            if sbet_weekday == container.gps_weekday() as i64 {
                tally.vote(container.path.clone());
            }
            if container.primary_serial != 0
                && sbet.path.contains(&container.primary_serial.to_string())
            {
                tally.vote(container.path.clone());
            }
            if !container.model.is_empty() && lowered_path.contains(&container.model.to_lowercase()) {
                tally.vote(container.path.clone());
            }
        }
        tally.into_winner()
    }

    /// Match SVP files to every container still missing one of their casts
    pub fn match_svp(
        &self,
        registry: &CategoryRegistry<SvpMeta>,
        project: &dyn ProjectState,
    ) -> SvpMatches {
        let containers = project.containers();
        let mut result = SvpMatches::default();

        for svp in registry.files() {
            if containers.is_empty() {
                result.unmatched.insert(
                    svp.path.clone(),
                    "No converted containers in the project to import sound velocity into"
                        .to_string(),
                );
                continue;
            }
            let casts = svp.meta.cast_epochs();
            let mut matched = false;
            for container in &containers {
                if casts.iter().any(|t| !container.cast_times.contains(t)) {
                    result
                        .groups
                        .entry(container.path.clone())
                        .or_default()
                        .push(svp.path.clone());
                    matched = true;
                }
            }
            if !matched {
                result.unmatched.insert(
                    svp.path.clone(),
                    "All profiles already present in every container".to_string(),
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::InMemoryProject;
    use crate::registry::Registries;
    use crate::types::{FileAttributes, MultibeamFormat, MultibeamMeta, NavErrorMeta, NavLogMeta};
    use chrono::{DateTime, TimeZone, Utc};

    fn mb(path: &str, serial: u32, start: DateTime<Utc>, size: u64) -> TrackedFile<MultibeamMeta> {
        TrackedFile::new(
            Path::new(path),
            "kongsberg_all",
            FileAttributes::from_size(size),
            MultibeamMeta {
                format: MultibeamFormat::KongsbergAll,
                start_time: start,
                end_time: start + chrono::Duration::minutes(5),
                primary_serial: serial,
                secondary_serial: 0,
                model: "em2040".to_string(),
            },
        )
    }

    fn sbet(path: &str, start: f64, end: f64) -> TrackedFile<NavigationMeta> {
        TrackedFile::new(
            Path::new(path),
            "pospac_sbet",
            FileAttributes::from_size(1360),
            NavigationMeta {
                weekly_seconds_start: start,
                weekly_seconds_end: end,
            },
        )
    }

    fn smrmsg(path: &str, start: f64, end: f64) -> TrackedFile<NavErrorMeta> {
        TrackedFile::new(
            Path::new(path),
            "pospac_smrmsg",
            FileAttributes::from_size(800),
            NavErrorMeta {
                weekly_seconds_start: start,
                weekly_seconds_end: end,
            },
        )
    }

    fn export_log(path: &str, exported: &str) -> TrackedFile<NavLogMeta> {
        TrackedFile::new(
            Path::new(path),
            "sbet_export_log",
            FileAttributes::from_size(900),
            NavLogMeta {
                mission_date: chrono::NaiveDate::from_ymd_opt(2017, 5, 23).unwrap(),
                datum: None,
                ellipsoid: None,
                input_sbet_file: None,
                exported_sbet_file: exported.to_string(),
                sample_rate_hertz: None,
            },
        )
    }

    #[test]
    fn test_vote_tally_majority_and_tie_break() {
        let mut tally = VoteTally::new();
        tally.vote("a");
        tally.vote("b");
        tally.vote("b");
        assert_eq!(tally.winner(), Some(&"b"));

        let mut tied = VoteTally::new();
        tied.vote("first");
        tied.vote("second");
        tied.vote("second");
        tied.vote("first");
        assert_eq!(tied.winner(), Some(&"first"));
        assert_eq!(tied.count(&"second"), 2);

        let empty: VoteTally<&str> = VoteTally::new();
        assert!(empty.winner().is_none());
    }

    #[test]
    fn test_best_name_match_cutoff() {
        let names = ["sbet_mission1.out", "sbet_other_day.out"];
        assert_eq!(best_name_match(&names, "smrmsg_mission1.out", 0.6), Some(0));
        assert_eq!(best_name_match(&names, "zzzz", 0.6), None);
        assert!(name_similarity("abc", "abc") > 0.99);
    }

    #[test]
    fn test_times_close_bounds() {
        assert!(times_close((100.0, 200.0), (102.0, 201.5), 2.0));
        assert!(!times_close((100.0, 200.0), (102.5, 200.0), 2.0));
        assert!(!times_close((100.0, 200.0), (100.0, 202.0), 2.0));
    }

    #[test]
    fn test_new_container_without_project_uses_file_directory() {
        let mut registries = Registries::new();
        let start = Utc.with_ymd_and_hms(2017, 5, 23, 18, 11, 19).unwrap();
        registries.multibeam.add(mb("/survey/raw/0009.all", 40111, start, 10));
        registries
            .multibeam
            .add(mb("/survey/raw/0010.all", 40111, start + chrono::Duration::minutes(6), 11));

        let project = InMemoryProject::default();
        let matches = MatchingEngine::default().match_multibeam(&registries.multibeam, &project);
        assert_eq!(matches.groups.len(), 1);
        let (destination, members) = matches.groups.get_index(0).unwrap();
        assert_eq!(destination, "/survey/raw/em2040_40111_05_23_2017");
        assert_eq!(members, &vec!["/survey/raw/0009.all".to_string(), "/survey/raw/0010.all".to_string()]);
    }

    #[test]
    fn test_multibeam_sorted_by_start_time() {
        let mut registries = Registries::new();
        let start = Utc.with_ymd_and_hms(2017, 5, 23, 18, 0, 0).unwrap();
        registries.multibeam.add(mb("/d/a_late.all", 1, start + chrono::Duration::hours(1), 10));
        registries.multibeam.add(mb("/d/b_early.all", 1, start, 11));

        let project = InMemoryProject::new(Some(PathBuf::from("/proj")));
        let matches = MatchingEngine::default().match_multibeam(&registries.multibeam, &project);
        let members = &matches.groups["/proj/em2040_1_05_23_2017"];
        assert_eq!(members, &vec!["/d/b_early.all".to_string(), "/d/a_late.all".to_string()]);
    }

    #[test]
    fn test_multibeam_joins_existing_container_and_skips_converted() {
        let mut registries = Registries::new();
        let start = Utc.with_ymd_and_hms(2017, 5, 23, 18, 0, 0).unwrap();
        registries.multibeam.add(mb("/d/0001.all", 40111, start, 10));
        registries.multibeam.add(mb("/d/0002.all", 40111, start, 11));

        let project = InMemoryProject::new(Some(PathBuf::from("/proj")));
        let mut container = ContainerHandle::new("/proj/existing", 40111, 0, "em2040", start, start);
        container.converted_lines.insert("0001.all".to_string());
        project.upsert_container(container);

        let matches = MatchingEngine::default().match_multibeam(&registries.multibeam, &project);
        assert_eq!(matches.groups["/proj/existing"], vec!["/d/0002.all".to_string()]);
        assert!(matches.unmatched["/d/0001.all"].contains("Already converted"));
    }

    #[test]
    fn test_error_file_matched_by_name_location_and_time() {
        let mut registries = Registries::new();
        registries.navigation.add(sbet("/nav/sbet_mission1.out", 1000.0, 2000.0));
        registries.navigation.add(sbet("/other/sbet_mission2.out", 5000.0, 6000.0));
        registries.nav_error.add(smrmsg("/nav/smrmsg_mission1.out", 1000.5, 2000.5));

        let engine = MatchingEngine::default();
        let matches = engine.match_error_files(&registries);
        assert_eq!(
            matches.matches.get("/nav/smrmsg_mission1.out").map(String::as_str),
            Some("/nav/sbet_mission1.out")
        );
        assert!(matches.unmatched.is_empty());
    }

    #[test]
    fn test_error_file_without_votes_is_unmatched() {
        let mut registries = Registries::new();
        registries.navigation.add(sbet("/a/sbet.out", 1000.0, 2000.0));
        registries.nav_error.add(smrmsg("/b/qqqqqqqqqqqqqqqqqq.out", 9000.0, 9500.0));

        let matches = MatchingEngine::default().match_error_files(&registries);
        assert!(matches.matches.is_empty());
        assert!(matches.unmatched.contains_key("/b/qqqqqqqqqqqqqqqqqq.out"));
    }

    #[test]
    fn test_log_file_matches_exported_name() {
        let mut registries = Registries::new();
        registries.navigation.add(sbet("/nav/a/export_H13131_251.out", 1000.0, 2000.0));
        registries.navigation.add(sbet("/nav/b/sbet_H13131_252.out", 1000.0, 2000.0));
        registries
            .nav_log
            .add(export_log("/logs_elsewhere/pospac.txt", "export_H13131_251.out"));

        let matches = MatchingEngine::default().match_log_files(&registries);
        assert_eq!(
            matches.matches.get("/logs_elsewhere/pospac.txt").map(String::as_str),
            Some("/nav/a/export_H13131_251.out")
        );
    }

    #[test]
    fn test_sbet_needs_both_companions() {
        let mut registries = Registries::new();
        registries.navigation.add(sbet("/nav/sbet.out", 172_800.0, 173_000.0));
        registries.nav_error.add(smrmsg("/nav/smrmsg.out", 172_800.0, 173_000.0));
        registries.nav_error.set_match("/nav/smrmsg.out", "/nav/sbet.out");

        let start = Utc.with_ymd_and_hms(2017, 5, 23, 18, 0, 0).unwrap();
        let project = InMemoryProject::default();
        project.upsert_container(ContainerHandle::new("/proj/c", 40111, 0, "em2040", start, start));

        let engine = MatchingEngine::default();
        let matches = engine.match_navigation(&registries, &project);
        assert!(matches.groups.is_empty());
        assert_eq!(matches.unmatched["/nav/sbet.out"], "SBET has no matching export log");

        registries.nav_log.add(export_log("/nav/export.log", "sbet.out"));
        registries.nav_log.set_match("/nav/export.log", "/nav/sbet.out");
        let matches = engine.match_navigation(&registries, &project);
        assert_eq!(matches.groups["/proj/c"].len(), 1);
        assert_eq!(matches.sbet_to_container["/nav/sbet.out"], "/proj/c");
    }

    #[test]
    fn test_sbet_container_vote_prefers_serial_and_model() {
        let mut registries = Registries::new();
        // Weekly seconds 172800 → GPS day 2 (Tuesday)
        registries
            .navigation
            .add(sbet("/nav/em2040_40111/sbet.out", 172_900.0, 173_000.0));
        registries.nav_error.add(smrmsg("/nav/em2040_40111/smrmsg.out", 172_900.0, 173_000.0));
        registries.nav_error.set_match("/nav/em2040_40111/smrmsg.out", "/nav/em2040_40111/sbet.out");
        registries.nav_log.add(export_log("/nav/em2040_40111/export.log", "sbet.out"));
        registries.nav_log.set_match("/nav/em2040_40111/export.log", "/nav/em2040_40111/sbet.out");

        let tuesday = Utc.with_ymd_and_hms(2017, 5, 23, 18, 0, 0).unwrap();
        let project = InMemoryProject::default();
        project.upsert_container(ContainerHandle::new("/proj/em710", 241, 0, "em710", tuesday, tuesday));
        project.upsert_container(ContainerHandle::new("/proj/em2040", 40111, 0, "em2040", tuesday, tuesday));

        let matches = MatchingEngine::default().match_navigation(&registries, &project);
        assert_eq!(
            matches.sbet_to_container["/nav/em2040_40111/sbet.out"],
            "/proj/em2040"
        );
    }

    #[test]
    fn test_sbet_already_imported_is_unmatched() {
        let mut registries = Registries::new();
        registries.navigation.add(sbet("/nav/sbet.out", 172_800.0, 173_000.0));
        registries.nav_error.add(smrmsg("/nav/smrmsg.out", 172_800.0, 173_000.0));
        registries.nav_error.set_match("/nav/smrmsg.out", "/nav/sbet.out");
        registries.nav_log.add(export_log("/nav/export.log", "sbet.out"));
        registries.nav_log.set_match("/nav/export.log", "/nav/sbet.out");

        let start = Utc.with_ymd_and_hms(2017, 5, 23, 18, 0, 0).unwrap();
        let mut container = ContainerHandle::new("/proj/c", 40111, 0, "em2040", start, start);
        container.imported_sbets.insert("sbet.out".to_string());
        let project = InMemoryProject::default();
        project.upsert_container(container);

        let matches = MatchingEngine::default().match_navigation(&registries, &project);
        assert!(matches.groups.is_empty());
        assert_eq!(matches.unmatched["/nav/sbet.out"], "SBET already imported into /proj/c");
    }

    #[test]
    fn test_svp_subset_unmatched_novel_cast_matched() {
        let mut registries = Registries::new();
        let cast = Utc.with_ymd_and_hms(2016, 10, 14, 2, 12, 0).unwrap();
        let svp_meta = |times: Vec<DateTime<Utc>>| SvpMeta {
            profiles: times.iter().map(|_| vec![(0.0, 1500.0)]).collect(),
            julian_days: times.iter().map(|_| "2016-288".to_string()).collect(),
            latitudes: times.iter().map(|_| 37.5).collect(),
            longitudes: times.iter().map(|_| -76.1).collect(),
            number_of_layers: times.iter().map(|_| 1).collect(),
            cast_times: times,
        };
        registries.svp.add(TrackedFile::new(
            Path::new("/svp/old.svp"),
            "caris_svp",
            FileAttributes::from_size(10),
            svp_meta(vec![cast]),
        ));
        registries.svp.add(TrackedFile::new(
            Path::new("/svp/new.svp"),
            "caris_svp",
            FileAttributes::from_size(20),
            svp_meta(vec![cast, cast + chrono::Duration::hours(4)]),
        ));

        let mut container = ContainerHandle::new("/proj/c", 1, 0, "em2040", cast, cast);
        container.cast_times.insert(cast.timestamp());
        let project = InMemoryProject::default();
        project.upsert_container(container);

        let matches = MatchingEngine::default().match_svp(&registries.svp, &project);
        assert_eq!(matches.groups["/proj/c"], vec!["/svp/new.svp".to_string()]);
        assert_eq!(
            matches.unmatched["/svp/old.svp"],
            "All profiles already present in every container"
        );
    }

    #[test]
    fn test_svp_without_containers_is_unmatched() {
        let mut registries = Registries::new();
        let cast = Utc.with_ymd_and_hms(2016, 10, 14, 2, 12, 0).unwrap();
        registries.svp.add(TrackedFile::new(
            Path::new("/svp/a.svp"),
            "caris_svp",
            FileAttributes::from_size(10),
            SvpMeta {
                profiles: vec![vec![(0.0, 1500.0)]],
                cast_times: vec![cast],
                julian_days: vec!["2016-288".to_string()],
                latitudes: vec![0.0],
                longitudes: vec![0.0],
                number_of_layers: vec![1],
            },
        ));
        let matches = MatchingEngine::default().match_svp(&registries.svp, &InMemoryProject::default());
        assert!(matches.groups.is_empty());
        assert!(matches.unmatched.contains_key("/svp/a.svp"));
    }
}
