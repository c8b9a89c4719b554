//! Per-category file registries
//!
//! Each category keeps its files in parallel maps keyed by normalized path,
//! file name and unique id. The specialized registries add the match links
//! their category owns (multibeam line groups, companion file to SBET links,
//! SBET to container links); removing a file scrubs it from every map.

use crate::classify::Classified;
use crate::error::{IntelError, Result};
use crate::types::{
    FileCategory, MultibeamMeta, NavErrorMeta, NavLogMeta, NavigationMeta, SvpMeta, TrackedFile,
};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

// ============================================================================
// Unique ids
// ============================================================================

/// Hands out process-lifetime unique file ids. Never reset, not even when a
/// project is closed.
#[derive(Debug, Clone)]
pub struct UniqueIdAllocator {
    next: Arc<AtomicU64>,
}

impl UniqueIdAllocator {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next successful add will receive
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for UniqueIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of adding a file to a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub added: bool,
    pub unique_id: Option<u64>,
}

impl AddOutcome {
    fn rejected() -> Self {
        Self {
            added: false,
            unique_id: None,
        }
    }
}

// ============================================================================
// Generic registry
// ============================================================================

#[derive(Debug, Clone)]
pub struct CategoryRegistry<M> {
    category: FileCategory,
    files: BTreeMap<String, TrackedFile<M>>,
    by_name: HashMap<String, Vec<String>>,
    by_id: BTreeMap<u64, String>,
    ids: UniqueIdAllocator,
}

impl<M> CategoryRegistry<M> {
    pub fn new(category: FileCategory, ids: UniqueIdAllocator) -> Self {
        Self {
            category,
            files: BTreeMap::new(),
            by_name: HashMap::new(),
            by_id: BTreeMap::new(),
            ids,
        }
    }

    pub fn category(&self) -> FileCategory {
        self.category
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&TrackedFile<M>> {
        self.files.get(path)
    }

    pub fn path_for_id(&self, unique_id: u64) -> Option<&str> {
        self.by_id.get(&unique_id).map(String::as_str)
    }

    /// Files in path order
    pub fn files(&self) -> impl Iterator<Item = &TrackedFile<M>> {
        self.files.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Path of an already registered file that `file` duplicates, if any
    pub fn find_duplicate(&self, file: &TrackedFile<M>) -> Option<&str> {
        if let Some(existing) = self.files.get_key_value(&file.path) {
            return Some(existing.0.as_str());
        }
        self.by_name.get(&file.file_name)?.iter().find_map(|path| {
            let existing = self.files.get(path)?;
            (existing.attributes.size_bytes == file.attributes.size_bytes)
                .then_some(path.as_str())
        })
    }

    /// Insert a file, assigning its unique id
    pub fn insert(&mut self, mut file: TrackedFile<M>) -> Result<u64> {
        if let Some(existing) = self.find_duplicate(&file) {
            return Err(IntelError::DuplicateFile(format!(
                "{} duplicates registered {}",
                file.path, existing
            )));
        }
        let unique_id = self.ids.next_id();
        file.unique_id = unique_id;
        self.by_name
            .entry(file.file_name.clone())
            .or_default()
            .push(file.path.clone());
        self.by_id.insert(unique_id, file.path.clone());
        self.files.insert(file.path.clone(), file);
        Ok(unique_id)
    }

    /// Insert a file; duplicates are rejected quietly
    pub fn add(&mut self, file: TrackedFile<M>) -> AddOutcome {
        match self.insert(file) {
            Ok(unique_id) => AddOutcome {
                added: true,
                unique_id: Some(unique_id),
            },
            Err(e) => {
                debug!(category = %self.category, error = %e, "Rejected duplicate file");
                AddOutcome::rejected()
            }
        }
    }

    /// Remove a file from every map, returning its unique id
    pub fn remove(&mut self, path: &str) -> Option<u64> {
        let file = self.files.remove(path)?;
        if let Some(paths) = self.by_name.get_mut(&file.file_name) {
            paths.retain(|p| p != path);
            if paths.is_empty() {
                self.by_name.remove(&file.file_name);
            }
        }
        self.by_id.remove(&file.unique_id);
        Some(file.unique_id)
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.by_name.clear();
        self.by_id.clear();
    }

    /// Check that the parallel maps agree with each other
    pub fn verify(&self) -> Result<()> {
        let fail = |message: String| IntelError::RegistryConsistency {
            category: self.category.to_string(),
            message,
        };

        if self.by_id.len() != self.files.len() {
            return Err(fail(format!(
                "{} files but {} ids",
                self.files.len(),
                self.by_id.len()
            )));
        }
        let named: usize = self.by_name.values().map(Vec::len).sum();
        if named != self.files.len() {
            return Err(fail(format!(
                "{} files but {} name entries",
                self.files.len(),
                named
            )));
        }
        for (path, file) in &self.files {
            if self.by_id.get(&file.unique_id) != Some(path) {
                return Err(fail(format!("id {} does not map to {}", file.unique_id, path)));
            }
            let listed = self
                .by_name
                .get(&file.file_name)
                .is_some_and(|paths| paths.contains(path));
            if !listed {
                return Err(fail(format!("{} missing from name index", path)));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Multibeam
// ============================================================================

/// Multibeam files plus their grouping into destination containers
#[derive(Debug, Clone)]
pub struct MultibeamRegistry {
    inner: CategoryRegistry<MultibeamMeta>,
    /// destination → member paths, in start time order
    line_groups: IndexMap<String, Vec<String>>,
}

impl MultibeamRegistry {
    pub fn new(ids: UniqueIdAllocator) -> Self {
        Self {
            inner: CategoryRegistry::new(FileCategory::Multibeam, ids),
            line_groups: IndexMap::new(),
        }
    }

    pub fn add(&mut self, file: TrackedFile<MultibeamMeta>) -> AddOutcome {
        self.inner.add(file)
    }

    /// Remove a file and scrub it from its line group; an emptied group is deleted
    pub fn remove(&mut self, path: &str) -> Option<u64> {
        let unique_id = self.inner.remove(path)?;
        for members in self.line_groups.values_mut() {
            members.retain(|p| p != path);
        }
        self.line_groups.retain(|_, members| !members.is_empty());
        Some(unique_id)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.line_groups.clear();
    }

    pub fn line_groups(&self) -> &IndexMap<String, Vec<String>> {
        &self.line_groups
    }

    pub fn set_line_groups(&mut self, groups: IndexMap<String, Vec<String>>) {
        self.line_groups = groups;
    }

    /// Destination container for a file, if grouped
    pub fn matching_container(&self, path: &str) -> Option<&str> {
        self.line_groups
            .iter()
            .find(|(_, members)| members.iter().any(|p| p == path))
            .map(|(destination, _)| destination.as_str())
    }

    pub fn verify(&self) -> Result<()> {
        self.inner.verify()?;
        for (destination, members) in &self.line_groups {
            if let Some(stray) = members.iter().find(|p| !self.inner.contains(p)) {
                return Err(IntelError::RegistryConsistency {
                    category: FileCategory::Multibeam.to_string(),
                    message: format!("line group {} lists unknown file {}", destination, stray),
                });
            }
        }
        Ok(())
    }
}

impl Deref for MultibeamRegistry {
    type Target = CategoryRegistry<MultibeamMeta>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

// ============================================================================
// Navigation (SBET)
// ============================================================================

#[derive(Debug, Clone)]
pub struct NavigationRegistry {
    inner: CategoryRegistry<NavigationMeta>,
    /// sbet → destination container
    matching_container: BTreeMap<String, String>,
}

impl NavigationRegistry {
    pub fn new(ids: UniqueIdAllocator) -> Self {
        Self {
            inner: CategoryRegistry::new(FileCategory::Navigation, ids),
            matching_container: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, file: TrackedFile<NavigationMeta>) -> AddOutcome {
        self.inner.add(file)
    }

    pub fn remove(&mut self, path: &str) -> Option<u64> {
        let unique_id = self.inner.remove(path)?;
        self.matching_container.remove(path);
        Some(unique_id)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.matching_container.clear();
    }

    pub fn matching_container(&self, sbet: &str) -> Option<&str> {
        self.matching_container.get(sbet).map(String::as_str)
    }

    pub fn container_matches(&self) -> &BTreeMap<String, String> {
        &self.matching_container
    }

    pub fn set_container_matches(&mut self, matches: BTreeMap<String, String>) {
        self.matching_container = matches;
    }

    pub fn verify(&self) -> Result<()> {
        self.inner.verify()?;
        if let Some(stray) = self.matching_container.keys().find(|p| !self.inner.contains(p)) {
            return Err(IntelError::RegistryConsistency {
                category: FileCategory::Navigation.to_string(),
                message: format!("container match for unknown SBET {}", stray),
            });
        }
        Ok(())
    }
}

impl Deref for NavigationRegistry {
    type Target = CategoryRegistry<NavigationMeta>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

// ============================================================================
// Companion files (error files and export logs)
// ============================================================================

/// Registry for files that pair with exactly one SBET
#[derive(Debug, Clone)]
pub struct CompanionRegistry<M> {
    inner: CategoryRegistry<M>,
    /// companion → sbet
    matching_sbet: BTreeMap<String, String>,
    /// sbet → companions that picked it
    sbet_lookup: BTreeMap<String, Vec<String>>,
}

impl<M> CompanionRegistry<M> {
    pub fn new(category: FileCategory, ids: UniqueIdAllocator) -> Self {
        Self {
            inner: CategoryRegistry::new(category, ids),
            matching_sbet: BTreeMap::new(),
            sbet_lookup: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, file: TrackedFile<M>) -> AddOutcome {
        self.inner.add(file)
    }

    pub fn remove(&mut self, path: &str) -> Option<u64> {
        let unique_id = self.inner.remove(path)?;
        self.unlink(path);
        Some(unique_id)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.clear_matches();
    }

    pub fn clear_matches(&mut self) {
        self.matching_sbet.clear();
        self.sbet_lookup.clear();
    }

    /// Link a companion file to an SBET, replacing any previous link
    pub fn set_match(&mut self, companion: &str, sbet: &str) {
        self.unlink(companion);
        self.matching_sbet
            .insert(companion.to_string(), sbet.to_string());
        self.sbet_lookup
            .entry(sbet.to_string())
            .or_default()
            .push(companion.to_string());
    }

    fn unlink(&mut self, companion: &str) {
        if let Some(sbet) = self.matching_sbet.remove(companion) {
            if let Some(companions) = self.sbet_lookup.get_mut(&sbet) {
                companions.retain(|c| c != companion);
                if companions.is_empty() {
                    self.sbet_lookup.remove(&sbet);
                }
            }
        }
    }

    pub fn matching_sbet(&self, companion: &str) -> Option<&str> {
        self.matching_sbet.get(companion).map(String::as_str)
    }

    /// Companion files matched to this SBET
    pub fn companions_of(&self, sbet: &str) -> &[String] {
        self.sbet_lookup.get(sbet).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn verify(&self) -> Result<()> {
        self.inner.verify()?;
        let linked: usize = self.sbet_lookup.values().map(Vec::len).sum();
        if linked != self.matching_sbet.len() {
            return Err(IntelError::RegistryConsistency {
                category: self.inner.category().to_string(),
                message: format!(
                    "{} companion links but {} reverse links",
                    self.matching_sbet.len(),
                    linked
                ),
            });
        }
        if let Some(stray) = self.matching_sbet.keys().find(|p| !self.inner.contains(p)) {
            return Err(IntelError::RegistryConsistency {
                category: self.inner.category().to_string(),
                message: format!("SBET link for unknown file {}", stray),
            });
        }
        Ok(())
    }
}

impl<M> Deref for CompanionRegistry<M> {
    type Target = CategoryRegistry<M>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

// ============================================================================
// All registries
// ============================================================================

/// The five category registries, sharing one id allocator
#[derive(Debug, Clone)]
pub struct Registries {
    ids: UniqueIdAllocator,
    pub multibeam: MultibeamRegistry,
    pub navigation: NavigationRegistry,
    pub nav_error: CompanionRegistry<NavErrorMeta>,
    pub nav_log: CompanionRegistry<NavLogMeta>,
    pub svp: CategoryRegistry<SvpMeta>,
}

impl Registries {
    pub fn new() -> Self {
        let ids = UniqueIdAllocator::new();
        Self {
            multibeam: MultibeamRegistry::new(ids.clone()),
            navigation: NavigationRegistry::new(ids.clone()),
            nav_error: CompanionRegistry::new(FileCategory::NavError, ids.clone()),
            nav_log: CompanionRegistry::new(FileCategory::NavLog, ids.clone()),
            svp: CategoryRegistry::new(FileCategory::Svp, ids.clone()),
            ids,
        }
    }

    pub fn ids(&self) -> &UniqueIdAllocator {
        &self.ids
    }

    /// Registry currently holding this path
    pub fn category_of(&self, path: &str) -> Option<FileCategory> {
        if self.multibeam.contains(path) {
            Some(FileCategory::Multibeam)
        } else if self.navigation.contains(path) {
            Some(FileCategory::Navigation)
        } else if self.nav_error.contains(path) {
            Some(FileCategory::NavError)
        } else if self.nav_log.contains(path) {
            Some(FileCategory::NavLog)
        } else if self.svp.contains(path) {
            Some(FileCategory::Svp)
        } else {
            None
        }
    }

    /// Route a classified file into its registry
    ///
    /// A path lives in at most one registry; a path already held anywhere is
    /// rejected like any other duplicate.
    pub fn add(&mut self, classified: Classified) -> Result<(FileCategory, AddOutcome)> {
        let (category, path) = match &classified {
            Classified::Multibeam(f) => (FileCategory::Multibeam, f.path.clone()),
            Classified::Navigation(f) => (FileCategory::Navigation, f.path.clone()),
            Classified::NavError(f) => (FileCategory::NavError, f.path.clone()),
            Classified::NavLog(f) => (FileCategory::NavLog, f.path.clone()),
            Classified::Svp(f) => (FileCategory::Svp, f.path.clone()),
            Classified::Unknown(reason) => return Err(IntelError::UnsupportedFile(reason.clone())),
        };
        if let Some(holder) = self.category_of(&path) {
            debug!(path = %path, category = %holder, "File already registered");
            return Ok((category, AddOutcome::rejected()));
        }

        let outcome = match classified {
            Classified::Multibeam(f) => self.multibeam.add(f),
            Classified::Navigation(f) => self.navigation.add(f),
            Classified::NavError(f) => self.nav_error.add(f),
            Classified::NavLog(f) => self.nav_log.add(f),
            Classified::Svp(f) => self.svp.add(f),
            Classified::Unknown(_) => AddOutcome::rejected(),
        };
        Ok((category, outcome))
    }

    /// Remove a path from whichever registry holds it
    pub fn remove(&mut self, path: &str) -> Option<(FileCategory, u64)> {
        let category = self.category_of(path)?;
        let unique_id = match category {
            FileCategory::Multibeam => self.multibeam.remove(path),
            FileCategory::Navigation => self.navigation.remove(path),
            FileCategory::NavError => self.nav_error.remove(path),
            FileCategory::NavLog => self.nav_log.remove(path),
            FileCategory::Svp => self.svp.remove(path),
        }?;
        Some((category, unique_id))
    }

    pub fn clear(&mut self) {
        self.multibeam.clear();
        self.navigation.clear();
        self.nav_error.clear();
        self.nav_log.clear();
        self.svp.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.multibeam.is_empty()
            && self.navigation.is_empty()
            && self.nav_error.is_empty()
            && self.nav_log.is_empty()
            && self.svp.is_empty()
    }

    /// Verify every registry; an inconsistent one is cleared
    pub fn verify_or_repair(&mut self) {
        if let Err(e) = self.multibeam.verify() {
            report_inconsistency(&e);
            self.multibeam.clear();
        }
        if let Err(e) = self.navigation.verify() {
            report_inconsistency(&e);
            self.navigation.clear();
        }
        if let Err(e) = self.nav_error.verify() {
            report_inconsistency(&e);
            self.nav_error.clear();
        }
        if let Err(e) = self.nav_log.verify() {
            report_inconsistency(&e);
            self.nav_log.clear();
        }
        if let Err(e) = self.svp.verify() {
            report_inconsistency(&e);
            self.svp.clear();
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

fn report_inconsistency(e: &IntelError) {
    debug_assert!(false, "{e}");
    error!(error = %e, "Registry inconsistent, clearing it");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileAttributes, MultibeamFormat};
    use chrono::{TimeZone, Utc};
    use std::path::Path;

    fn multibeam(path: &str, size: u64) -> TrackedFile<MultibeamMeta> {
        let start = Utc.with_ymd_and_hms(2017, 5, 23, 18, 11, 19).unwrap();
        TrackedFile::new(
            Path::new(path),
            "kongsberg_all",
            FileAttributes::from_size(size),
            MultibeamMeta {
                format: MultibeamFormat::KongsbergAll,
                start_time: start,
                end_time: start,
                primary_serial: 40111,
                secondary_serial: 0,
                model: "em2040".to_string(),
            },
        )
    }

    fn nav(path: &str) -> TrackedFile<NavErrorMeta> {
        TrackedFile::new(
            Path::new(path),
            "pospac_smrmsg",
            FileAttributes::from_size(800),
            NavErrorMeta {
                weekly_seconds_start: 10.0,
                weekly_seconds_end: 20.0,
            },
        )
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let mut registry = MultibeamRegistry::new(UniqueIdAllocator::new());
        let a = registry.add(multibeam("/data/a.all", 10));
        let b = registry.add(multibeam("/data/b.all", 10));
        assert!(a.added && b.added);
        assert!(b.unique_id > a.unique_id);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.path_for_id(a.unique_id.unwrap()), Some("/data/a.all"));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut registry = MultibeamRegistry::new(UniqueIdAllocator::new());
        assert!(registry.add(multibeam("/data/a.all", 10)).added);
        let again = registry.add(multibeam("/data/a.all", 99));
        assert_eq!(again, AddOutcome { added: false, unique_id: None });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_and_size_rejected() {
        let mut registry = MultibeamRegistry::new(UniqueIdAllocator::new());
        assert!(registry.add(multibeam("/data/day1/a.all", 10)).added);
        assert!(!registry.add(multibeam("/backup/day1/a.all", 10)).added);
        // Same name, different size is a different file
        assert!(registry.add(multibeam("/backup/day1/a.all", 11)).added);
    }

    #[test]
    fn test_insert_reports_duplicate_error() {
        let mut registry = CategoryRegistry::new(FileCategory::NavError, UniqueIdAllocator::new());
        registry.insert(nav("/data/smrmsg.out")).unwrap();
        assert!(matches!(
            registry.insert(nav("/data/smrmsg.out")),
            Err(IntelError::DuplicateFile(_))
        ));
    }

    #[test]
    fn test_add_then_remove_restores_state_except_ids() {
        let ids = UniqueIdAllocator::new();
        let mut registry = MultibeamRegistry::new(ids.clone());
        registry.add(multibeam("/data/a.all", 10));
        let before_paths: Vec<String> = registry.paths().map(str::to_string).collect();

        let outcome = registry.add(multibeam("/data/b.all", 20));
        let next_before_remove = ids.peek();
        assert_eq!(registry.remove("/data/b.all"), outcome.unique_id);

        let after_paths: Vec<String> = registry.paths().map(str::to_string).collect();
        assert_eq!(before_paths, after_paths);
        assert!(registry.verify().is_ok());
        assert_eq!(ids.peek(), next_before_remove);

        let readded = registry.add(multibeam("/data/b.all", 20));
        assert_ne!(readded.unique_id, outcome.unique_id);
    }

    #[test]
    fn test_remove_scrubs_line_groups() {
        let mut registry = MultibeamRegistry::new(UniqueIdAllocator::new());
        registry.add(multibeam("/data/a.all", 10));
        registry.add(multibeam("/data/b.all", 20));
        let mut groups = IndexMap::new();
        groups.insert(
            "/proj/em2040_40111_05_23_2017".to_string(),
            vec!["/data/a.all".to_string(), "/data/b.all".to_string()],
        );
        registry.set_line_groups(groups);

        registry.remove("/data/a.all");
        assert_eq!(registry.line_groups().len(), 1);
        assert_eq!(
            registry.matching_container("/data/b.all"),
            Some("/proj/em2040_40111_05_23_2017")
        );

        registry.remove("/data/b.all");
        assert!(registry.line_groups().is_empty());
    }

    #[test]
    fn test_companion_links_scrubbed_on_remove() {
        let mut registry = CompanionRegistry::new(FileCategory::NavError, UniqueIdAllocator::new());
        registry.add(nav("/data/smrmsg_a.out"));
        registry.add(nav("/data/smrmsg_b.out"));
        registry.set_match("/data/smrmsg_a.out", "/data/sbet.out");
        registry.set_match("/data/smrmsg_b.out", "/data/sbet.out");
        assert_eq!(registry.companions_of("/data/sbet.out").len(), 2);

        registry.remove("/data/smrmsg_a.out");
        assert_eq!(
            registry.companions_of("/data/sbet.out").to_vec(),
            vec!["/data/smrmsg_b.out".to_string()]
        );
        assert_eq!(registry.matching_sbet("/data/smrmsg_a.out"), None);
        assert!(registry.verify().is_ok());
    }

    #[test]
    fn test_verify_detects_stray_group_member() {
        let mut registry = MultibeamRegistry::new(UniqueIdAllocator::new());
        let mut groups = IndexMap::new();
        groups.insert("/proj/c".to_string(), vec!["/data/ghost.all".to_string()]);
        registry.set_line_groups(groups);
        assert!(matches!(
            registry.verify(),
            Err(IntelError::RegistryConsistency { .. })
        ));
    }

    #[test]
    fn test_path_lives_in_one_registry() {
        let mut registries = Registries::new();
        let (category, outcome) = registries
            .add(Classified::Multibeam(multibeam("/data/a.all", 10)))
            .unwrap();
        assert_eq!(category, FileCategory::Multibeam);
        assert!(outcome.added);

        let (_, again) = registries
            .add(Classified::NavError(nav("/data/a.all")))
            .unwrap();
        assert!(!again.added);
        assert_eq!(registries.category_of("/data/a.all"), Some(FileCategory::Multibeam));
    }

    #[test]
    fn test_unknown_is_unsupported() {
        let mut registries = Registries::new();
        assert!(matches!(
            registries.add(Classified::Unknown("readme".to_string())),
            Err(IntelError::UnsupportedFile(_))
        ));
    }

    #[test]
    fn test_clear_keeps_id_counter() {
        let mut registries = Registries::new();
        registries
            .add(Classified::Multibeam(multibeam("/data/a.all", 10)))
            .unwrap();
        let next = registries.ids().peek();
        registries.clear();
        assert!(registries.is_empty());
        assert_eq!(registries.ids().peek(), next);
    }
}
