//! Backtracking version selection
//!
//! The search state is a single owned value. Each decision stores a
//! snapshot of the state taken just before its version was selected, so
//! backtracking restores the snapshot and selects the next candidate.
//! A conflict names the decisions that caused it, and the search jumps
//! straight back to the newest of those; decisions in between are
//! discarded along with their untried candidates.
//! Version lists for frontier identities are fetched concurrently; every
//! decision that changes the state happens in one serialized step.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tokio::task::JoinSet;
use tracing::{debug, info};

use lode_core::error::LodeError;
use lode_core::types::{
    ConflictClause, ConflictReport, ConstraintOrigin, Origin, PackageIdentity, Requirement,
    Version, VersionConstraint,
};
use lode_core::utils::normalize_name;
use lode_core::RegistryBindings;
use lode_registry::{CacheStats, CachedRegistry, DeclaredDependency, RegistryQuery};

use crate::graph::{RequirementEdge, ResolutionGraph, ResolvedPackage};
use crate::options::{CancelSignal, ResolveOptions};
use crate::ResolverResult;

/// Dependency resolver for one project
pub struct Resolver {
    query: Arc<dyn RegistryQuery>,
    bindings: RegistryBindings,
    options: ResolveOptions,
}

/// Result of a successful resolution
#[derive(Debug)]
pub struct ResolutionOutcome {
    pub graph: ResolutionGraph,
    /// Identities the project requires directly
    pub roots: Vec<PackageIdentity>,
    pub package_count: usize,
    /// Decisions revisited after a conflict
    pub backtracks: usize,
    pub elapsed_ms: u64,
    pub cache: CacheStats,
}

#[derive(Debug, Clone)]
struct Selection {
    version: Version,
    extras: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
struct SearchState {
    /// Every requirement seen so far, per identity, in discovery order
    constraints: IndexMap<PackageIdentity, Vec<Requirement>>,
    selected: IndexMap<PackageIdentity, Selection>,
    frontier: VecDeque<Requirement>,
    seen: HashSet<(PackageIdentity, String)>,
}

#[derive(Debug)]
struct Decision {
    snapshot: SearchState,
    identity: PackageIdentity,
    /// Candidates not tried yet, best first
    remaining: Vec<Version>,
    /// Older decisions that narrowed the candidates or ruled out tried ones
    culprits: HashSet<PackageIdentity>,
}

impl SearchState {
    fn push(&mut self, requirement: Requirement) {
        let (identity, fingerprint) = requirement.frontier_key();
        let extras: Vec<&str> = requirement.extras.iter().map(String::as_str).collect();
        let key = (identity.clone(), format!("{}[{}]", fingerprint, extras.join(",")));

        self.constraints
            .entry(identity)
            .or_default()
            .push(requirement.clone());
        if self.seen.insert(key) {
            self.frontier.push_back(requirement);
        }
    }

    /// Conjunction of every constraint recorded for an identity
    fn combined(&self, identity: &PackageIdentity) -> VersionConstraint {
        self.constraints
            .get(identity)
            .into_iter()
            .flatten()
            .fold(VersionConstraint::any(), |acc, requirement| {
                acc.intersect(&requirement.constraint)
            })
    }

    /// Union of extras requested for an identity
    fn requested_extras(&self, identity: &PackageIdentity) -> BTreeSet<String> {
        self.constraints
            .get(identity)
            .into_iter()
            .flatten()
            .flat_map(|requirement| requirement.extras.iter().cloned())
            .collect()
    }

    /// Packages and their selected versions, from the project down to the
    /// requester of `requirement`
    fn chain(&self, requirement: &Requirement) -> Vec<(PackageIdentity, Version)> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = requirement.requester().cloned();
        while let Some(parent) = current {
            if !visited.insert(parent.clone()) {
                break;
            }
            current = self
                .constraints
                .get(&parent)
                .and_then(|requirements| requirements.first())
                .and_then(|first| first.requester().cloned());
            if let Some(selection) = self.selected.get(&parent) {
                chain.push((parent, selection.version.clone()));
            }
        }
        chain.reverse();
        chain
    }

    /// Selected packages whose versions put `requirement` on the frontier.
    ///
    /// A requirement that arrived through an extra also depends on whoever
    /// asked for extras on its requester.
    fn responsible(&self, requirement: &Requirement) -> HashSet<PackageIdentity> {
        let mut culprits = HashSet::new();
        let Some(parent) = requirement.requester() else {
            return culprits;
        };
        culprits.insert(parent.clone());
        for upstream in self.constraints.get(parent).into_iter().flatten() {
            if upstream.extras.is_empty() {
                continue;
            }
            if let Some(requester) = upstream.requester() {
                culprits.insert(requester.clone());
            }
        }
        culprits
    }

    /// Decisions behind every constraint recorded for an identity
    fn culprits_for(&self, identity: &PackageIdentity) -> HashSet<PackageIdentity> {
        self.constraints
            .get(identity)
            .into_iter()
            .flatten()
            .flat_map(|requirement| self.responsible(requirement))
            .collect()
    }

    fn conflict_clause(&self, identity: &PackageIdentity, available: Vec<Version>) -> ConflictClause {
        let constraints = self
            .constraints
            .get(identity)
            .into_iter()
            .flatten()
            .map(|requirement| ConstraintOrigin {
                constraint: requirement.constraint.clone(),
                chain: self.chain(requirement),
            })
            .collect();
        ConflictClause {
            identity: identity.clone(),
            constraints,
            available,
        }
    }
}

enum Step {
    Continue,
    Conflict {
        identity: PackageIdentity,
        culprits: HashSet<PackageIdentity>,
    },
}

impl Resolver {
    pub fn new(query: Arc<dyn RegistryQuery>, bindings: RegistryBindings) -> Self {
        Self {
            query,
            bindings,
            options: ResolveOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Resolve direct requirements plus the project extras selected in the options
    pub async fn resolve(
        &self,
        requirements: &[Requirement],
        extras: &BTreeMap<String, Vec<Requirement>>,
    ) -> ResolverResult<ResolutionOutcome> {
        let started = Instant::now();
        let deadline = self
            .options
            .timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let registry = CachedRegistry::new(Arc::clone(&self.query));

        let mut state = SearchState::default();
        for requirement in self.roots(requirements, extras)? {
            state.push(requirement);
        }

        let mut decisions: Vec<Decision> = Vec::new();
        let mut conflicts: IndexMap<PackageIdentity, ConflictClause> = IndexMap::new();
        let mut backtracks = 0usize;

        loop {
            self.checkpoint(deadline)?;
            self.prefetch(&registry, &state, deadline).await?;
            let Some(requirement) = state.frontier.pop_front() else {
                break;
            };

            let step = match state.selected.get(&requirement.identity).cloned() {
                Some(selection) => {
                    if requirement.satisfied_by(&selection.version) {
                        self.activate_extras(&registry, &mut state, &requirement, &selection, deadline)
                            .await?;
                        Step::Continue
                    } else {
                        debug!(
                            "{} {} does not satisfy {}",
                            requirement.identity.label(),
                            selection.version,
                            requirement
                        );
                        let mut culprits = state.responsible(&requirement);
                        culprits.insert(requirement.identity.clone());
                        Step::Conflict {
                            identity: requirement.identity.clone(),
                            culprits,
                        }
                    }
                },
                None => {
                    let identity = requirement.identity.clone();
                    let versions = self.guarded(deadline, registry.versions(&identity)).await?;
                    if versions.is_empty() {
                        return Err(LodeError::PackageNotFound {
                            name: identity.name().to_string(),
                            registry: identity.registry().alias.clone(),
                        });
                    }

                    let combined = state.combined(&identity);
                    let mut candidates = self.candidates(&identity, &combined, &versions);
                    if candidates.is_empty() {
                        debug!("No version of {} satisfies {}", identity.label(), combined);
                        let culprits = state.culprits_for(&identity);
                        Step::Conflict { identity, culprits }
                    } else {
                        let version = candidates.remove(0);
                        let snapshot = state.clone();
                        let culprits = state.culprits_for(&identity);
                        self.select(&registry, &mut state, &identity, version, deadline)
                            .await?;
                        decisions.push(Decision {
                            snapshot,
                            identity,
                            remaining: candidates,
                            culprits,
                        });
                        Step::Continue
                    }
                },
            };

            let Step::Conflict {
                identity,
                mut culprits,
            } = step
            else {
                continue;
            };
            let available = self.guarded(deadline, registry.versions(&identity)).await?;
            let clause = state.conflict_clause(&identity, available.as_ref().clone());
            match conflicts.get_mut(&identity) {
                Some(existing) => existing.merge(clause),
                None => {
                    conflicts.insert(identity, clause);
                },
            }

            // Jump to the newest decision behind the conflict. A decision out
            // of candidates passes its own culprits further up.
            loop {
                let target = decisions
                    .iter()
                    .rposition(|decision| culprits.contains(&decision.identity));
                let Some(mut decision) = target.and_then(|target| decisions.drain(target..).next())
                else {
                    return Err(unresolvable(conflicts));
                };
                backtracks += 1;
                culprits.remove(&decision.identity);
                decision.culprits.extend(culprits.drain());

                if decision.remaining.is_empty() {
                    debug!("{} has no candidates left", decision.identity.label());
                    culprits = std::mem::take(&mut decision.culprits);
                    continue;
                }

                let version = decision.remaining.remove(0);
                debug!(
                    "Backtracking: retrying {} with {}",
                    decision.identity.label(),
                    version
                );
                state = decision.snapshot.clone();
                self.select(&registry, &mut state, &decision.identity, version, deadline)
                    .await?;
                decisions.push(decision);
                break;
            }
            // Cached lookups never suspend; let timers and other tasks run
            tokio::task::yield_now().await;
        }

        let graph = self.build_graph(&registry, &state, deadline).await?;
        let roots: Vec<PackageIdentity> = graph.roots().into_iter().cloned().collect();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let cache = registry.stats();

        info!(
            "Resolved {} packages in {}ms ({} backtracks, {} registry queries)",
            graph.package_count(),
            elapsed_ms,
            backtracks,
            cache.misses
        );
        for cycle in graph.cycles() {
            debug!("Dependency cycle: {}", ResolutionGraph::format_cycle(&cycle));
        }

        Ok(ResolutionOutcome {
            package_count: graph.package_count(),
            roots,
            graph,
            backtracks,
            elapsed_ms,
            cache,
        })
    }

    /// Direct requirements followed by every selected project extra group
    fn roots(
        &self,
        requirements: &[Requirement],
        extras: &BTreeMap<String, Vec<Requirement>>,
    ) -> ResolverResult<Vec<Requirement>> {
        let groups: HashMap<String, &Vec<Requirement>> = extras
            .iter()
            .map(|(group, requirements)| (normalize_name(group), requirements))
            .collect();

        let mut roots = requirements.to_vec();
        for extra in &self.options.extras {
            let group = groups.get(extra).ok_or_else(|| {
                LodeError::invalid_metadata(
                    "project.optional-dependencies",
                    format!("unknown extra '{}'", extra),
                )
            })?;
            roots.extend(group.iter().cloned());
        }
        Ok(roots)
    }

    /// Matching versions, best first
    fn candidates(
        &self,
        identity: &PackageIdentity,
        combined: &VersionConstraint,
        versions: &[Version],
    ) -> Vec<Version> {
        let matching: Vec<&Version> = versions
            .iter()
            .rev()
            .filter(|version| combined.matches(version))
            .collect();
        let has_stable = matching.iter().any(|version| !version.is_prerelease());

        // Pre-releases only when asked for, or when nothing else fits
        let mut candidates: Vec<Version> = matching
            .into_iter()
            .filter(|version| combined.allows_prereleases() || !has_stable || !version.is_prerelease())
            .cloned()
            .collect();

        if let Some(preferred) = self.options.preferred.get(identity) {
            if let Some(position) = candidates.iter().position(|version| version == preferred) {
                let version = candidates.remove(position);
                candidates.insert(0, version);
            }
        }
        candidates
    }

    async fn select(
        &self,
        registry: &CachedRegistry,
        state: &mut SearchState,
        identity: &PackageIdentity,
        version: Version,
        deadline: Option<tokio::time::Instant>,
    ) -> ResolverResult<()> {
        debug!("Selecting {} {}", identity.label(), version);
        let extras = state.requested_extras(identity);
        let dependencies = self
            .guarded(deadline, registry.dependencies(identity, &version))
            .await?;

        self.enqueue(state, identity, &dependencies, |extra| {
            extra.map_or(true, |extra| extras.contains(extra))
        })?;
        state
            .selected
            .insert(identity.clone(), Selection { version, extras });
        Ok(())
    }

    /// Push the dependencies behind extras that a new requirement turns on
    async fn activate_extras(
        &self,
        registry: &CachedRegistry,
        state: &mut SearchState,
        requirement: &Requirement,
        selection: &Selection,
        deadline: Option<tokio::time::Instant>,
    ) -> ResolverResult<()> {
        let added: BTreeSet<String> = requirement
            .extras
            .difference(&selection.extras)
            .cloned()
            .collect();
        if added.is_empty() {
            return Ok(());
        }

        let identity = &requirement.identity;
        debug!("Activating extras {:?} of {}", added, identity.label());
        let dependencies = self
            .guarded(deadline, registry.dependencies(identity, &selection.version))
            .await?;
        self.enqueue(state, identity, &dependencies, |extra| {
            extra.is_some_and(|extra| added.contains(extra))
        })?;
        if let Some(selected) = state.selected.get_mut(identity) {
            selected.extras.extend(added);
        }
        Ok(())
    }

    fn enqueue(
        &self,
        state: &mut SearchState,
        parent: &PackageIdentity,
        dependencies: &[DeclaredDependency],
        include: impl Fn(Option<&str>) -> bool,
    ) -> ResolverResult<()> {
        for dependency in dependencies {
            if !include(dependency.extra.as_deref()) {
                continue;
            }
            let identity = self.bindings.identity(&dependency.spec.name)?;
            state.push(Requirement::bind(
                &dependency.spec,
                identity,
                Origin::TransitiveOf(parent.clone()),
            ));
        }
        Ok(())
    }

    /// Fetch version lists for unresolved frontier identities concurrently
    async fn prefetch(
        &self,
        registry: &CachedRegistry,
        state: &SearchState,
        deadline: Option<tokio::time::Instant>,
    ) -> ResolverResult<()> {
        let mut pending: Vec<PackageIdentity> = Vec::new();
        for requirement in &state.frontier {
            let identity = &requirement.identity;
            if pending.len() >= self.options.concurrency {
                break;
            }
            if state.selected.contains_key(identity)
                || registry.has_versions(identity)
                || pending.contains(identity)
            {
                continue;
            }
            pending.push(identity.clone());
        }
        // One lookup gains nothing from a task
        if pending.len() < 2 {
            return Ok(());
        }

        debug!("Prefetching versions of {} packages", pending.len());
        let mut tasks = JoinSet::new();
        for identity in pending {
            let registry = registry.clone();
            tasks.spawn(async move {
                if let Err(e) = registry.versions(&identity).await {
                    // Surfaces again when the identity is decided
                    debug!("Prefetch of {} failed: {}", identity.label(), e);
                }
            });
        }
        self.guarded(deadline, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    debug!("Prefetch task failed: {}", e);
                }
            }
            Ok(())
        })
        .await
    }

    async fn build_graph(
        &self,
        registry: &CachedRegistry,
        state: &SearchState,
        deadline: Option<tokio::time::Instant>,
    ) -> ResolverResult<ResolutionGraph> {
        let mut selected: Vec<(&PackageIdentity, &Selection)> = state.selected.iter().collect();
        selected.sort_by(|a, b| a.0.sort_key().cmp(&b.0.sort_key()));

        // Warm the hash cache concurrently, then read it in order
        for chunk in selected.chunks(self.options.concurrency.max(1)) {
            let mut tasks = JoinSet::new();
            for (identity, selection) in chunk {
                let registry = registry.clone();
                let identity = (*identity).clone();
                let version = selection.version.clone();
                tasks.spawn(async move {
                    if let Err(e) = registry.content_hash(&identity, &version).await {
                        debug!("Hash lookup for {} failed: {}", identity.label(), e);
                    }
                });
            }
            self.guarded(deadline, async {
                while let Some(joined) = tasks.join_next().await {
                    if let Err(e) = joined {
                        debug!("Hash lookup task failed: {}", e);
                    }
                }
                Ok(())
            })
            .await?;
        }

        let mut graph = ResolutionGraph::new();
        for (identity, selection) in &selected {
            let content_hash = self
                .guarded(deadline, registry.content_hash(identity, &selection.version))
                .await?;
            let direct = state
                .constraints
                .get(*identity)
                .is_some_and(|requirements| requirements.iter().any(Requirement::is_direct));
            graph.add_package(ResolvedPackage {
                identity: (*identity).clone(),
                version: selection.version.clone(),
                content_hash,
                extras: selection.extras.clone(),
                direct,
            });
        }

        for (identity, _) in &selected {
            let requirements = state.constraints.get(*identity).into_iter().flatten();
            for requirement in requirements {
                let Some(parent) = requirement.requester() else {
                    continue;
                };
                if parent == *identity {
                    continue;
                }
                graph.add_requirement(
                    parent,
                    identity,
                    RequirementEdge {
                        constraint: requirement.constraint.clone(),
                        extras: requirement.extras.clone(),
                        marker: requirement.marker.clone(),
                    },
                );
            }
        }
        Ok(graph)
    }

    /// Run a registry future against the caller's cancellation and the deadline
    async fn guarded<T, F>(&self, deadline: Option<tokio::time::Instant>, future: F) -> ResolverResult<T>
    where
        F: Future<Output = ResolverResult<T>>,
    {
        let mut signal = self.options.cancellation.clone();
        tokio::select! {
            biased;
            _ = cancelled(&mut signal) => Err(cancelled_by_caller()),
            _ = expired(deadline) => Err(self.timed_out()),
            result = future => result,
        }
    }

    /// Check cancellation and the deadline without waiting on anything
    fn checkpoint(&self, deadline: Option<tokio::time::Instant>) -> ResolverResult<()> {
        if self
            .options
            .cancellation
            .as_ref()
            .is_some_and(CancelSignal::is_cancelled)
        {
            return Err(cancelled_by_caller());
        }
        if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
            return Err(self.timed_out());
        }
        Ok(())
    }

    fn timed_out(&self) -> LodeError {
        LodeError::Cancelled {
            reason: format!(
                "timed out after {} ms",
                self.options.timeout.map_or(0, |timeout| timeout.as_millis())
            ),
        }
    }
}

fn cancelled_by_caller() -> LodeError {
    LodeError::Cancelled {
        reason: "cancelled by caller".to_string(),
    }
}

fn unresolvable(conflicts: IndexMap<PackageIdentity, ConflictClause>) -> LodeError {
    LodeError::Unresolvable {
        report: ConflictReport {
            clauses: conflicts.into_values().collect(),
        },
    }
}

async fn cancelled(signal: &mut Option<CancelSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
