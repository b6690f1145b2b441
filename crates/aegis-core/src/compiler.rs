//! Policy compilation and the compiled-policy cache.
//!
//! Authorization is read-heavy: policy bodies change far less often than
//! they are matched. Each policy is therefore compiled to a set of anchored
//! regexes once and reused from an id-keyed cache, making repeated
//! evaluation O(regex-match) instead of O(recompile).

use std::sync::{Arc, Mutex};

use regex::Regex;
use tracing::trace;

use crate::cache::RecencyMap;
use crate::error::CompileError;
use crate::glob::glob_to_regex;
use crate::policy::Policy;

/// Capacity of the compiled-policy cache.
const COMPILE_CACHE_CAPACITY: usize = 1000;

/// A policy compiled to regex form.
///
/// Immutable once built and shared via `Arc` between the cache and every
/// in-flight match.
#[derive(Debug)]
pub struct CompiledPolicy {
    actions: Vec<Regex>,
    resources: Vec<Regex>,
    all_resources: bool,
}

impl CompiledPolicy {
    /// Whether any action pattern matches the whole of `action`.
    #[must_use]
    pub fn match_action(&self, action: &str) -> bool {
        self.actions.iter().any(|regex| regex.is_match(action))
    }

    /// Probe the resource axis.
    ///
    /// Returns `Some(true)` when the policy covers all resources or a
    /// pattern matches, `Some(false)` when a resource was given and nothing
    /// matched, and `None` when no resource was given and the axis stays
    /// unresolved.
    #[must_use]
    pub fn match_resource(&self, resource: Option<&str>) -> Option<bool> {
        if self.all_resources {
            return Some(true);
        }

        resource.map(|r| self.resources.iter().any(|regex| regex.is_match(r)))
    }

    /// Whether the source resource list contained the catch-all `"*"`.
    #[must_use]
    pub fn all_resources(&self) -> bool {
        self.all_resources
    }
}

/// Compiles policies and caches the result by policy id.
///
/// Cheap to clone: clones share the same cache. The instance is built once
/// in the wiring layer and injected into the storage manager and every
/// evaluation call, so tests can run fully isolated engines.
#[derive(Debug, Clone)]
pub struct PolicyCompiler {
    cache: Arc<Mutex<RecencyMap<String, Arc<CompiledPolicy>>>>,
}

impl PolicyCompiler {
    /// Create a compiler with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Arc::new(Mutex::new(RecencyMap::new(COMPILE_CACHE_CAPACITY))),
        }
    }

    /// Compile a policy, returning the shared cached entry when available.
    ///
    /// Policies with an empty id (decoded inline policies that were never
    /// persisted) are compiled but not cached, so unrelated inline policies
    /// cannot alias one another under the empty key.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when one of the policy's globs does not
    /// translate to a valid pattern.
    pub fn compile(&self, policy: &Policy) -> Result<Arc<CompiledPolicy>, CompileError> {
        if !policy.id().is_empty() {
            if let Ok(mut cache) = self.cache.lock() {
                if let Some(compiled) = cache.get(policy.id()) {
                    return Ok(Arc::clone(compiled));
                }
            }
        }

        trace!(id = %policy.id(), "compiling policy");

        let actions = policy
            .actions()
            .iter()
            .map(|glob| glob_to_regex(glob))
            .collect::<Result<Vec<_>, _>>()?;

        let all_resources = policy.resources().iter().any(|r| r == "*");
        let resources = if all_resources {
            Vec::new()
        } else {
            policy
                .resources()
                .iter()
                .map(|glob| glob_to_regex(glob))
                .collect::<Result<Vec<_>, _>>()?
        };

        let compiled = Arc::new(CompiledPolicy {
            actions,
            resources,
            all_resources,
        });

        if !policy.id().is_empty() {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(policy.id().to_owned(), Arc::clone(&compiled));
            }
        }

        Ok(compiled)
    }

    /// Drop every cached compilation.
    ///
    /// Invoked on every write to any policy, identity, or group:
    /// conservative but cheap, and keeps the cache coherent without
    /// per-id invalidation bookkeeping.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Number of cached compiled policies.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        Self::new()
    }
}
