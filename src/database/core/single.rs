//! Single-flight named instance cache
//!
//! `NamedCache` memoizes an expensive "construct by name" function. At most one
//! construction runs per name at a time; concurrent callers for the same name
//! wait for it and share its outcome. Successful results are kept for the
//! lifetime of the cache, failures are handed to the waiters and then forgotten
//! so the next call tries again.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};

use anyhow::{anyhow, Result};
use tracing::debug;

/// Name used when the caller asks for the empty name
pub const DEFAULT_NAME: &str = "DEFAULT";

/// Normalize a requested name, mapping `""` to [`DEFAULT_NAME`]
pub fn normalize_name(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_NAME
    } else {
        name
    }
}

/// Error produced by one failed construction, shared by every caller that
/// waited on it.
///
/// Callers receive it wrapped in an `anyhow::Error`; use
/// `err.downcast_ref::<SharedError>()` to get at the shared original.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    fn new(err: anyhow::Error) -> Self {
        SharedError(Arc::new(err))
    }

    /// The original error returned by the constructor
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Whether both handles point at the same failed construction
    pub fn same_as(&self, other: &SharedError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

type Outcome<T> = std::result::Result<T, SharedError>;

/// One in-flight construction; waiters park on `done` until `outcome` is set.
struct Call<T> {
    outcome: Mutex<Option<Outcome<T>>>,
    done: Condvar,
}

impl<T: Clone> Call<T> {
    fn new() -> Self {
        Call {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: Outcome<T>) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome<T> {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self
                .done
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

type Constructor<T> = dyn Fn(&str) -> Result<T> + Send + Sync;

/// Memoized, deduplicated factory of named instances
///
/// ```rust,ignore
/// use dbkit::NamedCache;
///
/// let cache = NamedCache::new(|name: &str| Ok(format!("resource for {name}")));
/// let a = cache.get("main")?;
/// let b = cache.get("main")?; // constructor not called again
/// assert_eq!(a, b);
/// ```
pub struct NamedCache<T> {
    instances: RwLock<HashMap<String, T>>,
    calls: Mutex<HashMap<String, Arc<Call<T>>>>,
    construct: Box<Constructor<T>>,
}

impl<T: Clone> NamedCache<T> {
    /// Wrap a constructor function
    pub fn new<F>(construct: F) -> Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        NamedCache {
            instances: RwLock::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            construct: Box::new(construct),
        }
    }

    /// Get the instance for `name`, constructing it on first use
    ///
    /// The empty name is treated as [`DEFAULT_NAME`].
    pub fn get(&self, name: &str) -> Result<T> {
        let name = normalize_name(name);

        if let Some(instance) = self.cached(name) {
            return Ok(instance);
        }

        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(call) = calls.get(name) {
                let call = Arc::clone(call);
                drop(calls);
                return call.wait().map_err(anyhow::Error::new);
            }
            // A leader that finished between our first look and taking the
            // lock has already published its instance.
            if let Some(instance) = self.cached(name) {
                return Ok(instance);
            }
            let call = Arc::new(Call::new());
            calls.insert(name.to_string(), Arc::clone(&call));
            call
        };

        let mut flight = Flight {
            cache: self,
            name,
            call: &call,
            finished: false,
        };
        debug!(instance = name, "constructing named instance");
        let outcome = match (self.construct)(name) {
            Ok(instance) => {
                self.instances
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), instance.clone());
                Ok(instance)
            }
            Err(err) => {
                debug!(instance = name, error = %err, "named instance construction failed");
                Err(SharedError::new(err))
            }
        };
        flight.finish(outcome.clone());

        outcome.map_err(anyhow::Error::new)
    }

    /// Whether an instance for `name` has been constructed
    pub fn contains(&self, name: &str) -> bool {
        self.cached(normalize_name(name)).is_some()
    }

    /// Number of constructed instances
    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all constructed instances, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn cached(&self, name: &str) -> Option<T> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Leader side of an in-flight call. Dropping it without `finish` (the
/// constructor panicked) still wakes the waiters.
struct Flight<'a, T: Clone> {
    cache: &'a NamedCache<T>,
    name: &'a str,
    call: &'a Arc<Call<T>>,
    finished: bool,
}

impl<T: Clone> Flight<'_, T> {
    fn finish(&mut self, outcome: Outcome<T>) {
        self.finished = true;
        self.cache
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.name);
        self.call.complete(outcome);
    }
}

impl<T: Clone> Drop for Flight<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            let err = anyhow!("construction of '{}' panicked", self.name);
            self.finish(Err(SharedError::new(err)));
        }
    }
}
