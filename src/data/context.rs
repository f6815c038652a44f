//! Load context handed to loaders, actions, and middleware.
//!
//! # Design Decisions
//! - Exactly one flavour per build: a plain JSON map, or a typed provider
//!   when middleware is enabled
//! - Provider keys are typed handles; values are stored behind `Arc<dyn Any>`
//!   and shared by every clone of the provider for one request

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::DispatchError;

/// The legacy load context: a string-keyed JSON map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppLoadContext {
    values: Arc<Map<String, Value>>,
}

impl AppLoadContext {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("No value found for context `{0}`")]
    Missing(String),
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A typed handle into a `RouterContextProvider`.
pub struct ContextKey<T> {
    id: u64,
    name: &'static str,
    default: Option<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            default: self.default.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Mint a new context key. Each call yields a distinct key.
pub fn create_context<T>(name: &'static str, default: Option<T>) -> ContextKey<T>
where
    T: Clone + Send + Sync + 'static,
{
    ContextKey {
        id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        name,
        default,
        _marker: PhantomData,
    }
}

type Slots = HashMap<u64, Arc<dyn Any + Send + Sync>>;

/// Typed per-request context used when middleware is enabled.
#[derive(Clone, Default)]
pub struct RouterContextProvider {
    slots: Arc<RwLock<Slots>>,
}

impl RouterContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(self, key: &ContextKey<T>, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.set(key, value);
        self
    }

    pub fn get<T>(&self, key: &ContextKey<T>) -> Result<T, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&key.id)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
            .or_else(|| key.default.clone())
            .ok_or_else(|| ContextError::Missing(key.name.to_string()))
    }

    pub fn set<T>(&self, key: &ContextKey<T>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.insert(key.id, Arc::new(value));
    }
}

impl fmt::Debug for RouterContextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.slots.read().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("RouterContextProvider").field("slots", &len).finish()
    }
}

/// The context every data function of one request shares.
#[derive(Debug, Clone)]
pub enum LoadContext {
    Legacy(AppLoadContext),
    Provider(RouterContextProvider),
}

impl LoadContext {
    pub fn legacy(&self) -> Option<&AppLoadContext> {
        match self {
            LoadContext::Legacy(ctx) => Some(ctx),
            LoadContext::Provider(_) => None,
        }
    }

    pub fn provider(&self) -> Option<&RouterContextProvider> {
        match self {
            LoadContext::Provider(ctx) => Some(ctx),
            LoadContext::Legacy(_) => None,
        }
    }
}

impl Default for LoadContext {
    fn default() -> Self {
        LoadContext::Legacy(AppLoadContext::default())
    }
}

/// What the caller of the request handler supplies.
#[derive(Debug, Clone, Default)]
pub enum InitialContext {
    #[default]
    None,
    Legacy(AppLoadContext),
    Provider(RouterContextProvider),
}

/// Build the load context for a request. A value of the wrong flavour for
/// the build is a configuration error.
pub fn create_load_context(
    initial: InitialContext,
    middleware: bool,
) -> Result<LoadContext, DispatchError> {
    match (initial, middleware) {
        (InitialContext::None, true) => Ok(LoadContext::Provider(RouterContextProvider::new())),
        (InitialContext::None, false) => Ok(LoadContext::Legacy(AppLoadContext::default())),
        (InitialContext::Provider(p), true) => Ok(LoadContext::Provider(p)),
        (InitialContext::Legacy(c), false) => Ok(LoadContext::Legacy(c)),
        _ => Err(DispatchError::InvalidLoadContext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_keys_are_distinct() {
        let user = create_context::<String>("user", None);
        let other = create_context::<String>("user", None);
        let locale = create_context("locale", Some("en".to_string()));

        let provider = RouterContextProvider::new().with(&user, "ada".to_string());
        assert_eq!(provider.get(&user).unwrap(), "ada");
        assert_eq!(provider.get(&other), Err(ContextError::Missing("user".into())));
        assert_eq!(provider.get(&locale).unwrap(), "en");

        let shared = provider.clone();
        shared.set(&locale, "fr".to_string());
        assert_eq!(provider.get(&locale).unwrap(), "fr");
    }

    #[test]
    fn test_context_flavour_must_match_build() {
        assert!(matches!(
            create_load_context(InitialContext::None, true),
            Ok(LoadContext::Provider(_))
        ));
        assert!(matches!(
            create_load_context(InitialContext::None, false),
            Ok(LoadContext::Legacy(_))
        ));
        assert!(matches!(
            create_load_context(InitialContext::Legacy(AppLoadContext::default()), true),
            Err(DispatchError::InvalidLoadContext)
        ));
        assert!(matches!(
            create_load_context(InitialContext::Provider(RouterContextProvider::new()), false),
            Err(DispatchError::InvalidLoadContext)
        ));
    }
}
