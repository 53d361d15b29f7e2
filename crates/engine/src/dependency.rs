//! Dependency tokens, factories, and the merged token→factory map.
//!
//! A handler type declares a default set of [`DependencyEntry`] values; callers
//! may pass overrides when compiling. [`DependencyMap::build`] merges both with
//! last-write-wins semantics. Steps name the tokens they need positionally and
//! receive freshly produced values through [`Dependencies`] on every call.

use std::{
    any::{Any, type_name},
    borrow::Cow,
    fmt,
    sync::Arc,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::DependencyError;

/// A type-erased dependency value handed to a step.
pub type Dependency = Arc<dyn Any + Send + Sync>;

/// Zero-argument factory producing a dependency value.
pub type DependencyFactory = Arc<dyn Fn() -> Dependency + Send + Sync>;

/// Lookup identity for a dependency factory.
///
/// Tokens are plain names; [`DependencyToken::of`] derives one from a Rust type
/// so that a dependency can be keyed by the type it produces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyToken(Cow<'static, str>);

impl DependencyToken {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Token keyed by the type name of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::from_static(type_name::<T>())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for DependencyToken {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

impl From<String> for DependencyToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A token paired with the factory that produces its value.
#[derive(Clone)]
pub struct DependencyEntry {
    pub token: DependencyToken,
    pub factory: DependencyFactory,
}

impl DependencyEntry {
    pub fn new(token: impl Into<DependencyToken>, factory: DependencyFactory) -> Self {
        Self {
            token: token.into(),
            factory,
        }
    }

    /// Entry whose factory builds a new `T` on every call.
    pub fn provide<T, F>(token: impl Into<DependencyToken>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(token, Arc::new(move || Arc::new(factory()) as Dependency))
    }

    /// Entry whose factory hands out the same shared instance on every call.
    pub fn shared<T>(token: impl Into<DependencyToken>, value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::new(token, Arc::new(move || value.clone() as Dependency))
    }
}

impl fmt::Debug for DependencyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyEntry").field("token", &self.token).finish_non_exhaustive()
    }
}

/// Merged token→factory table owned by a compiled controller.
#[derive(Clone, Default)]
pub struct DependencyMap {
    factories: IndexMap<DependencyToken, DependencyFactory>,
}

impl DependencyMap {
    /// Merge `defaults` and `overrides`, applied in that order.
    ///
    /// A later entry for a token replaces an earlier one, both within each list
    /// and across them, so overrides always win over defaults.
    pub fn build<D, O>(defaults: D, overrides: O) -> Self
    where
        D: IntoIterator<Item = DependencyEntry>,
        O: IntoIterator<Item = DependencyEntry>,
    {
        let mut factories = IndexMap::new();
        for entry in defaults.into_iter().chain(overrides) {
            factories.insert(entry.token, entry.factory);
        }
        Self { factories }
    }

    pub fn contains(&self, token: &DependencyToken) -> bool {
        self.factories.contains_key(token)
    }

    pub fn factory(&self, token: &DependencyToken) -> Option<&DependencyFactory> {
        self.factories.get(token)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &DependencyToken> {
        self.factories.keys()
    }

    /// Invoke the factory of every token, in order, producing fresh values.
    pub fn resolve(&self, tokens: &[DependencyToken]) -> Result<Dependencies, DependencyError> {
        let values = tokens
            .iter()
            .map(|token| {
                let factory = self
                    .factories
                    .get(token)
                    .ok_or_else(|| DependencyError::UnknownToken { token: token.clone() })?;
                Ok((token.clone(), factory()))
            })
            .collect::<Result<Vec<_>, DependencyError>>()?;
        Ok(Dependencies { values })
    }
}

impl fmt::Debug for DependencyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

/// Live dependency values for one step invocation, in the step's declared order.
#[derive(Clone, Default)]
pub struct Dependencies {
    values: Vec<(DependencyToken, Dependency)>,
}

impl Dependencies {
    /// Value at `position`, downcast to `T`.
    pub fn get<T: Any + Send + Sync>(&self, position: usize) -> Result<Arc<T>, DependencyError> {
        let (token, value) = self.values.get(position).ok_or(DependencyError::MissingPosition {
            position,
            len: self.values.len(),
        })?;
        downcast(token, value)
    }

    /// First value resolved for `token`, downcast to `T`.
    pub fn by_token<T: Any + Send + Sync>(&self, token: &DependencyToken) -> Result<Arc<T>, DependencyError> {
        let (token, value) = self
            .values
            .iter()
            .find(|(candidate, _)| candidate == token)
            .ok_or_else(|| DependencyError::UnknownToken { token: token.clone() })?;
        downcast(token, value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &DependencyToken> {
        self.values.iter().map(|(token, _)| token)
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tokens()).finish()
    }
}

fn downcast<T: Any + Send + Sync>(token: &DependencyToken, value: &Dependency) -> Result<Arc<T>, DependencyError> {
    value.clone().downcast::<T>().map_err(|_| DependencyError::TypeMismatch {
        token: token.clone(),
        expected: type_name::<T>(),
    })
}
