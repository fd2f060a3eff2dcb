//! Environment queries and the predicate built from them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::info::PythonEnvInfo;
use super::kind::PythonEnvKind;
use crate::utils::is_parent_path;

/// Restricts results to environments discovered under particular roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchLocations {
    pub roots: Vec<PathBuf>,
    /// Also accept environments that have no search location. Defaults to
    /// `false` when search locations are given.
    pub include_non_rooted: bool,
}

impl SearchLocations {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            include_non_rooted: false,
        }
    }

    #[must_use]
    pub const fn including_non_rooted(mut self) -> Self {
        self.include_non_rooted = true;
        self
    }
}

/// A query against locators or the collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PythonLocatorQuery {
    /// Bypass cached results and force a fresh discovery pass.
    pub ignore_cache: bool,
    /// Accept only these kinds. `None` accepts every kind.
    pub kinds: Option<Vec<PythonEnvKind>>,
    pub search_locations: Option<SearchLocations>,
}

impl PythonLocatorQuery {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<PythonEnvKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    #[must_use]
    pub fn with_search_locations(mut self, locations: SearchLocations) -> Self {
        self.search_locations = Some(locations);
        self
    }

    #[must_use]
    pub const fn ignoring_cache(mut self) -> Self {
        self.ignore_cache = true;
        self
    }

    /// The narrowest query accepting everything `self` or `other` accepts.
    #[must_use]
    pub fn widened(&self, other: &Self) -> Self {
        let kinds = match (&self.kinds, &other.kinds) {
            (Some(ours), Some(theirs)) => {
                let mut kinds = ours.clone();
                kinds.extend(theirs.iter().filter(|kind| !ours.contains(kind)).copied());
                Some(kinds)
            }
            _ => None,
        };
        let search_locations = match (&self.search_locations, &other.search_locations) {
            (Some(ours), Some(theirs)) => {
                let mut roots = ours.roots.clone();
                roots.extend(
                    theirs
                        .roots
                        .iter()
                        .filter(|root| !ours.roots.contains(root))
                        .cloned(),
                );
                Some(SearchLocations {
                    roots,
                    include_non_rooted: ours.include_non_rooted || theirs.include_non_rooted,
                })
            }
            _ => None,
        };
        Self {
            ignore_cache: self.ignore_cache || other.ignore_cache,
            kinds,
            search_locations,
        }
    }

    /// Whether `env` satisfies the query.
    pub fn matches(&self, env: &PythonEnvInfo) -> bool {
        self.matches_kind(env) && self.matches_search_location(env)
    }

    fn matches_kind(&self, env: &PythonEnvInfo) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&env.kind))
    }

    fn matches_search_location(&self, env: &PythonEnvInfo) -> bool {
        let Some(locations) = &self.search_locations else {
            return true;
        };
        match &env.search_location {
            None => locations.include_non_rooted,
            Some(location) => locations
                .roots
                .iter()
                .any(|root| is_parent_path(location, root)),
        }
    }
}

/// Build a predicate equivalent to [`PythonLocatorQuery::matches`].
pub fn get_query_filter(query: &PythonLocatorQuery) -> impl Fn(&PythonEnvInfo) -> bool + use<> {
    let query = query.clone();
    move |env| query.matches(env)
}
