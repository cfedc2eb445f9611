//! Picks the theme a branch targets out of the themes a store reports.
//!
//! Theme names in practice carry prefixes and suffixes, so besides an exact
//! match the resolver accepts names that contain the target or are contained
//! in it. Such matches are best effort. Among partial matches drafts are
//! preferred over the live theme so an ambiguous name never lands edits on
//! the published storefront.

use crate::metrics_defs::THEME_RESOLUTIONS;
use crate::types::{ThemeCandidate, ThemeRole};
use shared::counter;

/// Role preference among ambiguous matches, most preferred first.
pub const ROLE_PRIORITY: &[ThemeRole] = &[
    ThemeRole::Unpublished,
    ThemeRole::Published,
    ThemeRole::Development,
    ThemeRole::Main,
];

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ResolveError {
    #[error("theme \"{target}\" not found, available: {}", describe(.candidates))]
    NotFound {
        target: String,
        candidates: Vec<ThemeCandidate>,
    },
}

fn describe(candidates: &[ThemeCandidate]) -> String {
    if candidates.is_empty() {
        return "none".to_string();
    }

    candidates
        .iter()
        .map(ThemeCandidate::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One stage of the resolution policy.
pub trait ThemeMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn find<'a>(&self, candidates: &'a [ThemeCandidate], target: &str)
    -> Option<&'a ThemeCandidate>;
}

/// Candidates named exactly `target`. A single hit wins whatever its role;
/// several hits are ordered by `ROLE_PRIORITY`, then by supplied order.
pub struct ExactName;

impl ThemeMatcher for ExactName {
    fn name(&self) -> &'static str {
        "exact_name"
    }

    fn find<'a>(
        &self,
        candidates: &'a [ThemeCandidate],
        target: &str,
    ) -> Option<&'a ThemeCandidate> {
        let exact: Vec<&ThemeCandidate> = candidates.iter().filter(|c| c.name == target).collect();

        match exact.as_slice() {
            [] => None,
            [only] => Some(*only),
            several => by_role_priority(several).or(Some(several[0])),
        }
    }
}

/// Highest priority role among the partial matches.
pub struct RolePriority;

impl ThemeMatcher for RolePriority {
    fn name(&self) -> &'static str {
        "role_priority"
    }

    fn find<'a>(
        &self,
        candidates: &'a [ThemeCandidate],
        target: &str,
    ) -> Option<&'a ThemeCandidate> {
        by_role_priority(&partial_matches(candidates, target))
    }
}

/// First partial match in supplied order, for pools whose roles are all
/// outside `ROLE_PRIORITY`.
pub struct FirstPartial;

impl ThemeMatcher for FirstPartial {
    fn name(&self) -> &'static str {
        "first_partial"
    }

    fn find<'a>(
        &self,
        candidates: &'a [ThemeCandidate],
        target: &str,
    ) -> Option<&'a ThemeCandidate> {
        candidates.iter().find(|c| is_partial_match(&c.name, target))
    }
}

fn is_partial_match(name: &str, target: &str) -> bool {
    name.contains(target) || target.contains(name)
}

fn partial_matches<'a>(candidates: &'a [ThemeCandidate], target: &str) -> Vec<&'a ThemeCandidate> {
    candidates
        .iter()
        .filter(|c| is_partial_match(&c.name, target))
        .collect()
}

fn by_role_priority<'a>(pool: &[&'a ThemeCandidate]) -> Option<&'a ThemeCandidate> {
    ROLE_PRIORITY
        .iter()
        .find_map(|role| pool.iter().copied().find(|c| &c.role == role))
}

/// Ordered list of matchers; the first one that returns a theme wins.
pub struct ThemeResolver {
    matchers: Vec<Box<dyn ThemeMatcher>>,
}

impl Default for ThemeResolver {
    fn default() -> Self {
        ThemeResolver::new(vec![
            Box::new(ExactName),
            Box::new(RolePriority),
            Box::new(FirstPartial),
        ])
    }
}

impl ThemeResolver {
    pub fn new(matchers: Vec<Box<dyn ThemeMatcher>>) -> Self {
        ThemeResolver { matchers }
    }

    pub fn resolve<'a>(
        &self,
        candidates: &'a [ThemeCandidate],
        target: &str,
    ) -> Result<&'a ThemeCandidate, ResolveError> {
        for matcher in &self.matchers {
            if let Some(theme) = matcher.find(candidates, target) {
                tracing::debug!(
                    target_name = target,
                    matcher = matcher.name(),
                    theme = %theme,
                    "Resolved theme"
                );
                counter!(THEME_RESOLUTIONS, "matcher" => matcher.name()).increment(1);
                return Ok(theme);
            }
        }

        counter!(THEME_RESOLUTIONS, "matcher" => "not_found").increment(1);
        Err(ResolveError::NotFound {
            target: target.to_string(),
            candidates: candidates.to_vec(),
        })
    }
}

/// Resolves `target` with the default matcher order.
pub fn resolve(candidates: &[ThemeCandidate], target: &str) -> Result<ThemeCandidate, ResolveError> {
    ThemeResolver::default()
        .resolve(candidates, target)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme(id: &str, name: &str, role: &str) -> ThemeCandidate {
        ThemeCandidate::new(id, name, role)
    }

    #[test]
    fn test_single_exact_match_wins_regardless_of_role() {
        let candidates = vec![
            theme("1", "tt-ca/US_Live copy", "UNPUBLISHED"),
            theme("2", "tt-ca/US_Live", "MAIN"),
        ];
        assert_eq!(resolve(&candidates, "tt-ca/US_Live").unwrap().id, "2");
    }

    #[test]
    fn test_ambiguous_exact_match_uses_role_priority() {
        let candidates = vec![theme("1", "A", "PUBLISHED"), theme("2", "A", "UNPUBLISHED")];
        assert_eq!(resolve(&candidates, "A").unwrap().id, "2");

        // Unrecognised roles fall back to supplied order
        let candidates = vec![theme("1", "A", "DEMO"), theme("2", "A", "LOCKED")];
        assert_eq!(resolve(&candidates, "A").unwrap().id, "1");
    }

    #[test]
    fn test_partial_match_prefers_unpublished_over_main() {
        let candidates = vec![
            theme("1", "Foo Bar", "MAIN"),
            theme("2", "Foo Baz", "UNPUBLISHED"),
        ];
        assert_eq!(resolve(&candidates, "Foo").unwrap().id, "2");
    }

    #[test]
    fn test_partial_match_role_order() {
        let candidates = vec![
            theme("1", "Foo main", "MAIN"),
            theme("2", "Foo dev", "DEVELOPMENT"),
            theme("3", "Foo pub", "PUBLISHED"),
        ];
        assert_eq!(resolve(&candidates, "Foo").unwrap().id, "3");

        let candidates = vec![theme("1", "Foo main", "MAIN"), theme("2", "Foo dev", "DEVELOPMENT")];
        assert_eq!(resolve(&candidates, "Foo").unwrap().id, "2");
    }

    #[test]
    fn test_target_containing_candidate_name() {
        // The configured name is longer than the theme's own name
        let candidates = vec![theme("1", "Other", "MAIN"), theme("2", "US_Live", "MAIN")];
        assert_eq!(resolve(&candidates, "tt-ca/US_Live").unwrap().id, "2");
    }

    #[test]
    fn test_unrecognised_roles_use_first_partial_match() {
        let candidates = vec![
            theme("1", "Unrelated", "UNPUBLISHED"),
            theme("2", "Foo archive", "ARCHIVED"),
            theme("3", "Foo demo", "DEMO"),
        ];
        assert_eq!(resolve(&candidates, "Foo").unwrap().id, "2");
    }

    #[test]
    fn test_not_found_carries_candidates() {
        let candidates = vec![theme("1", "Foo", "MAIN")];
        let err = resolve(&candidates, "Zed").unwrap_err();

        assert_eq!(
            err,
            ResolveError::NotFound {
                target: "Zed".into(),
                candidates: candidates.clone(),
            }
        );
        assert_eq!(
            err.to_string(),
            "theme \"Zed\" not found, available: \"Foo\" (MAIN)"
        );
    }

    #[test]
    fn test_no_candidates() {
        let err = resolve(&[], "Foo").unwrap_err();
        assert_eq!(err.to_string(), "theme \"Foo\" not found, available: none");
    }

    #[test]
    fn test_custom_matcher_order() {
        let candidates = vec![theme("1", "Foo Bar", "MAIN"), theme("2", "Foo Baz", "UNPUBLISHED")];
        let resolver = ThemeResolver::new(vec![Box::new(FirstPartial)]);
        assert_eq!(resolver.resolve(&candidates, "Foo").unwrap().id, "1");
    }
}
