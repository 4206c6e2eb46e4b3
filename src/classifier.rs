// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Classifier engine: an ordered chain of rules mapped to categories

use std::path::Path;

use crate::config::{OrganizerConfig, UnclassifiedMode};
use crate::rules::{
    file_name_of, CategoryRule, DotfileRule, EpisodeRule, ExtensionRule, GlobRule, KeywordRule,
};
use crate::Result;

/// What to do when a rule matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Move into this subdirectory of the destination root
    Route(String),
    /// Leave the file alone without reporting it
    Ignore,
}

/// What to do when no rule matches
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UnclassifiedPolicy {
    #[default]
    Skip,
    Route(String),
}

/// Raw result of running the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Category(String),
    Ignored { rule: &'static str },
    Unclassified,
}

/// Classification with the unclassified policy applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Move(String),
    Ignore { rule: &'static str },
    Skip,
}

struct MapEntry {
    rule: Box<dyn CategoryRule>,
    action: RuleAction,
}

/// Ordered `(rule, action)` pairs plus the unclassified policy
///
/// Position in the map is priority: the first matching entry wins.
#[derive(Default)]
pub struct CategoryMap {
    entries: Vec<MapEntry>,
    policy: UnclassifiedPolicy,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the default chain from configuration
    ///
    /// Order: dotfiles, ignore list, extension routes, glob routes, TV
    /// episodes, movie keywords. TV must stay ahead of movies so that a name
    /// like `Show.S01E02.1080p.mkv` is filed as TV.
    pub fn from_config(config: &OrganizerConfig) -> Result<Self> {
        let mut map = Self::new();
        let filters = &config.filters;
        let cats = &config.categories;

        if filters.ignore_dotfiles {
            map.push(DotfileRule, RuleAction::Ignore);
        }

        let ignored = ExtensionRule::with_extensions(&filters.ignored_extensions);
        if !ignored.is_empty() {
            map.push(ignored, RuleAction::Ignore);
        }

        for route in &cats.extension_routes {
            map.push(
                ExtensionRule::with_extensions([&route.extension]),
                RuleAction::Route(route.directory.clone()),
            );
        }

        for route in &cats.glob_routes {
            map.push(
                GlobRule::new(&route.pattern)?,
                RuleAction::Route(route.directory.clone()),
            );
        }

        if cats.tv_enabled {
            map.push(
                EpisodeRule::with_pattern(&cats.episode_pattern)?,
                RuleAction::Route(cats.tv_dir.clone()),
            );
        }

        if cats.movies_enabled {
            map.push(
                KeywordRule::with_keywords(&cats.movie_keywords),
                RuleAction::Route(cats.movies_dir.clone()),
            );
        }

        map.policy = match cats.unclassified {
            UnclassifiedMode::Skip => UnclassifiedPolicy::Skip,
            UnclassifiedMode::Route => UnclassifiedPolicy::Route(cats.other_dir.clone()),
        };

        Ok(map)
    }

    /// Append a rule at the lowest priority
    pub fn push(&mut self, rule: impl CategoryRule + 'static, action: RuleAction) -> &mut Self {
        self.entries.push(MapEntry {
            rule: Box::new(rule),
            action,
        });
        self
    }

    /// Insert a rule at `index`, shifting lower-priority rules down
    pub fn insert(
        &mut self,
        index: usize,
        rule: impl CategoryRule + 'static,
        action: RuleAction,
    ) -> &mut Self {
        let index = index.min(self.entries.len());
        self.entries.insert(
            index,
            MapEntry {
                rule: Box::new(rule),
                action,
            },
        );
        self
    }

    pub fn with_policy(mut self, policy: UnclassifiedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &UnclassifiedPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classifier engine over a [`CategoryMap`]
pub struct Classifier {
    map: CategoryMap,
}

impl Classifier {
    pub fn new(map: CategoryMap) -> Self {
        Self { map }
    }

    pub fn from_config(config: &OrganizerConfig) -> Result<Self> {
        Ok(Self::new(CategoryMap::from_config(config)?))
    }

    /// Run the chain against the file name of `path`
    pub fn classify(&self, path: &Path) -> Classification {
        let Some(name) = file_name_of(path) else {
            return Classification::Unclassified;
        };

        for entry in &self.map.entries {
            if entry.rule.matches(&name) {
                return match &entry.action {
                    RuleAction::Route(dir) => Classification::Category(dir.clone()),
                    RuleAction::Ignore => Classification::Ignored {
                        rule: entry.rule.name(),
                    },
                };
            }
        }

        Classification::Unclassified
    }

    /// Classify and apply the unclassified policy
    pub fn route(&self, path: &Path) -> Route {
        match self.classify(path) {
            Classification::Category(dir) => Route::Move(dir),
            Classification::Ignored { rule } => Route::Ignore { rule },
            Classification::Unclassified => match &self.map.policy {
                UnclassifiedPolicy::Skip => Route::Skip,
                UnclassifiedPolicy::Route(dir) => Route::Move(dir.clone()),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Rule names in priority order
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.map.entries.iter().map(|e| e.rule.name()).collect()
    }

    /// Every directory a file can be routed to, without duplicates
    pub fn categories(&self) -> Vec<&str> {
        let routed = self.map.entries.iter().filter_map(|e| match &e.action {
            RuleAction::Route(dir) => Some(dir.as_str()),
            RuleAction::Ignore => None,
        });
        let fallback = match &self.map.policy {
            UnclassifiedPolicy::Route(dir) => Some(dir.as_str()),
            UnclassifiedPolicy::Skip => None,
        };

        let mut dirs = Vec::new();
        for dir in routed.chain(fallback) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtensionRoute, GlobRoute};
    use crate::rules::media::DEFAULT_MOVIE_KEYWORDS;
    use std::path::PathBuf;

    fn default_classifier() -> Classifier {
        Classifier::from_config(&OrganizerConfig::default()).unwrap()
    }

    fn category(name: &str) -> Classification {
        Classification::Category(name.to_string())
    }

    #[test]
    fn test_default_chain_order() {
        let classifier = default_classifier();
        assert_eq!(
            classifier.rule_names(),
            vec!["dotfile", "extension", "episode", "keyword"]
        );
    }

    #[test]
    fn test_tv_and_movies() {
        let c = default_classifier();
        assert_eq!(c.classify(Path::new("/dl/Show.S01E02.mkv")), category("TV"));
        assert_eq!(c.classify(Path::new("/dl/Film.2019.720p.mkv")), category("Movies"));
        assert_eq!(c.classify(Path::new("/dl/notes.txt")), Classification::Unclassified);
    }

    #[test]
    fn test_episode_beats_movie_keyword() {
        let c = default_classifier();
        let shows = ["Show", "the.show", "A Show (2020)"];
        let tokens = ["S01E02", "s10e11", "S99E00"];
        for show in shows {
            for token in tokens {
                for keyword in DEFAULT_MOVIE_KEYWORDS {
                    for name in [
                        format!("{show}.{token}.{keyword}.mkv"),
                        format!("{show}.{}.{token}.mkv", keyword.to_uppercase()),
                    ] {
                        assert_eq!(c.classify(&PathBuf::from(&name)), category("TV"), "{name}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_ignored_before_categories() {
        let c = default_classifier();
        assert_eq!(
            c.classify(Path::new("/dl/Show.S01E02.1080p.nfo")),
            Classification::Ignored { rule: "extension" }
        );
        assert_eq!(
            c.classify(Path::new("/dl/.Show.S01E02.mkv")),
            Classification::Ignored { rule: "dotfile" }
        );
        assert_eq!(c.route(Path::new("/dl/thumb.jpg")), Route::Ignore { rule: "extension" });
    }

    #[test]
    fn test_matches_file_name_not_directory() {
        let c = default_classifier();
        assert_eq!(
            c.classify(Path::new("/dl/Show.S01E02.1080p/readme.txt")),
            Classification::Unclassified
        );
        assert_eq!(
            c.classify(Path::new("/dl/.cache/Film.1080p.mkv")),
            category("Movies")
        );
    }

    #[test]
    fn test_dotfiles_allowed_when_disabled() {
        let mut config = OrganizerConfig::default();
        config.filters.ignore_dotfiles = false;
        let c = Classifier::from_config(&config).unwrap();
        assert_eq!(c.classify(Path::new(".Show.S01E02.mkv")), category("TV"));
        assert_eq!(
            c.classify(Path::new(".jpg")),
            Classification::Ignored { rule: "extension" }
        );
    }

    #[test]
    fn test_unclassified_policy() {
        let c = default_classifier();
        assert_eq!(c.route(Path::new("notes.txt")), Route::Skip);

        let mut config = OrganizerConfig::default();
        config.categories.unclassified = UnclassifiedMode::Route;
        let c = Classifier::from_config(&config).unwrap();
        assert_eq!(c.route(Path::new("notes.txt")), Route::Move("Other".to_string()));
        assert_eq!(c.route(Path::new("thumb.png")), Route::Ignore { rule: "extension" });
    }

    #[test]
    fn test_routes_from_config() {
        let mut config = OrganizerConfig::default();
        config.categories.extension_routes.push(ExtensionRoute {
            extension: ".pdf".to_string(),
            directory: "Magazines".to_string(),
        });
        config.categories.glob_routes.push(GlobRoute {
            directory: "Books".to_string(),
            pattern: "*.epub".to_string(),
        });
        let c = Classifier::from_config(&config).unwrap();
        assert_eq!(c.classify(Path::new("Wired.1080p.PDF")), category("Magazines"));
        assert_eq!(c.classify(Path::new("Novel.epub")), category("Books"));
        assert_eq!(c.classify(Path::new("Show.S01E01.mkv")), category("TV"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(default_classifier().categories(), vec!["TV", "Movies"]);

        let mut config = OrganizerConfig::default();
        config.categories.unclassified = UnclassifiedMode::Route;
        config.categories.extension_routes.push(ExtensionRoute {
            extension: ".pdf".to_string(),
            directory: "Magazines".to_string(),
        });
        config.categories.glob_routes.push(GlobRoute {
            directory: "Magazines".to_string(),
            pattern: "*.cbz".to_string(),
        });
        let c = Classifier::from_config(&config).unwrap();
        assert_eq!(c.categories(), vec!["Magazines", "TV", "Movies", "Other"]);
    }

    #[test]
    fn test_disable_movie_rule() {
        let mut config = OrganizerConfig::default();
        config.categories.movies_enabled = false;
        let c = Classifier::from_config(&config).unwrap();
        assert_eq!(c.classify(Path::new("Film.1080p.mkv")), Classification::Unclassified);
    }

    #[test]
    fn test_insert_at_priority() {
        let mut map = CategoryMap::new();
        map.push(EpisodeRule::new().unwrap(), RuleAction::Route("TV".to_string()));
        map.insert(0, GlobRule::new("*anime*").unwrap(), RuleAction::Route("Anime".to_string()));
        let c = Classifier::new(map);
        assert_eq!(c.classify(Path::new("Some.Anime.S01E01.mkv")), category("Anime"));
        assert_eq!(c.classify(Path::new("Show.S01E01.mkv")), category("TV"));
        assert_eq!(c.rule_names(), vec!["glob", "episode"]);
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        let mut config = OrganizerConfig::default();
        config.categories.episode_pattern = "(".to_string();
        assert!(Classifier::from_config(&config).is_err());

        let mut config = OrganizerConfig::default();
        config.categories.glob_routes.push(GlobRoute {
            directory: "X".to_string(),
            pattern: "[".to_string(),
        });
        assert!(Classifier::from_config(&config).is_err());
    }
}
