//! Turns declarative dependency rulesets into concrete `identifier -> branch` maps.
//!
//! The resolver knows every project of the metadata tree (by repository path
//! and by identifier) and the table of named branch rules. Resolution walks
//! each applicable ruleset in order and expands repository path globs into
//! the projects they match. Magic branch names (`@same`, `@stable`, ...) are
//! resolved per dependency.

use glob::Pattern;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use walkdir::WalkDir;

use cibuild_schema::{
    Branch, BranchRuleTable, BranchSpec, DependencyRuleset, MAINLINE_BRANCH, PlatformFlavor,
    Project, ProjectId,
};

use crate::config::{ConfigError, ConfigLoader};
use crate::env::RefEnvironment;
use crate::git::GitRepository;

/// Per-project descriptor file in the metadata tree.
pub const METADATA_FILE: &str = "metadata.yaml";

/// Result of a resolution: dependency identifier to branch.
pub type ResolvedDependencies = BTreeMap<ProjectId, Branch>;

/// Dependency to the projects depending on it.
pub type ReverseDependencies = BTreeMap<ProjectId, BTreeSet<ProjectId>>;

/// Errors raised while loading resolver inputs.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// A metadata file or the rule table could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A metadata file or the rule table is not valid YAML for its schema.
    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml::Error,
    },

    /// The metadata tree could not be walked.
    #[error("Failed to walk {0}: {1}")]
    Walk(PathBuf, walkdir::Error),

    /// A project configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Decides what `@same` means for the current build.
///
/// In order: a protected ref keeps its own branch, a merge request uses its
/// target branch, anything else searches Git history for the mainline it
/// forked from. The ancestry result is computed once per policy.
#[derive(Debug)]
pub struct SameBranchPolicy {
    refs: RefEnvironment,
    repository: PathBuf,
    ancestor: OnceLock<Branch>,
}

impl SameBranchPolicy {
    /// Create a policy for the working copy at `repository`.
    pub fn new(refs: RefEnvironment, repository: impl Into<PathBuf>) -> Self {
        Self {
            refs,
            repository: repository.into(),
            ancestor: OnceLock::new(),
        }
    }

    /// The branch `@same` stands for when building `current`.
    ///
    /// Without a current branch (seed jobs) the protected shortcut does not
    /// apply and resolution continues with the merge request target and the
    /// ancestry search.
    pub fn resolve(&self, current: Option<&Branch>) -> Branch {
        if let (true, Some(branch)) = (self.refs.protected, current) {
            return branch.clone();
        }

        if let Some(target) = &self.refs.merge_request_target {
            return target.clone();
        }

        self.ancestor
            .get_or_init(|| {
                GitRepository::open(&self.repository)
                    .and_then(|repo| repo.mainline_ancestor())
                    .unwrap_or_else(|e| {
                        tracing::warn!("Unable to determine mainline ancestor, using master: {e}");
                        Branch::new(MAINLINE_BRANCH)
                    })
            })
            .clone()
    }
}

/// Resolves dependency rulesets against the metadata tree.
#[derive(Debug)]
pub struct BranchResolver {
    by_path: BTreeMap<String, Project>,
    by_identifier: BTreeMap<ProjectId, Project>,
    rules: BranchRuleTable,
    flavor: PlatformFlavor,
    same_branch: SameBranchPolicy,
}

impl BranchResolver {
    /// Create a resolver over an already loaded set of projects.
    pub fn new(
        projects: impl IntoIterator<Item = Project>,
        rules: BranchRuleTable,
        flavor: PlatformFlavor,
        refs: RefEnvironment,
        repository: impl Into<PathBuf>,
    ) -> Self {
        let mut by_path = BTreeMap::new();
        let mut by_identifier = BTreeMap::new();
        for project in projects {
            by_identifier.insert(project.identifier.clone(), project.clone());
            by_path.insert(project.repopath.clone(), project);
        }

        Self {
            by_path,
            by_identifier,
            rules,
            flavor,
            same_branch: SameBranchPolicy::new(refs, repository),
        }
    }

    /// Load every `metadata.yaml` below `metadata_dir` plus the rule table.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked or any descriptor or
    /// the rule table cannot be read or parsed.
    pub fn load(
        metadata_dir: &Path,
        rules_file: &Path,
        flavor: PlatformFlavor,
        refs: RefEnvironment,
        repository: impl Into<PathBuf>,
    ) -> Result<Self, ResolverError> {
        let projects = load_projects(metadata_dir)?;
        tracing::debug!(
            "Loaded {} projects from {}",
            projects.len(),
            metadata_dir.display()
        );

        let content = read(rules_file)?;
        let rules = BranchRuleTable::from_yaml(&content).map_err(|source| ResolverError::Yaml {
            path: rules_file.to_path_buf(),
            source,
        })?;

        Ok(Self::new(projects, rules, flavor, refs, repository))
    }

    /// The flavor rulesets are matched against.
    pub fn flavor(&self) -> &PlatformFlavor {
        &self.flavor
    }

    /// Look up a project by identifier.
    pub fn project(&self, identifier: &str) -> Option<&Project> {
        self.by_identifier.get(identifier)
    }

    /// All known projects, ordered by identifier.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.by_identifier.values()
    }

    /// Resolve `rulesets` for a build of `current_branch`.
    ///
    /// Rulesets not applying to the active flavor are skipped. When the same
    /// identifier is required more than once, the last requirement wins.
    pub fn resolve(
        &self,
        rulesets: &[DependencyRuleset],
        current_branch: Option<&Branch>,
    ) -> ResolvedDependencies {
        let mut resolved = ResolvedDependencies::new();

        for ruleset in rulesets.iter().filter(|r| self.flavor.matches(&r.on)) {
            for (requirement, spec) in &ruleset.require {
                for project in self.matching_projects(requirement) {
                    let branch = self.resolve_spec(project, spec, current_branch);
                    tracing::debug!(
                        "{requirement} ({spec}) -> {} @ {branch}",
                        project.identifier
                    );
                    resolved.insert(project.identifier.clone(), branch);
                }
            }
        }

        resolved
    }

    fn matching_projects<'a>(&'a self, requirement: &'a str) -> impl Iterator<Item = &'a Project> {
        let pattern = Pattern::new(requirement).ok();
        self.by_path
            .iter()
            .filter(move |(path, _)| glob_matches(pattern.as_ref(), requirement, path))
            .map(|(_, project)| project)
    }

    /// Branch of `dependency` requested by `spec`.
    pub fn resolve_spec(
        &self,
        dependency: &Project,
        spec: &BranchSpec,
        current_branch: Option<&Branch>,
    ) -> Branch {
        match spec {
            BranchSpec::Literal(branch) => branch.clone(),
            BranchSpec::Same => self.same_branch.resolve(current_branch),
            BranchSpec::Magic(name) => self.resolve_magic(dependency, name),
        }
    }

    fn resolve_magic(&self, dependency: &Project, name: &str) -> Branch {
        let Some(rule) = self.rules.rule(name) else {
            return Branch::new(name);
        };

        if let Some((_, branch)) = rule.iter().find(|(path, _)| *path == dependency.repopath) {
            return branch.clone();
        }

        rule.iter()
            .find(|(glob, _)| glob_matches(Pattern::new(glob).ok().as_ref(), glob, &dependency.repopath))
            .map_or_else(|| Branch::new(name), |(_, branch)| branch.clone())
    }

    /// Map each dependency of the `ext_*` projects below `working_dir` to its dependents.
    ///
    /// Only directories up to two levels deep are considered; a directory
    /// with a `CMakeLists.txt` is a project and is not descended into. When
    /// `allow` is given, projects and dependencies outside it are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be walked or a project
    /// configuration fails to load.
    pub fn reverse_dependencies(
        &self,
        working_dir: &Path,
        branch: Option<&Branch>,
        loader: &ConfigLoader,
        allow: Option<&BTreeSet<ProjectId>>,
    ) -> Result<ReverseDependencies, ResolverError> {
        let allowed = |name: &str| allow.is_none_or(|set| set.contains(name));
        let mut reverse = ReverseDependencies::new();

        let mut walker = WalkDir::new(working_dir)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || (e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with("ext_"))
            });

        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| ResolverError::Walk(working_dir.to_path_buf(), e))?;
            if entry.depth() == 0 {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !allowed(&name) || !entry.path().join("CMakeLists.txt").exists() {
                continue;
            }

            let configuration = loader.load(entry.path(), &name)?;
            let dependencies: Vec<ProjectId> = self
                .resolve(&configuration.dependencies, branch)
                .into_keys()
                .filter(|dep| allowed(dep))
                .collect();
            tracing::debug!("{name} depends on {dependencies:?}");

            for dependency in dependencies {
                reverse
                    .entry(dependency)
                    .or_default()
                    .insert(ProjectId::new(&name));
            }
            walker.skip_current_dir();
        }

        Ok(reverse)
    }
}

/// fnmatch-style match; `*` crosses `/`. Invalid patterns only match themselves.
fn glob_matches(pattern: Option<&Pattern>, raw: &str, candidate: &str) -> bool {
    pattern.map_or(raw == candidate, |p| p.matches(candidate))
}

fn read(path: &Path) -> Result<String, ResolverError> {
    std::fs::read_to_string(path).map_err(|source| ResolverError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_projects(metadata_dir: &Path) -> Result<Vec<Project>, ResolverError> {
    let mut projects = Vec::new();

    for entry in WalkDir::new(metadata_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| ResolverError::Walk(metadata_dir.to_path_buf(), e))?;
        if !entry.file_type().is_file() || entry.file_name() != METADATA_FILE {
            continue;
        }

        let content = read(entry.path())?;
        let project = Project::from_yaml(&content).map_err(|source| ResolverError::Yaml {
            path: entry.path().to_path_buf(),
            source,
        })?;
        projects.push(project);
    }

    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(identifier: &str, repopath: &str) -> Project {
        Project {
            identifier: ProjectId::new(identifier),
            repopath: repopath.to_string(),
            hasrepo: true,
            reuse_directory: None,
        }
    }

    fn projects() -> Vec<Project> {
        vec![
            project("kcoreaddons", "frameworks/kcoreaddons"),
            project("ki18n", "frameworks/ki18n"),
            project("kio", "frameworks/kio"),
            project("dolphin", "system/dolphin"),
        ]
    }

    fn resolver(refs: RefEnvironment) -> BranchResolver {
        let rules = BranchRuleTable::from_yaml(
            "'@stable':\n  frameworks/kio: '5.115'\n  frameworks/*: '5.116'\n  system/*: '24.02'\n",
        )
        .unwrap();
        // Point ancestry searches at a directory that is not a repository
        let nowhere = std::env::temp_dir().join("cibuild-no-such-repository");
        BranchResolver::new(
            projects(),
            rules,
            "Linux/Qt6".parse().unwrap(),
            refs,
            nowhere,
        )
    }

    #[test]
    fn test_protected_same_branch_for_glob() {
        let resolver = resolver(RefEnvironment::protected());
        let rulesets = [DependencyRuleset::new(&["@all"], &[("frameworks/*", "@same")])];

        let resolved = resolver.resolve(&rulesets, Some(&Branch::new("master")));
        assert_eq!(resolved.len(), 3);
        assert!(resolved.values().all(|b| *b == "master"));
        // The ancestry search never ran
        assert!(resolver.same_branch.ancestor.get().is_none());
    }

    #[test]
    fn test_merge_request_target_is_used() {
        let refs = RefEnvironment {
            protected: false,
            merge_request_target: Some(Branch::new("5.3")),
        };
        let resolver = resolver(refs);
        let rulesets = [DependencyRuleset::new(&["Linux"], &[("frameworks/kio", "@same")])];

        let resolved = resolver.resolve(&rulesets, Some(&Branch::new("work/fix")));
        assert_eq!(resolved["kio"], "5.3");
    }

    #[test]
    fn test_same_branch_without_repository_falls_back_to_master() {
        let resolver = resolver(RefEnvironment::default());
        let branch = resolver.resolve_spec(
            &project("kio", "frameworks/kio"),
            &BranchSpec::Same,
            Some(&Branch::new("work/fix")),
        );
        assert_eq!(branch, "master");
    }

    #[test]
    fn test_later_ruleset_wins() {
        let resolver = resolver(RefEnvironment::protected());
        let rulesets = [
            DependencyRuleset::new(&["@all"], &[("frameworks/kio", "master")]),
            DependencyRuleset::new(&["Linux/Qt6"], &[("frameworks/kio", "5.3")]),
        ];
        let resolved = resolver.resolve(&rulesets, None);
        assert_eq!(resolved["kio"], "5.3");
    }

    #[test]
    fn test_rulesets_for_other_flavors_are_skipped() {
        let resolver = resolver(RefEnvironment::protected());
        let rulesets = [
            DependencyRuleset::new(&["Windows"], &[("frameworks/*", "master")]),
            DependencyRuleset::new(&["Linux/Qt6/static"], &[("system/*", "master")]),
        ];
        assert!(resolver.resolve(&rulesets, None).is_empty());
    }

    #[test]
    fn test_magic_rules() {
        let resolver = resolver(RefEnvironment::protected());
        let rulesets = [DependencyRuleset::new(
            &["@all"],
            &[("*", "@stable"), ("frameworks/ki18n", "@unknown")],
        )];
        let resolved = resolver.resolve(&rulesets, None);

        // Exact entry beats the earlier glob
        assert_eq!(resolved["kio"], "5.115");
        assert_eq!(resolved["kcoreaddons"], "5.116");
        assert_eq!(resolved["dolphin"], "24.02");
        // Unknown rules pass through literally
        assert_eq!(resolved["ki18n"], "@unknown");
    }

    #[test]
    fn test_magic_rule_without_match_is_literal() {
        let mut rules = BranchRuleTable::default();
        rules.insert("@lts", vec![("frameworks/*".to_string(), Branch::new("5.116"))]);
        let resolver = BranchResolver::new(
            projects(),
            rules,
            "Linux".parse().unwrap(),
            RefEnvironment::protected(),
            ".",
        );
        let branch = resolver.resolve_spec(
            &project("dolphin", "system/dolphin"),
            &BranchSpec::parse("@lts"),
            None,
        );
        assert_eq!(branch, "@lts");
    }

    #[test]
    fn test_glob_star_crosses_slashes() {
        let resolver = resolver(RefEnvironment::protected());
        let rulesets = [DependencyRuleset::new(&["@all"], &[("*", "master")])];
        assert_eq!(resolver.resolve(&rulesets, None).len(), 4);
    }

    #[test]
    fn test_load_metadata_tree() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("projects");
        for (id, path) in [("kio", "frameworks/kio"), ("dolphin", "system/dolphin")] {
            let folder = tree.join(path);
            fs::create_dir_all(&folder).unwrap();
            fs::write(
                folder.join(METADATA_FILE),
                format!("identifier: {id}\nrepopath: {path}\nhasrepo: true\n"),
            )
            .unwrap();
        }
        let rules_file = dir.path().join("branch-rules.yml");
        fs::write(&rules_file, "'@stable':\n  '*': '24.02'\n").unwrap();

        let resolver = BranchResolver::load(
            &tree,
            &rules_file,
            "Linux".parse().unwrap(),
            RefEnvironment::protected(),
            dir.path(),
        )
        .unwrap();

        assert_eq!(resolver.projects().count(), 2);
        assert_eq!(resolver.project("kio").unwrap().repopath, "frameworks/kio");
    }

    #[test]
    fn test_reverse_dependencies() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("global.yml"), "{}\n").unwrap();

        let work = dir.path().join("work");
        let write_project = |rel: &str, deps: &str| {
            let root = work.join(rel);
            fs::create_dir_all(&root).unwrap();
            fs::write(root.join("CMakeLists.txt"), "").unwrap();
            fs::write(
                root.join(".ci.yml"),
                format!("Dependencies:\n  - on: ['@all']\n    require:\n{deps}"),
            )
            .unwrap();
        };
        write_project("ext_kio", "      frameworks/kcoreaddons: master\n      frameworks/ki18n: master\n");
        write_project("ext_group/ext_dolphin", "      frameworks/kio: master\n");
        // Not an ext_ directory, never looked at
        write_project("other", "      frameworks/kio: master\n");

        let resolver = resolver(RefEnvironment::protected());
        let loader = ConfigLoader::new(&config_dir);
        let reverse = resolver
            .reverse_dependencies(&work, None, &loader, None)
            .unwrap();

        assert_eq!(reverse["kcoreaddons"], BTreeSet::from([ProjectId::new("ext_kio")]));
        assert_eq!(reverse["kio"], BTreeSet::from([ProjectId::new("ext_dolphin")]));
        assert!(!reverse.values().any(|d| d.contains("other")));

        let allow = BTreeSet::from([ProjectId::new("ext_kio"), ProjectId::new("ki18n")]);
        let filtered = resolver
            .reverse_dependencies(&work, None, &loader, Some(&allow))
            .unwrap();
        assert_eq!(filtered.keys().collect::<Vec<_>>(), [&ProjectId::new("ki18n")]);
    }
}
