use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use glob::{MatchOptions, Pattern};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::comparer::hash::sidecar_owner;
use crate::comparer::{LocalMap, RemoteMap};
use crate::config::WalkerConfig;
use crate::storage::local::fs_util;
use crate::types::LocalEntry;
use crate::types::error::S3mirrorError;
use crate::types::token::PipelineCancellationToken;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One line of an ignore file.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: Pattern,
    // directory holding the ignore file, relative to the walk root, without a trailing '/'
    base: String,
    anchored: bool,
    directory_only: bool,
}

impl IgnoreRule {
    pub fn parse(line: &str, base: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let directory_only = line.ends_with('/');
        let line = line.trim_end_matches('/');
        let anchored = line.contains('/');
        let line = line.trim_start_matches('/');
        if line.is_empty() {
            return None;
        }

        match Pattern::new(line) {
            Ok(pattern) => Some(Self {
                pattern,
                base: base.to_string(),
                anchored,
                directory_only,
            }),
            Err(e) => {
                warn!(pattern = line, error = e.to_string(), "invalid ignore pattern.");
                None
            }
        }
    }

    /// `relative_path` is relative to the walk root, without a trailing '/'.
    pub fn is_match(&self, relative_path: &str, is_directory: bool) -> bool {
        if self.directory_only && !is_directory {
            return false;
        }

        let path_from_base = if self.base.is_empty() {
            relative_path
        } else {
            match relative_path
                .strip_prefix(self.base.as_str())
                .and_then(|path| path.strip_prefix('/'))
            {
                Some(path) => path,
                None => return false,
            }
        };

        if self.anchored {
            return self.pattern.matches_with(path_from_base, MATCH_OPTIONS);
        }

        let name = path_from_base.rsplit('/').next().unwrap_or(path_from_base);
        self.pattern.matches_with(name, MATCH_OPTIONS)
    }
}

pub fn parse_ignore_file(content: &str, base: &str) -> Vec<IgnoreRule> {
    content
        .lines()
        .filter_map(|line| IgnoreRule::parse(line, base))
        .collect()
}

#[derive(Clone)]
pub struct LocalFileWalker {
    config: WalkerConfig,
    cancellation_token: PipelineCancellationToken,
}

impl LocalFileWalker {
    pub fn new(config: WalkerConfig, cancellation_token: PipelineCancellationToken) -> Self {
        Self {
            config,
            cancellation_token,
        }
    }

    /// Walks every root. With one root, paths are relative to it. With
    /// several, each path is prefixed by its root's name.
    pub fn walk(&self, roots: &[PathBuf]) -> Result<Vec<LocalEntry>> {
        let mut entries = Vec::new();
        let prefix_with_root_name = 1 < roots.len();

        for root in roots {
            let prefix = if prefix_with_root_name {
                root.file_name()
                    .map(|name| format!("{}/", name.to_string_lossy()))
                    .unwrap_or_default()
            } else {
                String::new()
            };
            self.walk_root(root, &prefix, &mut entries)?;
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn walk_root(&self, root: &Path, prefix: &str, entries: &mut Vec<LocalEntry>) -> Result<()> {
        if root.is_file() {
            let name = root
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            entries.push(build_entry(root, &format!("{prefix}{name}"), false)?);
            return Ok(());
        }

        if !root.is_dir() {
            debug!(
                path = root.to_string_lossy().to_string(),
                "walk root does not exist."
            );
            return Ok(());
        }

        // (depth of the directory that owns the rules, rules)
        let mut rule_stack: Vec<(usize, Vec<IgnoreRule>)> = vec![(0, self.load_rules(root, ""))];

        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            if self.cancellation_token.is_cancelled() {
                trace!("walk() cancelled.");
                return Err(anyhow!(S3mirrorError::Interrupted));
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if let Some(inner) = e.io_error() {
                        if inner.kind() == io::ErrorKind::NotFound {
                            continue;
                        }
                    }
                    let path = e
                        .path()
                        .unwrap_or_else(|| Path::new(""))
                        .to_string_lossy()
                        .to_string();
                    return Err(anyhow!(S3mirrorError::IoFailure {
                        path,
                        message: e.to_string(),
                    }));
                }
            };

            let depth = entry.depth();
            while rule_stack.last().is_some_and(|(owner, _)| depth <= *owner) {
                rule_stack.pop();
            }

            let Some(relative_path) = fs_util::relative_key(root, entry.path()) else {
                continue;
            };
            let file_type = entry.file_type();
            let is_directory = file_type.is_dir();

            if !is_directory && !file_type.is_file() {
                debug!(path = relative_path, "skip non regular file.");
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if !is_directory && self.is_walker_file(&file_name, entry.path()) {
                continue;
            }

            let ignored = rule_stack
                .iter()
                .flat_map(|(_, rules)| rules.iter())
                .any(|rule| rule.is_match(&relative_path, is_directory));
            if ignored {
                trace!(path = relative_path, "ignored.");
                if is_directory {
                    walker.skip_current_dir();
                }
                continue;
            }

            if is_directory {
                rule_stack.push((depth, self.load_rules(entry.path(), &relative_path)));
                entries.push(build_entry(
                    entry.path(),
                    &format!("{prefix}{relative_path}/"),
                    true,
                )?);
            } else {
                entries.push(build_entry(
                    entry.path(),
                    &format!("{prefix}{relative_path}"),
                    false,
                )?);
            }
        }

        Ok(())
    }

    // ignore files, and sidecars whose file exists next to them
    fn is_walker_file(&self, file_name: &str, path: &Path) -> bool {
        if file_name == self.config.ignore_file_name {
            return true;
        }

        self.config.sidecar_hashes
            && sidecar_owner(file_name).is_some_and(|owner| path.with_file_name(owner).is_file())
    }

    /// Removes the remote entries a walk of `root` would never report, so they
    /// are neither deleted nor transferred over their local counterparts.
    /// Rules are read from the local tree, one ignore file per directory.
    pub fn retain_walkable(&self, root: &Path, local: &LocalMap, remote: &mut RemoteMap) {
        let mut rules_by_directory = HashMap::new();

        let listed: &RemoteMap = remote;
        let excluded: Vec<String> = listed
            .values()
            .filter(|entry| {
                self.is_excluded_key(
                    root,
                    &entry.key,
                    entry.is_directory,
                    local,
                    listed,
                    &mut rules_by_directory,
                )
            })
            .map(|entry| entry.key.clone())
            .collect();

        for key in excluded {
            trace!(key = key, "remote entry excluded.");
            remote.remove(&key);
        }
    }

    fn is_excluded_key(
        &self,
        root: &Path,
        key: &str,
        is_directory: bool,
        local: &LocalMap,
        remote: &RemoteMap,
        rules_by_directory: &mut HashMap<String, Vec<IgnoreRule>>,
    ) -> bool {
        let path = key.trim_end_matches('/');
        let components: Vec<&str> = path.split('/').collect();
        let name = components.last().copied().unwrap_or_default();

        if !is_directory {
            if name == self.config.ignore_file_name {
                return true;
            }

            let is_sidecar = self.config.sidecar_hashes
                && sidecar_owner(path).is_some_and(|owner| {
                    local.get(owner).is_some_and(|entry| !entry.is_directory)
                        || remote.get(owner).is_some_and(|entry| !entry.is_directory)
                });
            if is_sidecar {
                return true;
            }
        }

        for depth in 0..components.len() {
            let directory = components[..depth].join("/");
            if !rules_by_directory.contains_key(&directory) {
                let local_directory = fs_util::key_to_file_path(root, &directory);
                let rules = if local_directory.is_dir() {
                    self.load_rules(&local_directory, &directory)
                } else {
                    Vec::new()
                };
                rules_by_directory.insert(directory, rules);
            }
        }

        // an ignored directory hides everything below it
        (0..components.len()).any(|depth| {
            let candidate = components[..=depth].join("/");
            let candidate_is_directory = depth + 1 < components.len() || is_directory;

            (0..=depth).any(|owner_depth| {
                rules_by_directory
                    .get(&components[..owner_depth].join("/"))
                    .is_some_and(|rules| {
                        rules
                            .iter()
                            .any(|rule| rule.is_match(&candidate, candidate_is_directory))
                    })
            })
        })
    }

    fn load_rules(&self, directory: &Path, base: &str) -> Vec<IgnoreRule> {
        let ignore_file = directory.join(&self.config.ignore_file_name);
        match std::fs::read_to_string(&ignore_file) {
            Ok(content) => {
                let rules = parse_ignore_file(&content, base);
                debug!(
                    ignore_file = ignore_file.to_string_lossy().to_string(),
                    rules = rules.len(),
                    "ignore file loaded."
                );
                rules
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(
                        ignore_file = ignore_file.to_string_lossy().to_string(),
                        error = e.to_string(),
                        "failed to read ignore file."
                    );
                }
                Vec::new()
            }
        }
    }
}

fn build_entry(path: &Path, relative_path: &str, is_directory: bool) -> Result<LocalEntry> {
    let metadata = std::fs::metadata(path).map_err(|e| S3mirrorError::IoFailure {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })?;
    let last_modified = metadata
        .modified()
        .map(fs_util::system_time_to_utc)
        .map_err(|e| S3mirrorError::IoFailure {
            path: path.to_string_lossy().to_string(),
            message: e.to_string(),
        })?;

    Ok(LocalEntry {
        path: relative_path.to_string(),
        absolute_path: path.to_path_buf(),
        is_directory,
        size_bytes: if is_directory { 0 } else { metadata.len() },
        last_modified,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::types::{DEFAULT_IGNORE_FILE_NAME, RemoteEntry};
    use crate::types::token::create_pipeline_cancellation_token;

    use super::*;

    fn walk(root: &Path, config: WalkerConfig) -> Vec<String> {
        LocalFileWalker::new(config, create_pipeline_cancellation_token())
            .walk(&[root.to_path_buf()])
            .unwrap()
            .into_iter()
            .map(|entry| entry.path)
            .collect()
    }

    #[test]
    fn rule_parsing() {
        init_dummy_tracing_subscriber();

        assert!(IgnoreRule::parse("", "").is_none());
        assert!(IgnoreRule::parse("   ", "").is_none());
        assert!(IgnoreRule::parse("# comment", "").is_none());
        assert!(IgnoreRule::parse("/", "").is_none());

        let rule = IgnoreRule::parse("*.log", "").unwrap();
        assert!(rule.is_match("a.log", false));
        assert!(rule.is_match("dir/sub/a.log", false));
        assert!(!rule.is_match("a.txt", false));

        let rule = IgnoreRule::parse("build/", "").unwrap();
        assert!(rule.is_match("build", true));
        assert!(rule.is_match("src/build", true));
        assert!(!rule.is_match("build", false));

        let rule = IgnoreRule::parse("?.tmp", "").unwrap();
        assert!(rule.is_match("a.tmp", false));
        assert!(!rule.is_match("ab.tmp", false));
    }

    #[test]
    fn anchored_and_recursive_rules() {
        init_dummy_tracing_subscriber();

        let rule = IgnoreRule::parse("docs/*.md", "").unwrap();
        assert!(rule.is_match("docs/a.md", false));
        assert!(!rule.is_match("docs/sub/a.md", false));
        assert!(!rule.is_match("other/docs/a.md", false));

        let rule = IgnoreRule::parse("**/cache/*.bin", "").unwrap();
        assert!(rule.is_match("cache/a.bin", false));
        assert!(rule.is_match("x/y/cache/a.bin", false));
        assert!(!rule.is_match("x/cache/sub/a.bin", false));

        let rule = IgnoreRule::parse("/top.txt", "sub").unwrap();
        assert!(rule.is_match("sub/top.txt", false));
        assert!(!rule.is_match("top.txt", false));
        assert!(!rule.is_match("sub/deeper/top.txt", false));
    }

    #[test]
    fn walk_directory_tree() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dir1").join("dir2")).unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("dir1").join("b.txt"), b"bb").unwrap();
        fs::write(dir.path().join("dir1").join("dir2").join("c.txt"), b"ccc").unwrap();

        let entries =
            LocalFileWalker::new(WalkerConfig::default(), create_pipeline_cancellation_token())
                .walk(&[dir.path().to_path_buf()])
                .unwrap();

        let paths: Vec<&str> = entries.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["a.txt", "dir1/", "dir1/b.txt", "dir1/dir2/", "dir1/dir2/c.txt"]
        );
        assert_eq!(entries[2].size_bytes, 2);
        assert!(entries[1].is_directory);
        assert_eq!(entries[1].size_bytes, 0);
        assert_eq!(entries[4].absolute_path, dir.path().join("dir1").join("dir2").join("c.txt"));
    }

    #[test]
    fn walk_with_inherited_ignore_rules() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src").join("target")).unwrap();
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        fs::write(
            dir.path().join(DEFAULT_IGNORE_FILE_NAME),
            "# comment\n\n*.log\nlogs/\n",
        )
        .unwrap();
        fs::write(dir.path().join("src").join(DEFAULT_IGNORE_FILE_NAME), "target/\n").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("a.log"), b"a").unwrap();
        fs::write(dir.path().join("logs").join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("src").join("main.rs"), b"fn main() {}").unwrap();
        fs::write(dir.path().join("src").join("debug.log"), b"log").unwrap();
        fs::write(dir.path().join("src").join("target").join("bin"), b"bin").unwrap();

        assert_eq!(
            walk(dir.path(), WalkerConfig::default()),
            vec!["a.txt", "src/", "src/main.rs"]
        );
    }

    #[test]
    fn sibling_rules_do_not_leak() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a").join(DEFAULT_IGNORE_FILE_NAME), "*.txt\n").unwrap();
        fs::write(dir.path().join("a").join("x.txt"), b"x").unwrap();
        fs::write(dir.path().join("b").join("y.txt"), b"y").unwrap();

        assert_eq!(
            walk(dir.path(), WalkerConfig::default()),
            vec!["a/", "b/", "b/y.txt"]
        );
    }

    #[test]
    fn sidecars_are_skipped_only_when_enabled() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("a.txt.md5"), b"0cc175b9c0f1b6a831c399e269772661").unwrap();
        fs::write(dir.path().join("release.md5"), b"checksums").unwrap();
        fs::write(dir.path().join(DEFAULT_IGNORE_FILE_NAME), b"# nothing\n").unwrap();

        assert_eq!(
            walk(dir.path(), WalkerConfig::default()),
            vec!["a.txt", "a.txt.md5", "release.md5"]
        );

        let config = WalkerConfig {
            sidecar_hashes: true,
            ..Default::default()
        };
        assert_eq!(walk(dir.path(), config), vec!["a.txt", "release.md5"]);
    }

    #[test]
    fn remote_entries_follow_local_filters() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join(DEFAULT_IGNORE_FILE_NAME), "*.log\nbuild/\n").unwrap();
        fs::write(dir.path().join("sub").join(DEFAULT_IGNORE_FILE_NAME), "secret.txt\n").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let config = WalkerConfig {
            sidecar_hashes: true,
            ..Default::default()
        };
        let walker = LocalFileWalker::new(config, create_pipeline_cancellation_token());
        let local: LocalMap = walker
            .walk(&[dir.path().to_path_buf()])
            .unwrap()
            .into_iter()
            .map(|entry| (entry.path.clone(), entry))
            .collect();

        let mut remote: RemoteMap = [
            "a.txt",
            "a.txt.md5",
            "app.log",
            "build/",
            "build/out.bin",
            "other/",
            "other/secret.txt",
            "release.md5",
            "sub/",
            "sub/.s3mirror-ignore",
            "sub/public.txt",
            "sub/secret.txt",
        ]
        .into_iter()
        .map(|key| (key.to_string(), RemoteEntry::new(key, 1, None, None, None)))
        .collect();

        walker.retain_walkable(dir.path(), &local, &mut remote);

        assert_eq!(
            remote.keys().map(String::as_str).collect::<Vec<_>>(),
            vec![
                "a.txt",
                "other/",
                "other/secret.txt",
                "release.md5",
                "sub/",
                "sub/public.txt"
            ]
        );
    }

    #[test]
    fn walk_multiple_roots_and_file_root() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("one")).unwrap();
        fs::create_dir_all(dir.path().join("two")).unwrap();
        fs::write(dir.path().join("one").join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("two").join("b.txt"), b"b").unwrap();

        let walker =
            LocalFileWalker::new(WalkerConfig::default(), create_pipeline_cancellation_token());
        let paths: Vec<String> = walker
            .walk(&[dir.path().join("one"), dir.path().join("two")])
            .unwrap()
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        assert_eq!(paths, vec!["one/a.txt", "two/b.txt"]);

        let paths: Vec<String> = walker
            .walk(&[dir.path().join("one").join("a.txt")])
            .unwrap()
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        assert_eq!(paths, vec!["a.txt"]);
    }

    #[test]
    fn walk_missing_root() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        assert!(walk(&dir.path().join("missing"), WalkerConfig::default()).is_empty());
    }

    #[test]
    fn walk_cancelled() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let token = create_pipeline_cancellation_token();
        token.cancel();
        let e = LocalFileWalker::new(WalkerConfig::default(), token)
            .walk(&[dir.path().to_path_buf()])
            .unwrap_err();

        assert!(crate::types::error::is_interrupted_error(&e));
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
