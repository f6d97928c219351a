//! Route tree compiled from a handler file tree.
//!
//! Every directory level maps normalized names to either a sub-directory or a
//! handler file, and remembers the single templated (`{name}`) entry it may
//! hold. The tree is validated while it is built: a second templated entry at
//! one level, or a file and a directory normalizing to the same name, fails
//! the build with [`RouteError::Conflict`], so no request can ever match an
//! ambiguous target.
//!
//! Matching is greedy and never backtracks. For every segment but the last
//! only directories are considered (exact name first, then the templated
//! one). The last segment tries, in order:
//!
//! 1. an exact directory, served by its index file
//! 2. an exact file
//! 3. the templated directory (served by its index) or templated file
//! 4. the level's `index` file, but only when a templated segment was
//!    consumed earlier
//!
//! A directory's index is its `index` file, falling back to a file named like
//! the directory itself (`users/users.js`, `{id}/{id}.js`).

use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use super::pattern::{is_template, FilePattern};
use crate::error::RouteError;

const INDEX: &str = "index";

/// A handler file in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    /// File path relative to the scan base, `/`-separated
    pub import_path: String,
    /// Index of the naming convention that matched; lower wins
    pub rank: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Dir(Level),
    File(Leaf),
}

#[derive(Debug, Clone, Default)]
struct Level {
    entries: BTreeMap<String, Node>,
    dynamic: Option<String>,
}

impl Level {
    fn file(&self, name: &str) -> Option<&Leaf> {
        match self.entries.get(name) {
            Some(Node::File(leaf)) => Some(leaf),
            _ => None,
        }
    }

    fn dir(&self, name: &str) -> Option<&Level> {
        match self.entries.get(name) {
            Some(Node::Dir(level)) => Some(level),
            _ => None,
        }
    }

    /// Index of this level when it is reached as directory `own_name`.
    fn index(&self, own_name: &str) -> Option<&Leaf> {
        self.file(INDEX).or_else(|| self.file(own_name))
    }

    fn claim_dynamic(&mut self, name: &str, location: &str) -> Result<(), RouteError> {
        if !is_template(name) {
            return Ok(());
        }
        match &self.dynamic {
            Some(existing) if existing != name => Err(RouteError::conflict(
                location,
                "more than one templated segment at the same level",
                [existing.as_str(), name],
            )),
            Some(_) => Ok(()),
            None => {
                self.dynamic = Some(name.to_string());
                Ok(())
            }
        }
    }

    fn collect_routes(&self, prefix: &str, own_name: Option<&str>, out: &mut Vec<(String, String)>) {
        for (name, node) in &self.entries {
            match node {
                Node::Dir(level) => {
                    level.collect_routes(&format!("{prefix}/{name}"), Some(name.as_str()), out);
                }
                Node::File(leaf) => {
                    // a self-named file serves the directory only when it has no index
                    let serves_dir = name == INDEX
                        || (Some(name.as_str()) == own_name && self.file(INDEX).is_none());
                    let route = if serves_dir {
                        if prefix.is_empty() { "/".to_string() } else { prefix.to_string() }
                    } else {
                        format!("{prefix}/{name}")
                    };
                    out.push((route, leaf.import_path.clone()));
                }
            }
        }
    }

    fn count_leaves(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                Node::Dir(level) => level.count_leaves(),
                Node::File(_) => 1,
            })
            .sum()
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
        for node in self.entries.values() {
            match node {
                Node::Dir(level) => level.collect_leaves(out),
                Node::File(leaf) => out.push(leaf),
            }
        }
    }
}

/// Result of a successful tree lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeMatch {
    pub import_path: String,
    /// A templated segment was consumed on the way
    pub has_path_params: bool,
    /// Route template of the matched segments, e.g. `/users/{id}`
    pub template: String,
}

/// Compiled, validated route tree.
#[derive(Debug, Clone, Default)]
pub struct RouteTree {
    root: Level,
}

impl RouteTree {
    /// Build a tree from relative file paths.
    pub fn build<I, S>(pattern: &FilePattern, files: I, index_only: bool) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = TreeBuilder::new(pattern.clone());
        builder.index_only = index_only;
        for file in files {
            builder.insert(file.as_ref())?;
        }
        Ok(builder.finish())
    }

    /// Number of handler files.
    pub fn len(&self) -> usize {
        self.root.count_leaves()
    }

    pub fn is_empty(&self) -> bool {
        self.root.entries.is_empty()
    }

    /// Every handler file, in tree order.
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.root.collect_leaves(&mut out);
        out
    }

    /// `(route template, import path)` for every routable file, sorted by route.
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.root.collect_routes("", None, &mut out);
        out.sort();
        out
    }

    /// Match request segments against the tree.
    pub fn find(&self, segments: &[&str]) -> Result<TreeMatch, RouteError> {
        let not_found = || RouteError::not_found(format!("/{}", segments.join("/")));

        let Some((last, parents)) = segments.split_last() else {
            return self
                .root
                .file(INDEX)
                .map(|leaf| TreeMatch {
                    import_path: leaf.import_path.clone(),
                    has_path_params: false,
                    template: "/".to_string(),
                })
                .ok_or_else(not_found);
        };

        let mut level = &self.root;
        let mut own_name: Option<&str> = None;
        let mut dynamic = false;
        let mut template: SmallVec<[&str; 8]> = SmallVec::new();

        for segment in parents {
            if let Some(next) = level.dir(segment) {
                template.push(*segment);
                own_name = Some(*segment);
                level = next;
                continue;
            }
            match level.dynamic.as_deref().and_then(|name| Some((name, level.dir(name)?))) {
                Some((name, next)) => {
                    template.push(name);
                    own_name = Some(name);
                    dynamic = true;
                    level = next;
                }
                None => return Err(not_found()),
            }
        }

        if let Some(leaf) = level.dir(last).and_then(|dir| dir.index(last)) {
            return Ok(matched(leaf, &template, Some(*last), dynamic));
        }
        // a self-named file standing in for the index serves only its directory
        let serves_dir =
            |name: &str| own_name.is_some_and(|own| own == name) && level.file(INDEX).is_none();
        if let Some(leaf) = level
            .file(last)
            .filter(|_| *last != INDEX && !serves_dir(*last))
        {
            return Ok(matched(leaf, &template, Some(*last), dynamic));
        }
        if let Some(name) = level.dynamic.as_deref() {
            let leaf = match level.entries.get(name) {
                Some(Node::Dir(dir)) => dir.index(name),
                Some(Node::File(leaf)) if !serves_dir(name) => Some(leaf),
                _ => None,
            };
            if let Some(leaf) = leaf {
                return Ok(matched(leaf, &template, Some(name), true));
            }
        }
        if dynamic {
            if let Some(leaf) = level.file(INDEX) {
                debug!(segment = %last, import_path = %leaf.import_path, "Falling back to index after templated segment");
                return Ok(matched(leaf, &template, None, dynamic));
            }
        }
        Err(not_found())
    }
}

fn matched(leaf: &Leaf, template: &[&str], tail: Option<&str>, has_path_params: bool) -> TreeMatch {
    let mut route = String::new();
    for part in template.iter().copied().chain(tail) {
        route.push('/');
        route.push_str(part);
    }
    if route.is_empty() {
        route.push('/');
    }
    TreeMatch {
        import_path: leaf.import_path.clone(),
        has_path_params,
        template: route,
    }
}

/// Incremental tree construction with conflict detection.
#[derive(Debug)]
pub struct TreeBuilder {
    pattern: FilePattern,
    root: Level,
    /// Only accept files normalizing to `index` or to their directory's name
    pub index_only: bool,
}

impl TreeBuilder {
    pub fn new(pattern: FilePattern) -> Self {
        Self {
            pattern,
            root: Level::default(),
            index_only: false,
        }
    }

    /// Insert one file, given relative to the pattern base. Returns whether
    /// the file became a route.
    pub fn insert(&mut self, relative_path: &str) -> Result<bool, RouteError> {
        let components: SmallVec<[&str; 8]> = relative_path
            .split(['/', '\\'])
            .filter(|c| !c.is_empty())
            .collect();
        let Some((file_name, dirs)) = components.split_last() else {
            return Ok(false);
        };
        let Some((name, rank)) = self.pattern.normalize(file_name) else {
            return Ok(false);
        };
        if self.index_only && name != INDEX && dirs.last() != Some(&name.as_str()) {
            debug!(file = %relative_path, "Skipping file that is neither index nor named after its directory");
            return Ok(false);
        }

        let mut location = String::from("/");
        let mut level = &mut self.root;
        for dir in dirs {
            level.claim_dynamic(dir, &location)?;
            let node = level
                .entries
                .entry((*dir).to_string())
                .or_insert_with(|| Node::Dir(Level::default()));
            level = match node {
                Node::Dir(next) => next,
                Node::File(existing) => {
                    return Err(RouteError::conflict(
                        &location,
                        "a file and a directory share the same name",
                        [existing.import_path.as_str(), relative_path],
                    ))
                }
            };
            if !location.ends_with('/') {
                location.push('/');
            }
            location.push_str(dir);
        }

        level.claim_dynamic(&name, &location)?;
        let leaf = Leaf {
            import_path: components.join("/"),
            rank,
        };
        match level.entries.get_mut(&name) {
            None => {
                level.entries.insert(name, Node::File(leaf));
                Ok(true)
            }
            Some(Node::Dir(_)) => Err(RouteError::conflict(
                &location,
                "a file and a directory share the same name",
                [name.as_str(), relative_path],
            )),
            Some(Node::File(existing)) => {
                if leaf.rank < existing.rank {
                    debug!(kept = %leaf.import_path, dropped = %existing.import_path, "Preferring earlier naming convention");
                    *existing = leaf;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    pub fn finish(self) -> RouteTree {
        RouteTree { root: self.root }
    }
}

/// List files under `base` as sorted, `/`-separated relative paths.
pub fn scan(base: &Path, recursive: bool) -> Result<Vec<String>, RouteError> {
    let scan_failed = |reason: String| RouteError::ScanFailed {
        path: base.display().to_string(),
        reason,
    };

    let mut walker = WalkDir::new(base).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| scan_failed(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|e| scan_failed(e.to_string()))?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js() -> FilePattern {
        FilePattern::parse("api/**/*.js").unwrap()
    }

    fn tree(files: &[&str]) -> RouteTree {
        RouteTree::build(&js(), files.iter().copied(), false).unwrap()
    }

    fn find(tree: &RouteTree, path: &str) -> Result<TreeMatch, RouteError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        tree.find(&segments)
    }

    #[test]
    fn test_templated_directory_index() {
        let t = tree(&["users/{id}/index.js", "users/index.js"]);
        let m = find(&t, "/users/42").unwrap();
        assert_eq!(m.import_path, "users/{id}/index.js");
        assert!(m.has_path_params);
        assert_eq!(m.template, "/users/{id}");

        let m = find(&t, "/users").unwrap();
        assert_eq!(m.import_path, "users/index.js");
        assert!(!m.has_path_params);
    }

    #[test]
    fn test_exact_beats_templated() {
        let t = tree(&["users/me.js", "users/{id}.js"]);
        assert_eq!(find(&t, "/users/me").unwrap().import_path, "users/me.js");
        let m = find(&t, "/users/7").unwrap();
        assert_eq!(m.import_path, "users/{id}.js");
        assert_eq!(m.template, "/users/{id}");
    }

    #[test]
    fn test_self_named_index() {
        let t = tree(&["orders/orders.js", "{tenant}/{tenant}.js"]);
        assert_eq!(find(&t, "/orders").unwrap().import_path, "orders/orders.js");
        let m = find(&t, "/acme").unwrap();
        assert_eq!(m.import_path, "{tenant}/{tenant}.js");
        assert!(m.has_path_params);
    }

    #[test]
    fn test_self_named_index_serves_only_its_directory() {
        let t = tree(&["posts/posts.js", "{tenant}/{tenant}.js"]);
        assert!(matches!(find(&t, "/posts/posts"), Err(RouteError::NotFound { .. })));
        assert!(matches!(find(&t, "/acme/other"), Err(RouteError::NotFound { .. })));

        // next to a real index the self-named file is an ordinary route
        let t = tree(&["posts/index.js", "posts/posts.js"]);
        assert_eq!(find(&t, "/posts").unwrap().import_path, "posts/index.js");
        assert_eq!(find(&t, "/posts/posts").unwrap().import_path, "posts/posts.js");
        let routes: Vec<String> = t.routes().into_iter().map(|(r, _)| r).collect();
        assert_eq!(routes, ["/posts", "/posts/posts"]);
    }

    #[test]
    fn test_root_index_and_not_found() {
        let t = tree(&["index.js", "health.js"]);
        assert_eq!(find(&t, "/").unwrap().import_path, "index.js");
        assert_eq!(find(&t, "").unwrap().template, "/");
        assert!(matches!(find(&t, "/missing"), Err(RouteError::NotFound { .. })));
        assert!(matches!(find(&t, "/health/deep"), Err(RouteError::NotFound { .. })));
        // index is only reachable as a directory
        assert!(find(&t, "/index").is_err());
    }

    #[test]
    fn test_index_fallback_only_after_templated_segment() {
        let t = tree(&["users/{id}/index.js", "static/index.js"]);
        let m = find(&t, "/users/42/anything").unwrap();
        assert_eq!(m.import_path, "users/{id}/index.js");
        assert_eq!(m.template, "/users/{id}");
        assert!(find(&t, "/static/anything").is_err());
    }

    #[test]
    fn test_two_templated_segments_conflict() {
        let err = RouteTree::build(&js(), ["users/{id}/index.js", "users/{slug}/index.js"], false)
            .unwrap_err();
        match err {
            RouteError::Conflict { location, entries, .. } => {
                assert_eq!(location, "/users");
                assert_eq!(entries, ["{id}", "{slug}"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_file_and_directory_conflict() {
        let err = RouteTree::build(&js(), ["users.js", "users/index.js"], false).unwrap_err();
        assert!(matches!(err, RouteError::Conflict { .. }));
        let err = RouteTree::build(&js(), ["users/index.js", "users.js"], false).unwrap_err();
        assert!(matches!(err, RouteError::Conflict { .. }));
    }

    #[test]
    fn test_alternation_rank_wins() {
        let pattern = FilePattern::parse("api/**/*.{ts,js}").unwrap();
        let t = RouteTree::build(&pattern, ["users.js", "users.ts"], false).unwrap();
        assert_eq!(find(&t, "/users").unwrap().import_path, "users.ts");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_index_only_skips_helpers() {
        let t = RouteTree::build(
            &js(),
            ["users/index.js", "users/helpers.js", "posts/posts.js", "top.js"],
            true,
        )
        .unwrap();
        assert_eq!(t.len(), 2);
        assert!(find(&t, "/users/helpers").is_err());
        assert_eq!(find(&t, "/posts").unwrap().import_path, "posts/posts.js");
    }

    #[test]
    fn test_routes_listing() {
        let t = tree(&["index.js", "users/index.js", "users/{id}.js", "orders/orders.js"]);
        let routes: Vec<String> = t.routes().into_iter().map(|(r, _)| r).collect();
        assert_eq!(routes, ["/", "/orders", "/users", "/users/{id}"]);
    }

    #[test]
    fn test_scan_lists_relative_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("users/{id}")).unwrap();
        std::fs::write(dir.path().join("users/{id}/index.js"), "").unwrap();
        std::fs::write(dir.path().join("index.js"), "").unwrap();

        let all = scan(dir.path(), true).unwrap();
        assert_eq!(all, ["index.js", "users/{id}/index.js"]);
        let shallow = scan(dir.path(), false).unwrap();
        assert_eq!(shallow, ["index.js"]);

        assert!(matches!(
            scan(&dir.path().join("absent"), true),
            Err(RouteError::ScanFailed { .. })
        ));
    }
}
