//! Function discovery: scans the function source root for handler modules.
//!
//! Every recognized file under the root becomes one function whose logical
//! name is its relative path with the extension stripped and separators
//! normalized to `/`. Symlinks are never followed.

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// File extensions recognized as function modules.
pub const FUNCTION_EXTENSIONS: [&str; 2] = ["wasm", "wat"];

/// Separator used inside logical names and lookup keys.
pub const NAME_SEPARATOR: char = '/';

/// A function module found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredFunction {
    /// Path-derived logical name, e.g. `hello/hello-world`.
    pub name: String,
    /// Source file path.
    pub path: PathBuf,
    /// Source file extension (one of [`FUNCTION_EXTENSIONS`]).
    pub extension: String,
}

impl DiscoveredFunction {
    /// Expose key used in the manifest (`./<name>`).
    pub fn expose_key(&self) -> String {
        format!("./{}", self.name)
    }
}

/// Result of a discovery scan: logical name → function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub root: PathBuf,
    pub functions: BTreeMap<String, DiscoveredFunction>,
}

impl Discovery {
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

/// Build the lookup key for a function inside a scope (remote) name.
pub fn lookup_key(scope: &str, name: &str) -> String {
    format!("{}{}{}", scope, NAME_SEPARATOR, name)
}

/// Split a lookup key into `(scope, name)`.
pub fn split_lookup_key(key: &str) -> Option<(&str, &str)> {
    let (scope, name) = key.split_once(NAME_SEPARATOR)?;
    if scope.is_empty() || name.is_empty() {
        return None;
    }
    Some((scope, name))
}

/// Derive the logical name of `path` relative to `root`.
///
/// Returns `None` when the path is outside the root, is not valid UTF-8, or
/// has no recognized extension.
pub fn logical_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let extension = relative.extension()?.to_str()?;
    if !FUNCTION_EXTENSIONS.contains(&extension) {
        return None;
    }

    let stem = relative.with_extension("");
    let mut parts = Vec::new();
    for component in stem.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join(&NAME_SEPARATOR.to_string()))
}

/// Scan `root` recursively for function modules.
pub fn discover_functions(root: &Path) -> Result<Discovery> {
    if !root.is_dir() {
        return Err(DiscoveryError::MissingRoot(root.to_path_buf()).into());
    }

    let mut discovery = Discovery {
        root: root.to_path_buf(),
        functions: BTreeMap::new(),
    };
    scan_dir(root, root, &mut discovery)?;

    info!(
        root = %root.display(),
        count = discovery.len(),
        "Discovered server functions"
    );
    for func in discovery.functions.values() {
        info!("  - {} (from {})", func.name, func.path.display());
    }

    Ok(discovery)
}

fn scan_dir(root: &Path, dir: &Path, discovery: &mut Discovery) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| DiscoveryError::unreadable(dir, e.to_string()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DiscoveryError::unreadable(dir, e.to_string()))?;
        let file_type = entry
            .file_type()
            .map_err(|e| DiscoveryError::unreadable(entry.path(), e.to_string()))?;
        paths.push((entry.path(), file_type));
    }
    // Deterministic order so duplicate reports name the same pair every time.
    paths.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, file_type) in paths {
        if file_type.is_symlink() {
            debug!(path = %path.display(), "Skipping symlink");
            continue;
        }
        if file_type.is_dir() {
            scan_dir(root, &path, discovery)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !FUNCTION_EXTENSIONS.contains(&extension) {
            continue;
        }

        let Some(name) = logical_name(root, &path) else {
            warn!(path = %path.display(), "Skipping function with non UTF-8 path");
            continue;
        };

        if let Some(existing) = discovery.functions.get(&name) {
            return Err(DiscoveryError::DuplicateName {
                name,
                first: existing.path.clone(),
                second: path,
            }
            .into());
        }

        let extension = extension.to_string();
        discovery.functions.insert(
            name.clone(),
            DiscoveredFunction {
                name,
                path,
                extension,
            },
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "(module)").unwrap();
    }

    #[test]
    fn test_discover_nested_tree() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "echo.wat");
        touch(dir.path(), "hello/hello-world.wat");
        touch(dir.path(), "deep/a/b/c.wasm");
        touch(dir.path(), "README.md");
        touch(dir.path(), "notes.ts");

        let discovery = discover_functions(dir.path()).unwrap();
        let names: Vec<_> = discovery.names().collect();
        assert_eq!(names, vec!["deep/a/b/c", "echo", "hello/hello-world"]);
        assert_eq!(discovery.len(), 3);

        let hello = &discovery.functions["hello/hello-world"];
        assert_eq!(hello.extension, "wat");
        assert_eq!(hello.expose_key(), "./hello/hello-world");
    }

    #[test]
    fn test_missing_root() {
        let err = discover_functions(Path::new("/nonexistent/function/root")).unwrap_err();
        match err {
            FederationError::Discovery(e) => assert!(e.is_degradable()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_root() {
        let dir = TempDir::new().unwrap();
        let discovery = discover_functions(dir.path()).unwrap();
        assert!(discovery.is_empty());
    }

    #[test]
    fn test_duplicate_logical_name_rejected() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "same.wat");
        touch(dir.path(), "same.wasm");

        let err = discover_functions(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            FederationError::Discovery(DiscoveryError::DuplicateName { ref name, .. }) if name == "same"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed() {
        let outside = TempDir::new().unwrap();
        touch(outside.path(), "secret.wat");

        let dir = TempDir::new().unwrap();
        touch(dir.path(), "echo.wat");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.wat"),
            dir.path().join("alias.wat"),
        )
        .unwrap();

        let discovery = discover_functions(dir.path()).unwrap();
        let names: Vec<_> = discovery.names().collect();
        assert_eq!(names, vec!["echo"]);
    }

    #[test]
    fn test_logical_name() {
        let root = Path::new("/srv/functions");
        assert_eq!(
            logical_name(root, Path::new("/srv/functions/hello/hello-world.wat")).as_deref(),
            Some("hello/hello-world")
        );
        assert_eq!(logical_name(root, Path::new("/srv/functions/x.txt")), None);
        assert_eq!(logical_name(root, Path::new("/elsewhere/x.wat")), None);
    }

    #[test]
    fn test_lookup_key_roundtrip() {
        let key = lookup_key("wheel_server", "hello/hello-world");
        assert_eq!(key, "wheel_server/hello/hello-world");
        assert_eq!(
            split_lookup_key(&key),
            Some(("wheel_server", "hello/hello-world"))
        );
        assert_eq!(split_lookup_key("no-separator"), None);
        assert_eq!(split_lookup_key("scope/"), None);
    }
}
