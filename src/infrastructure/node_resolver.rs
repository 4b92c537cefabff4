use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// The subset of package.json the bundler reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    /// Everything else, so any configured main field can be looked up
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

/// Conditions honored in an `exports` map, in priority order
const EXPORT_CONDITIONS: [&str; 3] = ["import", "module", "default"];

impl PackageJson {
    pub fn entry_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }

    /// Map `subpath` (`.` or `./feature`) through the `exports` field.
    /// `None` when there is no `exports` field or it does not expose `subpath`.
    pub fn exports_target(&self, subpath: &str) -> Option<String> {
        let exports = self.fields.get("exports")?;
        match exports {
            Value::Object(map) if map.keys().any(|k| k.starts_with('.')) => {
                if let Some(target) = map.get(subpath) {
                    return conditional_target(target, None);
                }
                let (value, rest) = match_export_pattern(map, subpath)?;
                conditional_target(value, Some(&rest))
            }
            // String, array or bare conditions all describe the main entry
            _ if subpath == "." => conditional_target(exports, None),
            _ => None,
        }
    }
}

/// Longest `./prefix*suffix` (or legacy `./dir/`) key matching `subpath`,
/// with the part of `subpath` the key left open
fn match_export_pattern<'a>(map: &'a Map<String, Value>, subpath: &str) -> Option<(&'a Value, String)> {
    let mut best: Option<(usize, &Value, String)> = None;
    for (key, value) in map {
        let rest = match key.split_once('*') {
            Some((prefix, suffix)) => subpath
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix)),
            None if key.ends_with('/') => subpath.strip_prefix(key.as_str()),
            None => None,
        };
        let Some(rest) = rest else {
            continue;
        };
        if best.as_ref().map_or(true, |(len, _, _)| key.len() > *len) {
            best = Some((key.len(), value, rest.to_string()));
        }
    }
    best.map(|(_, value, rest)| (value, rest))
}

/// Pick a target string out of an `exports` value
fn conditional_target(value: &Value, star: Option<&str>) -> Option<String> {
    match value {
        Value::String(target) => Some(match star {
            Some(star) if target.contains('*') => target.replace('*', star),
            Some(rest) if target.ends_with('/') => format!("{}{}", target, rest),
            _ => target.clone(),
        }),
        Value::Array(candidates) => candidates.iter().find_map(|c| conditional_target(c, star)),
        Value::Object(conditions) => EXPORT_CONDITIONS
            .iter()
            .filter_map(|condition| conditions.get(*condition))
            .find_map(|c| conditional_target(c, star)),
        // `null` excludes the subpath
        _ => None,
    }
}

/// Read and parse a package.json, `None` if missing or malformed
pub async fn read_package_json(path: &Path) -> Option<PackageJson> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(pkg) => Some(pkg),
        Err(e) => {
            warn!("Ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

/// Node.js-style module resolution
pub struct NodeModuleResolver {
    extensions: Vec<String>,
    main_fields: Vec<String>,
    /// Cache of package.json files
    package_cache: DashMap<PathBuf, Option<PackageJson>>,
    /// Memoized (specifier, directory) results
    resolve_cache: DashMap<(String, PathBuf), Option<PathBuf>>,
}

impl NodeModuleResolver {
    pub fn new(extensions: Vec<String>, main_fields: Vec<String>) -> Self {
        Self {
            extensions,
            main_fields,
            package_cache: DashMap::new(),
            resolve_cache: DashMap::new(),
        }
    }

    /// Resolve `specifier` relative to `from_dir`. The result is canonical,
    /// so one file always resolves to one path.
    pub async fn resolve(&self, specifier: &str, from_dir: &Path) -> Option<PathBuf> {
        let key = (specifier.to_string(), from_dir.to_path_buf());
        if let Some(cached) = self.resolve_cache.get(&key) {
            return cached.clone();
        }

        let resolved = self.resolve_uncached(specifier, from_dir).await;
        let resolved = resolved.map(|p| std::fs::canonicalize(&p).unwrap_or(p));
        debug!("resolve '{}' from {} -> {:?}", specifier, from_dir.display(), resolved);

        self.resolve_cache.insert(key, resolved.clone());
        resolved
    }

    async fn resolve_uncached(&self, specifier: &str, from_dir: &Path) -> Option<PathBuf> {
        // Strip query and hash suffixes
        let specifier = specifier.split(['?', '#']).next().unwrap_or(specifier);

        if Self::is_relative(specifier) {
            let resolved = normalize(&from_dir.join(specifier));
            return self.resolve_file_or_directory(&resolved).await;
        }

        if Path::new(specifier).is_absolute() {
            return self.resolve_file_or_directory(Path::new(specifier)).await;
        }

        self.resolve_node_module(specifier, from_dir).await
    }

    fn is_relative(specifier: &str) -> bool {
        specifier == "."
            || specifier == ".."
            || specifier.starts_with("./")
            || specifier.starts_with("../")
    }

    /// Check if a specifier names a package rather than a path
    pub fn is_bare(specifier: &str) -> bool {
        !Self::is_relative(specifier) && !Path::new(specifier).is_absolute()
    }

    /// Search node_modules directories from `from_dir` up to the filesystem root
    async fn resolve_node_module(&self, specifier: &str, from_dir: &Path) -> Option<PathBuf> {
        let (pkg_name, subpath) = parse_package_specifier(specifier);

        for dir in from_dir.ancestors() {
            let package_dir = dir.join("node_modules").join(&pkg_name);
            if !package_dir.is_dir() {
                continue;
            }
            if let Some(entry) = self.resolve_package_entry(&package_dir, subpath.as_deref()).await {
                return Some(entry);
            }
        }

        None
    }

    async fn resolve_package_entry(&self, package_dir: &Path, subpath: Option<&str>) -> Option<PathBuf> {
        if let Some(pkg) = self.package_json(&package_dir.join("package.json")).await {
            let key = subpath.map_or_else(|| ".".to_string(), |s| format!("./{}", s));
            if let Some(target) = pkg.exports_target(&key) {
                let entry = normalize(&package_dir.join(&target));
                if entry.is_file() {
                    return Some(entry);
                }
                warn!(
                    "{}: exports entry '{}' points at missing {}",
                    package_dir.display(),
                    key,
                    target
                );
            }
        }

        match subpath {
            Some(subpath) => self.resolve_file_or_directory(&package_dir.join(subpath)).await,
            None => self.resolve_directory(package_dir).await,
        }
    }

    async fn resolve_file_or_directory(&self, path: &Path) -> Option<PathBuf> {
        if let Some(file) = self.resolve_as_file(path) {
            return Some(file);
        }
        if path.is_dir() {
            return self.resolve_directory(path).await;
        }
        None
    }

    /// Directory entry: package.json main fields, then index files
    async fn resolve_directory(&self, dir: &Path) -> Option<PathBuf> {
        if let Some(pkg) = self.package_json(&dir.join("package.json")).await {
            for field in &self.main_fields {
                if let Some(entry) = pkg.entry_field(field) {
                    let entry_path = normalize(&dir.join(entry));
                    if let Some(resolved) = self.resolve_as_file(&entry_path) {
                        return Some(resolved);
                    }
                    if let Some(index) = self.resolve_index(&entry_path) {
                        return Some(index);
                    }
                }
            }
        }
        self.resolve_index(dir)
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.resolve_as_file(&dir.join("index"))
    }

    /// Try the path as-is, then with each extension appended
    fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        for ext in &self.extensions {
            let mut with_ext = path.as_os_str().to_os_string();
            with_ext.push(ext);
            let candidate = PathBuf::from(with_ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        None
    }

    async fn package_json(&self, path: &Path) -> Option<PackageJson> {
        if let Some(cached) = self.package_cache.get(path) {
            return cached.clone();
        }
        let pkg = if path.is_file() {
            read_package_json(path).await
        } else {
            None
        };
        self.package_cache.insert(path.to_path_buf(), pkg.clone());
        pkg
    }
}

/// Split a bare specifier into package name and subpath
pub fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name = if specifier.starts_with('@') {
        match (parts.next(), parts.next()) {
            (Some(scope), Some(pkg)) => format!("{}/{}", scope, pkg),
            (Some(scope), None) => scope.to_string(),
            _ => specifier.to_string(),
        }
    } else {
        parts.next().unwrap_or(specifier).to_string()
    };
    let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    (name, subpath)
}

/// Lexically normalize `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
