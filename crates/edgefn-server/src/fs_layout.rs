//! The filesystem layout convention (spec §6) the `/admin/functions/reload`
//! handler scans: `<dir>/<name>.ts` (flat) or `<dir>/<name>/index.ts`
//! (directory form, flat wins if both exist), companion `.ts`/`.js`/`.mts`/
//! `.mjs` files as supporting files, an optional `deno.json(c)` as the
//! function-local import map, and a top-level `<dir>/_shared/` tree as the
//! shared-module set. Spec §1 excludes the watcher that *triggers* a
//! reload, not this scan-and-reconcile logic itself.

use std::path::{Path, PathBuf};

use edgefn_errors::EdgeError;

const SUPPORTING_EXTENSIONS: &[&str] = &["ts", "js", "mts", "mjs"];

pub struct ScannedFunction {
    pub name: String,
    pub main_code: String,
    pub supporting_files: Vec<(String, String)>,
    pub import_map: Option<String>,
}

/// Verifies `candidate` resolves to a path under `root` (spec §6: "Any
/// constructed filesystem path must be verified to reside under the
/// functions directory"). Uses a lexical prefix check on joined,
/// non-canonicalized paths, since the candidate may not exist yet (a
/// `deno.json` we're about to read) -- canonicalizing a nonexistent path
/// fails outright.
pub fn ensure_within(root: &Path, candidate: &Path) -> Result<PathBuf, EdgeError> {
    let joined = root.join(candidate);
    let normalized = normalize_lexically(&joined);
    let root_normalized = normalize_lexically(root);
    if !normalized.starts_with(&root_normalized) {
        return Err(EdgeError::invalid_name(format!(
            "path {} escapes the functions directory",
            candidate.display()
        )));
    }
    Ok(normalized)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Scans `dir` for functions stored per the flat/directory convention.
/// Skips a top-level `_shared` entry (that's [`scan_shared_modules`]'s
/// job) and anything that isn't a valid function name.
pub async fn scan_functions(dir: &Path) -> Result<Vec<ScannedFunction>, EdgeError> {
    let mut names = std::collections::BTreeSet::new();
    let mut entries = read_dir(dir).await?;
    while let Some(entry) = next_entry(&mut entries).await? {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(stem) = file_name.strip_suffix(".ts") {
            if edgefn_common::FunctionName::parse(stem).is_ok() {
                names.insert(stem.to_string());
            }
        } else if file_name != "_shared" && edgefn_common::FunctionName::parse(file_name.as_ref()).is_ok() {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                names.insert(file_name.to_string());
            }
        }
    }

    let mut functions = Vec::new();
    for name in names {
        if let Some(function) = scan_one(dir, &name).await? {
            functions.push(function);
        }
    }
    Ok(functions)
}

async fn scan_one(dir: &Path, name: &str) -> Result<Option<ScannedFunction>, EdgeError> {
    let flat_path = ensure_within(dir, Path::new(&format!("{name}.ts")))?;
    if let Ok(main_code) = tokio::fs::read_to_string(&flat_path).await {
        return Ok(Some(ScannedFunction {
            name: name.to_string(),
            main_code,
            supporting_files: Vec::new(),
            import_map: None,
        }));
    }

    let dir_path = ensure_within(dir, Path::new(name))?;
    let index_path = dir_path.join("index.ts");
    let Ok(main_code) = tokio::fs::read_to_string(&index_path).await else {
        return Ok(None);
    };

    let mut supporting_files = Vec::new();
    let mut import_map = None;
    let mut entries = read_dir(&dir_path).await?;
    while let Some(entry) = next_entry(&mut entries).await? {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy().to_string();
        if file_name == "index.ts" {
            continue;
        }
        if file_name == "deno.json" || file_name == "deno.jsonc" {
            import_map = tokio::fs::read_to_string(dir_path.join(&file_name)).await.ok();
            continue;
        }
        if let Some(ext) = file_name.rsplit('.').next() {
            if SUPPORTING_EXTENSIONS.contains(&ext) {
                if let Ok(content) = tokio::fs::read_to_string(dir_path.join(&file_name)).await {
                    supporting_files.push((file_name, content));
                }
            }
        }
    }

    Ok(Some(ScannedFunction {
        name: name.to_string(),
        main_code,
        supporting_files,
        import_map,
    }))
}

/// Scans `<dir>/_shared/` recursively into `(path-under-_shared, content)`
/// pairs, matching `SharedModuleRecord::path`'s `_shared/<path>` shape.
pub async fn scan_shared_modules(dir: &Path) -> Result<Vec<(String, String)>, EdgeError> {
    let shared_dir = dir.join("_shared");
    if tokio::fs::metadata(&shared_dir).await.is_err() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let mut stack = vec![shared_dir.clone()];
    while let Some(current) = stack.pop() {
        let mut entries = read_dir(&current).await?;
        while let Some(entry) = next_entry(&mut entries).await? {
            let path = entry.path();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                stack.push(path);
                continue;
            }
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                let relative = path
                    .strip_prefix(&shared_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                out.push((format!("_shared/{relative}"), content));
            }
        }
    }
    Ok(out)
}

async fn read_dir(dir: &Path) -> Result<tokio::fs::ReadDir, EdgeError> {
    tokio::fs::read_dir(dir)
        .await
        .map_err(|e| EdgeError::store_error(format!("failed to read directory {}: {e}", dir.display())))
}

async fn next_entry(entries: &mut tokio::fs::ReadDir) -> Result<Option<tokio::fs::DirEntry>, EdgeError> {
    entries
        .next_entry()
        .await
        .map_err(|e| EdgeError::store_error(format!("failed to read directory entry: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_within_rejects_parent_traversal() {
        let root = Path::new("/srv/functions");
        assert!(ensure_within(root, Path::new("../../etc/passwd")).is_err());
        assert!(ensure_within(root, Path::new("foo.ts")).is_ok());
    }

    #[tokio::test]
    async fn flat_form_wins_over_directory_form() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("f.ts"), "flat").await.unwrap();
        tokio::fs::create_dir(dir.path().join("f")).await.unwrap();
        tokio::fs::write(dir.path().join("f/index.ts"), "dir-form").await.unwrap();

        let functions = scan_functions(dir.path()).await.unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].main_code, "flat");
    }

    #[tokio::test]
    async fn directory_form_collects_supporting_files_and_import_map() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("g")).await.unwrap();
        tokio::fs::write(dir.path().join("g/index.ts"), "main").await.unwrap();
        tokio::fs::write(dir.path().join("g/util.ts"), "export const x = 1;").await.unwrap();
        tokio::fs::write(dir.path().join("g/deno.json"), "{\"imports\":{}}").await.unwrap();

        let functions = scan_functions(dir.path()).await.unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].supporting_files.len(), 1);
        assert_eq!(functions[0].supporting_files[0].0, "util.ts");
        assert!(functions[0].import_map.is_some());
    }

    #[tokio::test]
    async fn shared_modules_are_scanned_recursively() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("_shared/nested")).await.unwrap();
        tokio::fs::write(dir.path().join("_shared/greet.ts"), "export const g = 1;").await.unwrap();
        tokio::fs::write(dir.path().join("_shared/nested/util.ts"), "export const u = 2;").await.unwrap();

        let mut modules = scan_shared_modules(dir.path()).await.unwrap();
        modules.sort();
        assert_eq!(
            modules,
            vec![
                ("_shared/greet.ts".to_string(), "export const g = 1;".to_string()),
                ("_shared/nested/util.ts".to_string(), "export const u = 2;".to_string()),
            ]
        );
    }
}
