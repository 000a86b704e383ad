//! Glue between the management HTTP handlers and C2 (`edgefn_bundler`): the
//! bundler itself never talks to the catalogue store or the filesystem
//! (spec §4.2's contract is pure data in, data out), so this module does
//! the resolving -- fetching referenced shared modules, reading import-map
//! local-alias targets off disk -- before calling `edgefn_bundler::bundle`.

use std::collections::HashMap;

use edgefn_bundler::{bundle, BundleInput, BundleOutput, ExternalBundler, ImportMap};
use edgefn_errors::EdgeError;
use edgefn_store::CatalogueStore;

pub struct BundleRequest {
    pub main_code: String,
    pub supporting_files: Vec<(String, String)>,
    pub import_map: Option<String>,
}

/// Resolves shared-module references and import-map local targets, then
/// runs the full §4.2 algorithm.
pub async fn bundle_for_function<S: CatalogueStore, B: ExternalBundler>(
    store: &S,
    external: &B,
    request: BundleRequest,
) -> Result<BundleOutput, EdgeError> {
    let shared_paths = edgefn_bundler::shared_module_references(&request.main_code, &request.supporting_files);
    let mut shared_modules = Vec::with_capacity(shared_paths.len());
    for path in &shared_paths {
        let full_path = format!("_shared/{path}");
        if let Some(record) = store
            .get_shared_module(&full_path)
            .await
            .map_err(|e| EdgeError::store_error(e.to_string()))?
        {
            shared_modules.push((path.clone(), record.content));
        }
        // A miss is not an error here: the bundler's own inliners treat a
        // missing shared module the same way a missing geojson file does
        // (left for the sandbox-side loader), and the external-bundling
        // path simply materialises whatever shared modules were resolved.
    }

    let import_map_target_contents = match &request.import_map {
        Some(raw) => read_local_alias_targets(raw).await,
        None => HashMap::new(),
    };

    bundle(
        BundleInput {
            main_code: request.main_code,
            supporting_files: request.supporting_files,
            shared_modules,
            import_map: request.import_map,
            import_map_target_contents,
            global_import_defaults: None,
        },
        external,
    )
    .await
}

/// Reads every local-filesystem alias target named in `raw` (a `deno.json`-
/// shaped import map), for the §4.2.4 full-inlining attempt. A target that
/// doesn't exist on disk is simply absent from the result, which is exactly
/// the "unreadable" signal `bundle` falls back to external bundling on.
async fn read_local_alias_targets(raw: &str) -> HashMap<String, String> {
    let Ok(map) = ImportMap::parse(raw) else {
        return HashMap::new();
    };
    let mut out = HashMap::new();
    for (_alias, target) in map.local_alias_targets() {
        if let Ok(content) = tokio::fs::read_to_string(target).await {
            out.insert(target.to_string(), content);
        }
    }
    out
}
