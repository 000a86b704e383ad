//! C2: the Bundler. Turns authored source plus its companions (supporting
//! files, shared modules, an optional import map) into a single artifact
//! the sandbox can run standalone, per the triage → strategy-selection →
//! inline-or-external algorithm of spec §4.2.

mod diagnostics;
mod external;
mod importmap;
mod inline;
mod triage;

use std::collections::{HashMap, HashSet};

pub use external::{
    DenoBundleExternalBundler, ExternalBundleRequest, ExternalBundler, NoopExternalBundler,
    ARTIFACT_SIZE_CEILING, BUNDLE_TIMEOUT,
};
pub use importmap::ImportMap;

use edgefn_errors::EdgeError;

/// Input to `bundle`. Paths in `supporting_files` are relative to the
/// function root; paths in `shared_modules` are relative to `_shared/`.
#[derive(Debug, Clone, Default)]
pub struct BundleInput {
    pub main_code: String,
    pub supporting_files: Vec<(String, String)>,
    pub shared_modules: Vec<(String, String)>,
    /// Raw `deno.json`/`deno.jsonc` content, if the function ships one.
    pub import_map: Option<String>,
    /// Contents of every import-map target already read from disk, keyed
    /// by the target path as it appears in the map (e.g.
    /// `/sdk/dist/index.js`). A target absent from this map is treated as
    /// unreadable, triggering the §4.2.4 fallback to external bundling.
    pub import_map_target_contents: HashMap<String, String>,
    /// Global import-map defaults, merged in ahead of the function's own
    /// map when external bundling is selected (§4.2.5).
    pub global_import_defaults: Option<ImportMap>,
}

#[derive(Debug, Clone)]
pub struct BundleOutput {
    pub artifact: String,
    pub is_bundled: bool,
    pub bundle_error: Option<String>,
}

/// Scans `main_code` and every supporting file for imports that reference a
/// shared module (`_shared/<path>`, with or without a leading `./`) and
/// returns the deduplicated set of `<path>` suffixes, in first-seen order.
/// Callers (the management HTTP handlers) use this to decide which rows to
/// fetch from the shared-module catalogue before building a [`BundleInput`]
/// -- the bundler itself never talks to the store.
pub fn shared_module_references(main_code: &str, supporting_files: &[(String, String)]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for code in std::iter::once(main_code).chain(supporting_files.iter().map(|(_, c)| c.as_str())) {
        for specifier in triage::import_specifiers(code) {
            let stripped = specifier.strip_prefix("./").unwrap_or(&specifier);
            if let Some(path) = stripped.strip_prefix("_shared/") {
                if seen.insert(path.to_string()) {
                    out.push(path.to_string());
                }
            }
        }
    }
    out
}

fn merged_file_map(input: &BundleInput) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (path, content) in input.shared_modules.iter().chain(&input.supporting_files) {
        map.insert(path.clone(), content.clone());
        map.insert(format!("_shared/{path}"), content.clone());
    }
    map
}

/// Runs the full §4.2 algorithm: triage, strategy selection, and whichever
/// inlining or external-bundling path the strategy picks.
pub async fn bundle(
    input: BundleInput,
    external: &dyn ExternalBundler,
) -> Result<BundleOutput, EdgeError> {
    triage::security_gate(&input.main_code)?;

    let has_companions = !input.supporting_files.is_empty() || !input.shared_modules.is_empty();
    if !triage::has_import(&input.main_code) && !has_companions {
        return Ok(BundleOutput {
            artifact: input.main_code,
            is_bundled: false,
            bundle_error: None,
        });
    }

    let files = merged_file_map(&input);
    let main_code = triage::inline_geojson(&input.main_code, &files);

    let import_map = input
        .import_map
        .as_deref()
        .map(ImportMap::parse)
        .transpose()
        .map_err(|e| EdgeError::bundle_error(format!("invalid import map: {e}")))?;

    // §4.2.2 strategy 1: only shared-module imports, nothing else.
    if input.supporting_files.is_empty() && import_map.is_none() && !input.shared_modules.is_empty() {
        let artifact = inline::inline_shared_modules(&main_code, &input.shared_modules)?;
        return Ok(BundleOutput {
            artifact,
            is_bundled: true,
            bundle_error: None,
        });
    }

    // §4.2.2 strategy 2: import map with local filesystem aliases.
    if let Some(map) = &import_map {
        let locals = map.local_alias_targets();
        if !locals.is_empty() {
            if let Some(artifact) =
                try_full_inline(&main_code, &locals, &input.import_map_target_contents, &input.shared_modules)?
            {
                return Ok(BundleOutput {
                    artifact,
                    is_bundled: true,
                    bundle_error: None,
                });
            }
            // a target was unreadable: fall through to external bundling.
        }
    }

    // §4.2.2 strategy 3 / §4.2.5: external bundling.
    let merged_map = importmap::merge_for_external_bundling(
        input.global_import_defaults.as_ref(),
        !input.shared_modules.is_empty(),
        import_map.as_ref(),
    );
    let artifact = external
        .bundle(ExternalBundleRequest {
            main_code,
            supporting_files: input.supporting_files,
            shared_modules: input.shared_modules,
            import_map: merged_map,
        })
        .await?;
    if artifact.len() > ARTIFACT_SIZE_CEILING {
        return Err(EdgeError::bundle_size(artifact.len(), ARTIFACT_SIZE_CEILING));
    }
    Ok(BundleOutput {
        artifact,
        is_bundled: true,
        bundle_error: None,
    })
}

/// §4.2.4: attempts full inlining of every local import-map target plus the
/// shared modules. Returns `Ok(None)` (not an error) when a target can't be
/// read, so the caller falls back to external bundling.
fn try_full_inline(
    main_code: &str,
    locals: &[(&str, &str)],
    target_contents: &HashMap<String, String>,
    shared_modules: &[(String, String)],
) -> Result<Option<String>, EdgeError> {
    let mut bodies = Vec::new();
    for (_alias, target_path) in locals {
        let Some(content) = target_contents.get(*target_path) else {
            return Ok(None);
        };
        let (wrapped, _exports) = inline::inline_import_map_target(content);
        bodies.push(wrapped);
    }

    let mut seen_names: HashSet<String> = HashSet::new();
    let shared_bodies = inline::inline_shared_module_bodies(shared_modules, &mut seen_names)?;

    let mut out = String::new();
    for body in bodies {
        out.push_str(&body);
        out.push('\n');
    }
    out.push_str(&shared_bodies);
    out.push_str(&inline::strip_all_imports(main_code));
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_imports_passes_through_unbundled() {
        let input = BundleInput {
            main_code: "async function handler(r){return {status:200, body:r.body}}".to_string(),
            ..Default::default()
        };
        let out = bundle(input, &NoopExternalBundler).await.unwrap();
        assert!(!out.is_bundled);
    }

    #[tokio::test]
    async fn shared_module_only_triggers_simple_inlining() {
        let input = BundleInput {
            main_code: r#"import {g} from "_shared/greet.ts";
async function handler(r) { return {status:200, body:g("x")}; }"#
                .to_string(),
            shared_modules: vec![(
                "greet.ts".to_string(),
                r#"export const g = (n)=>"hi "+n;"#.to_string(),
            )],
            ..Default::default()
        };
        let out = bundle(input, &NoopExternalBundler).await.unwrap();
        assert!(out.is_bundled);
        assert!(out.artifact.contains("const g ="));
        assert!(!out.artifact.contains("import"));
    }

    #[tokio::test]
    async fn blocked_import_rejected_before_anything_else() {
        let input = BundleInput {
            main_code: r#"import {exec} from "npm:child_process";"#.to_string(),
            ..Default::default()
        };
        let err = bundle(input, &NoopExternalBundler).await.unwrap_err();
        assert_eq!(err.kind, edgefn_errors::ErrorKind::BundleSecurity);
        assert!(err.msg.contains("child_process"));
    }

    #[tokio::test]
    async fn geojson_inlined_before_strategy_selection() {
        let input = BundleInput {
            main_code: r#"import countries from "_shared/data/countries.geojson";
async function handler(r) { return {status:200, body:countries}; }"#
                .to_string(),
            shared_modules: vec![(
                "data/countries.geojson".to_string(),
                r#"{"type":"FeatureCollection","features":[]}"#.to_string(),
            )],
            ..Default::default()
        };
        let out = bundle(input, &NoopExternalBundler).await.unwrap();
        assert!(out
            .artifact
            .contains(r#"const countries = {"type":"FeatureCollection","features":[]};"#));
        assert!(!out.artifact.contains("import"));
    }

    #[tokio::test]
    async fn supporting_files_without_import_map_go_external() {
        let input = BundleInput {
            main_code: r#"import {helper} from "./util.ts";
async function handler(r) { return {status:200, body:helper()}; }"#
                .to_string(),
            supporting_files: vec![("util.ts".to_string(), "export function helper(){return 1;}".to_string())],
            ..Default::default()
        };
        let out = bundle(input, &NoopExternalBundler).await.unwrap();
        // NoopExternalBundler echoes main_code back unchanged; is_bundled
        // still true because the external path was taken.
        assert!(out.is_bundled);
    }

    #[test]
    fn shared_module_references_dedupes_and_strips_prefixes() {
        let main = r#"import {g} from "./_shared/greet.ts";
import {h} from "_shared/greet.ts";
import {x} from "npm:lodash";"#;
        let refs = shared_module_references(main, &[]);
        assert_eq!(refs, vec!["greet.ts".to_string()]);
    }

    #[tokio::test]
    async fn idempotent_when_no_imports() {
        let code = "async function handler(r){return {status:200, body:r.body}}".to_string();
        let first = bundle(
            BundleInput {
                main_code: code.clone(),
                ..Default::default()
            },
            &NoopExternalBundler,
        )
        .await
        .unwrap();
        let second = bundle(
            BundleInput {
                main_code: first.artifact.clone(),
                ..Default::default()
            },
            &NoopExternalBundler,
        )
        .await
        .unwrap();
        assert_eq!(first.artifact, second.artifact);
        assert!(!second.is_bundled);
    }
}
