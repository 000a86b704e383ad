//! §4.2.1 triage: import sniffing, the security gate, and the geojson
//! data-file inlining pass that runs before strategy selection.

use std::collections::HashMap;

use edgefn_errors::EdgeError;
use regex::Regex;
use std::sync::OnceLock;

/// Node builtins the sandbox must never reach directly; blocked regardless
/// of the `node:`/`npm:` prefix spelling.
const BLOCKED_SPECIFIERS: &[&str] = &["child_process", "vm", "fs", "process"];

fn import_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*import\b[^;]*?from\s*["']([^"']+)["']"#).expect("valid regex")
    })
}

fn bare_import_re() -> &'static Regex {
    // `import "side-effect-module";` has no `from` clause.
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*import\s*["']([^"']+)["']"#).expect("valid regex"))
}

/// All import specifiers in `code`, in source order. Only matches
/// non-comment, non-string occurrences in the loose sense that it scans
/// line-oriented `import` statements rather than tokenizing a full grammar
/// — sufficient for the single-line-per-import style our bundler targets.
pub fn import_specifiers(code: &str) -> Vec<String> {
    let mut out = Vec::new();
    for cap in import_line_re().captures_iter(code) {
        out.push(cap[1].to_string());
    }
    for cap in bare_import_re().captures_iter(code) {
        out.push(cap[1].to_string());
    }
    out
}

/// §4.2.1.1: does `main_code` contain at least one import statement?
pub fn has_import(code: &str) -> bool {
    !import_specifiers(code).is_empty()
}

fn strip_prefix(specifier: &str) -> &str {
    specifier
        .strip_prefix("node:")
        .or_else(|| specifier.strip_prefix("npm:"))
        .unwrap_or(specifier)
}

/// §4.2.1.2: reject imports of blocked node builtins, with or without the
/// `node:`/`npm:` prefix.
pub fn security_gate(code: &str) -> Result<(), EdgeError> {
    for specifier in import_specifiers(code) {
        let bare = strip_prefix(&specifier);
        if BLOCKED_SPECIFIERS.contains(&bare) {
            return Err(EdgeError::bundle_security(specifier));
        }
    }
    Ok(())
}

fn geojson_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^.*import\s+(\w+)\s+from\s*["']([^"']+\.geojson)["'].*$"#)
            .expect("valid regex")
    })
}

/// §4.2.1.3: inline `import NAME from "PATH.geojson"` as a JSON literal when
/// PATH resolves against the merged supporting-file/shared-module map.
/// Misses are left untouched for the sandbox-side loader to resolve.
pub fn inline_geojson(code: &str, files: &HashMap<String, String>) -> String {
    geojson_import_re()
        .replace_all(code, |caps: &regex::Captures| {
            let name = &caps[1];
            let path = &caps[2];
            let content = files
                .get(path)
                .or_else(|| path.strip_prefix("./").and_then(|p| files.get(p)))
                .or_else(|| files.get(&format!("./{path}")));
            match content {
                Some(content) => format!("const {name} = {content};"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_plain_import() {
        assert!(has_import(r#"import {g} from "_shared/greet.ts";"#));
        assert!(!has_import("async function handler(r) { return r; }"));
    }

    #[test]
    fn security_gate_blocks_with_and_without_prefixes() {
        assert!(security_gate(r#"import {exec} from "npm:child_process";"#).is_err());
        assert!(security_gate(r#"import {exec} from "node:child_process";"#).is_err());
        assert!(security_gate(r#"import {exec} from "child_process";"#).is_err());
        assert!(security_gate(r#"import {readFile} from "npm:lodash";"#).is_ok());
    }

    #[test]
    fn inlines_geojson_preserving_raw_json() {
        let mut files = HashMap::new();
        files.insert(
            "_shared/data/countries.geojson".to_string(),
            r#"{"type":"FeatureCollection","features":[]}"#.to_string(),
        );
        let code = r#"import countries from "_shared/data/countries.geojson";"#;
        let out = inline_geojson(code, &files);
        assert_eq!(
            out,
            r#"const countries = {"type":"FeatureCollection","features":[]};"#
        );
    }

    #[test]
    fn leaves_geojson_import_untouched_on_miss() {
        let files = HashMap::new();
        let code = r#"import countries from "_shared/data/countries.geojson";"#;
        assert_eq!(inline_geojson(code, &files), code);
    }
}
