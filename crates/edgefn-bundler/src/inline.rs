//! §4.2.3 simple shared-module inlining and §4.2.4 import-map inlining.

use std::collections::HashSet;
use std::sync::OnceLock;

use edgefn_errors::EdgeError;
use regex::Regex;

fn top_level_const_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*const\s+(\w+)\s*="#).expect("valid regex"))
}

/// Names introduced by `const NAME = …` at the top of `code`.
fn top_level_const_names(code: &str) -> Vec<String> {
    top_level_const_re()
        .captures_iter(code)
        .map(|c| c[1].to_string())
        .collect()
}

/// Strip every line of `code` that is (part of) an `import …` statement
/// whose specifier matches `predicate`. Handles imports that span several
/// lines: once an `import` keyword starts a statement, every line is
/// elided up to and including the one containing the closing ` from "…"`.
fn strip_imports(code: &str, predicate: impl Fn(&str) -> bool) -> String {
    let mut out = Vec::new();
    let mut lines = code.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("import") {
            let mut statement = line.to_string();
            while !statement.contains(" from ") && !statement.trim_end().ends_with(';') {
                match lines.next() {
                    Some(next) => {
                        statement.push('\n');
                        statement.push_str(next);
                    }
                    None => break,
                }
            }
            if let Some(specifier) = extract_specifier(&statement) {
                if predicate(&specifier) {
                    continue;
                }
            }
            out.push(statement);
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

fn extract_specifier(statement: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"from\s*["']([^"']+)["']"#).expect("valid regex"));
    re.captures(statement).map(|c| c[1].to_string())
}

/// Strip *every* import statement regardless of specifier (used by the
/// import-map inliner, which inlines the whole dependency set).
pub fn strip_all_imports(code: &str) -> String {
    strip_imports(code, |_| true)
}

/// Concatenates shared-module bodies (imports stripped) tracking the
/// top-level `const` names introduced so far in `seen_names`, so callers
/// that inline other things first (import-map targets) still get the
/// §4.2.6 duplicate-declaration check across the whole artifact.
pub fn inline_shared_module_bodies(
    shared_modules: &[(String, String)],
    seen_names: &mut HashSet<String>,
) -> Result<String, EdgeError> {
    let mut out = String::new();
    for (path, content) in shared_modules {
        let inlined = strip_imports(content, |_| true);
        for name in top_level_const_names(&inlined) {
            if !seen_names.insert(name.clone()) {
                return Err(EdgeError::bundle_error(format!(
                    "inlining shared module \"{path}\" would redeclare top-level const \"{name}\""
                )));
            }
        }
        out.push_str(&format!("// Inlined from _shared/{path}\n"));
        out.push_str(&inlined);
        out.push('\n');
    }
    Ok(out)
}

/// §4.2.3: concatenate shared modules (imports removed from each) ahead of
/// the main code (with only its `_shared/…` imports removed).
pub fn inline_shared_modules(
    main_code: &str,
    shared_modules: &[(String, String)],
) -> Result<String, EdgeError> {
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut out = inline_shared_module_bodies(shared_modules, &mut seen_names)?;
    let main_inlined = strip_imports(main_code, |specifier| specifier.contains("_shared/"));
    for name in top_level_const_names(&main_inlined) {
        if !seen_names.insert(name) {
            return Err(EdgeError::bundle_error(
                "main code redeclares a top-level const already introduced by an inlined shared module",
            ));
        }
    }
    out.push_str(&main_inlined);
    Ok(out)
}

fn exported_names(content: &str) -> Vec<(String, String)> {
    // harvest the first `export { a, b as c, d }` statement; returns
    // (exposed_name, source_name) pairs.
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"export\s*\{([^}]*)\}"#).expect("valid regex"));
    let Some(caps) = re.captures(content) else {
        return Vec::new();
    };
    caps[1]
        .split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            if let Some((src, alias)) = entry.split_once(" as ") {
                Some((alias.trim().to_string(), src.trim().to_string()))
            } else {
                Some((entry.to_string(), entry.to_string()))
            }
        })
        .collect()
}

/// §4.2.4: wrap an import-map target's content in an IIFE that re-exposes
/// only its declared exports, then destructure them at the call site.
pub fn inline_import_map_target(content: &str) -> (String, Vec<String>) {
    let exports = exported_names(content);
    let body = strip_all_imports(content);
    let body = strip_export_lines(&body);
    let export_names: Vec<String> = exports.iter().map(|(exposed, _)| exposed.clone()).collect();
    let return_fields = exports
        .iter()
        .map(|(exposed, source)| {
            if exposed == source {
                exposed.clone()
            } else {
                format!("{exposed}: {source}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let wrapped = format!(
        "const __m = (() => {{\n{body}\n  return {{ {return_fields} }};\n}})();\nconst {{ {names} }} = __m;",
        names = export_names.join(", "),
    );
    (wrapped, export_names)
}

fn strip_export_lines(code: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"(?m)^\s*export\s*\{[^}]*\}\s*;?\s*$"#).expect("valid regex"));
    re.replace_all(code, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_shared_module_strips_import_and_concatenates() {
        let main = r#"import {g} from "_shared/greet.ts";
async function handler(r) { return {status:200, body:g("x")}; }"#;
        let shared = vec![(
            "greet.ts".to_string(),
            r#"export const g = (n)=>"hi "+n;"#.to_string(),
        )];
        let artifact = inline_shared_modules(main, &shared).unwrap();
        assert!(artifact.contains("const g ="));
        assert!(!artifact.contains("import"));
    }

    #[test]
    fn duplicate_const_surfaces_as_error() {
        let main = r#"const g = 1;
async function handler(r) { return {status:200, body:g}; }"#;
        let shared = vec![("greet.ts".to_string(), "export const g = 2;".to_string())];
        let err = inline_shared_modules(main, &shared).unwrap_err();
        assert_eq!(err.kind, edgefn_errors::ErrorKind::BundleError);
    }

    #[test]
    fn multiline_import_fully_elided() {
        let main = "import {\n  g,\n  h,\n} from \"_shared/greet.ts\";\nhandler();";
        let stripped = strip_imports(main, |s| s.contains("_shared/"));
        assert!(!stripped.contains("import"));
        assert!(stripped.contains("handler();"));
    }

    #[test]
    fn import_map_target_wraps_exports() {
        let content = "export function add(a,b){return a+b;}\nexport { add as sum };";
        let (wrapped, names) = inline_import_map_target(content);
        assert_eq!(names, vec!["sum"]);
        assert!(wrapped.contains("const __m ="));
        assert!(wrapped.contains("const { sum } = __m;"));
    }
}
