//! Deno-style import map parsing and the merge order of §4.2.5: global
//! defaults ⊕ `_shared/` alias (if shared modules exist) ⊕ the
//! function-provided map, function wins last.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportMap {
    pub imports: BTreeMap<String, String>,
}

impl ImportMap {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let imports = value
            .get("imports")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self { imports })
    }

    /// Entries whose target is a local filesystem path rather than a URL or
    /// npm/jsr specifier (§4.2.2 strategy-selection trigger).
    pub fn local_alias_targets(&self) -> Vec<(&str, &str)> {
        self.imports
            .iter()
            .filter(|(_, target)| is_local_path(target))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    /// Merge `other` on top of `self`: `other`'s entries win on key clash.
    pub fn merged_with(mut self, other: &ImportMap) -> Self {
        for (k, v) in &other.imports {
            self.imports.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "imports": self.imports })
    }
}

fn is_local_path(target: &str) -> bool {
    !(target.starts_with("npm:")
        || target.starts_with("jsr:")
        || target.starts_with("https:")
        || target.starts_with("http:")
        || target.starts_with("node:"))
}

/// Builds the merged map the external bundler is invoked with: global
/// defaults, then a `_shared/` alias pointing at the materialised shared
/// module directory if any shared modules are present, then the
/// function-provided map last (it wins).
pub fn merge_for_external_bundling(
    global_defaults: Option<&ImportMap>,
    has_shared_modules: bool,
    function_map: Option<&ImportMap>,
) -> ImportMap {
    let mut merged = global_defaults.cloned().unwrap_or_default();
    if has_shared_modules {
        merged
            .imports
            .insert("_shared/".to_string(), "./_shared/".to_string());
    }
    if let Some(function_map) = function_map {
        merged = merged.merged_with(function_map);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_local_alias_targets() {
        let map = ImportMap::parse(r#"{"imports": {"sdk": "/sdk/dist/index.js", "lodash": "npm:lodash"}}"#).unwrap();
        let local = map.local_alias_targets();
        assert_eq!(local, vec![("sdk", "/sdk/dist/index.js")]);
    }

    #[test]
    fn function_map_wins_on_merge() {
        let global = ImportMap {
            imports: BTreeMap::from([("a".to_string(), "npm:a@1".to_string())]),
        };
        let function = ImportMap {
            imports: BTreeMap::from([("a".to_string(), "npm:a@2".to_string())]),
        };
        let merged = merge_for_external_bundling(Some(&global), true, Some(&function));
        assert_eq!(merged.imports.get("a").unwrap(), "npm:a@2");
        assert_eq!(merged.imports.get("_shared/").unwrap(), "./_shared/");
    }
}
