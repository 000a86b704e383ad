//! §4.2.5: cleaning up the external bundler's stderr into a diagnostic safe
//! to surface to the function author (no scratch-path leakage).

const INTERESTING_MARKERS: &[&str] = &["error:", "Module not found", "Expected", "Unexpected"];

/// Filter `stderr` to lines worth surfacing, then rewrite any absolute
/// scratch-directory path (our `index.ts`) to the sentinel `function.ts`.
pub fn clean_diagnostic(stderr: &str, scratch_dir: &std::path::Path) -> String {
    let scratch = scratch_dir.to_string_lossy();
    let entry_path = scratch_dir.join("index.ts");
    let entry = entry_path.to_string_lossy();
    let lines: Vec<String> = stderr
        .lines()
        .filter(|line| INTERESTING_MARKERS.iter().any(|marker| line.contains(marker)))
        .map(|line| line.replace(entry.as_ref(), "function.ts").replace(scratch.as_ref(), "."))
        .collect();
    if lines.is_empty() {
        // Nothing matched a known marker; fall back to the raw tail so the
        // caller still has something actionable.
        stderr
            .replace(entry.as_ref(), "function.ts")
            .replace(scratch.as_ref(), ".")
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_to_known_markers_and_rewrites_path() {
        let dir = std::path::Path::new("/tmp/edgefn-scratch-abc123");
        let stderr = format!(
            "some noise\nerror: Module not found \"{}/index.ts\"\nanother noise",
            dir.display()
        );
        let cleaned = clean_diagnostic(&stderr, dir);
        assert!(cleaned.contains("function.ts"));
        assert!(!cleaned.contains("/tmp/edgefn-scratch-abc123"));
        assert!(!cleaned.contains("some noise"));
    }
}
