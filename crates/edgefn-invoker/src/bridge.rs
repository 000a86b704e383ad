//! The runtime bridge: a single embedded template string appended after the
//! user's artifact, in the spirit of the teacher's `isolate::bundled_js`
//! module which embeds a generated asset at compile time via `include_str!`.

const BRIDGE_TEMPLATE: &str = include_str!("bridge.js");

/// Renders the full scratch-file contents: the artifact, then the bridge
/// with the serialized request substituted inline (spec §4.3.1: "parses the
/// serialised request (passed inline, not via environment)").
pub fn render(artifact: &str, request_json: &str) -> String {
    let bridge = BRIDGE_TEMPLATE.replace("__REQUEST_JSON__", request_json);
    format!("{artifact}\n\n// --- runtime bridge ---\n{bridge}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_request_json_inline() {
        let out = render("async function handler(r){return r;}", r#"{"method":"GET"}"#);
        assert!(out.contains(r#"const __request = {"method":"GET"};"#));
        assert!(!out.contains("__REQUEST_JSON__"));
    }
}
