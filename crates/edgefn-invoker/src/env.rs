//! §4.3.1 curated subprocess environment: only the system's own namespace is
//! forwarded, with an explicit deny-list stripping anything that looks like
//! a credential regardless of its value. Generalises the bundler's
//! `curated_bundler_env` (which only needs the allow side) with the deny
//! side spec §4.3.1 and §5 ("Any implementation must resist the urge to
//! 'pass through' untrusted environment variables convenient for debugging")
//! require for the sandbox.

const RESERVED_PREFIX: &str = "EDGEFN_";
const DENY_SUBSTRINGS: &[&str] = &["SECRET", "PASSWORD", "ACCESS_KEY", "SETUP_TOKEN"];

/// Builds the environment the sandbox subprocess is spawned with: the
/// caller's `EDGEFN_`-prefixed variables (minus the deny-list), plus a
/// forced `HOME` and scratch cache directory so the subprocess can't read
/// the host user's caches.
pub fn curated_sandbox_env(home: &str, cache_dir: &str) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = std::env::vars()
        .filter(|(k, _)| k.starts_with(RESERVED_PREFIX))
        .filter(|(k, _)| !DENY_SUBSTRINGS.iter().any(|needle| k.contains(needle)))
        .collect();
    env.push(("HOME".to_string(), home.to_string()));
    env.push(("DENO_DIR".to_string(), cache_dir.to_string()));
    env
}

/// Additional user-declared environment variables forwarded only when the
/// function's `allow_env` permission bit is set (the advisory-only quadruple
/// of spec §3; the sandbox's own `--allow-env` flag is the real enforcement
/// point, this just decides what's *available* to approve).
pub fn merge_user_env(base: Vec<(String, String)>, user_env: &[(String, String)]) -> Vec<(String, String)> {
    let mut env = base;
    for (k, v) in user_env {
        if DENY_SUBSTRINGS.iter().any(|needle| k.contains(needle)) {
            continue;
        }
        env.push((k.clone(), v.clone()));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_credential_like_names_regardless_of_prefix() {
        std::env::set_var("EDGEFN_SECRET_TOKEN", "leak-me");
        std::env::set_var("EDGEFN_SAFE_FLAG", "ok");
        let env = curated_sandbox_env("/scratch/home", "/scratch/deno");
        assert!(env.iter().any(|(k, _)| k == "EDGEFN_SAFE_FLAG"));
        assert!(!env.iter().any(|(k, _)| k == "EDGEFN_SECRET_TOKEN"));
        std::env::remove_var("EDGEFN_SECRET_TOKEN");
        std::env::remove_var("EDGEFN_SAFE_FLAG");
    }

    #[test]
    fn forces_home_and_cache_dir() {
        let env = curated_sandbox_env("/scratch/home", "/scratch/deno");
        assert!(env.contains(&("HOME".to_string(), "/scratch/home".to_string())));
        assert!(env.contains(&("DENO_DIR".to_string(), "/scratch/deno".to_string())));
    }

    #[test]
    fn merge_user_env_still_denies_credentials() {
        let base = vec![("HOME".to_string(), "/h".to_string())];
        let merged = merge_user_env(
            base,
            &[
                ("MY_SECRET_KEY".to_string(), "x".to_string()),
                ("MY_FLAG".to_string(), "y".to_string()),
            ],
        );
        assert!(merged.iter().any(|(k, _)| k == "MY_FLAG"));
        assert!(!merged.iter().any(|(k, _)| k == "MY_SECRET_KEY"));
    }
}
