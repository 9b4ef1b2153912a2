//! Command expansion: substitute flag values and I/O host paths into a
//! node def's command template, then split into argv.
//!
//! Expansion is a single flat substitution pass — no recursive expansion,
//! no sub-shell semantics, matching the spec's deliberately narrow scope.

use std::collections::HashMap;

use crate::error::WorkerError;
use crate::io::ResolvedPath;

/// Builds the substitution map: validated flag values plus every resolved
/// input/output path, keyed by local name.
#[must_use]
pub fn build_env(flags: &HashMap<String, String>, inputs: &[ResolvedPath], outputs: &[ResolvedPath]) -> HashMap<String, String> {
    let mut env = flags.clone();
    for path in inputs.iter().chain(outputs.iter()) {
        env.insert(path.port_name.clone(), path.host_path.clone());
    }
    env
}

/// Substitutes every `$name` token in `exec` from `env`, then splits the
/// result on shell-word boundaries into argv.
///
/// # Errors
///
/// Returns an error if the substituted string isn't valid shell-word
/// syntax (unbalanced quotes).
pub fn expand(exec: &str, env: &HashMap<String, String>) -> Result<Vec<String>, WorkerError> {
    let substituted = substitute(exec, env);
    shell_words::split(&substituted).map_err(|e| WorkerError::CommandExpansionFailed { message: e.to_string() })
}

fn substitute(template: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }

        if name.is_empty() {
            out.push('$');
        } else if let Some(value) = env.get(&name) {
            out.push_str(value);
        } else {
            out.push('$');
            out.push_str(&name);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables() {
        let mut env = HashMap::new();
        env.insert("in".to_string(), "/tmp/a.png".to_string());
        env.insert("out".to_string(), "/tmp/b.png".to_string());
        let argv = expand("resize --in $in --out $out --scale 2", &env).unwrap();
        assert_eq!(argv, vec!["resize", "--in", "/tmp/a.png", "--out", "/tmp/b.png", "--scale", "2"]);
    }

    #[test]
    fn leaves_unknown_variables_untouched() {
        let env = HashMap::new();
        let argv = expand("run $missing", &env).unwrap();
        assert_eq!(argv, vec!["run", "$missing"]);
    }

    #[test]
    fn splits_quoted_arguments() {
        let mut env = HashMap::new();
        env.insert("msg".to_string(), "hello world".to_string());
        let argv = expand(r#"echo "$msg""#, &env).unwrap();
        assert_eq!(argv, vec!["echo", "hello world"]);
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        let env = HashMap::new();
        assert!(expand(r#"echo "unterminated"#, &env).is_err());
    }
}
