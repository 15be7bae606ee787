// src/guard/template.rs

//! Per-run substitution of `{{path}}`, `{{op}}` and `{{file}}` in command
//! arguments. The `{{.path}}` form and inner whitespace are accepted too.

use std::path::PathBuf;

use tracing::debug;

use crate::types::Op;

/// The change that caused a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Path relative to the watch root, with forward slashes.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub op: Op,
}

/// Render every argument for one run. Without a trigger (the initial run)
/// placeholders become empty strings.
pub fn render_args(args: &[String], trigger: Option<&Trigger>) -> Vec<String> {
    args.iter().map(|arg| render(arg, trigger)).collect()
}

/// Log-friendly rendering of a command line: each argument JSON-quoted and
/// cut to 20 characters.
pub fn display_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            let short = if arg.chars().count() > MAX_ARG_CHARS {
                let head: String = arg.chars().take(MAX_ARG_CHARS).collect();
                format!("{head} ...")
            } else {
                arg.clone()
            };
            serde_json::to_string(&short).unwrap_or(short)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

const MAX_ARG_CHARS: usize = 20;

fn render(arg: &str, trigger: Option<&Trigger>) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let inner = &rest[start + 2..start + 2 + len];
        let name = inner.trim();
        let name = name.strip_prefix('.').unwrap_or(name);

        out.push_str(&rest[..start]);
        match substitute(name, trigger) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 4 + len]),
        }
        rest = &rest[start + 4 + len..];
    }

    out.push_str(rest);
    out
}

fn substitute(name: &str, trigger: Option<&Trigger>) -> Option<String> {
    let value = match name {
        "path" => trigger.map(|t| t.rel_path.clone()),
        "op" => trigger.map(|t| t.op.as_str().to_string()),
        "file" => trigger.map(|t| match std::fs::read_to_string(&t.abs_path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = ?t.abs_path, error = %err, "cannot read {{file}} contents");
                String::new()
            }
        }),
        _ => return None,
    };
    Some(value.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(rel: &str, op: Op) -> Trigger {
        Trigger {
            rel_path: rel.to_string(),
            abs_path: PathBuf::from("/nonexistent").join(rel),
            op,
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn substitutes_path_and_op() {
        let t = trigger("sub/x", Op::Write);
        let got = render_args(&args(&["echo", "ok", "{{path}}", "{{ .op }}:{{.path}}"]), Some(&t));
        assert_eq!(got, ["echo", "ok", "sub/x", "WRITE:sub/x"]);
    }

    #[test]
    fn initial_run_renders_empty() {
        let got = render_args(&args(&["run", "{{path}}", "--op={{op}}"]), None);
        assert_eq!(got, ["run", "", "--op="]);
    }

    #[test]
    fn unknown_and_unterminated_placeholders_are_kept() {
        let t = trigger("a", Op::Create);
        let got = render_args(&args(&["{{name}}", "{{path", "x}}{{path}}"]), Some(&t));
        assert_eq!(got, ["{{name}}", "{{path", "x}}a"]);
    }

    #[test]
    fn display_args_quotes_and_truncates() {
        let got = display_args(&args(&["echo", "a \"b\"", "0123456789abcdefghijKLMN"]));
        assert_eq!(got, r#""echo" "a \"b\"" "0123456789abcdefghij ...""#);
    }

    #[test]
    fn file_placeholder_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msg.txt");
        std::fs::write(&path, "hello").unwrap();
        let t = Trigger {
            rel_path: "msg.txt".to_string(),
            abs_path: path,
            op: Op::Write,
        };
        assert_eq!(render_args(&args(&["<{{file}}>"]), Some(&t)), ["<hello>"]);
        assert_eq!(render_args(&args(&["<{{file}}>"]), Some(&trigger("gone", Op::Remove))), ["<>"]);
    }
}
