//! Write a configuration value as a YAML document, with registered help
//! texts rendered as comments. The output round-trips through the loader's
//! file source, so it doubles as a starting template for users.

use std::io;
use std::path::Path;

use serde::Serialize;

use crate::node::{MapItem, Node, Scalar};
use crate::value::to_node;

/// Render `config` as a YAML document with `# help` comments above the
/// annotated fields.
///
/// Panics when `config` does not project to a record, which is a programmer
/// error.
pub fn render<C: Serialize>(config: &C, help: &[(String, String)]) -> String {
    let mut node = match to_node(config) {
        Ok(node @ Node::Map(_)) => node,
        Ok(other) => panic!("cannot save a non-record value: {other}"),
        Err(e) => panic!("cannot save configuration: {e}"),
    };
    node.annotate(help);

    let Node::Map(items) = &node else {
        unreachable!()
    };
    let mut out = String::new();
    write_map(&mut out, items, 0);
    out
}

/// Write `config` to `w` in YAML format.
pub fn save<C: Serialize>(w: &mut impl io::Write, config: &C) -> io::Result<()> {
    w.write_all(render(config, &[]).as_bytes())
}

/// Write `config` to the file at `path`, creating it if needed.
pub fn save_to<C: Serialize>(path: impl AsRef<Path>, config: &C) -> io::Result<()> {
    std::fs::write(path, render(config, &[]))
}

fn write_map(out: &mut String, items: &[MapItem], indent: usize) {
    for item in items {
        if let Some(help) = &item.help {
            out.push('\n');
            write_indent(out, indent);
            out.push_str("# ");
            out.push_str(help);
            out.push('\n');
        }
        write_indent(out, indent);
        out.push_str(&item.name);
        out.push_str(": ");
        write_value(out, &item.value, indent);
    }
}

fn write_value(out: &mut String, node: &Node, indent: usize) {
    match node {
        Node::Map(items) => {
            out.push('\n');
            write_map(out, items, indent + 1);
        }
        Node::Array(items) => {
            out.push('\n');
            for item in items {
                write_indent(out, indent + 1);
                out.push_str("- ");
                write_value(out, item, indent + 1);
            }
        }
        Node::Scalar(Scalar::Null) => out.push('\n'),
        Node::Scalar(Scalar::Str(s)) => write_string(out, s, indent),
        Node::Scalar(scalar) => {
            out.push_str(&scalar.to_string());
            out.push('\n');
        }
    }
}

/// Plain strings print bare; strings that would read as YAML syntax or
/// keywords are JSON-quoted, and multiline strings use a literal block.
fn write_string(out: &mut String, s: &str, indent: usize) {
    if s.is_empty() {
        out.push('\n');
        return;
    }

    let trimmed = s.trim();
    if !trimmed.is_empty() {
        let first = trimmed.chars().next().expect("non-empty after trim");
        let syntax = matches!(
            first,
            '\'' | '"' | '`' | '>' | '|' | '?' | '!' | '&' | '@' | '%' | '*' | '-' | '[' | ']'
                | '{' | '}' | ':'
        );
        let keyword = matches!(
            trimmed,
            "true" | "True" | "TRUE" | "false" | "False" | "FALSE" | "null" | "Null" | "NULL"
                | ".nan" | ".NaN" | ".NAN" | ".inf" | ".Inf" | ".INF"
        );
        if syntax || keyword {
            out.push_str(&serde_json::to_string(s).expect("string quoting cannot fail"));
            out.push('\n');
            return;
        }
    }

    if !s.contains('\n') {
        out.push_str(s);
        out.push('\n');
        return;
    }

    out.push_str("|\n");
    for line in s.split('\n') {
        write_indent(out, indent + 1);
        out.push_str(line);
        out.push('\n');
    }
}

fn write_indent(out: &mut String, n: usize) {
    for _ in 0..n {
        out.push_str("  ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::from_node;
    use serde::Deserialize;
    use serde_yaml_ng::Value as Yaml;
    use std::time::Duration;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Database {
        url: Option<String>,
        pool: i64,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Config {
        host: String,
        port: i64,
        debug: bool,
        timeout: Duration,
        labels: Vec<String>,
        database: Database,
    }

    fn sample() -> Config {
        Config {
            host: "localhost".into(),
            port: 8080,
            debug: false,
            timeout: Duration::from_secs(10),
            labels: vec!["a".into(), "b".into()],
            database: Database {
                url: None,
                pool: 5,
            },
        }
    }

    #[test]
    fn renders_nested_yaml() {
        let out = render(&sample(), &[]);
        assert_eq!(
            out,
            "host: localhost\n\
             port: 8080\n\
             debug: false\n\
             timeout: 10s\n\
             labels: \n\
             \x20 - a\n\
             \x20 - b\n\
             database: \n\
             \x20 url: \n\
             \x20 pool: 5\n"
        );
    }

    #[test]
    fn renders_help_comments() {
        let out = render(
            &sample(),
            &[
                ("host".to_string(), "The application host.".to_string()),
                ("database.pool".to_string(), "Connection pool size.".to_string()),
            ],
        );
        assert!(out.contains("\n# The application host.\nhost: localhost\n"));
        assert!(out.contains("\n  # Connection pool size.\n  pool: 5\n"));
    }

    #[test]
    fn quotes_strings_that_read_as_yaml() {
        #[derive(Serialize)]
        struct S {
            a: String,
            b: String,
            c: String,
        }
        let out = render(
            &S {
                a: "true".into(),
                b: "- item".into(),
                c: "plain text".into(),
            },
            &[],
        );
        assert!(out.contains("a: \"true\"\n"));
        assert!(out.contains("b: \"- item\"\n"));
        assert!(out.contains("c: plain text\n"));
    }

    #[test]
    fn multiline_strings_use_a_literal_block() {
        #[derive(Serialize)]
        struct S {
            text: String,
        }
        let out = render(
            &S {
                text: "first\nsecond".into(),
            },
            &[],
        );
        assert_eq!(out, "text: |\n  first\n  second\n");
    }

    #[test]
    fn rendered_output_round_trips_through_the_codec() {
        let original = sample();
        let out = render(&original, &[]);

        let value: Yaml = serde_yaml_ng::from_str(&out).unwrap();
        let mut node = to_node(&original).unwrap();
        node.merge_yaml(&value);
        let back: Config = from_node(&node).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn save_to_writes_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.yml");
        save_to(&path, &sample()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("host: localhost"));
    }

    #[test]
    #[should_panic(expected = "non-record")]
    fn saving_a_scalar_panics() {
        render(&42, &[]);
    }
}
