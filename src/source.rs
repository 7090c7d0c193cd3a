//! Pluggable configuration sources.
//!
//! A [`Source`] decodes values into the shared [`Node`] tree; the loader runs
//! every configured source in order, so later sources overwrite earlier ones
//! on overlapping fields. A source may also contribute its own command-line
//! flag (the file source's "where is the file" flag), which the loader parses
//! and hands over before any source runs.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use log::{debug, trace};
use serde_yaml_ng::Value as Yaml;

use crate::error::ConflateError;
use crate::node::{Node, Scalar};
use crate::path;

/// A provider of configuration values, applied once per load.
pub trait Source {
    /// Decode this source's values into the destination tree.
    fn load(&mut self, dst: &mut Node) -> Result<(), ConflateError>;

    /// The command-line flag this source wants, if any.
    fn flag_spec(&self) -> Option<FlagSpec> {
        None
    }

    /// Receive the value of the contributed flag, parsed before any source
    /// runs.
    fn set_flag(&mut self, _value: &str) {}
}

/// Description of a source-contributed flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    pub name: String,
    pub help: String,
}

/// Adapter that lets a plain closure act as a source.
pub struct SourceFn<F>(pub F);

impl<F> Source for SourceFn<F>
where
    F: FnMut(&mut Node) -> Result<(), ConflateError>,
{
    fn load(&mut self, dst: &mut Node) -> Result<(), ConflateError> {
        (self.0)(dst)
    }
}

/// Parse a raw textual value through the structured codec.
pub(crate) fn decode_text(key: &str, raw: &str) -> Result<Yaml, ConflateError> {
    if raw.trim().is_empty() {
        return Ok(Yaml::String(raw.to_string()));
    }
    serde_yaml_ng::from_str(raw).map_err(|e| ConflateError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Decode one textual value into the tree at `dotted`.
///
/// Text-valued leaves (strings, durations) take the raw text as-is, so
/// addresses like `[::1%11]:80` never go through the codec's flow syntax;
/// every other target decodes structurally.
pub(crate) fn decode_into(dst: &mut Node, dotted: &str, raw: &str) -> Result<(), ConflateError> {
    let text_leaf = matches!(
        dst.get(dotted),
        Some(Node::Scalar(Scalar::Str(_) | Scalar::Duration(_)))
    );
    let value = if text_leaf {
        Yaml::String(raw.to_string())
    } else {
        decode_text(dotted, raw)?
    };
    dst.set_path(dotted, &value);
    Ok(())
}

/// Loads values from `KEY=VALUE` environment entries.
///
/// Keys are computed per field as the upper snake-case of the underscore
/// joined path, prefixed with `prefix` when non-empty. Matching is a
/// case-sensitive exact prefix match on `KEY=`; the first matching entry per
/// field wins, and entries that match nothing are ignored.
pub struct EnvSource {
    prefix: String,
    entries: Vec<String>,
}

impl EnvSource {
    pub fn new<I, S>(prefix: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnvSource {
            prefix: prefix.to_string(),
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }
}

impl Source for EnvSource {
    fn load(&mut self, dst: &mut Node) -> Result<(), ConflateError> {
        if self.entries.is_empty() {
            return Ok(());
        }

        let mut matched = Vec::new();
        dst.scan(&self.prefix, "_", &mut |dotted, _, _| {
            let key = format!("{}=", path::snakecase_upper(dotted));
            for entry in &self.entries {
                if let Some(raw) = entry.strip_prefix(&key) {
                    matched.push((dotted.to_string(), raw.to_string()));
                    break;
                }
            }
        });

        for (dotted, raw) in matched {
            trace!("env: {dotted} <- {raw:?}");
            decode_into(dst, &dotted, &raw)?;
        }
        Ok(())
    }
}

/// Loads a configuration file whose location arrives through this source's
/// own flag. An unset location is a no-op; a configured but unreadable file
/// is an error.
///
/// The file body is rendered against the supplied variable bindings
/// (`{{ NAME }}` is replaced by the binding for `NAME`) before being handed
/// to the decode function.
pub struct FileSource {
    flag: String,
    location: String,
    vars: HashMap<String, String>,
    read: Box<dyn FnMut(&str) -> io::Result<Vec<u8>>>,
    decode: Box<dyn FnMut(&[u8], &mut Node) -> Result<(), ConflateError>>,
}

impl FileSource {
    pub fn new<R, D>(flag: &str, vars: HashMap<String, String>, read: R, decode: D) -> Self
    where
        R: FnMut(&str) -> io::Result<Vec<u8>> + 'static,
        D: FnMut(&[u8], &mut Node) -> Result<(), ConflateError> + 'static,
    {
        FileSource {
            flag: flag.to_string(),
            location: String::new(),
            vars,
            read: Box::new(read),
            decode: Box::new(decode),
        }
    }

    /// A file source reading from the filesystem and decoding as YAML.
    pub fn yaml(flag: &str, vars: HashMap<String, String>) -> Self {
        FileSource::new(
            flag,
            vars,
            |location| std::fs::read(location),
            |bytes, node| {
                let value: Yaml =
                    serde_yaml_ng::from_slice(bytes).map_err(|e| ConflateError::Decode {
                        key: "<config-file>".into(),
                        reason: e.to_string(),
                    })?;
                node.merge_yaml(&value);
                Ok(())
            },
        )
    }
}

impl Source for FileSource {
    fn load(&mut self, dst: &mut Node) -> Result<(), ConflateError> {
        if self.location.is_empty() {
            return Ok(());
        }

        debug!("loading configuration file {}", self.location);
        let bytes = (self.read)(&self.location).map_err(|e| ConflateError::Io {
            path: PathBuf::from(&self.location),
            source: e,
        })?;

        let rendered = render(&String::from_utf8_lossy(&bytes), &self.vars);
        (self.decode)(rendered.as_bytes(), dst)
    }

    fn flag_spec(&self) -> Option<FlagSpec> {
        Some(FlagSpec {
            name: self.flag.clone(),
            help: "Location to load the configuration file from.".to_string(),
        })
    }

    fn set_flag(&mut self, value: &str) {
        self.location = value.to_string();
    }
}

/// Substitute `{{ NAME }}` occurrences with the binding for `NAME`.
/// Unbound names render empty.
fn render(contents: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut rest = contents;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open..].find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = rest[open + 2..open + close].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => debug!("template: no binding for {name:?}"),
        }
        rest = &rest[open + close + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{from_node, to_node};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
    struct KinesisConfig {
        stream_name: String,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
    struct TestConfig {
        kinesis: KinesisConfig,
    }

    #[test]
    fn env_source_matches_nested_fields() {
        let mut node = to_node(&TestConfig::default()).unwrap();
        let mut src = EnvSource::new("collector", ["COLLECTOR_KINESIS_STREAM_NAME=blah"]);
        src.load(&mut node).unwrap();

        let config: TestConfig = from_node(&node).unwrap();
        assert_eq!(config.kinesis.stream_name, "blah");
    }

    #[test]
    fn env_source_without_prefix() {
        #[derive(Serialize, Deserialize, Debug, Default)]
        struct Config {
            stream_name: String,
        }
        let mut node = to_node(&Config::default()).unwrap();
        let mut src = EnvSource::new("", ["STREAM_NAME=blah"]);
        src.load(&mut node).unwrap();

        let config: Config = from_node(&node).unwrap();
        assert_eq!(config.stream_name, "blah");
    }

    #[test]
    fn env_source_first_match_wins_and_rest_is_ignored() {
        #[derive(Serialize, Deserialize, Debug, Default)]
        struct Config {
            a: i32,
        }
        let mut node = to_node(&Config { a: 1 }).unwrap();
        let mut src = EnvSource::new(
            "test",
            ["UNRELATED=x", "TEST_A=42", "TEST_A=7", "TEST_B=ignored"],
        );
        src.load(&mut node).unwrap();

        let config: Config = from_node(&node).unwrap();
        assert_eq!(config.a, 42);
    }

    #[test]
    fn env_source_keeps_raw_text_for_string_fields() {
        #[derive(Serialize, Deserialize, Debug, Default)]
        struct Config {
            addr: String,
        }
        let mut node = to_node(&Config::default()).unwrap();
        let mut src = EnvSource::new("test", ["TEST_ADDR=[::1%11]:80"]);
        src.load(&mut node).unwrap();

        let config: Config = from_node(&node).unwrap();
        assert_eq!(config.addr, "[::1%11]:80");
    }

    #[test]
    fn env_source_reports_undecodable_values() {
        #[derive(Serialize, Deserialize, Debug, Default)]
        struct Config {
            l: Vec<i32>,
        }
        let mut node = to_node(&Config::default()).unwrap();
        let mut src = EnvSource::new("test", ["TEST_L=[1, 2"]);
        let err = src.load(&mut node).unwrap_err();
        assert!(matches!(err, ConflateError::Decode { .. }), "got {err}");
    }

    #[test]
    fn file_source_is_a_noop_without_a_location() {
        let mut node = to_node(&TestConfig::default()).unwrap();
        let before = node.clone();
        let mut src = FileSource::new(
            "config-file",
            HashMap::new(),
            |_| panic!("read should not be called"),
            |_, _| panic!("decode should not be called"),
        );
        src.load(&mut node).unwrap();
        assert_eq!(node, before);
    }

    #[test]
    fn file_source_reads_and_decodes_when_located() {
        #[derive(Serialize, Deserialize, Debug, Default)]
        struct Config {
            message: String,
        }
        let mut node = to_node(&Config::default()).unwrap();

        let mut src = FileSource::new(
            "config-file",
            HashMap::new(),
            |location| {
                assert_eq!(location, "conf.yml");
                Ok(b"message: hello".to_vec())
            },
            |bytes, node| {
                let value: Yaml = serde_yaml_ng::from_slice(bytes).unwrap();
                node.merge_yaml(&value);
                Ok(())
            },
        );
        src.set_flag("conf.yml");
        src.load(&mut node).unwrap();

        let config: Config = from_node(&node).unwrap();
        assert_eq!(config.message, "hello");
    }

    #[test]
    fn file_source_renders_template_bindings() {
        let vars = HashMap::from([
            ("X".to_string(), "21".to_string()),
            ("Y".to_string(), "42".to_string()),
        ]);
        assert_eq!(
            render("p: { x: {{ X }}, y: {{ Y }} }", &vars),
            "p: { x: 21, y: 42 }"
        );
        assert_eq!(render("no actions", &vars), "no actions");
        assert_eq!(render("gone: {{ MISSING }}!", &vars), "gone: !");
    }

    #[test]
    fn file_source_contributes_its_flag() {
        let src = FileSource::yaml("config-file", HashMap::new());
        let spec = src.flag_spec().unwrap();
        assert_eq!(spec.name, "config-file");
        assert!(!spec.help.is_empty());
    }

    #[test]
    fn closures_are_sources() {
        let mut node = to_node(&TestConfig::default()).unwrap();
        let mut src = SourceFn(|dst: &mut Node| -> Result<(), ConflateError> {
            let value: Yaml =
                serde_yaml_ng::from_str("kinesis: { stream_name: from-closure }").unwrap();
            dst.merge_yaml(&value);
            Ok(())
        });
        src.load(&mut node).unwrap();

        let config: TestConfig = from_node(&node).unwrap();
        assert_eq!(config.kinesis.stream_name, "from-closure");
    }
}
