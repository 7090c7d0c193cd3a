//! The loader: one merge of file, environment, and command-line values into
//! a typed configuration struct.
//!
//! Per load, the caller's value is projected into a [`Node`] tree carrying
//! the defaults, sources decode into the tree in configured order, and the
//! command line is applied strictly last so it always wins. The populated
//! tree is then copied back into the caller's value. A failed load leaves
//! the destination untouched.

use std::collections::HashMap;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ConflateError, Violation, Violations};
use crate::flag::{apply_source_flags, FlagSet};
use crate::node::Node;
use crate::source::{EnvSource, FileSource, Source};
use crate::value::{from_node, to_node};

/// A declared sub-command: its name and a help line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub help: String,
}

impl Command {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Command {
            name: name.into(),
            help: help.into(),
        }
    }
}

/// What a successful load produced besides the populated value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The matched sub-command, when commands are configured.
    pub command: Option<String>,
    /// Arguments that were not consumed by flags.
    pub args: Vec<String>,
}

/// Merges configuration sources into a typed value.
///
/// ```no_run
/// use conflate::{EnvSource, Loader};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Default)]
/// struct Config {
///     message: String,
/// }
///
/// let mut config = Config::default();
/// let entries: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
/// let outcome = Loader::new("myapp")
///     .args(std::env::args().skip(1))
///     .source(EnvSource::new("myapp", entries))
///     .help("message", "The message to print out.")
///     .load(&mut config)?;
/// # Ok::<(), conflate::ConflateError>(())
/// ```
pub struct Loader {
    name: String,
    args: Vec<String>,
    sources: Vec<Box<dyn Source>>,
    commands: Vec<Command>,
    help: Vec<(String, String)>,
}

impl Loader {
    /// A loader for the named program, with no arguments and no sources.
    pub fn new(name: &str) -> Self {
        Loader {
            name: name.to_string(),
            args: Vec::new(),
            sources: Vec::new(),
            commands: Vec::new(),
            help: Vec::new(),
        }
    }

    /// The argument vector, program name excluded.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append a source. Sources run in the order they were added; later
    /// sources overwrite earlier ones on overlapping fields.
    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Declare a sub-command. Once any command is declared, the first
    /// argument must match one of them.
    pub fn command(mut self, name: &str, help: &str) -> Self {
        self.commands.push(Command::new(name, help));
        self
    }

    /// Attach help text to a field by its dotted path, for the flag set and
    /// the template writer.
    pub fn help(mut self, dotted: &str, text: &str) -> Self {
        self.help.push((dotted.to_string(), text.to_string()));
        self
    }

    /// Load the configuration into `config` and return the outcome.
    ///
    /// Panics when `config` does not project to a record (a programmer
    /// error); every load-time failure is returned.
    pub fn load<C>(&mut self, config: &mut C) -> Result<Outcome, ConflateError>
    where
        C: Serialize + DeserializeOwned,
    {
        let mut node = match to_node(config) {
            Ok(node @ Node::Map(_)) => node,
            Ok(other) => panic!("cannot load configuration into a non-record value: {other}"),
            Err(e) => panic!("cannot load configuration: {e}"),
        };
        node.annotate(&self.help);

        let mut args = self.args.clone();
        let command = self.resolve_command(&mut args)?;

        let specs: Vec<_> = self
            .sources
            .iter()
            .filter_map(|source| source.flag_spec())
            .collect();
        let flags = FlagSet::new(&self.name, &node, &specs);
        let (matches, leftover) = flags.parse(&args)?;

        // Sources capture their own flags (a file source's location) before
        // any of them runs.
        apply_source_flags(&matches, &mut self.sources);

        for source in &mut self.sources {
            source.load(&mut node)?;
        }

        // The command line is the last write, whatever the source order.
        flags.apply(&matches, &mut node)?;

        debug!("merged configuration: {node}");
        *config = from_node(&node)?;

        Ok(Outcome {
            command,
            args: leftover,
        })
    }

    /// Load, then run `validate` over the populated value. Every violation
    /// is aggregated into one composite error, sorted by field path.
    pub fn load_validated<C, F>(
        &mut self,
        config: &mut C,
        validate: F,
    ) -> Result<Outcome, ConflateError>
    where
        C: Serialize + DeserializeOwned,
        F: FnOnce(&C) -> Vec<Violation>,
    {
        let outcome = self.load(config)?;
        let violations = validate(config);
        if violations.is_empty() {
            Ok(outcome)
        } else {
            Err(ConflateError::Invalid(Violations::new(violations)))
        }
    }

    fn resolve_command(&self, args: &mut Vec<String>) -> Result<Option<String>, ConflateError> {
        if self.commands.is_empty() {
            return Ok(None);
        }
        let first = args.first().ok_or(ConflateError::MissingCommand)?;
        let command = self
            .commands
            .iter()
            .find(|c| c.name == *first)
            .ok_or_else(|| ConflateError::UnknownCommand(first.clone()))?
            .name
            .clone();
        args.remove(0);
        Ok(Some(command))
    }
}

/// Load the process configuration into `config` and return the leftover
/// arguments.
///
/// The configuration is merged from an optional `--config-file` (rendered
/// against the environment as template bindings), environment variables
/// prefixed by the program name, and the command-line flags, in that
/// precedence order. A help request prints the flag listing and exits zero;
/// any error prints and exits non-zero.
pub fn load<C>(config: &mut C) -> Vec<String>
where
    C: Serialize + DeserializeOwned,
{
    let name = std::env::args()
        .next()
        .as_deref()
        .map(|arg0| {
            std::path::Path::new(arg0)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| arg0.to_string())
        })
        .unwrap_or_else(|| "program".to_string());

    let vars: HashMap<String, String> = std::env::vars().collect();
    let entries: Vec<String> = vars.iter().map(|(k, v)| format!("{k}={v}")).collect();

    let mut loader = Loader::new(&name)
        .args(std::env::args().skip(1))
        .source(FileSource::yaml("config-file", vars))
        .source(EnvSource::new(&name, entries));

    match loader.load(config) {
        Ok(outcome) => outcome.args,
        Err(e) if e.is_help() => {
            eprintln!("{e}");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
