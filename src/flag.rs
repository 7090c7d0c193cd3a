//! The command-line flag set, derived from the scanned field paths.
//!
//! Every field path becomes a long flag (`--database.pool`, dot-joined);
//! boolean leaves are switch flags, everything else takes one value decoded
//! through the structured codec. Sources may contribute their own flags (the
//! file source's location flag). Arguments after the first non-flag token
//! are left alone and handed back to the caller.

use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::error::ConflateError;
use crate::node::{Node, Scalar};
use crate::source::{decode_into, FlagSpec, Source};

const REST: &str = "__rest__";

pub(crate) struct FlagSet {
    command: Command,
    /// Field flags as `(dotted path, is switch)`.
    fields: Vec<(String, bool)>,
}

impl FlagSet {
    pub(crate) fn new(name: &str, node: &Node, specs: &[FlagSpec]) -> FlagSet {
        let mut fields = Vec::new();
        let mut args = Vec::new();

        node.scan("", ".", &mut |dotted, help, child| {
            let switch = matches!(child, Node::Scalar(Scalar::Bool(_)));
            let mut arg = Arg::new(dotted.to_string()).long(dotted.to_string());
            arg = if switch {
                arg.action(ArgAction::SetTrue)
            } else {
                arg.action(ArgAction::Set)
                    .value_name("value")
                    .num_args(1)
                    .allow_hyphen_values(true)
            };
            if let Some(help) = help {
                arg = arg.help(help.to_string());
            }
            fields.push((dotted.to_string(), switch));
            args.push(arg);
        });

        for spec in specs {
            args.push(
                Arg::new(spec.name.clone())
                    .long(spec.name.clone())
                    .action(ArgAction::Set)
                    .value_name("value")
                    .num_args(1)
                    .help(spec.help.clone()),
            );
        }

        let command = Command::new(name.to_string())
            .disable_version_flag(true)
            .args_override_self(true)
            .args(args)
            // Once leftovers begin they are captured verbatim, but an
            // unknown leading flag still errors instead of leaking through.
            .arg(
                Arg::new(REST)
                    .num_args(0..)
                    .trailing_var_arg(true)
                    .value_name("args"),
            );

        FlagSet { command, fields }
    }

    /// Parse the argument vector. A help request surfaces as the distinct
    /// [`ConflateError::Help`] outcome; anything else clap rejects is a
    /// usage error.
    pub(crate) fn parse(&self, args: &[String]) -> Result<(ArgMatches, Vec<String>), ConflateError> {
        let argv = std::iter::once(self.command.get_name().to_string()).chain(args.iter().cloned());
        let matches = self.command.clone().try_get_matches_from(argv).map_err(|e| {
            match e.kind() {
                ErrorKind::DisplayHelp => ConflateError::Help(e.render().to_string()),
                _ => ConflateError::Usage(e.render().to_string()),
            }
        })?;

        let leftover = matches
            .get_many::<String>(REST)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        Ok((matches, leftover))
    }

    /// Write every flag the user provided into the tree. Called after all
    /// sources ran, so the command line is the last write and always wins.
    pub(crate) fn apply(&self, matches: &ArgMatches, node: &mut Node) -> Result<(), ConflateError> {
        for (dotted, switch) in &self.fields {
            if *switch {
                if matches.get_flag(dotted) {
                    node.set_path(dotted, &serde_yaml_ng::Value::Bool(true));
                }
            } else if matches.value_source(dotted) == Some(ValueSource::CommandLine) {
                let raw = matches
                    .get_one::<String>(dotted)
                    .expect("flag with a command-line value source has a value");
                decode_into(node, dotted, raw)?;
            }
        }
        Ok(())
    }
}

/// Hand each flag-contributing source its captured value.
pub(crate) fn apply_source_flags(matches: &ArgMatches, sources: &mut [Box<dyn Source>]) {
    for source in sources.iter_mut() {
        if let Some(spec) = source.flag_spec() {
            if let Some(value) = matches.get_one::<String>(&spec.name) {
                source.set_flag(value);
            }
        }
    }
}
