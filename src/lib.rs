//! Typed, multi-source configuration loading. Declare a struct, build a
//! loader, and go.
//!
//! Conflate populates a plain serde struct by merging a configuration file,
//! environment variables, and command-line flags, in a fixed precedence
//! order. The struct's initial value provides the defaults; every source is
//! sparse and only overwrites what it actually carries.
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Config {
//!     message: String,
//! }
//!
//! let mut config = Config { message: "default".into() };
//! let args = conflate::load(&mut config);
//! println!("{}", config.message);
//! ```
//!
//! That single call parses the process arguments, reads the file named by
//! `--config-file` when present, matches `MYAPP_*` environment variables
//! (prefix derived from the program name), and hands back the leftover
//! arguments. A `--help` request prints the flag listing derived from the
//! struct and exits zero; bad usage prints an error and exits non-zero.
//!
//! # Layer precedence
//!
//! ```text
//! Struct defaults       the value you pass in
//!        ^ overridden by
//! Sources in order      file, environment, config map, custom
//!        ^ overridden by
//! Command-line flags    applied strictly last, always win
//! ```
//!
//! Sources run in the order they were added to the [`Loader`]; later sources
//! overwrite earlier ones on overlapping fields. Flags are applied after the
//! last source, so a CLI value wins no matter how sources are ordered.
//!
//! # The value tree
//!
//! Every load works through [`Node`], a generic tree of scalars, arrays, and
//! named maps. [`to_node`] projects the caller's struct into the tree
//! (capturing defaults and shape), sources decode into it in place, and
//! [`from_node`] copies the merged result back into the struct. The tree is
//! also the introspection surface: fields are addressed by dotted paths
//! (`database.pool`), which become flag names as-is and environment keys
//! after an upper snake-case transform (`DATABASE_POOL`).
//!
//! Field naming follows serde: `#[serde(rename = "...")]` overrides a name,
//! `#[serde(skip)]` removes a field from the configuration surface, and
//! `#[serde(flatten)]` splices an embedded struct's fields into its parent.
//! A flatten that produces two fields with the same name fails fast with a
//! path-qualified error.
//!
//! # Sources
//!
//! - [`FileSource`] reads a file named by its own `--config-file` flag,
//!   renders `{{ NAME }}` template bindings, and decodes the body as YAML.
//!   An absent flag is a no-op, so the file is always optional.
//! - [`EnvSource`] matches upper snake-cased field paths, optionally
//!   prefixed, against `KEY=VALUE` entries.
//! - [`ConfigMapSource`] treats each file of a mounted directory as one
//!   key, the way container orchestrators expose config maps.
//!   [`ConfigMapWatcher`] polls such a directory and reports key changes.
//! - Anything implementing [`Source`] plugs in; [`SourceFn`] adapts a
//!   closure.
//!
//! # Field types
//!
//! Any serde-compatible type works. Types whose natural encoding is not
//! plain text get dedicated support so they still round-trip through files,
//! flags, and the environment:
//!
//! | Type | Text form |
//! |------|-----------|
//! | `std::time::Duration` / [`Duration`] | `10s`, `1h30m`, `300ms` |
//! | [`NetAddr`] | `127.0.0.1:53`, `[::1%11]:80`, `:8080` |
//! | [`Email`] | `Bob <bob@domain.com>` |
//! | `chrono` timestamps | RFC 3339 |
//!
//! # Commands
//!
//! Declaring commands on the loader makes the first argument mandatory: it
//! must match a declared command name, resolved before any flag or source
//! processing, and is returned in the [`Outcome`].
//!
//! # Errors
//!
//! Load-time trouble comes back as [`ConflateError`]: undecodable values,
//! unreadable files, usage errors, and the help outcome callers exit zero
//! on. Malformed schemas (duplicate embedded names, non-record roots) are
//! programmer errors and panic instead; see [`error`] for the split.
//! [`Loader::load_validated`] runs a caller-supplied check after the merge
//! and aggregates every failure into one error, sorted by field path.
//!
//! # Saving
//!
//! [`render`] and [`save`] write a configuration value back out as YAML,
//! with registered help texts as `#` comments. The output decodes through
//! the file source, so it doubles as a documented starting template.

pub mod error;

mod configmap;
mod flag;
mod load;
mod node;
mod path;
mod save;
mod source;
mod special;
mod value;

pub use configmap::{ConfigMapSource, ConfigMapWatcher, Subscriber};
pub use error::{ConflateError, Violation, Violations};
pub use load::{load, Command, Loader, Outcome};
pub use node::{MapItem, Node, Scalar};
pub use save::{render, save, save_to};
pub use source::{EnvSource, FileSource, FlagSpec, Source, SourceFn};
pub use special::{Duration, Email, NetAddr};
pub use value::{from_node, to_node};
