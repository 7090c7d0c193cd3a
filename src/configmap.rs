//! Configuration from a directory of single-value files, the layout used by
//! container orchestrators when a config map is mounted as a volume.
//!
//! Each non-hidden directory entry is one key: the file name (upper
//! snake-cased) names the field, the file contents are the value with the
//! trailing newline trimmed. [`ConfigMapWatcher`] adds a polling subscriber
//! that reports key additions, changes, and removals.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::error::ConflateError;
use crate::node::Node;
use crate::path;
use crate::source::{decode_into, Source};

/// Loads configuration from a config-map directory.
///
/// A prefix may be set to namespace the keys this source looks at, matching
/// the environment source's key scheme.
pub struct ConfigMapSource {
    prefix: String,
    dir: PathBuf,
}

impl ConfigMapSource {
    pub fn new(prefix: &str, dir: impl Into<PathBuf>) -> Self {
        ConfigMapSource {
            prefix: prefix.to_string(),
            dir: dir.into(),
        }
    }
}

impl Source for ConfigMapSource {
    fn load(&mut self, dst: &mut Node) -> Result<(), ConflateError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| ConflateError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut vars = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConflateError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let data = std::fs::read_to_string(entry.path()).map_err(|e| ConflateError::Io {
                path: entry.path(),
                source: e,
            })?;
            vars.insert(
                path::snakecase_upper(&name),
                data.trim_end_matches('\n').to_string(),
            );
        }

        let mut matched = Vec::new();
        dst.scan(&self.prefix, "_", &mut |dotted, _, _| {
            if let Some(value) = vars.get(&path::snakecase_upper(dotted)) {
                matched.push((dotted.to_string(), value.clone()));
            }
        });

        for (dotted, raw) in matched {
            trace!("configmap: {dotted} <- {raw:?}");
            decode_into(dst, &dotted, &raw)?;
        }
        Ok(())
    }
}

/// Watches an external key/value snapshot for changes.
pub trait Subscriber {
    /// Start watching. `f` is invoked once per added or changed key with the
    /// new value, and once per removed key with an empty value; there is no
    /// way to tell a removed key from an emptied one. Invocations are
    /// serialized. No callbacks fire until a first successful snapshot
    /// exists to diff against.
    ///
    /// Watching stops when the cancel channel is signalled or its sender is
    /// dropped.
    fn subscribe(
        &self,
        cancel: Receiver<()>,
        f: Box<dyn FnMut(&str, &str) + Send>,
    ) -> thread::JoinHandle<()>;

    /// A copy of the current state.
    fn snapshot(&self) -> io::Result<HashMap<String, String>>;
}

/// Polling [`Subscriber`] over a config-map directory.
pub struct ConfigMapWatcher {
    dir: PathBuf,
    interval: Duration,
}

impl ConfigMapWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ConfigMapWatcher {
            dir: dir.into(),
            interval: Duration::from_secs(30),
        }
    }

    /// Override the poll interval (default 30s).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Subscriber for ConfigMapWatcher {
    fn subscribe(
        &self,
        cancel: Receiver<()>,
        mut f: Box<dyn FnMut(&str, &str) + Send>,
    ) -> thread::JoinHandle<()> {
        let dir = self.dir.clone();
        let interval = self.interval;
        let mut state = snapshot_dir(&dir).ok();

        thread::spawn(move || {
            loop {
                match cancel.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }

                let new_state = match snapshot_dir(&dir) {
                    Ok(s) => s,
                    Err(e) => {
                        debug!("configmap watcher: snapshot failed: {e}");
                        continue;
                    }
                };

                // No callbacks until a first good snapshot exists to diff
                // against.
                if let Some(old) = &state {
                    for (key, value) in &new_state {
                        match old.get(key) {
                            None => f(key, value),
                            Some(prev) if prev != value => f(key, value),
                            _ => {}
                        }
                    }
                    for key in old.keys() {
                        if !new_state.contains_key(key) {
                            f(key, "");
                        }
                    }
                }
                state = Some(new_state);
            }
        })
    }

    fn snapshot(&self) -> io::Result<HashMap<String, String>> {
        snapshot_dir(&self.dir)
    }
}

fn snapshot_dir(dir: &Path) -> io::Result<HashMap<String, String>> {
    let mut state = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match std::fs::read_to_string(entry.path()) {
            Ok(data) => {
                state.insert(name, data.trim_end_matches('\n').to_string());
            }
            // A file removed between the listing and the read counts as
            // absent, not as a failed snapshot.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(state)
}
