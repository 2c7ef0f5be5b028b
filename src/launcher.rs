//! Finds the newest versioned release folder and starts the binary inside.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a version number")]
pub struct ParseVersionError(String);

/// Dotted numeric version. Trailing zero components do not count, so `1.0`
/// and `1.0.0` compare equal.
#[derive(Debug, Clone)]
pub struct Version(Vec<u64>);

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('v').unwrap_or(s);
        digits
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map(Version)
            .map_err(|_| ParseVersionError(s.to_string()))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| {
                let a = self.0.get(i).copied().unwrap_or(0);
                let b = other.0.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Path of `binary` inside the newest version-named subfolder of `base`.
/// Entries that are not directories or not versions are skipped.
pub fn find_newest(base: &Path, binary: &str) -> io::Result<Option<PathBuf>> {
    if !base.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("'{}' is not a directory", base.display()),
        ));
    }

    let mut newest: Option<(Version, PathBuf)> = None;
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let version = match name.to_str().map(str::parse::<Version>) {
            Some(Ok(version)) => version,
            _ => {
                log::info!("Skipping '{}', not a version number", name.to_string_lossy());
                continue;
            }
        };
        if newest.as_ref().is_none_or(|(current, _)| version > *current) {
            newest = Some((version, entry.path()));
        }
    }

    Ok(newest.map(|(_, path)| path.join(binary)))
}

/// Runs `target`, through `runner` when given, and waits for it.
pub fn launch(runner: Option<&str>, target: &Path) -> io::Result<Output> {
    let mut command = match runner {
        Some(runner) => {
            let mut command = Command::new(runner);
            command.arg(target);
            command
        }
        None => Command::new(target),
    };
    log::info!("Starting {:?}", command);
    command.output()
}
