use error::Error;
use status::{Snapshot, StatusProvider};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const HEADER: &str = "Variable_name";

/// Reads snapshots from a status dump on disk.
///
/// The dump is the tab-separated output of a `SHOW GLOBAL STATUS` style
/// query, one `name<TAB>value` pair per line. A leading `Variable_name` header
/// is skipped, as are blank lines.
#[derive(Debug, Clone)]
pub struct StatusFile {
    resource: String,
    path: PathBuf,
}

impl StatusFile {
    /// Create a provider for `resource` reading `path` on every fetch.
    pub fn new<S, P>(resource: S, path: P) -> StatusFile
    where
        S: Into<String>,
        P: AsRef<Path>,
    {
        StatusFile {
            resource: resource.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The path read on every fetch.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn upstream<R: Into<String>>(&self, reason: R) -> Error {
        Error::upstream(self.resource.as_str(), reason)
    }
}

impl StatusProvider for StatusFile {
    fn fetch(&mut self) -> Result<Snapshot, Error> {
        let fp = File::open(&self.path)
            .map_err(|e| self.upstream(format!("{}: {}", self.path.display(), e)))?;
        let mut snapshot = Snapshot::new();
        for (idx, line) in BufReader::new(fp).lines().enumerate() {
            let line = line.map_err(|e| self.upstream(format!("{}: {}", self.path.display(), e)))?;
            let line = line.trim_right_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            match (parts.next(), parts.next()) {
                (Some(HEADER), _) if snapshot.is_empty() => continue,
                (Some(key), Some(val)) => {
                    snapshot.insert(key.trim().to_string(), val.trim().to_string());
                }
                _ => {
                    return Err(self.upstream(format!(
                        "{}:{}: expected name<TAB>value",
                        self.path.display(),
                        idx + 1
                    )))
                }
            }
        }
        Ok(snapshot)
    }
}
