//! Persistence of the failover list under the agent's data directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::error::ConnectivityResult;
use crate::failover_list::FailoverList;
use crate::hooks::Console;

/// File name of the persisted list inside the data directory.
pub const FAILOVER_LIST_FILE: &str = "failover-list.dat";

/// Reads and writes the failover list file.
///
/// Write failures are logged and never propagated.
pub struct FailoverListStore {
    path: PathBuf,
    console: Arc<dyn Console>,
    loopback_warned: AtomicBool,
}

impl FailoverListStore {
    /// Creates a store for `data_directory`/[`FAILOVER_LIST_FILE`].
    #[must_use]
    pub fn new(data_directory: &Path, console: Arc<dyn Console>) -> Self {
        Self {
            path: data_directory.join(FAILOVER_LIST_FILE),
            console,
            loopback_warned: AtomicBool::new(false),
        }
    }

    /// Location of the list file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted list; a missing or unreadable file yields an empty list.
    #[must_use]
    pub fn load(&self) -> FailoverList {
        match self.try_load() {
            Ok(Some(list)) => {
                let size = list.size();
                debug!(path = %self.path.display(), size, "loaded persisted failover list");
                list
            }
            Ok(None) => FailoverList::empty(),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to load persisted failover list");
                FailoverList::empty()
            }
        }
    }

    /// Writes `list`, or deletes the file when `list` is `None`.
    pub fn persist(&self, list: Option<&FailoverList>) {
        let result = match list {
            Some(list) => {
                self.warn_on_loopback(list);
                self.write(list)
            }
            None => self.remove(),
        };
        if let Err(err) = result {
            warn!(path = %self.path.display(), %err, "failed to persist failover list");
        }
    }

    fn try_load(&self) -> ConnectivityResult<Option<FailoverList>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match FailoverList::read_as_text(&text) {
            Ok(list) => Ok(Some(list)),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring corrupt failover list file");
                Ok(None)
            }
        }
    }

    fn write(&self, list: &FailoverList) -> ConnectivityResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, list.write_as_text())?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), size = list.size(), "persisted failover list");
        Ok(())
    }

    fn remove(&self) -> ConnectivityResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "server has no failover list; removed copy");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn warn_on_loopback(&self, list: &FailoverList) {
        let Some(server) = list.servers().iter().find(|server| server.is_loopback()) else {
            return;
        };
        if self.loopback_warned.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(
            server = %server,
            "failover list contains a loopback address; remote agents cannot reach it"
        );
        self.console.message(&format!(
            "WARNING: the failover list contains the loopback address {}; \
             configure the servers with routable addresses",
            server.address()
        ));
    }
}

impl std::fmt::Debug for FailoverListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverListStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
