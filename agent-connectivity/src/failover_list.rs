//! Ordered server candidates with a rotating cursor.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use agent_primitives::ServerEndpoint;

/// Servers the agent may fail over to, most preferred first.
///
/// The list itself never changes after construction; only the cursor moves.
/// A refresh from the server installs a whole new list through
/// [`SharedFailoverList::replace`].
#[derive(Debug, Default)]
pub struct FailoverList {
    servers: Vec<ServerEndpoint>,
    cursor: AtomicUsize,
}

impl FailoverList {
    /// Creates a list with the cursor at the head.
    #[must_use]
    pub fn new(servers: Vec<ServerEndpoint>) -> Self {
        Self {
            servers,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Creates an empty list.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Entry at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ServerEndpoint> {
        self.servers.get(index)
    }

    /// Number of entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.servers.len()
    }

    /// Returns `true` when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Returns `true` whenever the list is non-empty; the cursor wraps.
    #[must_use]
    pub fn has_next(&self) -> bool {
        !self.servers.is_empty()
    }

    /// Entry the next call to [`FailoverList::next`] would return.
    #[must_use]
    pub fn peek(&self) -> Option<&ServerEndpoint> {
        self.servers.get(self.index())
    }

    /// Returns the entry at the cursor and advances it, wrapping to the head.
    #[must_use = "the returned entry is the failover candidate"]
    pub fn next(&self) -> Option<ServerEndpoint> {
        let len = self.servers.len();
        if len == 0 {
            return None;
        }
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |index| {
                Some((index + 1) % len)
            })
            .unwrap_or_else(|index| index);
        self.servers.get(previous % len).cloned()
    }

    /// Moves the cursor back to the head.
    pub fn reset_index(&self) {
        self.cursor.store(0, Ordering::Release);
    }

    /// Current cursor position.
    #[must_use]
    pub fn index(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// All entries in preference order.
    #[must_use]
    pub fn servers(&self) -> &[ServerEndpoint] {
        &self.servers
    }

    /// Renders one `address:port/secure_port` line per entry.
    #[must_use]
    pub fn write_as_text(&self) -> String {
        let mut text = String::new();
        for server in &self.servers {
            let _ = writeln!(text, "{server}");
        }
        text
    }

    /// Parses the format produced by [`FailoverList::write_as_text`].
    ///
    /// Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`agent_primitives::Error`] on the first malformed line.
    pub fn read_as_text(text: &str) -> agent_primitives::Result<Self> {
        let servers = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::parse)
            .collect::<agent_primitives::Result<Vec<ServerEndpoint>>>()?;
        Ok(Self::new(servers))
    }
}

/// Process wide holder of the current failover list.
#[derive(Debug, Default)]
pub struct SharedFailoverList {
    current: RwLock<Arc<FailoverList>>,
}

impl SharedFailoverList {
    /// Creates a holder with an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the list in effect right now.
    #[must_use]
    pub fn current(&self) -> Arc<FailoverList> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Installs `list` and returns the shared handle to it.
    pub fn replace(&self, list: FailoverList) -> Arc<FailoverList> {
        let list = Arc::new(list);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&list);
        list
    }
}
