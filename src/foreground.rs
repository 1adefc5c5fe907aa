//! Foreground application lookup.
//!
//! When the deck becomes visible it jumps to the folder mapped to whatever
//! application is in front. This module answers the two halves of that: which
//! executable owns the foreground window, and which folder it maps to.

use crate::platform;
use std::collections::HashMap;

/// File name of the executable owning the foreground window, e.g.
/// `"obs64.exe"`.
///
/// Returns `None` when no window is focused, the owner cannot be queried, or
/// the window belongs to this process.
pub fn foreground_executable() -> Option<String> {
    platform::foreground_executable()
}

/// Case-insensitive map from executable file name to folder id.
#[derive(Debug, Clone, Default)]
pub struct AppFolderMap {
    folders: HashMap<String, String>,
}

impl AppFolderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `executable` to `folder_id`, replacing any earlier mapping.
    pub fn insert(&mut self, executable: &str, folder_id: impl Into<String>) {
        self.folders.insert(normalize(executable), folder_id.into());
    }

    /// Remove the mapping for `executable`.
    pub fn remove(&mut self, executable: &str) -> Option<String> {
        self.folders.remove(&normalize(executable))
    }

    /// Folder mapped to `executable`.
    pub fn folder_for(&self, executable: &str) -> Option<&str> {
        self.folders.get(&normalize(executable)).map(String::as_str)
    }

    /// Folder mapped to the current foreground application.
    pub fn foreground_folder(&self) -> Option<&str> {
        foreground_executable().and_then(|exe| self.folder_for(&exe))
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for AppFolderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (exe, folder) in iter {
            map.insert(exe.as_ref(), folder);
        }
        map
    }
}

fn normalize(executable: &str) -> String {
    executable.trim().to_lowercase()
}
