//! INI-file-backed preference store.
//!
//! Persists preferences in a plain INI file so they survive process
//! restarts. Reads come from an in-memory copy loaded on open; writes go
//! through to disk immediately, best effort. A write failure is logged and
//! the in-memory copy keeps the new value, so the process stays consistent
//! even when the disk does not.

use std::fs;
use std::path::PathBuf;

use ini::Ini;
use parking_lot::Mutex;
use tracing::warn;

use super::PreferenceStore;

/// Section holding all preference keys.
const SECTION: &str = "preferences";

/// Preference store backed by an INI file.
pub struct IniPreferenceStore {
    path: PathBuf,
    ini: Mutex<Ini>,
}

impl IniPreferenceStore {
    /// Opens a store at the given path, loading existing values if the file
    /// exists. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ini = match Ini::load_from_file(&path) {
            Ok(ini) => ini,
            Err(error) => {
                if path.exists() {
                    warn!(path = %path.display(), %error, "could not read preference file, starting empty");
                }
                Ini::new()
            }
        };

        Self {
            path,
            ini: Mutex::new(ini),
        }
    }

    /// Returns the conventional preference file path for an application,
    /// under the platform configuration directory.
    pub fn default_path(app_name: &str) -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_name).join("preferences.ini"))
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn flush(&self, ini: &Ini) {
        if let Some(parent) = self.path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), %error, "could not create preference directory");
                return;
            }
        }
        if let Err(error) = ini.write_to_file(&self.path) {
            warn!(path = %self.path.display(), %error, "could not persist preferences");
        }
    }
}

impl PreferenceStore for IniPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.ini
            .lock()
            .get_from(Some(SECTION), key)
            .map(str::to_string)
    }

    fn put(&self, key: &str, value: Option<&str>) {
        let mut ini = self.ini.lock();
        match value {
            Some(value) => {
                ini.with_section(Some(SECTION)).set(key, value);
            }
            None => {
                ini.delete_from(Some(SECTION), key);
            }
        }
        self.flush(&ini);
    }
}
