use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use postern_common::{Content, MailId, internal};
use postern_tracing::traced;
use serde::Deserialize;
use tokio::fs;

use crate::{
    SerializationError, SpoolError, ValidationError,
    record::{SpoolEntry, SpoolRecord, sort_by_arrival},
    r#trait::BackingStore,
};

const META_EXTENSION: &str = "bin";
const DATA_EXTENSION: &str = "eml";
const TEMP_PREFIX: &str = ".tmp_";
const DELETED_SUFFIX: &str = ".deleted";
const MAX_ID_LENGTH: usize = 200;

/// File-based backing store implementation
///
/// Every mail is stored as two files in one directory:
/// - `{id}.eml`: the raw message content
/// - `{id}.bin`: the envelope and queue metadata, encoded with bincode
///
/// Content read back from disk stays on disk until a step asks for it.
///
/// # Atomicity
/// Writes go to `.tmp_` files which are then renamed into place, so a crash
/// never leaves a half-written entry visible. Removal renames both files to a
/// `.deleted` suffix before unlinking them; leftovers of either kind are
/// cleaned up by [`FileBackingStore::init`].
///
/// # Security
/// The spool path must be absolute, free of `..`, and outside system
/// directories. Mail ids that cannot safely be used as file names are refused.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
}

impl Default for FileBackingStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/postern"),
        }
    }
}

impl<'de> Deserialize<'de> for FileBackingStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileBackingStoreHelper {
            path: PathBuf,
        }

        let helper = FileBackingStoreHelper::deserialize(deserializer)?;
        Self::validate_path(&helper.path).map_err(serde::de::Error::custom)?;

        Ok(Self { path: helper.path })
    }
}

impl FileBackingStore {
    /// Validate a spool path
    ///
    /// # Errors
    /// If the path is relative, contains `..`, or lies in a system directory
    fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::InvalidPath(format!(
                "'..' components are not allowed: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(ValidationError::InvalidPath(format!(
                "path must be absolute: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes.iter().find(|p| path.starts_with(p)) {
            return Err(ValidationError::InvalidPath(format!(
                "path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Validate that a mail id can be used as a file stem
    fn validate_id(id: &MailId) -> Result<(), ValidationError> {
        let id = id.as_str();
        let safe = !id.is_empty()
            && id.len() <= MAX_ID_LENGTH
            && !id.starts_with('.')
            && !id.contains("..")
            && !id.contains(['/', '\\'])
            && !id.chars().any(char::is_control);

        if safe {
            Ok(())
        } else {
            Err(ValidationError::UnsafeId(id.to_string()))
        }
    }

    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn meta_path(&self, id: &MailId) -> PathBuf {
        self.path.join(format!("{id}.{META_EXTENSION}"))
    }

    fn data_path(&self, id: &MailId) -> PathBuf {
        self.path.join(format!("{id}.{DATA_EXTENSION}"))
    }

    /// Initialise the spool directory
    ///
    /// Creates the directory if needed and removes leftovers of interrupted
    /// writes and removals.
    ///
    /// # Errors
    /// If the directory cannot be created, or the path exists but is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising spool at {} ...", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        self.cleanup_orphans()
    }

    fn cleanup_orphans(&self) -> crate::Result<()> {
        let mut cleaned = 0;

        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.ends_with(DELETED_SUFFIX) || filename.starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from spool"
            );
        }

        Ok(())
    }

    async fn read_meta(&self, id: &MailId) -> crate::Result<SpoolEntry> {
        let bytes = match fs::read(self.meta_path(id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            Err(err) => return Err(err.into()),
        };

        let (entry, _): (SpoolEntry, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(SerializationError::from)?;

        if entry.mail.id() != id {
            return Err(SerializationError::Corrupted(format!(
                "{id}.{META_EXTENSION} holds mail {}",
                entry.mail.id()
            ))
            .into());
        }

        Ok(entry)
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    /// Content already living in this entry's `.eml` file is not rewritten.
    #[traced(instrument(level = tracing::Level::DEBUG, skip(self, entry), fields(id = %entry.mail.id())), timing(precision = "ms"))]
    async fn write(&self, entry: &SpoolEntry) -> crate::Result<()> {
        let id = entry.mail.id();
        Self::validate_id(id)?;

        let data_path = self.data_path(id);
        let meta_path = self.meta_path(id);

        let rewrite_content = !matches!(entry.mail.content(), Content::File(path) if *path == data_path);
        let temp_data_path = self.path.join(format!("{TEMP_PREFIX}{id}.{DATA_EXTENSION}"));
        if rewrite_content {
            let content = entry.mail.content().load().await?;
            fs::write(&temp_data_path, &content).await?;
        }

        let metadata = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .map_err(SerializationError::from)?;
        let temp_meta_path = self.path.join(format!("{TEMP_PREFIX}{id}.{META_EXTENSION}"));
        fs::write(&temp_meta_path, &metadata).await?;

        if rewrite_content {
            fs::rename(&temp_data_path, &data_path).await?;
        }
        fs::rename(&temp_meta_path, &meta_path).await?;

        internal!(level = DEBUG, "Spooled mail {id} to {}", data_path.display());

        Ok(())
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip(self), fields(id = %id)), timing(precision = "ms"))]
    async fn read(&self, id: &MailId) -> crate::Result<SpoolEntry> {
        Self::validate_id(id)?;

        let mut entry = self.read_meta(id).await?;
        entry.mail.set_content(Content::File(self.data_path(id)));

        Ok(entry)
    }

    /// Two-phase removal: both files are renamed to `.deleted`, then unlinked.
    #[traced(instrument(level = tracing::Level::DEBUG, skip(self), fields(id = %id)), timing(precision = "ms"))]
    async fn remove(&self, id: &MailId) -> crate::Result<()> {
        Self::validate_id(id)?;

        let meta_path = self.meta_path(id);
        let data_path = self.data_path(id);
        let deleted_meta_path = self.path.join(format!("{id}.{META_EXTENSION}{DELETED_SUFFIX}"));
        let deleted_data_path = self.path.join(format!("{id}.{DATA_EXTENSION}{DELETED_SUFFIX}"));

        match fs::rename(&meta_path, &deleted_meta_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            Err(err) => return Err(err.into()),
        }

        let has_data = match fs::rename(&data_path, &deleted_data_path).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };

        fs::remove_file(&deleted_meta_path).await?;
        if has_data {
            fs::remove_file(&deleted_data_path).await?;
        }

        internal!(level = DEBUG, "Removed mail {id} from spool");

        Ok(())
    }

    /// Unreadable entries are logged and skipped so one corrupt file cannot
    /// block the rest of the spool.
    #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
    async fn list(&self) -> crate::Result<Vec<SpoolRecord>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            let Some(stem) = filename
                .strip_suffix(META_EXTENSION)
                .and_then(|s| s.strip_suffix('.'))
            else {
                continue;
            };

            let id = MailId::from(stem);
            if Self::validate_id(&id).is_err() {
                continue;
            }

            match self.read_meta(&id).await {
                Ok(entry) => records.push(entry.record()),
                Err(SpoolError::NotFound(_)) => {}
                Err(err) => {
                    internal!(level = WARN, "Skipping unreadable spool entry {id}: {err}");
                }
            }
        }

        sort_by_arrival(&mut records);

        internal!(level = DEBUG, "Found {} mails in spool", records.len());

        Ok(records)
    }
}

/// Builder for `FileBackingStore`
#[derive(Debug, Default)]
pub struct FileBackingStoreBuilder {
    path: PathBuf,
}

impl FileBackingStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Build the final `FileBackingStore`
    ///
    /// # Errors
    /// If the path is relative, contains `..`, or lies in a system directory
    pub fn build(self) -> crate::Result<FileBackingStore> {
        FileBackingStore::validate_path(&self.path)?;
        Ok(FileBackingStore { path: self.path })
    }
}
