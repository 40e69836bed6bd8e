use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{split_front_matter, Result, SyncError};

const INDEX_FILE: &str = ".cubox-index.json";

/// Joins front matter and body into the final note text
pub fn compose_note(front_matter: &str, body: &str) -> String {
    if front_matter.trim().is_empty() {
        return body.to_string();
    }

    let mut note = String::with_capacity(front_matter.len() + body.len() + 10);
    note.push_str("---\n");
    note.push_str(front_matter);
    if !front_matter.ends_with('\n') {
        note.push('\n');
    }
    note.push_str("---\n\n");
    note.push_str(body);
    note
}

/// Persisted map from article id to the note written for it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteIndex {
    entries: BTreeMap<String, PathBuf>,
}

impl NoteIndex {
    pub fn get(&self, article_id: &str) -> Option<&Path> {
        self.entries.get(article_id).map(PathBuf::as_path)
    }

    pub fn insert(&mut self, article_id: &str, relative_path: PathBuf) {
        self.entries.insert(article_id.to_string(), relative_path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The folder that receives synced notes
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the output folder when it does not exist yet
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.root.exists() {
            debug!("Output directory does not exist, creating: {}", self.root.display());
            fs::create_dir_all(&self.root).map_err(|e| {
                error!("Failed to create output directory: {}", e);
                SyncError::DirectoryError {
                    path: self.root.clone(),
                }
            })?;
        }
        Ok(())
    }

    /// `{root}/{file_name}.md`
    pub fn note_path(&self, file_name: &str) -> PathBuf {
        self.root.join(format!("{}.md", file_name))
    }

    fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Reads the `id` stored in a note's front matter.
    ///
    /// Missing files, notes without front matter and notes without an id
    /// all yield `None`.
    pub fn read_note_id(&self, path: &Path) -> Result<Option<String>> {
        if !path.is_file() {
            return Ok(None);
        }

        let text = fs::read_to_string(path)?;
        let Some((front_matter, _)) = split_front_matter(&text) else {
            trace!("No front matter in {}", path.display());
            return Ok(None);
        };

        let value: Value = match serde_yaml::from_str(front_matter) {
            Ok(value) => value,
            Err(e) => {
                debug!("Unreadable front matter in {}: {}", path.display(), e);
                return Ok(None);
            }
        };
        let id = match value.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Ok(id)
    }

    /// True when `path` holds the note for `article_id`
    pub fn holds_article(&self, path: &Path, article_id: &str) -> Result<bool> {
        Ok(self.read_note_id(path)?.as_deref() == Some(article_id))
    }

    /// Finds an existing note for the article, by index first and then by file name
    pub fn find_existing(
        &self,
        index: &NoteIndex,
        article_id: &str,
        candidate: &Path,
    ) -> Result<Option<PathBuf>> {
        if let Some(relative) = index.get(article_id) {
            let indexed = self.resolve(relative);
            if self.holds_article(&indexed, article_id)? {
                return Ok(Some(indexed));
            }
            debug!(
                "Index entry for {} points at {}, which no longer holds it",
                article_id,
                indexed.display()
            );
        }

        if self.holds_article(candidate, article_id)? {
            return Ok(Some(candidate.to_path_buf()));
        }

        Ok(None)
    }

    /// Writes a note atomically, replacing any file at `path`
    pub fn write_note(&self, path: &Path, contents: &str) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }

        let mut temp_file = NamedTempFile::new_in(dir)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(path).map_err(|e| {
            error!("Failed to persist note {}: {}", path.display(), e.error);
            SyncError::Io(e.error)
        })?;

        trace!("Wrote note {}", path.display());
        Ok(())
    }

    /// Records where the note for an article lives
    pub fn record(&self, index: &mut NoteIndex, article_id: &str, path: &Path) {
        index.insert(article_id, self.relative(path));
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn load_index(&self) -> Result<NoteIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(NoteIndex::default());
        }

        match serde_json::from_str(&fs::read_to_string(&path)?) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(
                    "Ignoring unreadable note index {}: {}",
                    path.display(),
                    e
                );
                Ok(NoteIndex::default())
            }
        }
    }

    pub fn save_index(&self, index: &NoteIndex) -> Result<()> {
        let json = serde_json::to_string_pretty(index)?;
        self.write_note(&self.index_path(), &json)
    }

    /// Rebuilds the index from the front matter of every note under the root
    pub fn rebuild_index(&self) -> Result<NoteIndex> {
        let mut index = NoteIndex::default();
        if !self.root.exists() {
            return Ok(index);
        }

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || !path.extension().is_some_and(|ext| ext == "md") {
                continue;
            }

            match self.read_note_id(path) {
                Ok(Some(id)) => self.record(&mut index, &id, path),
                Ok(None) => trace!("No article id in {}", path.display()),
                Err(e) => warn!("Skipping {} while indexing: {}", path.display(), e),
            }
        }

        info!("Indexed {} synced notes", index.len());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn compose_with_and_without_front_matter() {
        assert_eq!(compose_note("id: '1'\n", "Body"), "---\nid: '1'\n---\n\nBody");
        assert_eq!(compose_note("id: '1'", "Body"), "---\nid: '1'\n---\n\nBody");
        assert_eq!(compose_note("", "Body"), "Body");
    }

    #[test]
    fn reads_back_written_id() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::new(dir.path().join("Cubox"));
        vault.ensure_dir().unwrap();

        let path = vault.note_path("Some note");
        vault
            .write_note(&path, &compose_note("id: '0042'\ntitle: x\n", "text"))
            .unwrap();

        assert_eq!(vault.read_note_id(&path).unwrap(), Some("0042".to_string()));
        assert!(vault.holds_article(&path, "0042").unwrap());
        assert!(!vault.holds_article(&path, "42").unwrap());
    }

    #[test]
    fn missing_or_plain_notes_have_no_id() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());

        assert_eq!(vault.read_note_id(&vault.note_path("absent")).unwrap(), None);

        let plain = vault.note_path("plain");
        fs::write(&plain, "# Just a note\n").unwrap();
        assert_eq!(vault.read_note_id(&plain).unwrap(), None);
    }

    #[test]
    fn index_lookup_survives_rename() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());
        let mut index = NoteIndex::default();

        let old_path = vault.note_path("Old name");
        vault.write_note(&old_path, &compose_note("id: a1\n", "")).unwrap();
        vault.record(&mut index, "a1", &old_path);
        vault.save_index(&index).unwrap();

        let reloaded = vault.load_index().unwrap();
        assert_eq!(reloaded.get("a1"), Some(Path::new("Old name.md")));

        let found = vault
            .find_existing(&reloaded, "a1", &vault.note_path("New name"))
            .unwrap();
        assert_eq!(found, Some(old_path));
    }

    #[test]
    fn stale_index_falls_back_to_file_name() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());
        let mut index = NoteIndex::default();
        index.insert("a1", PathBuf::from("deleted.md"));

        let candidate = vault.note_path("current");
        assert_eq!(vault.find_existing(&index, "a1", &candidate).unwrap(), None);

        vault.write_note(&candidate, &compose_note("id: a1\n", "")).unwrap();
        assert_eq!(
            vault.find_existing(&index, "a1", &candidate).unwrap(),
            Some(candidate)
        );
    }

    #[test]
    fn rebuild_index_from_notes() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());

        vault.write_note(&vault.note_path("one"), &compose_note("id: c1\n", "")).unwrap();
        vault
            .write_note(&dir.path().join("sub").join("two.md"), &compose_note("id: c2\n", ""))
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "---\nid: c3\n---\n").unwrap();
        fs::write(vault.note_path("manual"), "no front matter").unwrap();

        let index = vault.rebuild_index().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("c2"), Some(Path::new("sub/two.md")));
    }
}
