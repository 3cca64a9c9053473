use std::{
    fmt,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Identifies a file inside a [`FileStore`].
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileId(usize);

impl FileId {
    /// The file id used for builtin entries that have no source text.
    pub const BUILTIN: Self = Self(usize::MAX);
}

/// A position inside a source file.
///
/// `line` and `column` are zero based; they are only turned into one based
/// values when rendered for humans.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    pub file: FileId,
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn builtin() -> Self {
        Self {
            file: FileId::BUILTIN,
            index: 0,
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// A half open `[start, end)` range of source text.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceRange {
    pub start: Location,
    pub end: Location,
}

impl SourceRange {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    pub fn builtin() -> Self {
        Self {
            start: Location::builtin(),
            end: Location::builtin(),
        }
    }

    /// Merges two ranges into one covering both.
    pub fn to(self, other: SourceRange) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }

    pub fn is_builtin(self) -> bool {
        self.start.file == FileId::BUILTIN
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("file {0:?} is already registered")]
    DuplicatePath(PathBuf),
    #[error("cannot read {path:?}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file is not loaded")]
    NotLoaded,
}

/// The backing storage of a single registered file.
///
/// On disk files start out [`FileEntry::Unloaded`] and transition to
/// [`FileEntry::Loaded`] exactly once; a loaded file never goes back.
#[derive(Debug)]
enum FileEntry {
    /// Source that only ever existed in memory, e.g. test input.
    Blob { name: String, text: String },
    Unloaded { path: PathBuf },
    Loaded { path: PathBuf, text: String },
}

/// Process lifetime mapping from [`FileId`] to source text.
#[derive(Debug, Default)]
pub struct FileStore {
    files: Vec<FileEntry>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers in-memory source text under a display name.
    pub fn add_blob(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len());
        self.files.push(FileEntry::Blob {
            name: name.into(),
            text: text.into(),
        });
        id
    }

    /// Registers an on-disk file without reading it yet.
    ///
    /// Registering the same path twice fails.
    pub fn add_path(&mut self, path: impl Into<PathBuf>) -> Result<FileId, SourceError> {
        let path = path.into();
        if self.files.iter().any(|entry| entry.path() == Some(&*path)) {
            return Err(SourceError::DuplicatePath(path));
        }
        let id = FileId(self.files.len());
        self.files.push(FileEntry::Unloaded { path });
        Ok(id)
    }

    /// Reads an [`FileEntry::Unloaded`] file into memory.
    ///
    /// Loading an already loaded file or a blob is a no-op.
    pub fn load(&mut self, id: FileId) -> Result<(), SourceError> {
        let entry = &mut self.files[id.0];
        if let FileEntry::Unloaded { path } = entry {
            let text = std::fs::read_to_string(&*path).map_err(|source| {
                SourceError::Unreadable {
                    path: path.clone(),
                    source,
                }
            })?;
            let path = std::mem::take(path);
            *entry = FileEntry::Loaded { path, text };
        }
        Ok(())
    }

    /// Returns the source text of a loaded file.
    ///
    /// The builtin sentinel id has no text and reports [`SourceError::NotLoaded`].
    pub fn text(&self, id: FileId) -> Result<&str, SourceError> {
        match self.files.get(id.0) {
            Some(FileEntry::Blob { text, .. } | FileEntry::Loaded { text, .. }) => Ok(text),
            Some(FileEntry::Unloaded { .. }) | None => Err(SourceError::NotLoaded),
        }
    }

    /// Returns the display name of a file, i.e. its path or blob name.
    pub fn name(&self, id: FileId) -> &str {
        if id == FileId::BUILTIN {
            return "<builtin>";
        }
        match &self.files[id.0] {
            FileEntry::Blob { name, .. } => name,
            FileEntry::Unloaded { path } | FileEntry::Loaded { path, .. } => {
                path.to_str().unwrap_or("<non-utf8 path>")
            }
        }
    }

    /// Returns the full text of the given zero based line, without its line break.
    ///
    /// Used by diagnostic renderers to show the offending source line.
    pub fn line(&self, id: FileId, line: usize) -> Option<&str> {
        let text = self.text(id).ok()?;
        text.split('\n').nth(line).map(|l| l.strip_suffix('\r').unwrap_or(l))
    }
}

impl FileEntry {
    fn path(&self) -> Option<&Path> {
        match self {
            FileEntry::Blob { .. } => None,
            FileEntry::Unloaded { path } | FileEntry::Loaded { path, .. } => Some(path),
        }
    }
}
