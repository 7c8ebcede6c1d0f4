//! File-like references handed over by whatever picked the shader: a path on
//! disk, or an in-memory tree standing in for a document provider. The
//! resolver only ever reads through this trait, which keeps preset sibling
//! lookups anchored to the preset's own container instead of the process
//! working directory.
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Read-only handle to a file or container.
pub trait ShaderReference: Send + Sync + fmt::Debug {
    /// File name shown to the user; `None` when the provider cannot name it.
    fn display_name(&self) -> Option<String>;

    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Containing directory, if any.
    fn parent(&self) -> Option<Arc<dyn ShaderReference>>;

    /// Named entry inside this container, if it exists.
    fn child(&self, name: &str) -> Option<Arc<dyn ShaderReference>>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    path: PathBuf,
}

impl FileReference {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ShaderReference for FileReference {
    fn display_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn parent(&self) -> Option<Arc<dyn ShaderReference>> {
        let anchored = anchored_path(&self.path);
        let parent = anchored
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())?;
        Some(Arc::new(FileReference::new(parent)))
    }

    fn child(&self, name: &str) -> Option<Arc<dyn ShaderReference>> {
        let candidate = self.path.join(name);
        if candidate.exists() {
            Some(Arc::new(FileReference::new(candidate)))
        } else {
            None
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Absolute form of `path` with `.` and `..` folded away. Relative paths are
/// joined onto the working directory so `parent` keeps climbing past it.
fn anchored_path(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// In-memory file tree keyed by `/`-separated paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(path.trim_matches('/').to_string(), contents.into());
        self
    }

    /// Freezes the tree and returns a reference to `path` inside it.
    pub fn reference(self, path: &str) -> MemoryReference {
        MemoryReference {
            tree: Arc::new(self),
            path: path.trim_matches('/').to_string(),
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{path}/");
        self.files.keys().any(|key| key.starts_with(&prefix))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryReference {
    tree: Arc<MemoryTree>,
    path: String,
}

impl MemoryReference {
    fn at(&self, path: String) -> MemoryReference {
        MemoryReference {
            tree: Arc::clone(&self.tree),
            path,
        }
    }
}

impl ShaderReference for MemoryReference {
    fn display_name(&self) -> Option<String> {
        self.path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self.tree.files.get(&self.path) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no file at '{}'", self.path),
            )),
        }
    }

    fn parent(&self) -> Option<Arc<dyn ShaderReference>> {
        if self.path.is_empty() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(split) => self.path[..split].to_string(),
            None => String::new(),
        };
        Some(Arc::new(self.at(parent)))
    }

    fn child(&self, name: &str) -> Option<Arc<dyn ShaderReference>> {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        };
        if self.tree.files.contains_key(&path) || self.tree.is_dir(&path) {
            Some(Arc::new(self.at(path)))
        } else {
            None
        }
    }

    fn describe(&self) -> String {
        format!("memory:/{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(reference: &dyn ShaderReference) -> String {
        let mut text = String::new();
        reference.open().unwrap().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn memory_tree_navigates_parents_and_children() {
        let preset = MemoryTree::new()
            .with_file("presets/crt.slangp", "shader0 = shaders/crt.slang")
            .with_file("presets/shaders/crt.slang", "void main() {}")
            .reference("presets/crt.slangp");

        assert_eq!(preset.display_name().as_deref(), Some("crt.slangp"));
        let dir = preset.parent().expect("parent");
        assert_eq!(dir.describe(), "memory:/presets");
        let shader = dir
            .child("shaders")
            .and_then(|shaders| shaders.child("crt.slang"))
            .expect("child");
        assert_eq!(read_all(shader.as_ref()), "void main() {}");
        assert!(dir.child("missing.slang").is_none());
        assert!(dir.parent().expect("root").parent().is_none());
    }

    #[test]
    fn file_reference_reads_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("tint.slang"), "#version 450").unwrap();
        let reference = FileReference::new(temp.path().join("tint.slang"));

        assert_eq!(reference.display_name().as_deref(), Some("tint.slang"));
        assert_eq!(read_all(&reference), "#version 450");
        let parent = reference.parent().expect("parent");
        assert!(parent.child("tint.slang").is_some());
        assert!(parent.child("other.slang").is_none());
    }

    #[test]
    fn relative_paths_climb_above_working_directory() {
        let cwd = env::current_dir().unwrap();
        let dir = FileReference::new("preset.slangp").parent().expect("parent");
        assert_eq!(dir.describe(), cwd.display().to_string());

        let above = dir.parent().expect("grandparent");
        assert_eq!(above.describe(), cwd.parent().unwrap().display().to_string());

        let dotted = FileReference::new("./nested/../preset.slangp")
            .parent()
            .expect("parent");
        assert_eq!(dotted.describe(), cwd.display().to_string());
    }
}
