use std::{
    collections::HashMap,
    fmt::Debug,
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use zip::{ZipArchive, result::ZipError};

/// Somewhere class bytes can be read from.
pub trait ClassSource: Debug + Send + Sync {
    fn name(&self) -> &str;
    /// `class_name` is the internal name without the `.class` suffix.
    fn find(&self, class_name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Opens a class path entry: archives by extension, anything else as a directory.
pub fn source_for_path(path: impl AsRef<Path>) -> io::Result<Box<dyn ClassSource>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jar" | "zip" | "jmod") => Ok(Box::new(ArchiveSource::open(path)?)),
        _ => Ok(Box::new(DirSource::new(path))),
    }
}

#[derive(Debug)]
pub struct DirSource {
    name: String,
    base_path: PathBuf,
}

impl DirSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            name: base_path.display().to_string(),
            base_path,
        }
    }
}

impl ClassSource for DirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, class_name: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.base_path.join(format!("{class_name}.class"));
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A jar, zip or jmod file. Entries of a jmod live under `classes/`.
#[derive(Debug)]
pub struct ArchiveSource {
    name: String,
    prefix: &'static str,
    archive: Mutex<ZipArchive<File>>,
}

impl ArchiveSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let archive = ZipArchive::new(file).map_err(zip_to_io)?;
        let is_jmod = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("jmod"));
        Ok(Self {
            name: path.display().to_string(),
            prefix: if is_jmod { "classes/" } else { "" },
            archive: Mutex::new(archive),
        })
    }
}

fn zip_to_io(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

impl ClassSource for ArchiveSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, class_name: &str) -> io::Result<Option<Vec<u8>>> {
        let mut archive = self.archive.lock();
        let mut class_file = match archive.by_name(&format!("{}{class_name}.class", self.prefix)) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(zip_to_io(e)),
        };
        let mut content = Vec::with_capacity(class_file.size() as usize);
        class_file.read_to_end(&mut content)?;
        Ok(Some(content))
    }
}

/// Class bytes handed to the VM directly, e.g. by an embedding program.
#[derive(Debug, Default)]
pub struct MemorySource {
    classes: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemorySource {
    pub fn add(&self, class_name: &str, bytes: impl Into<Arc<[u8]>>) {
        self.classes
            .write()
            .insert(class_name.to_string(), bytes.into());
    }
}

impl ClassSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn find(&self, class_name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.classes.read().get(class_name).map(|b| b.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_dir_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/A.class"), [0xca, 0xfe]).unwrap();
        let source = source_for_path(dir.path()).unwrap();
        assert_eq!(source.find("pkg/A").unwrap(), Some(vec![0xca, 0xfe]));
        assert_eq!(source.find("pkg/B").unwrap(), None);
    }

    #[test]
    fn test_archive_sources() {
        let dir = tempfile::tempdir().unwrap();
        for (file_name, entry) in [("lib.jar", "pkg/A.class"), ("m.jmod", "classes/pkg/A.class")] {
            let path = dir.path().join(file_name);
            let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
            writer
                .start_file(entry, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(&[1, 2, 3]).unwrap();
            writer.finish().unwrap();

            let source = source_for_path(&path).unwrap();
            assert_eq!(source.find("pkg/A").unwrap(), Some(vec![1, 2, 3]), "{file_name}");
            assert_eq!(source.find("pkg/Missing").unwrap(), None);
        }
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::default();
        source.add("mem/A", vec![9u8]);
        assert_eq!(source.find("mem/A").unwrap(), Some(vec![9]));
        assert_eq!(source.name(), "memory");
    }
}
