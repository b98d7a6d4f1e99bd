use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes through a sibling temp file and renames it over `path`, creating
/// parent directories first. A crash mid-write leaves the previous file.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, text.as_bytes())?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("scene.sdf");
    let tmp_name = format!(".{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn creates_parents_and_replaces_existing() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("nested").join("dir").join("world.sdf");
        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
        assert!(!temp_path_for(&path).exists());
    }
}
