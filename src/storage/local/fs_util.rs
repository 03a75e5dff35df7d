use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use filetime::{FileTime, set_file_mtime};
use regex::Regex;
use std::sync::LazyLock;
use tempfile::NamedTempFile;
use tracing::trace;

static DIRECTORY_TRAVERSAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\.[/\\]").expect("valid regex"));
static ROOT_SLASH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/+").expect("valid regex"));

pub fn check_directory_traversal(key: &str) -> bool {
    DIRECTORY_TRAVERSAL_REGEX.is_match(key)
}

pub fn system_time_to_utc(time: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

pub async fn get_last_modified(path: &Path) -> Result<DateTime<Utc>> {
    let modified = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("tokio::fs::metadata() failed. path={}", path.display()))?
        .modified()
        .context("std::fs::Metadata::modified() failed.")?;

    Ok(system_time_to_utc(modified))
}

pub fn set_last_modified(path: &Path, last_modified: &DateTime<Utc>) -> std::io::Result<()> {
    set_file_mtime(
        path,
        FileTime::from_unix_time(
            last_modified.timestamp(),
            last_modified.timestamp_subsec_nanos(),
        ),
    )
}

pub fn is_key_a_directory(key: &str) -> bool {
    if cfg!(windows) && key.ends_with('\\') {
        return true;
    }

    key.ends_with('/')
}

pub async fn create_temp_file_from_key(path: &Path, key: &str) -> Result<NamedTempFile> {
    create_directory_hierarchy_from_key(path, key).await?;

    let temp_directory_path = key_to_directory_without_filename(path, key);
    let file =
        NamedTempFile::new_in(temp_directory_path).context("NamedTempFile::new_in failed.")?;
    Ok(file)
}

pub async fn create_directory_hierarchy_from_key(path: &Path, key: &str) -> Result<bool> {
    let directory_path = key_to_directory_without_filename(path, key);

    if directory_path.try_exists().unwrap_or(false) {
        return Ok(false);
    }

    tokio::fs::create_dir_all(&directory_path)
        .await
        .context("tokio::fs::create_dir_all() failed.")?;

    let directory = directory_path.to_string_lossy().to_string();
    trace!(key = key, directory = directory, "directory created.");

    Ok(true)
}

pub fn remove_root_slash(key: &str) -> String {
    ROOT_SLASH_REGEX.replace(key, "").to_string()
}

pub fn key_to_file_path(path: &Path, key: &str) -> PathBuf {
    let relative = remove_root_slash(key);
    let mut file_path = path.to_path_buf();
    for component in relative.split('/').filter(|component| !component.is_empty()) {
        file_path.push(component);
    }
    file_path
}

/// Relative `/`-delimited form of `path` under `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let components: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(components.join("/"))
}

fn key_to_directory_without_filename(path: &Path, key: &str) -> PathBuf {
    let file_path = key_to_file_path(path, key);
    if is_key_a_directory(key) {
        return file_path;
    }

    file_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn check_directory_traversal_test() {
        init_dummy_tracing_subscriber();

        assert!(check_directory_traversal("../etc/passwd"));
        assert!(check_directory_traversal("dir1/dir2/../../etc/passwd"));
        assert!(check_directory_traversal("/xyz/data/../../etc/passwd"));
        assert!(check_directory_traversal("..\\etc\\passwd"));
        assert!(check_directory_traversal("dir1\\dir2\\..\\..\\etc\\passwd"));

        assert!(!check_directory_traversal("/etc/passwd"));
        assert!(!check_directory_traversal("etc/passwd"));
        assert!(!check_directory_traversal("passwd"));
        assert!(!check_directory_traversal("/xyz/test..jpg"));
        assert!(!check_directory_traversal("\\xyz\\test..jpg"));
    }

    #[test]
    fn is_key_directory_test() {
        init_dummy_tracing_subscriber();

        assert!(is_key_a_directory("/dir/"));
        assert!(is_key_a_directory("dir/"));
        assert!(is_key_a_directory("/dir1/dir2/"));

        assert!(!is_key_a_directory("/dir"));
        assert!(!is_key_a_directory("dir"));
        assert!(!is_key_a_directory("/dir1/dir2"));
    }

    #[test]
    fn remove_root_slash_test() {
        init_dummy_tracing_subscriber();

        assert_eq!(remove_root_slash("/dir/file"), "dir/file");
        assert_eq!(remove_root_slash("///dir/file"), "dir/file");
        assert_eq!(remove_root_slash("dir/file"), "dir/file");
        assert_eq!(remove_root_slash("dir/"), "dir/");
    }

    #[test]
    fn key_to_file_path_test() {
        init_dummy_tracing_subscriber();

        let root = PathBuf::from("root");
        assert_eq!(
            key_to_file_path(&root, "dir1/dir2/file"),
            root.join("dir1").join("dir2").join("file")
        );
        assert_eq!(key_to_file_path(&root, "/file"), root.join("file"));
        assert_eq!(key_to_file_path(&root, "dir1/"), root.join("dir1"));
    }

    #[test]
    fn relative_key_test() {
        init_dummy_tracing_subscriber();

        let root = PathBuf::from("root");
        assert_eq!(
            relative_key(&root, &root.join("dir1").join("file")).unwrap(),
            "dir1/file"
        );
        assert_eq!(relative_key(&root, &root).unwrap(), "");
        assert!(relative_key(&root, Path::new("other/file")).is_none());
    }

    #[tokio::test]
    async fn create_temp_file_and_directory_hierarchy() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();

        assert!(
            create_directory_hierarchy_from_key(dir.path(), "testdir1/testdir2/filename")
                .await
                .unwrap()
        );
        assert!(dir.path().join("testdir1").join("testdir2").is_dir());
        assert!(
            !create_directory_hierarchy_from_key(dir.path(), "testdir1/testdir2/")
                .await
                .unwrap()
        );

        let temp_file = create_temp_file_from_key(dir.path(), "tempdir/filename")
            .await
            .unwrap();
        assert_eq!(
            temp_file.path().parent().unwrap(),
            dir.path().join("tempdir")
        );
    }

    #[tokio::test]
    async fn set_and_get_last_modified() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("5byte.dat");
        std::fs::write(&file, b"12345").unwrap();

        let last_modified = Utc.with_ymd_and_hms(2020, 2, 3, 4, 5, 6).unwrap();
        set_last_modified(&file, &last_modified).unwrap();

        assert_eq!(get_last_modified(&file).await.unwrap(), last_modified);
        assert!(get_last_modified(&dir.path().join("missing")).await.is_err());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
