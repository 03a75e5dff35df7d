use percent_encoding::percent_decode_str;
use url::{ParseError, Url};

use crate::types::StoragePath;

const INVALID_SCHEME: &str = "scheme must be s3:// .";
const INVALID_PATH: &str = "path must be a valid URL or a local path.";
const NO_BUCKET_NAME_SPECIFIED: &str = "bucket name must be specified.";
const NO_PATH_SPECIFIED: &str = "path must be specified.";
const INVALID_PREFIX_ENCODING: &str = "prefix must be valid UTF-8.";

/// Accepts `s3://bucket[/prefix]` or a local directory. Local paths are
/// returned with a trailing separator.
pub fn check_storage_path(path: &str) -> Result<String, String> {
    if path.is_empty() {
        return Err(NO_PATH_SPECIFIED.to_string());
    }

    match Url::parse(path) {
        Err(ParseError::RelativeUrlWithoutBase) => Ok(with_trailing_separator(path)),
        Err(_) => Err(INVALID_PATH.to_string()),
        Ok(_) if is_windows_absolute_path(path) => Ok(with_trailing_separator(path)),
        Ok(parsed) => {
            if parsed.scheme() != "s3" {
                return Err(INVALID_SCHEME.to_string());
            }
            if parsed.host_str().is_none_or(str::is_empty) {
                return Err(NO_BUCKET_NAME_SPECIFIED.to_string());
            }
            decode_prefix(&parsed)?;
            Ok(path.to_string())
        }
    }
}

pub fn parse_storage_path(path: &str) -> Result<StoragePath, String> {
    let checked = check_storage_path(path)?;

    match Url::parse(&checked) {
        Ok(parsed) if !is_windows_absolute_path(&checked) => {
            let bucket = parsed
                .host_str()
                .ok_or_else(|| NO_BUCKET_NAME_SPECIFIED.to_string())?
                .to_string();
            let prefix = decode_prefix(&parsed)?;
            Ok(StoragePath::S3 { bucket, prefix })
        }
        _ => Ok(StoragePath::Local(checked.into())),
    }
}

pub fn is_both_storage_local(source: &StoragePath, target: &StoragePath) -> bool {
    source.is_local() && target.is_local()
}

pub fn is_both_storage_s3(source: &StoragePath, target: &StoragePath) -> bool {
    !source.is_local() && !target.is_local()
}

fn decode_prefix(parsed: &Url) -> Result<String, String> {
    let path = parsed.path();
    let path = path.strip_prefix('/').unwrap_or(path);

    percent_decode_str(path)
        .decode_utf8()
        .map(|prefix| prefix.to_string())
        .map_err(|_| INVALID_PREFIX_ENCODING.to_string())
}

fn with_trailing_separator(path: &str) -> String {
    if path.ends_with(std::path::MAIN_SEPARATOR) || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}{}", path, std::path::MAIN_SEPARATOR)
    }
}

fn is_windows_absolute_path(path: &str) -> bool {
    if !cfg!(windows) {
        return false;
    }

    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(drive), Some(':'), Some('\\')) if drive.is_ascii_alphabetic()
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn check_valid_path() {
        init_dummy_tracing_subscriber();

        check_storage_path("/etc/").unwrap();
        check_storage_path("./dir").unwrap();
        check_storage_path("../dir/").unwrap();

        check_storage_path("s3://my-bucket").unwrap();
        check_storage_path("s3://my-bucket/").unwrap();
        check_storage_path("s3://my-bucket/photos/2024").unwrap();
        check_storage_path("s3://my-bucket/hello/こんばんは/☃").unwrap();
    }

    #[test]
    fn check_invalid_path() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            check_storage_path("").unwrap_err(),
            NO_PATH_SPECIFIED.to_string()
        );
        assert_eq!(
            check_storage_path("https://my-bucket/").unwrap_err(),
            INVALID_SCHEME.to_string()
        );
        assert_eq!(
            check_storage_path("s3:///prefix").unwrap_err(),
            NO_BUCKET_NAME_SPECIFIED.to_string()
        );
    }

    #[test]
    #[cfg(target_family = "unix")]
    fn local_path_gets_trailing_separator() {
        init_dummy_tracing_subscriber();

        assert_eq!(check_storage_path("dir1").unwrap(), "dir1/");
        assert_eq!(check_storage_path("dir1/").unwrap(), "dir1/");

        let StoragePath::Local(path) = parse_storage_path("/dir1").unwrap() else {
            panic!("local path not found");
        };
        assert_eq!(path, PathBuf::from("/dir1/"));
    }

    #[test]
    fn parse_s3_path() {
        init_dummy_tracing_subscriber();

        let StoragePath::S3 { bucket, prefix } = parse_storage_path("s3://my-bucket").unwrap()
        else {
            panic!("s3 path not found");
        };
        assert_eq!(bucket, "my-bucket");
        assert_eq!(prefix, "");

        let StoragePath::S3 { bucket, prefix } =
            parse_storage_path("s3://my-bucket/dir1/dir2/").unwrap()
        else {
            panic!("s3 path not found");
        };
        assert_eq!(bucket, "my-bucket");
        assert_eq!(prefix, "dir1/dir2/");
    }

    #[test]
    fn parse_percent_encoded_prefix() {
        init_dummy_tracing_subscriber();

        let StoragePath::S3 { prefix, .. } =
            parse_storage_path("s3://my-bucket/a%20b/c+d").unwrap()
        else {
            panic!("s3 path not found");
        };
        assert_eq!(prefix, "a b/c+d");
    }

    #[test]
    fn both_storage_kinds() {
        init_dummy_tracing_subscriber();

        let local = parse_storage_path("./dir").unwrap();
        let s3 = parse_storage_path("s3://bucket/prefix").unwrap();

        assert!(is_both_storage_local(&local, &local));
        assert!(!is_both_storage_local(&local, &s3));
        assert!(is_both_storage_s3(&s3, &s3));
        assert!(!is_both_storage_s3(&s3, &local));
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
