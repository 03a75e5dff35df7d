use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose;
use chrono::{DateTime, SecondsFormat, Utc};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod event_callback;
pub mod event_manager;
pub mod interruptible;
pub mod progress_watcher;
pub mod token;

pub const S3MIRROR_ORIGINAL_LAST_MODIFIED_METADATA_KEY: &str = "s3mirror-original-last-modified";
pub const S3MIRROR_ORIGINAL_MD5_METADATA_KEY: &str = "s3mirror-original-md5";
pub const SIDECAR_HASH_SUFFIX: &str = ".md5";
pub const DEFAULT_IGNORE_FILE_NAME: &str = ".s3mirror-ignore";

/// One entry of the local tree. `path` is relative and `/`-delimited.
/// Directories carry a trailing `/` and a size of 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub path: String,
    pub absolute_path: PathBuf,
    pub is_directory: bool,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// One object as reported by an object store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteEntry {
    pub key: String,
    pub size_bytes: u64,
    pub content_hash: Option<ContentHash>,
    pub original_content_hash: Option<ContentHash>,
    pub source_last_modified: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub is_directory: bool,
    // false when the entry came from a listing that does not carry user metadata.
    pub metadata_loaded: bool,
}

impl RemoteEntry {
    pub fn new(
        key: &str,
        size_bytes: u64,
        content_hash: Option<ContentHash>,
        last_modified: Option<DateTime<Utc>>,
        metadata: Option<HashMap<String, String>>,
    ) -> Self {
        let metadata_loaded = metadata.is_some();
        let metadata = metadata.unwrap_or_default();

        let original_content_hash = metadata
            .get(S3MIRROR_ORIGINAL_MD5_METADATA_KEY)
            .and_then(|value| ContentHash::parse(value));
        let source_last_modified = metadata
            .get(S3MIRROR_ORIGINAL_LAST_MODIFIED_METADATA_KEY)
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|datetime| datetime.with_timezone(&Utc));

        Self {
            key: key.to_string(),
            size_bytes,
            content_hash,
            original_content_hash,
            source_last_modified,
            last_modified,
            metadata,
            is_directory: key.ends_with('/'),
            metadata_loaded,
        }
    }

    /// A directory that exists only because some key lives beneath it.
    pub fn implicit_directory(key: &str) -> Self {
        Self {
            key: key.to_string(),
            is_directory: true,
            metadata_loaded: true,
            ..Default::default()
        }
    }

    pub fn authoritative_hash(&self) -> Option<&ContentHash> {
        self.original_content_hash
            .as_ref()
            .or(self.content_hash.as_ref())
    }

    pub fn authoritative_last_modified(&self) -> Option<DateTime<Utc>> {
        self.source_last_modified.or(self.last_modified)
    }

    pub fn with_key(&self, key: &str) -> Self {
        Self {
            key: key.to_string(),
            is_directory: key.ends_with('/'),
            ..self.clone()
        }
    }
}

/// Raw digest bytes. Equality is on the bytes, never on an encoding.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(Vec<u8>);

impl ContentHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Accepts hex or base64, with or without surrounding quotes.
    /// Multipart style ETags (`<hex>-<parts>`) are not content digests and yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim().trim_matches('"');
        if trimmed.is_empty() || is_multipart_etag(trimmed) {
            return None;
        }

        if trimmed.len() % 2 == 0 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return hex::decode(trimmed).ok().map(Self);
        }

        general_purpose::STANDARD.decode(trimmed).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.0)
    }
}

fn is_multipart_etag(value: &str) -> bool {
    let Some((digest, parts)) = value.rsplit_once('-') else {
        return false;
    };
    !parts.is_empty()
        && parts.chars().all(|c| c.is_ascii_digit())
        && digest.chars().all(|c| c.is_ascii_hexdigit())
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Debug for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

pub fn format_source_last_modified(last_modified: &DateTime<Utc>) -> String {
    last_modified.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// User supplied settings attached to an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub user_metadata: HashMap<String, String>,
    pub content_type: Option<String>,
    pub canned_acl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclGrantee {
    CanonicalUser { id: String },
    Group { uri: String },
    Email { address: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclGrant {
    pub grantee: AclGrantee,
    pub permission: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControlList {
    pub owner_id: Option<String>,
    pub grants: Vec<AclGrant>,
}

#[derive(Debug, PartialEq)]
pub enum SyncStatistics {
    SyncBytes(u64),
    SyncComplete { key: String },
    SyncSkip { key: String },
    SyncDelete { key: String },
    SyncError { key: String },
}

#[derive(Debug, Clone)]
pub enum StoragePath {
    S3 { bucket: String, prefix: String },
    Local(PathBuf),
}

impl StoragePath {
    pub fn is_local(&self) -> bool {
        matches!(self, StoragePath::Local(_))
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn content_hash_hex_and_base64_are_equal() {
        init_dummy_tracing_subscriber();

        let from_hex = ContentHash::parse("\"9e107d9d372bb6826bd81d3542a419d6\"").unwrap();
        let from_base64 = ContentHash::parse("nhB9nTcrtoJr2B01QqQZ1g==").unwrap();

        assert_eq!(from_hex, from_base64);
        assert_eq!(from_hex.to_hex(), "9e107d9d372bb6826bd81d3542a419d6");
        assert_eq!(from_hex.to_base64(), "nhB9nTcrtoJr2B01QqQZ1g==");
        assert_eq!(from_base64.to_string(), "9e107d9d372bb6826bd81d3542a419d6");
    }

    #[test]
    fn content_hash_rejects_multipart_etag() {
        init_dummy_tracing_subscriber();

        assert!(ContentHash::parse("\"d41d8cd98f00b204e9800998ecf8427e-3\"").is_none());
        assert!(ContentHash::parse("").is_none());
        assert!(ContentHash::parse("\"\"").is_none());
    }

    #[test]
    fn content_hash_invalid_value() {
        init_dummy_tracing_subscriber();

        assert!(ContentHash::parse("not a hash!").is_none());
    }

    #[test]
    fn remote_entry_prefers_original_metadata() {
        init_dummy_tracing_subscriber();

        let mut metadata = HashMap::new();
        metadata.insert(
            S3MIRROR_ORIGINAL_LAST_MODIFIED_METADATA_KEY.to_string(),
            "2023-01-02T03:04:05Z".to_string(),
        );
        metadata.insert(
            S3MIRROR_ORIGINAL_MD5_METADATA_KEY.to_string(),
            "9e107d9d372bb6826bd81d3542a419d6".to_string(),
        );

        let entry = RemoteEntry::new(
            "dir/file",
            10,
            ContentHash::parse("d41d8cd98f00b204e9800998ecf8427e"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            Some(metadata),
        );

        assert!(entry.metadata_loaded);
        assert!(!entry.is_directory);
        assert_eq!(
            entry.authoritative_last_modified(),
            Some(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(
            entry.authoritative_hash().unwrap().to_hex(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn remote_entry_falls_back_to_store_values() {
        init_dummy_tracing_subscriber();

        let last_modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entry = RemoteEntry::new(
            "file",
            10,
            ContentHash::parse("d41d8cd98f00b204e9800998ecf8427e"),
            Some(last_modified),
            None,
        );

        assert!(!entry.metadata_loaded);
        assert_eq!(entry.authoritative_last_modified(), Some(last_modified));
        assert_eq!(
            entry.authoritative_hash().unwrap().to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn implicit_directory_entry() {
        init_dummy_tracing_subscriber();

        let entry = RemoteEntry::implicit_directory("dir/");
        assert!(entry.is_directory);
        assert_eq!(entry.size_bytes, 0);
        assert!(entry.authoritative_hash().is_none());

        let renamed = entry.with_key("other/");
        assert_eq!(renamed.key, "other/");
        assert!(renamed.is_directory);
    }

    #[test]
    fn format_source_last_modified_test() {
        init_dummy_tracing_subscriber();

        let last_modified = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            format_source_last_modified(&last_modified),
            "2023-01-02T03:04:05Z"
        );
    }

    #[test]
    fn debug_print_access_keys() {
        init_dummy_tracing_subscriber();

        let access_keys = AccessKeys {
            access_key: "access_key".to_string(),
            secret_access_key: "secret_access_key".to_string(),
            session_token: Some("session_token".to_string()),
        };
        let debug_string = format!("{access_keys:?}");

        assert!(debug_string.contains("secret_access_key: \"** redacted **\""));
        assert!(debug_string.contains("session_token: \"** redacted **\""));
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
