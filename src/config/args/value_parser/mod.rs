pub mod canned_acl;
pub mod storage_path;
pub mod url;
