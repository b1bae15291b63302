//! src/services/local_object_tier.rs
//!
//! LocalObjectTier: a versioned hot tier backed by SQLite for metadata and
//! local disk for payloads. Every write lands in its own version file sharded
//! beneath `base_path/{bucket}/{shard}/{shard}/{version_id}`; the newest row
//! per (bucket, key) carries `is_latest`.

use crate::{
    models::{byte_source::ByteSource, object::ObjectVersion},
    services::{
        error::{TierError, TierResult},
        integrity::Checksum,
        object_tier::{ObjectTier, PutObject, PutReceipt, StoredObject},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

const VERSION_COLUMNS: &str = "id, bucket, key, version_id, content_type, size_bytes, etag, \
                               storage_class, acl, metadata, is_latest, created_at";

#[derive(Clone)]
pub struct LocalObjectTier {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where version payloads are stored.
    pub base_path: PathBuf,
}

impl LocalObjectTier {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> TierResult<()> {
        let invalid = || Err(TierError::InvalidObjectKey(key.to_string()));
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return invalid();
        }
        if key.starts_with('/') || key.split('/').any(|seg| seg == "." || seg == "..") {
            return invalid();
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return invalid();
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> TierResult<()> {
        let reject = |reason: &str| {
            Err(TierError::InvalidBucketName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };

        let len = name.len();
        if len < BUCKET_NAME_MIN_LEN || len > BUCKET_NAME_MAX_LEN {
            return reject("must be between 3 and 63 characters");
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return reject("allowed characters are lowercase letters, digits, dots, and hyphens");
        }
        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return reject("must start and end with a lowercase letter or digit");
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return reject("cannot contain consecutive dots or dot-hyphen combinations");
        }
        if is_ipv4_like(name) {
            return reject("must not be formatted like an IP address");
        }
        Ok(())
    }

    fn validate(&self, bucket: &str, key: &str) -> TierResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)
    }

    /// Two-level shard identifiers from MD5(bucket/key).
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Payload path of one version. Parent directories may not exist yet.
    fn version_path(&self, bucket: &str, key: &str, version_id: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.base_path.clone();
        path.push(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(version_id);
        path
    }

    /// Version row for `version_id`, or the latest row when `None`.
    async fn fetch_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> TierResult<Option<ObjectVersion>> {
        let row = match version_id {
            Some(version_id) => {
                sqlx::query_as::<_, ObjectVersion>(&format!(
                    "SELECT {} FROM object_versions
                     WHERE bucket = ? AND key = ? AND version_id = ?",
                    VERSION_COLUMNS
                ))
                .bind(bucket)
                .bind(key)
                .bind(version_id)
                .fetch_optional(&*self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, ObjectVersion>(&format!(
                    "SELECT {} FROM object_versions
                     WHERE bucket = ? AND key = ? AND is_latest = 1",
                    VERSION_COLUMNS
                ))
                .bind(bucket)
                .bind(key)
                .fetch_optional(&*self.db)
                .await?
            }
        };
        Ok(row)
    }

    /// Write `data` to `path` through a temporary file, fsync, then rename.
    ///
    /// Returns the MD5 of the bytes written.
    async fn write_payload(&self, path: &Path, data: &[u8]) -> TierResult<Checksum> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            TierError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result: io::Result<()> = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(TierError::Io(err));
        }

        Ok(Checksum::of(data))
    }

    /// Latest version of an object plus an open handle for streaming it out.
    pub async fn open_latest(
        &self,
        bucket: &str,
        key: &str,
    ) -> TierResult<Option<(ObjectVersion, File)>> {
        self.validate(bucket, key)?;
        let Some(version) = self.fetch_version(bucket, key, None).await? else {
            return Ok(None);
        };

        let path = self.version_path(bucket, key, &version.version_id);
        match File::open(&path).await {
            Ok(file) => Ok(Some((version, file))),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} missing for latest version", path.display());
                Ok(None)
            }
            Err(err) => Err(TierError::Io(err)),
        }
    }
}

#[async_trait]
impl ObjectTier for LocalObjectTier {
    async fn put(&self, request: PutObject) -> TierResult<PutReceipt> {
        self.validate(&request.bucket, &request.key)?;

        let supplied = Checksum::of(&request.body).to_base64();
        if supplied != request.content_md5 {
            return Err(TierError::BadDigest {
                expected: request.content_md5,
                computed: supplied,
            });
        }

        let version_id = Uuid::new_v4().simple().to_string();
        let path = self.version_path(&request.bucket, &request.key, &version_id);
        let written = self.write_payload(&path, &request.body).await?;
        let etag = written.to_etag();
        let metadata = serde_json::to_string(&request.metadata)?;

        let committed: Result<(), sqlx::Error> = async {
            let mut tx = self.db.begin().await?;
            sqlx::query(
                "UPDATE object_versions SET is_latest = 0
                 WHERE bucket = ? AND key = ? AND is_latest = 1",
            )
            .bind(&request.bucket)
            .bind(&request.key)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO object_versions (
                    id, bucket, key, version_id, content_type, size_bytes, etag,
                    storage_class, acl, metadata, is_latest, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&request.bucket)
            .bind(&request.key)
            .bind(&version_id)
            .bind(&request.content_type)
            .bind(request.body.len() as i64)
            .bind(&etag)
            .bind(request.storage_class.as_str())
            .bind(request.acl.as_str())
            .bind(&metadata)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

            tx.commit().await
        }
        .await;

        if let Err(err) = committed {
            let _ = fs::remove_file(&path).await;
            return Err(TierError::Sqlx(err));
        }

        debug!(
            "stored {}/{} version {} ({} bytes)",
            request.bucket,
            request.key,
            version_id,
            request.body.len()
        );

        Ok(PutReceipt {
            version_id: Some(version_id),
            etag: format!("\"{}\"", etag),
        })
    }

    async fn exists(&self, bucket: &str, key: &str) -> TierResult<bool> {
        self.validate(bucket, key)?;
        Ok(self.fetch_version(bucket, key, None).await?.is_some())
    }

    async fn latest_version(&self, bucket: &str, key: &str) -> TierResult<Option<String>> {
        self.validate(bucket, key)?;
        Ok(self
            .fetch_version(bucket, key, None)
            .await?
            .map(|v| v.version_id))
    }

    async fn get(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> TierResult<Option<StoredObject>> {
        self.validate(bucket, key)?;
        let Some(version) = self.fetch_version(bucket, key, version_id).await? else {
            return Ok(None);
        };

        let path = self.version_path(bucket, key, &version.version_id);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} missing for {}/{}", path.display(), bucket, key);
                return Ok(None);
            }
            Err(err) => return Err(TierError::Io(err)),
        };
        let metadata: BTreeMap<String, String> = serde_json::from_str(&version.metadata)?;

        Ok(Some(StoredObject {
            key: version.key,
            version_id: Some(version.version_id),
            content_type: version.content_type,
            etag: version.etag,
            metadata,
            body: ByteSource::new(data),
        }))
    }

    /// Runs `SELECT 1` and a write/read/delete probe under `base_path`.
    async fn check_ready(&self) -> TierResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(TierError::Corrupt(format!("unexpected probe result: {}", one)));
        }

        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(TierError::Corrupt("file content mismatch".into()));
        }
        Ok(())
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        models::object::{CannedAcl, StorageClass},
        services::object_tier::META_WIDTH,
    };
    use bytes::Bytes;
    use tempfile::TempDir;

    async fn tier() -> (LocalObjectTier, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::memory_pool().await.unwrap();
        (LocalObjectTier::new(Arc::new(pool), dir.path()), dir)
    }

    fn request(key: &str, body: &[u8]) -> PutObject {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_WIDTH.to_string(), "64".to_string());
        PutObject {
            bucket: "originals".into(),
            key: key.into(),
            storage_class: StorageClass::Standard,
            acl: CannedAcl::Private,
            content_type: "image/png".into(),
            metadata,
            body: Bytes::copy_from_slice(body),
            content_md5: Checksum::of(body).to_base64(),
        }
    }

    #[tokio::test]
    async fn put_then_get_latest_round_trips() {
        let (tier, _dir) = tier().await;
        let receipt = tier.put(request("ab/cd/x.png", b"pixels")).await.unwrap();
        assert_eq!(
            receipt.etag,
            format!("\"{}\"", Checksum::of(b"pixels").to_etag())
        );

        let got = tier.get("originals", "ab/cd/x.png", None).await.unwrap().unwrap();
        assert_eq!(got.body.as_bytes().as_ref(), b"pixels");
        assert_eq!(got.version_id, receipt.version_id);
        assert_eq!(got.content_type.as_deref(), Some("image/png"));
        assert_eq!(got.width(), Some(64));
    }

    #[tokio::test]
    async fn overwrites_keep_older_versions() {
        let (tier, _dir) = tier().await;
        let v1 = tier.put(request("ab/cd/x.png", b"one")).await.unwrap();
        let v2 = tier.put(request("ab/cd/x.png", b"two")).await.unwrap();

        assert_eq!(
            tier.latest_version("originals", "ab/cd/x.png").await.unwrap(),
            v2.version_id
        );
        let old = tier
            .get("originals", "ab/cd/x.png", v1.version_id.as_deref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.body.as_bytes().as_ref(), b"one");
    }

    #[tokio::test]
    async fn absent_objects_are_none() {
        let (tier, _dir) = tier().await;
        assert!(!tier.exists("originals", "no/such/key").await.unwrap());
        assert!(tier.latest_version("originals", "no/such/key").await.unwrap().is_none());
        assert!(tier.get("originals", "no/such/key", Some("v9")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_mismatched_content_md5() {
        let (tier, _dir) = tier().await;
        let mut req = request("ab/cd/x.png", b"pixels");
        req.content_md5 = Checksum::of(b"other").to_base64();
        assert!(matches!(tier.put(req).await, Err(TierError::BadDigest { .. })));
        assert!(!tier.exists("originals", "ab/cd/x.png").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_unsafe_keys_and_buckets() {
        let (tier, _dir) = tier().await;
        assert!(matches!(
            tier.put(request("../etc/passwd", b"x")).await,
            Err(TierError::InvalidObjectKey(_))
        ));
        assert!(matches!(
            tier.exists("originals", "ab/./cd/x.png").await,
            Err(TierError::InvalidObjectKey(_))
        ));
        assert!(matches!(
            tier.exists("originals", "ab/cd/..").await,
            Err(TierError::InvalidObjectKey(_))
        ));
        assert!(matches!(
            tier.exists("10.0.0.1", "a/b").await,
            Err(TierError::InvalidBucketName { .. })
        ));
        assert!(matches!(
            tier.exists("Uppercase", "a/b").await,
            Err(TierError::InvalidBucketName { .. })
        ));
    }

    #[tokio::test]
    async fn dots_inside_a_segment_are_allowed() {
        let (tier, _dir) = tier().await;
        tier.put(request("ab/cd/holiday..jpg", b"x")).await.unwrap();
        tier.put(request("ab/cd/photo...png", b"y")).await.unwrap();
        assert!(tier.exists("originals", "ab/cd/holiday..jpg").await.unwrap());
        assert!(tier.exists("originals", "ab/cd/photo...png").await.unwrap());
    }

    #[tokio::test]
    async fn open_latest_streams_newest_payload() {
        let (tier, _dir) = tier().await;
        tier.put(request("ab/cd/x.png", b"one")).await.unwrap();
        tier.put(request("ab/cd/x.png", b"two")).await.unwrap();

        let (version, mut file) = tier.open_latest("originals", "ab/cd/x.png").await.unwrap().unwrap();
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut file, &mut buf).await.unwrap();
        assert_eq!(buf, b"two");
        assert!(version.is_latest);
    }

    #[tokio::test]
    async fn readiness_probe_passes() {
        let (tier, _dir) = tier().await;
        tier.check_ready().await.unwrap();
    }
}
