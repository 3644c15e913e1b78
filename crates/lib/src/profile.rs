//! Profile cache: lazy single-fetch memoization of user profile data with a
//! periodically flushed on-disk mirror.
//!
//! The cache is the sole owner of the in-memory mapping; the on-disk file is a
//! passive mirror rewritten in full on each flush. Entries added between the
//! last flush and process termination are lost, which is accepted. First-time
//! fetches also write a normalized subset through to an external user sink.

use crate::error::BotError;
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Flush the mirror at most once per this window.
const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Profile data for one platform user. Immutable once cached; there is no
/// refresh path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Platform user id. Absent in the remote fetch response; stamped by the
    /// cache before insertion.
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// Normalized subset forwarded to the external user store on first fetch.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl NewUser {
    fn from_profile(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
        }
    }
}

/// Remote profile fetch seam; implemented by `SendClient` and by test mocks.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile, String>;
}

/// External durable user store, treated as an opaque sink. Failures are
/// logged, never fatal.
#[async_trait]
pub trait UserSink: Send + Sync {
    async fn save_user(&self, user: &NewUser) -> Result<(), String>;
}

/// Default sink: does nothing.
pub struct NoopUserSink;

#[async_trait]
impl UserSink for NoopUserSink {
    async fn save_user(&self, _user: &NewUser) -> Result<(), String> {
        Ok(())
    }
}

struct CacheInner {
    profiles: HashMap<String, UserProfile>,
    last_flush: Instant,
}

/// In-memory profile mapping with a JSON-file mirror.
pub struct ProfileCache {
    path: PathBuf,
    sink: std::sync::Arc<dyn UserSink>,
    flush_interval: Duration,
    inner: Mutex<CacheInner>,
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("path", &self.path)
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}

impl ProfileCache {
    /// Load the cache from `path`. A missing file starts empty; a file that
    /// exists but fails to parse is fatal.
    pub fn load(path: impl AsRef<Path>, sink: std::sync::Arc<dyn UserSink>) -> Result<Self, BotError> {
        let path = path.as_ref().to_path_buf();
        let profiles = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).map_err(|source| BotError::MalformedCacheFile {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(BotError::Io(e)),
        };
        log::debug!(
            "profile cache loaded {} entries from {}",
            profiles.len(),
            path.display()
        );
        Ok(Self {
            path,
            sink,
            flush_interval: FLUSH_INTERVAL,
            inner: Mutex::new(CacheInner {
                profiles,
                last_flush: Instant::now(),
            }),
        })
    }

    /// Override the flush window (tests use a zero interval).
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Number of cached profiles.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.profiles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Peek at a cached profile without fetching.
    pub async fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.inner.lock().await.profiles.get(user_id).cloned()
    }

    /// Return the memoized profile, or fetch it once from the remote API.
    ///
    /// On a miss: fetch, stamp `id`, insert, flush the mirror when the window
    /// has elapsed, write the normalized subset through to the user sink, then
    /// return the full profile. Two concurrent misses for the same id may both
    /// fetch; the second insert wins.
    pub async fn get_or_fetch(
        &self,
        user_id: &str,
        fetcher: &dyn ProfileFetcher,
    ) -> Result<UserProfile, BotError> {
        if let Some(profile) = self.get(user_id).await {
            return Ok(profile);
        }
        let mut profile = fetcher
            .fetch_profile(user_id)
            .await
            .map_err(BotError::RemoteCallFailed)?;
        profile.id = user_id.to_string();
        {
            let mut inner = self.inner.lock().await;
            inner.profiles.insert(user_id.to_string(), profile.clone());
            if inner.last_flush.elapsed() >= self.flush_interval {
                if let Err(e) = write_mirror(&self.path, &inner.profiles) {
                    log::warn!("profile cache flush failed: {}", e);
                } else {
                    inner.last_flush = Instant::now();
                }
            }
        }
        if let Err(e) = self.sink.save_user(&NewUser::from_profile(&profile)).await {
            log::warn!("user sink save failed for {}: {}", user_id, e);
        }
        Ok(profile)
    }

    /// Rewrite the mirror unconditionally (e.g. on graceful shutdown).
    pub async fn flush(&self) -> Result<(), BotError> {
        let mut inner = self.inner.lock().await;
        write_mirror(&self.path, &inner.profiles)?;
        inner.last_flush = Instant::now();
        Ok(())
    }
}

/// Rewrite the whole mirror file under an exclusive advisory lock. The caller
/// holds the cache lock, so in-process flushes are already serialized; the
/// file lock guards against a second process on the same data directory.
fn write_mirror(path: &Path, profiles: &HashMap<String, UserProfile>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(profiles)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    let result = (|| {
        file.set_len(0)?;
        let mut writer = &file;
        writer.write_all(json.as_bytes())?;
        writer.flush()
    })();
    let _ = file.unlock();
    result
}
