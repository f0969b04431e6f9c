//! Media item model.
//!
//! Catalog entries carry a `type` discriminator naming the key that holds the
//! payload (`{"type": "image", "image": {...}}`). Legacy offset pages return
//! flat image records without a discriminator. Unrecognized tags decode to
//! [`MediaItem::Unknown`] instead of failing.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::vsco::error::{VscoError, VscoResult};
use crate::vsco::transport::Transport;

const TYPE_KEY: &str = "type";
const IMAGE_TAG: &str = "image";
const VIDEO_TAG: &str = "video";

const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";
const DEFAULT_VIDEO_EXTENSION: &str = ".mp4";

/// Playlist extensions that would need transcoding to materialize
const PLAYLIST_EXTENSIONS: &[&str] = &[".m3u8"];

/// Still image, or a video posted through the image endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageItem {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "is_video", default)]
    pub is_video_flag: bool,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(rename = "responsive_url")]
    pub image_url: String,
    #[serde(rename = "upload_date")]
    pub upload_date_millis: i64,
}

/// Native video post
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoItem {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub playback_url: String,
    #[serde(rename = "created_date")]
    pub created_date_millis: i64,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaItem {
    Image(ImageItem),
    Video(VideoItem),
    /// Discriminator present but not recognized. The tag is kept for diagnostics only.
    Unknown { tag: String },
}

/// What a save actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    Skipped(String),
}

impl MediaItem {
    /// Decode a single catalog entry.
    ///
    /// Fails only for this entry: a missing payload key for a known tag, a
    /// non-object entry, or a payload of the wrong shape.
    pub fn decode(entry: Value) -> VscoResult<Self> {
        let Value::Object(mut fields) = entry else {
            return Err(VscoError::Decode("catalog entry is not an object".to_string()));
        };

        let tag = match fields.get(TYPE_KEY) {
            None => return Ok(MediaItem::Image(serde_json::from_value(Value::Object(fields))?)),
            Some(Value::String(tag)) => tag.clone(),
            Some(other) => {
                return Err(VscoError::Decode(format!(
                    "discriminator '{}' is not a string: {}",
                    TYPE_KEY, other
                )));
            }
        };

        match tag.as_str() {
            IMAGE_TAG => Ok(MediaItem::Image(serde_json::from_value(take_payload(
                &mut fields,
                IMAGE_TAG,
            )?)?)),
            VIDEO_TAG => Ok(MediaItem::Video(serde_json::from_value(take_payload(
                &mut fields,
                VIDEO_TAG,
            )?)?)),
            _ => Ok(MediaItem::Unknown { tag }),
        }
    }

    /// URL the item is downloaded from, with a scheme guaranteed.
    pub fn source_url(&self) -> Option<String> {
        match self {
            MediaItem::Image(image) => {
                let url = match image.video_url.as_deref() {
                    Some(video_url) if image.is_video_flag && !video_url.is_empty() => video_url,
                    _ => image.image_url.as_str(),
                };
                Some(normalize_url(url))
            }
            MediaItem::Video(video) => Some(video.playback_url.clone()),
            MediaItem::Unknown { .. } => None,
        }
    }

    fn upload_millis(&self) -> Option<i64> {
        match self {
            MediaItem::Image(image) => Some(image.upload_date_millis),
            MediaItem::Video(video) => Some(video.created_date_millis),
            MediaItem::Unknown { .. } => None,
        }
    }

    /// Upload time truncated to whole seconds
    pub fn upload_epoch_seconds(&self) -> Option<i64> {
        self.upload_millis().map(|millis| millis.div_euclid(1000))
    }

    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        self.upload_epoch_seconds()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    /// True when the bytes fetched by [`MediaItem::source_url`] are a video.
    pub fn is_video(&self) -> bool {
        match self {
            MediaItem::Image(image) => {
                image.is_video_flag && image.video_url.as_deref().is_some_and(|u| !u.is_empty())
            }
            MediaItem::Video(_) => true,
            MediaItem::Unknown { .. } => false,
        }
    }

    /// Stable identity used as the filename stem and for dedup.
    ///
    /// The server id when present, otherwise the upload time in Unix seconds.
    /// Two id-less uploads within the same second share an identity.
    pub fn identity(&self) -> Option<String> {
        if let Some(id) = self.server_id() {
            return Some(id.to_string());
        }
        match self {
            MediaItem::Unknown { .. } => None,
            _ => self.upload_epoch_seconds().map(|secs| secs.to_string()),
        }
    }

    /// True when the identity comes from the upload second rather than a server id.
    pub fn has_derived_identity(&self) -> bool {
        !matches!(self, MediaItem::Unknown { .. }) && self.server_id().is_none()
    }

    fn server_id(&self) -> Option<&str> {
        let id = match self {
            MediaItem::Image(image) => image.id.as_deref(),
            MediaItem::Video(video) => video.id.as_deref(),
            MediaItem::Unknown { .. } => None,
        };
        id.filter(|id| !id.is_empty())
    }

    /// Extension of the source URL path, or the media-type default.
    pub fn extension(&self) -> String {
        self.source_url()
            .as_deref()
            .and_then(url_extension)
            .unwrap_or_else(|| {
                if self.is_video() {
                    DEFAULT_VIDEO_EXTENSION.to_string()
                } else {
                    DEFAULT_IMAGE_EXTENSION.to_string()
                }
            })
    }

    pub fn filename(&self) -> Option<String> {
        self.identity().map(|identity| format!("{}{}", identity, self.extension()))
    }

    /// Why this item cannot be saved, if it cannot.
    pub fn unsupported_reason(&self) -> Option<String> {
        match self {
            MediaItem::Unknown { tag } => Some(format!("unrecognized media type '{}'", tag)),
            MediaItem::Video(_) => {
                let ext = self.extension();
                PLAYLIST_EXTENSIONS
                    .contains(&ext.as_str())
                    .then(|| format!("streaming playlist ({}) needs transcoding", ext))
            }
            MediaItem::Image(_) => None,
        }
    }

    /// Download into `dir`, then stamp the file with the upload time.
    ///
    /// Unsupported variants are not an error: they come back as
    /// [`SaveOutcome::Skipped`]. A failure to set timestamps is logged only.
    pub async fn save(&self, transport: &dyn Transport, dir: &Path) -> VscoResult<SaveOutcome> {
        if let Some(reason) = self.unsupported_reason() {
            info!("Skipping {}: {}", self.identity().unwrap_or_else(|| "entry".to_string()), reason);
            return Ok(SaveOutcome::Skipped(reason));
        }

        let (Some(url), Some(filename)) = (self.source_url(), self.filename()) else {
            return Err(VscoError::UnsupportedMedia(
                "item has no source URL or identity".to_string(),
            ));
        };

        let path = dir.join(&filename);
        let bytes = transport.download_to(&url, &path).await?;
        debug!("Saved {} ({} bytes) from {}", path.display(), bytes, url);

        if let Some(uploaded) = self.uploaded_at() {
            if let Err(e) = set_file_times(path.clone(), uploaded.into()).await {
                warn!("Failed to set timestamps on {}: {}", path.display(), e);
            }
        }

        Ok(SaveOutcome::Saved(path))
    }
}

fn take_payload(fields: &mut Map<String, Value>, tag: &str) -> VscoResult<Value> {
    fields.remove(tag).ok_or_else(|| {
        VscoError::Decode(format!("entry tagged '{}' has no '{}' payload", tag, tag))
    })
}

/// Prepend `https://` to scheme-less URLs.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("https://{}", url)
    }
}

/// `.jpg` for `https://host/a/b.jpg?w=10`, `None` when the path has no extension.
fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let ext = Path::new(parsed.path()).extension()?.to_str()?;
    (!ext.is_empty()).then(|| format!(".{}", ext))
}

async fn set_file_times(path: PathBuf, time: SystemTime) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || {
        let times = std::fs::FileTimes::new()
            .set_accessed(time)
            .set_modified(time);
        std::fs::File::options().write(true).open(&path)?.set_times(times)
    })
    .await
    .map_err(std::io::Error::other)?
}
