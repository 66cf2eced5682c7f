//! Builds transfer descriptors from video files on disk.

use std::collections::HashMap;
use std::path::Path;
use regex::Regex;
use thiserror::Error;
use crate::config::Config;
use crate::upload::TransferDescriptor;

pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "mkv"];

const DEFAULT_PLAYLIST_KEY: &str = "default";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error for {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Unsupported video format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Derives titles and target playlists from recording file names.
pub struct MetadataResolver {
    medal: Regex,
    obs: Regex,
    mobile: Regex,
    month: Regex,
    playlists: HashMap<String, String>,
}

impl MetadataResolver {
    pub fn new(playlists: HashMap<String, String>) -> Result<Self, MetadataError> {
        Ok(Self {
            medal: Regex::new(r"^([A-Za-z]+)(\d{14})(\d{3})?$")?,
            obs: Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) (\d{2})-(\d{2})-(\d{2})$")?,
            mobile: Regex::new(r"^([\w ]+)[_-](\d{4})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-(\d{2})$")?,
            month: Regex::new(r"\d{4}/\d{2}")?,
            playlists,
        })
    }

    /// Human readable title for a recording file name.
    ///
    /// Medal.tv clips, OBS recordings and mobile game recorder files get a
    /// `YYYY/MM/DD hh:mm:ss` timestamp; anything else keeps its stem.
    pub fn parse_title(&self, file_name: &str) -> String {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(file_name);

        if let Some(rest) = stem.strip_prefix("MedalTV") {
            if let Some(caps) = self.medal.captures(rest) {
                let stamp = &caps[2];
                return format!("{} {}", &caps[1], format_stamp(
                    &stamp[0..4], &stamp[4..6], &stamp[6..8],
                    &stamp[8..10], &stamp[10..12], &stamp[12..14],
                ));
            }
        }

        if let Some(caps) = self.obs.captures(stem) {
            return format!("Recording {}", format_stamp(&caps[1], &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]));
        }

        if let Some(caps) = self.mobile.captures(stem) {
            let game: String = caps[1].split_whitespace().collect();
            return format!("{} {}", game, format_stamp(&caps[2], &caps[3], &caps[4], &caps[5], &caps[6], &caps[7]));
        }

        stem.to_string()
    }

    /// Playlist for a title: the first `YYYY/MM` in it selects the entry,
    /// falling back to the `default` entry. Empty ids count as unset.
    pub fn resolve_playlist(&self, title: &str) -> Option<String> {
        let key = self.month
            .find(title)
            .map(|found| found.as_str())
            .unwrap_or(DEFAULT_PLAYLIST_KEY);

        self.playlists
            .get(key)
            .filter(|id| !id.is_empty())
            .or_else(|| self.playlists.get(DEFAULT_PLAYLIST_KEY))
            .filter(|id| !id.is_empty())
            .cloned()
    }

    pub async fn describe(&self, path: &Path) -> Result<TransferDescriptor, MetadataError> {
        if !is_video_file(path) {
            return Err(MetadataError::UnsupportedFormat(path.display().to_string()));
        }

        let metadata = tokio::fs::metadata(path).await.map_err(|source| MetadataError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(MetadataError::UnsupportedFormat(path.display().to_string()));
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = self.parse_title(&file_name);
        let playlist = self.resolve_playlist(&title);

        Ok(TransferDescriptor::new(path, title, playlist, metadata.len()))
    }
}

/// One-shot descriptor for `path`, relative paths resolved against the
/// configured default directory.
pub async fn describe(path: &Path, config: &Config) -> Result<TransferDescriptor, MetadataError> {
    let resolver = MetadataResolver::new(config.playlists.clone())?;
    resolver.describe(&config.resolve_path(path)).await
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

fn format_stamp(year: &str, month: &str, day: &str, hour: &str, minute: &str, second: &str) -> String {
    format!("{}/{}/{} {}:{}:{}", year, month, day, hour, minute, second)
}
