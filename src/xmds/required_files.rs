/// Required files manifest returned by the CMS.
use std::fmt;

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::soap::SoapError;

/// How the downloader should fetch a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadType {
    /// Plain HTTP(S) GET of `url`
    Http,
    /// Chunked fetch through the XMDS `GetFile` call
    Xmds,
}

impl DownloadType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "http" => Some(DownloadType::Http),
            "xmds" => Some(DownloadType::Xmds),
            _ => None,
        }
    }
}

/// Media or layout file the display must hold locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularFile {
    pub id: i32,
    pub size: u64,
    /// Lowercase hex MD5 of the content
    pub md5: String,
    pub url: String,
    pub name: String,
    /// `media`, `layout`, ...
    pub file_type: String,
    pub download_type: DownloadType,
}

/// Dynamic content rendered by the CMS for one widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    pub layout_id: i32,
    pub region_id: i32,
    pub media_id: i32,
    pub last_update: DateTime<Utc>,
}

impl ResourceFile {
    /// Local cache file name
    pub fn name(&self) -> String {
        format!("{}.html", self.media_id)
    }
}

impl fmt::Display for RegularFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {} ({} bytes, {:?})",
            self.file_type, self.id, self.name, self.size, self.download_type
        )
    }
}

impl fmt::Display for ResourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resource layout={} region={} media={} updated={}",
            self.layout_id, self.region_id, self.media_id, self.last_update
        )
    }
}

/// Both lists from one RequiredFiles call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredItems {
    pub files: Vec<RegularFile>,
    pub resources: Vec<ResourceFile>,
}

#[derive(Debug, Deserialize)]
struct FilesDocument {
    #[serde(rename = "file", default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@size")]
    size: Option<String>,
    #[serde(rename = "@md5")]
    md5: Option<String>,
    #[serde(rename = "@download")]
    download: Option<String>,
    #[serde(rename = "@path")]
    path: Option<String>,
    #[serde(rename = "@saveAs")]
    save_as: Option<String>,
    #[serde(rename = "@layoutid")]
    layout_id: Option<String>,
    #[serde(rename = "@regionid")]
    region_id: Option<String>,
    #[serde(rename = "@mediaid")]
    media_id: Option<String>,
    #[serde(rename = "@updated")]
    updated: Option<String>,
}

/// Parse the `<files>` document carried inside the RequiredFiles response.
pub fn parse_required_files(xml: &str) -> Result<RequiredItems, SoapError> {
    let document: FilesDocument = from_str(xml.trim())
        .map_err(|e| SoapError::Malformed(format!("required files: {e}")))?;

    let mut items = RequiredItems::default();
    for entry in document.files {
        match entry.kind.as_str() {
            "media" | "layout" => items.files.push(regular_file(entry)?),
            "resource" => items.resources.push(resource_file(entry)?),
            other => debug!("Ignoring required file entry of type '{}'", other),
        }
    }

    debug!(
        "Required files: {} file(s), {} resource(s)",
        items.files.len(),
        items.resources.len()
    );
    Ok(items)
}

fn regular_file(entry: FileEntry) -> Result<RegularFile, SoapError> {
    let download = entry.download.as_deref().unwrap_or_default();
    let download_type = DownloadType::parse(download).ok_or_else(|| {
        SoapError::Malformed(format!("file {:?} has invalid download type '{download}'", entry.id))
    })?;

    let id = number(&entry.id, "id")?;
    let size = match entry.size.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(s) => s
            .parse()
            .map_err(|_| SoapError::Malformed(format!("file {id} has invalid size '{s}'")))?,
    };
    let url = entry.path.unwrap_or_default();
    if url.is_empty() {
        warn!("File {} has no download path", id);
    }

    Ok(RegularFile {
        id,
        size,
        md5: entry.md5.unwrap_or_default().to_ascii_lowercase(),
        name: entry.save_as.unwrap_or_else(|| id.to_string()),
        url,
        file_type: entry.kind,
        download_type,
    })
}

fn resource_file(entry: FileEntry) -> Result<ResourceFile, SoapError> {
    let updated: i64 = number(&entry.updated, "updated")?;
    let last_update = DateTime::from_timestamp(updated, 0)
        .ok_or_else(|| SoapError::Malformed(format!("resource timestamp {updated} out of range")))?;

    Ok(ResourceFile {
        layout_id: number(&entry.layout_id, "layoutid")?,
        region_id: number(&entry.region_id, "regionid")?,
        media_id: number(&entry.media_id, "mediaid")?,
        last_update,
    })
}

fn number<T: std::str::FromStr>(value: &Option<String>, attr: &str) -> Result<T, SoapError> {
    let raw = value
        .as_deref()
        .ok_or_else(|| SoapError::Malformed(format!("file entry is missing '{attr}'")))?;
    raw.trim()
        .parse()
        .map_err(|_| SoapError::Malformed(format!("file entry has invalid {attr} '{raw}'")))
}
