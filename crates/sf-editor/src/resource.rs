//! Content-API wire types and editor resources.

use serde::{Deserialize, Serialize};

/// Edge length the editor uses for videos until the real dimensions are
/// known from the file itself.
pub const VIDEO_PLACEHOLDER_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One page of a content-API listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPage {
    pub items: Vec<ApiItem>,
    #[serde(default)]
    pub meta: ApiPageMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiPageMeta {
    #[serde(default)]
    pub total_count: u64,
}

/// A single image, media item or document.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiItem {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    pub meta: ApiItemMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiItemMeta {
    pub download_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<ApiSize>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ApiSize {
    pub width: u32,
    pub height: u32,
}

// ---------------------------------------------------------------------------
// Editor resources
// ---------------------------------------------------------------------------

/// What kind of resource the editor is placing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Video,
    Audio,
    /// Caption tracks, stored as CMS documents.
    Caption,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Video => "video",
            ResourceKind::Audio => "audio",
            ResourceKind::Caption => "caption",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = sf_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" | "images" => Ok(ResourceKind::Image),
            "video" | "videos" => Ok(ResourceKind::Video),
            "audio" => Ok(ResourceKind::Audio),
            "caption" | "captions" | "documents" => Ok(ResourceKind::Caption),
            other => Err(sf_core::Error::Validation(format!(
                "unknown resource kind: {other}"
            ))),
        }
    }
}

/// A resource as handed to the editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResource {
    pub id: u64,
    pub src: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub mime_type: Option<String>,
    /// Alternate renditions; the CMS provides none.
    pub sizes: serde_json::Map<String, serde_json::Value>,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl MediaResource {
    /// Shape an API item for the editor.
    pub fn from_item(kind: ResourceKind, item: ApiItem) -> Self {
        let (width, height) = match kind {
            ResourceKind::Image => item
                .meta
                .size
                .map(|s| (s.width, s.height))
                .unwrap_or((0, 0)),
            ResourceKind::Video => (VIDEO_PLACEHOLDER_SIZE, VIDEO_PLACEHOLDER_SIZE),
            ResourceKind::Audio | ResourceKind::Caption => (0, 0),
        };
        let alt = match kind {
            ResourceKind::Image => item.title,
            _ => None,
        };

        Self {
            id: item.id,
            src: item.meta.download_url,
            kind,
            mime_type: item.meta.mime_type,
            sizes: serde_json::Map::new(),
            width,
            height,
            alt,
        }
    }
}

/// A listing of resources. Listings are never paginated towards the
/// editor, so `total_pages` is always 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourcePage {
    pub items: Vec<MediaResource>,
    pub meta: ResourcePageMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePageMeta {
    pub total_items: u64,
    pub total_pages: u32,
}

impl ResourcePage {
    pub fn from_api(kind: ResourceKind, page: ApiPage) -> Self {
        let total_items = page.meta.total_count;
        Self {
            items: page
                .items
                .into_iter()
                .map(|item| MediaResource::from_item(kind, item))
                .collect(),
            meta: ResourcePageMeta {
                total_items,
                total_pages: 1,
            },
        }
    }
}
