//! Detection of shareable content blocks in transcript HTML.
//!
//! Blocks are recognised by the CSS classes the content authoring tools emit,
//! so detection is a handful of opening-tag patterns rather than a DOM walk.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetType {
    EtymologyCard,
    AhadeesContainer,
    AyahCard,
    ImageAsset,
    TableAsset,
}

impl AssetType {
    pub const ALL: [AssetType; 5] = [
        AssetType::EtymologyCard,
        AssetType::AhadeesContainer,
        AssetType::AyahCard,
        AssetType::ImageAsset,
        AssetType::TableAsset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::EtymologyCard => "etymology-card",
            AssetType::AhadeesContainer => "ahadees-container",
            AssetType::AyahCard => "ayah-card",
            AssetType::ImageAsset => "image-asset",
            AssetType::TableAsset => "table-asset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    pub fn pattern(&self) -> &'static str {
        match self {
            AssetType::EtymologyCard => {
                r#"<div[^>]*class="[^"]*etymology-derivative-card[^"]*"[^>]*>"#
            }
            AssetType::AhadeesContainer => {
                r#"<div[^>]*class="[^"]*(?:inserted-hadees|ks-ahadees-container|ahadees-content)[^"]*"[^>]*>"#
            }
            AssetType::AyahCard => r#"<div[^>]*class="[^"]*ayah-card[^"]*"[^>]*>"#,
            AssetType::ImageAsset => r#"<img[^>]*>"#,
            AssetType::TableAsset => {
                r#"<table[^>]*class="[^"]*(?:islamic-table|content-table|comparison-table)[^"]*"[^>]*>"#
            }
        }
    }
}

static DETECTORS: LazyLock<Vec<(AssetType, Regex)>> = LazyLock::new(|| {
    AssetType::ALL
        .into_iter()
        .map(|t| {
            let regex = Regex::new(&format!("(?i){}", t.pattern()))
                .expect("asset patterns are valid regexes");
            (t, regex)
        })
        .collect()
});

static ID_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\sid\s*=\s*"([^"]+)""#).expect("id pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedAsset {
    pub asset_type: AssetType,
    pub selector: String,
    /// 1-based order in the document.
    pub position: i32,
    pub css_pattern: &'static str,
    #[serde(skip)]
    pub offset: usize,
}

pub fn detect_assets(html: &str) -> Vec<DetectedAsset> {
    let mut hits: Vec<(usize, AssetType, &str)> = DETECTORS
        .iter()
        .flat_map(|(asset_type, regex)| {
            regex
                .find_iter(html)
                .map(move |m| (m.start(), *asset_type, m.as_str()))
        })
        .collect();
    hits.sort_by_key(|(offset, _, _)| *offset);

    let mut per_type: HashMap<AssetType, usize> = HashMap::new();
    hits.into_iter()
        .enumerate()
        .map(|(index, (offset, asset_type, tag))| {
            let n = per_type.entry(asset_type).or_insert(0);
            *n += 1;
            let selector = match ID_ATTRIBUTE.captures(tag) {
                Some(caps) => format!("#{}", &caps[1]),
                None => format!("{}-{}", asset_type.as_str(), n),
            };
            DetectedAsset {
                asset_type,
                selector,
                position: index as i32 + 1,
                css_pattern: asset_type.pattern(),
                offset,
            }
        })
        .collect()
}
