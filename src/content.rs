//! The shared content record shown on the moodboard, and the partial field
//! sets the edit panel produces.
//!
//! Wire names are camelCase so documents written by earlier revisions of the
//! page decode unchanged. Every field has a default; a document missing
//! `likes` or `links` still loads. Fields are decoded one at a time: a
//! `null` or mistyped value falls back for that field only.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Per-field decoders for documents written by other clients, which may
/// store `null`, numbers-as-strings or fractional counters.
mod lenient {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    use super::SocialLinks;

    fn text(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn whole(n: f64) -> u64 {
        if n.is_finite() && n > 0.0 {
            n.floor() as u64
        } else {
            0
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(text(Value::deserialize(deserializer)?).unwrap_or_default())
    }

    pub fn optional_string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(text(Value::deserialize(deserializer)?))
    }

    /// Non-negative whole count. Anything unreadable counts as zero.
    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_u64().unwrap_or_else(|| n.as_f64().map_or(0, whole)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .unwrap_or_else(|_| s.parse::<f64>().map_or(0, whole))
            }
            _ => 0,
        })
    }

    pub fn links<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SocialLinks, D::Error> {
        match Value::deserialize(deserializer)? {
            map @ Value::Object(_) => serde_json::from_value(map).map_err(D::Error::custom),
            _ => Ok(SocialLinks::default()),
        }
    }
}

/// Social profile links shown on the socials card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialLinks {
    #[serde(deserialize_with = "lenient::string")]
    pub instagram: String,
    #[serde(deserialize_with = "lenient::string")]
    pub twitter: String,
    #[serde(deserialize_with = "lenient::string")]
    pub linkedin: String,
}

impl Default for SocialLinks {
    fn default() -> Self {
        Self {
            instagram: "https://instagram.com".to_string(),
            twitter: "https://twitter.com".to_string(),
            linkedin: "https://linkedin.com".to_string(),
        }
    }
}

/// The single content record backing the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub bio: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
    /// Image URL or inline `data:` URI.
    #[serde(deserialize_with = "lenient::string")]
    pub profile_pic: String,
    #[serde(deserialize_with = "lenient::string")]
    pub insta_img: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_string"
    )]
    pub insta_post_img: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub twitter_url: String,
    #[serde(deserialize_with = "lenient::string")]
    pub twitter_preview: String,
    #[serde(deserialize_with = "lenient::string")]
    pub portfolio_title: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_string"
    )]
    pub portfolio_desc: Option<String>,
    #[serde(deserialize_with = "lenient::count")]
    pub likes: u64,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_string"
    )]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient::links")]
    pub links: SocialLinks,
}

impl Default for ContentRecord {
    fn default() -> Self {
        Self {
            bio: "Bienvenue sur mon moodboard ! Je suis créateur de contenu.".to_string(),
            status: "En ligne".to_string(),
            profile_pic: "https://images.unsplash.com/photo-1535713875002-d1d0cf377fde?auto=format&fit=crop&w=150".to_string(),
            insta_img: "https://images.unsplash.com/photo-1611162617213-7d7a39e9b1d7?auto=format&fit=crop&w=400".to_string(),
            insta_post_img: None,
            twitter_url: "https://twitter.com".to_string(),
            twitter_preview: "Cliquez pour voir mon dernier post sur X".to_string(),
            portfolio_title: "Mon Portfolio".to_string(),
            portfolio_desc: Some("Découvrez mes projets.".to_string()),
            likes: 0,
            email: None,
            links: SocialLinks::default(),
        }
    }
}

impl ContentRecord {
    /// Decode a stored document.
    pub fn from_document(doc: &Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(doc.clone()))?)
    }

    /// Encode as a store document.
    pub fn to_document(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(crate::error::MoodboardError::Store(format!(
                "content encoded to non-object: {}",
                other
            ))),
        }
    }

    /// Overwrite the fields present in `patch`, leaving the rest as-is.
    pub fn apply(&mut self, patch: &ContentPatch) {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn set_opt(target: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }

        set(&mut self.bio, &patch.bio);
        set(&mut self.status, &patch.status);
        set(&mut self.profile_pic, &patch.profile_pic);
        set(&mut self.insta_img, &patch.insta_img);
        set_opt(&mut self.insta_post_img, &patch.insta_post_img);
        set(&mut self.twitter_url, &patch.twitter_url);
        set(&mut self.twitter_preview, &patch.twitter_preview);
        set(&mut self.portfolio_title, &patch.portfolio_title);
        set_opt(&mut self.portfolio_desc, &patch.portfolio_desc);
        set_opt(&mut self.email, &patch.email);
        set(&mut self.links.instagram, &patch.instagram_link);
        set(&mut self.links.twitter, &patch.twitter_link);
        set(&mut self.links.linkedin, &patch.linkedin_link);
    }

    /// Link the twitter card points at; falls back to the profile link.
    pub fn twitter_card_url(&self) -> &str {
        if self.twitter_url.is_empty() {
            &self.links.twitter
        } else {
            &self.twitter_url
        }
    }
}

/// Pending edits from the edit panel. `None` means "leave untouched".
///
/// `likes` is not editable; saving the form never resets the counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insta_img: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insta_post_img: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio_desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_link: Option<String>,
}

impl ContentPatch {
    pub fn is_empty(&self) -> bool {
        self.to_fields().is_empty()
    }

    /// Merge `other` into `self`; fields set in `other` win.
    pub fn merge(&mut self, other: ContentPatch) {
        fn take(target: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *target = value;
            }
        }

        take(&mut self.bio, other.bio);
        take(&mut self.status, other.status);
        take(&mut self.profile_pic, other.profile_pic);
        take(&mut self.insta_img, other.insta_img);
        take(&mut self.insta_post_img, other.insta_post_img);
        take(&mut self.twitter_url, other.twitter_url);
        take(&mut self.twitter_preview, other.twitter_preview);
        take(&mut self.portfolio_title, other.portfolio_title);
        take(&mut self.portfolio_desc, other.portfolio_desc);
        take(&mut self.email, other.email);
        take(&mut self.instagram_link, other.instagram_link);
        take(&mut self.twitter_link, other.twitter_link);
        take(&mut self.linkedin_link, other.linkedin_link);
    }

    /// Field updates keyed by store field path. Link fields use dotted
    /// paths so a partial link edit leaves its siblings alone.
    pub fn to_fields(&self) -> Map<String, Value> {
        let entries = [
            ("bio", &self.bio),
            ("status", &self.status),
            ("profilePic", &self.profile_pic),
            ("instaImg", &self.insta_img),
            ("instaPostImg", &self.insta_post_img),
            ("twitterUrl", &self.twitter_url),
            ("twitterPreview", &self.twitter_preview),
            ("portfolioTitle", &self.portfolio_title),
            ("portfolioDesc", &self.portfolio_desc),
            ("email", &self.email),
            ("links.instagram", &self.instagram_link),
            ("links.twitter", &self.twitter_link),
            ("links.linkedin", &self.linkedin_link),
        ];

        entries
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|v| (key.to_string(), Value::String(v.clone())))
            })
            .collect()
    }
}
