//! Contact details extracted from a page.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Social platforms we look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialPlatform {
    Linkedin,
    Twitter,
    Facebook,
    Youtube,
    Instagram,
    Tiktok,
}

impl SocialPlatform {
    pub const ALL: [SocialPlatform; 6] = [
        SocialPlatform::Linkedin,
        SocialPlatform::Twitter,
        SocialPlatform::Facebook,
        SocialPlatform::Youtube,
        SocialPlatform::Instagram,
        SocialPlatform::Tiktok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::Linkedin => "linkedin",
            SocialPlatform::Twitter => "twitter",
            SocialPlatform::Facebook => "facebook",
            SocialPlatform::Youtube => "youtube",
            SocialPlatform::Instagram => "instagram",
            SocialPlatform::Tiktok => "tiktok",
        }
    }

    /// Domain substrings that identify a profile link on this platform.
    pub fn domains(&self) -> &'static [&'static str] {
        match self {
            SocialPlatform::Linkedin => &["linkedin.com"],
            SocialPlatform::Twitter => &["twitter.com", "x.com"],
            SocialPlatform::Facebook => &["facebook.com"],
            SocialPlatform::Youtube => &["youtube.com", "youtu.be"],
            SocialPlatform::Instagram => &["instagram.com"],
            SocialPlatform::Tiktok => &["tiktok.com"],
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One optional URL per known platform.
///
/// A struct rather than a map so that all six keys are always present,
/// serialized as `null` when nothing was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
    pub facebook: Option<String>,
    pub youtube: Option<String>,
    pub instagram: Option<String>,
    pub tiktok: Option<String>,
}

impl SocialLinks {
    pub fn get(&self, platform: SocialPlatform) -> Option<&str> {
        self.slot(platform).as_deref()
    }

    pub fn set(&mut self, platform: SocialPlatform, url: impl Into<String>) {
        *self.slot_mut(platform) = Some(url.into());
    }

    /// All six platforms, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (SocialPlatform, Option<&str>)> + '_ {
        SocialPlatform::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    pub fn found(&self) -> usize {
        self.iter().filter(|(_, url)| url.is_some()).count()
    }

    fn slot(&self, platform: SocialPlatform) -> &Option<String> {
        match platform {
            SocialPlatform::Linkedin => &self.linkedin,
            SocialPlatform::Twitter => &self.twitter,
            SocialPlatform::Facebook => &self.facebook,
            SocialPlatform::Youtube => &self.youtube,
            SocialPlatform::Instagram => &self.instagram,
            SocialPlatform::Tiktok => &self.tiktok,
        }
    }

    fn slot_mut(&mut self, platform: SocialPlatform) -> &mut Option<String> {
        match platform {
            SocialPlatform::Linkedin => &mut self.linkedin,
            SocialPlatform::Twitter => &mut self.twitter,
            SocialPlatform::Facebook => &mut self.facebook,
            SocialPlatform::Youtube => &mut self.youtube,
            SocialPlatform::Instagram => &mut self.instagram,
            SocialPlatform::Tiktok => &mut self.tiktok,
        }
    }
}

/// Contact details found on a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Lowercased, deduplicated, sorted
    pub emails: BTreeSet<String>,

    /// E.164, first-seen order, deduplicated
    pub phones: Vec<String>,

    pub social: SocialLinks,

    pub address: Option<String>,
}

impl ContactRecord {
    /// First email in sorted order.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.iter().next().map(String::as_str)
    }

    /// First phone found on the page.
    pub fn primary_phone(&self) -> Option<&str> {
        self.phones.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
            && self.phones.is_empty()
            && self.social.found() == 0
            && self.address.is_none()
    }
}
