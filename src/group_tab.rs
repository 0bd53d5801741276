//! Synthetic group tab URLs.
//!
//! A group tab is an ordinary host tab whose URL carries its title, whether
//! the engine may discard it, and the persistent id of the pinned tab it
//! groups children for: `about:treestyletab-group?title=…&temporary=true&openerTabId=…`.

use crate::tab::PersistentId;
use url::{Position, Url};

const TITLE_PARAM: &str = "title";
const TEMPORARY_PARAM: &str = "temporary";
const OPENER_PARAM: &str = "openerTabId";

/// Title for a group whose first member has no title yet
pub const DEFAULT_GROUP_TITLE: &str = "Group";

/// Title of a group named after its first member
pub fn group_label(first_title: &str) -> String {
    let title = first_title.trim();
    if title.is_empty() {
        DEFAULT_GROUP_TITLE.to_string()
    } else {
        format!("{title} and more")
    }
}

/// Title of a group collecting tabs opened from a pinned tab
pub fn pinned_group_label(opener_title: &str) -> String {
    format!("Tabs from {}", opener_title.trim())
}

/// Decoded group tab URL parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTabUrl {
    pub title: String,
    /// Created by the engine; closed automatically when it runs out of children
    pub temporary: bool,
    /// Pinned tab whose children this group collects
    pub opener: Option<PersistentId>,
}

impl GroupTabUrl {
    pub fn temporary(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            temporary: true,
            opener: None,
        }
    }

    pub fn for_opener(title: impl Into<String>, opener: PersistentId) -> Self {
        Self {
            opener: Some(opener),
            ..Self::temporary(title)
        }
    }

    /// Build the URL under `prefix`. Falls back to a plain query string when
    /// the prefix is not a parseable URL.
    pub fn build(&self, prefix: &str) -> String {
        let mut params: Vec<(&str, String)> = vec![
            (TITLE_PARAM, self.title.clone()),
            (TEMPORARY_PARAM, self.temporary.to_string()),
        ];
        if let Some(opener) = self.opener {
            params.push((OPENER_PARAM, opener.to_string()));
        }
        match Url::parse_with_params(prefix, &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                log::warn!("Group tab prefix {:?} is not a URL: {}", prefix, e);
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
                    .finish();
                format!("{prefix}?{query}")
            }
        }
    }

    /// Decode a tab URL; `None` unless it points at the group page under `prefix`.
    pub fn parse(prefix: &str, url: &str) -> Option<Self> {
        let base = Url::parse(prefix).ok()?;
        let parsed = Url::parse(url).ok()?;
        if parsed[..Position::AfterPath] != base[..Position::AfterPath] {
            return None;
        }

        let mut group = GroupTabUrl {
            title: String::new(),
            temporary: false,
            opener: None,
        };
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                TITLE_PARAM => group.title = value.into_owned(),
                TEMPORARY_PARAM => group.temporary = value == "true",
                OPENER_PARAM => group.opener = value.parse().ok(),
                _ => {}
            }
        }
        Some(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const PREFIX: &str = "about:treestyletab-group";

    #[test]
    fn test_build_then_parse() {
        let opener = Uuid::new_v4();
        let group = GroupTabUrl::for_opener("News & more", opener);
        let url = group.build(PREFIX);
        assert!(url.starts_with(PREFIX));
        assert_eq!(GroupTabUrl::parse(PREFIX, &url), Some(group));
    }

    #[test]
    fn test_parse_rejects_other_pages() {
        assert_eq!(GroupTabUrl::parse(PREFIX, "https://example.com/?title=x"), None);
        assert_eq!(GroupTabUrl::parse(PREFIX, "about:newtab"), None);
        assert_eq!(GroupTabUrl::parse(PREFIX, "not a url"), None);
    }

    #[test]
    fn test_parse_defaults_to_permanent() {
        let group = GroupTabUrl::parse(PREFIX, "about:treestyletab-group?title=Work").unwrap();
        assert_eq!(group.title, "Work");
        assert!(!group.temporary);
        assert_eq!(group.opener, None);
    }
}
