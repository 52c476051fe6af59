//! Channel routing and announcement styling.
//!
//! Rules are tried in priority order (UHD, TRANS, HD); the first category
//! substring hit selects both the destination channel and the colour pair.
//! Unknown categories fall back to the special channel for special releases
//! and to the HD channel otherwise.

use nzbrelay_grammar::codes::{BOLD, Color, NORMAL};
use nzbrelay_grammar::is_special;
use nzbrelay_shared::{Category, ChannelsConfig, RelayError, Result};

// ---------------------------------------------------------------------------
// Style
// ---------------------------------------------------------------------------

/// Colour pair used for the name segment and the link segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub name: Color,
    pub link: Color,
}

impl Style {
    pub const UHD: Style = Style {
        name: Color::Pink,
        link: Color::Green,
    };
    pub const TRANS: Style = Style {
        name: Color::LightCyan,
        link: Color::Orange,
    };
    pub const HD: Style = Style {
        name: Color::Red,
        link: Color::Yellow,
    };

    /// `<name> => <link>`, each segment bold and coloured.
    pub fn render(&self, name: &str, link: &str) -> String {
        format!(
            "{BOLD}{}{name}{NORMAL} => {BOLD}{}{link}{NORMAL}{BOLD}",
            self.name.fg(),
            self.link.fg()
        )
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// A resolved destination and the styled text to send there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub channel: String,
    pub message: String,
}

#[derive(Debug, Clone)]
struct RouteRule {
    category: Category,
    channel: String,
    style: Style,
}

/// Maps a category label to a channel and style.
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<RouteRule>,
    special_channel: String,
    default_channel: String,
}

impl Router {
    /// Build the rule table from the `[channels]` section.
    pub fn new(channels: &ChannelsConfig) -> Self {
        let rules = Category::PRIORITY
            .into_iter()
            .map(|category| {
                let (channel, style) = match category {
                    Category::UhdClips => (&channels.uhd, Style::UHD),
                    Category::Trans => (&channels.trans, Style::TRANS),
                    Category::HdClips => (&channels.hd, Style::HD),
                };
                RouteRule {
                    category,
                    channel: channel.trim().to_string(),
                    style,
                }
            })
            .collect();

        Self {
            rules,
            special_channel: channels.special.trim().to_string(),
            default_channel: channels.hd.trim().to_string(),
        }
    }

    /// Resolve the destination for `release_name` announced under `category`.
    ///
    /// Fails only when the resolved channel is blank.
    pub fn route(&self, category: &str, release_name: &str, link: &str) -> Result<Route> {
        let upper = category.to_uppercase();
        let hit = self
            .rules
            .iter()
            .find(|rule| upper.contains(rule.category.label()));

        let (channel, style) = match hit {
            Some(rule) => (rule.channel.as_str(), rule.style),
            None if is_special(release_name) => (self.special_channel.as_str(), Style::HD),
            None => (self.default_channel.as_str(), Style::HD),
        };

        if channel.is_empty() {
            return Err(RelayError::Routing(format!(
                "no channel configured for category '{category}' ({release_name})"
            )));
        }

        Ok(Route {
            channel: channel.to_string(),
            message: style.render(release_name, link),
        })
    }
}
