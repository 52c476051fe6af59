//! Announcement grammar for nzbrelay.
//!
//! Everything that turns a raw chat line into a decision lives here, so that
//! grammar changes stay local and can be tested in isolation:
//! - [`codes`]: formatting control codes and the colour palette
//! - [`normalize`]: strips formatting from raw text
//! - [`AnnouncementParser`]: bracket-group grammar + validation
//! - [`classify`]: special-marker / keyword decision

pub mod classifier;
pub mod codes;
pub mod normalize;
mod parser;

pub use classifier::{CLIP_MARKER, SPECIAL_MARKER, Verdict, classify, is_clip, is_special, verdict};
pub use normalize::{normalize, normalize_opt};
pub use parser::{AnnouncementParser, RecentYears};

#[cfg(test)]
mod tests {
    use super::*;
    use nzbrelay_shared::KeywordSet;

    #[test]
    fn formatted_line_flows_through_grammar() {
        let raw = "\x02\x0304[XXX: UHD-CLIPS]\x0f \x0308[Studio.24.03.01.Scene.2160p]\x0f [Studio.Scene.Clip.2160p] [ 2.1 GB ] [99]";
        let clean = normalize(raw);
        let parsed = AnnouncementParser::default()
            .parse(&clean)
            .expect("grammar should match");
        assert_eq!(parsed.release_name, "Studio.Scene.Clip.2160p");
        assert_eq!(verdict(&parsed, &KeywordSet::default()), Some(Verdict::Clip));
    }
}
