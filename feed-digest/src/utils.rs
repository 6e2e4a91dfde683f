/// Text processing utilities
pub mod text {
    /// Remove emoji and other pictographs the chat channel cannot render.
    pub fn strip_pictographs(text: &str) -> String {
        text.chars().filter(|c| !is_pictograph(*c)).collect()
    }

    fn is_pictograph(c: char) -> bool {
        matches!(
            c as u32,
            0x1F000..=0x1FAFF   // mahjong, cards, emoticons, pictographs, transport, flags
                | 0x2600..=0x27BF   // misc symbols, dingbats
                | 0x231A..=0x231B
                | 0x23E9..=0x23FA
                | 0x2B50
                | 0x2B55
                | 0x200D            // zero width joiner
                | 0x20E3            // combining keycap
                | 0xFE0E..=0xFE0F   // variation selectors
                | 0xE0020..=0xE007F // tag sequences
        )
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Only plain http(s) feeds are fetched.
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => (url.scheme() == "http" || url.scheme() == "https") && url.has_host(),
            Err(_) => false,
        }
    }
}

/// Calendar utilities
pub mod time {
    use chrono::{Days, NaiveDate};

    /// Title for a weekly summary, e.g. `2026-10-09 ~ 2026-10-16`.
    pub fn week_range_title(today: NaiveDate) -> String {
        let week_ago = today.checked_sub_days(Days::new(7)).unwrap_or(today);
        format!("{} ~ {}", week_ago.format("%Y-%m-%d"), today.format("%Y-%m-%d"))
    }
}
