use crate::types::SourceDigest;
use crate::utils::text::strip_pictographs;
use tracing::debug;

/// Message used when a batch found nothing new.
pub const NO_NEW_CONTENT: &str = "No new articles yet~";

/// Renders accumulated source digests into the markdown message sent to chat.
#[derive(Debug, Clone)]
pub struct DigestAssembler {
    index_url: String,
}

impl DigestAssembler {
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            index_url: index_url.into(),
        }
    }

    /// Builds the digest message.
    ///
    /// Sources are listed by descending weight. The weekly banner is only
    /// rendered on the weekly day and when a summary URL is known.
    pub fn assemble(
        &self,
        digests: &[SourceDigest],
        total_items: usize,
        is_weekly_day: bool,
        weekly_url: Option<&str>,
    ) -> String {
        if digests.is_empty() {
            return NO_NEW_CONTENT.to_string();
        }

        let mut ordered: Vec<&SourceDigest> = digests.iter().collect();
        ordered.sort_by(|a, b| b.source.weight.total_cmp(&a.source.weight));

        let mut msg = String::new();
        msg.push_str(&format!("{} new articles\n\n", total_items));

        // Banner only once the weekly summary exists
        if let (true, Some(url)) = (is_weekly_day, weekly_url.filter(|u| !u.is_empty())) {
            msg.push_str("Have a nice weekend~\n\n");
            msg.push_str(&format!("[This week's digest]({}) is ready\n\n", url));
        }

        for (index, digest) in ordered.iter().enumerate() {
            msg.push_str(&format!(
                "{}.{} | {} articles\n\n",
                index + 1,
                digest.source.title,
                digest.items.len()
            ));
            for item in &digest.items {
                msg.push_str(&format!("[{}]({})\n\n", item.title, item.link));
            }
        }

        msg.push_str(&format!(
            "Past digests are archived in the [weekly digest]({})",
            self.index_url
        ));

        debug!("Assembled digest for {} sources", ordered.len());
        strip_pictographs(&msg)
    }
}
