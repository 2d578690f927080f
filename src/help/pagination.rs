/// Entries per page of a text listing.
pub const STRINGS_PER_PAGE: usize = 10;

pub const STICKERS_PER_ROW: usize = 4;
pub const STICKER_ROWS_PER_PAGE: usize = 6;
/// Tiles per sticker montage page.
pub const STICKERS_PER_PAGE: usize = STICKERS_PER_ROW * STICKER_ROWS_PER_PAGE;

pub const PREVIOUS_PAGE_EMOJI: &str = "⬅️";
pub const NEXT_PAGE_EMOJI: &str = "➡️";
pub const PAGINATION_REACTIONS: [&str; 2] = [PREVIOUS_PAGE_EMOJI, NEXT_PAGE_EMOJI];

/// `ceil(total / per_page)`
pub fn total_pages(total: usize, per_page: usize) -> usize {
    total.div_ceil(per_page)
}

/// Half-open item range shown on `page`.
pub fn page_range(page: usize, total: usize, per_page: usize) -> std::ops::Range<usize> {
    let start = (page * per_page).min(total);
    let end = ((page + 1) * per_page).min(total);
    start..end
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Previous,
    Next,
}

impl Navigation {
    pub fn from_emoji(emoji: &str) -> Option<Self> {
        match emoji {
            PREVIOUS_PAGE_EMOJI => Some(Self::Previous),
            NEXT_PAGE_EMOJI => Some(Self::Next),
            _ => None,
        }
    }
}

/// What a help message is browsing.
#[derive(Debug, Clone, PartialEq)]
pub enum HelpContent {
    /// Sorted text entries: category names or the assets of one category.
    Listing { title: String, items: Vec<String> },
    /// Pre-rendered montage pages of one sticker pack, as absolute URLs.
    StickerPack { pack: String, pages: Vec<String> },
}

impl HelpContent {
    pub fn listing(title: impl Into<String>, mut items: Vec<String>) -> Self {
        items.sort();
        Self::Listing {
            title: title.into(),
            items,
        }
    }

    fn page_count(&self) -> usize {
        match self {
            Self::Listing { items, .. } => total_pages(items.len(), STRINGS_PER_PAGE),
            Self::StickerPack { pages, .. } => pages.len(),
        }
    }
}

/// One rendered page, independent of the chat library.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub footer: String,
}

/// Paginated browsing state bound to one help message.
///
/// `page < total_pages` holds after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct HelpSession {
    content: HelpContent,
    page: usize,
    total_pages: usize,
}

impl HelpSession {
    /// Starts on the first page. Empty content still gets one (empty) page.
    pub fn new(content: HelpContent) -> Self {
        let total_pages = content.page_count().max(1);
        Self {
            content,
            page: 0,
            total_pages,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Moves one page; out-of-range moves are rejected and change nothing.
    pub fn navigate(&mut self, navigation: Navigation) -> bool {
        let candidate = match navigation {
            Navigation::Previous => self.page.checked_sub(1),
            Navigation::Next => Some(self.page + 1),
        };

        match candidate {
            Some(page) if page < self.total_pages => {
                self.page = page;
                true
            }
            _ => false,
        }
    }

    pub fn render(&self) -> RenderedPage {
        let footer = format!("Page {}/{}", self.page + 1, self.total_pages);

        match &self.content {
            HelpContent::Listing { title, items } => {
                let range = page_range(self.page, items.len(), STRINGS_PER_PAGE);
                let description = items[range].iter().fold(String::new(), |mut acc, item| {
                    acc.push_str(item);
                    acc.push('\n');
                    acc
                });
                RenderedPage {
                    title: title.clone(),
                    description: Some(description),
                    image_url: None,
                    footer,
                }
            }
            HelpContent::StickerPack { pack, pages } => RenderedPage {
                title: pack.clone(),
                description: None,
                image_url: pages.get(self.page).cloned(),
                footer,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("sound{i:03}")).collect()
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(48, STICKERS_PER_PAGE), 2);
        assert_eq!(total_pages(49, STICKERS_PER_PAGE), 3);
    }

    #[test]
    fn test_pages_partition_the_sorted_items() {
        for n in [1, 9, 10, 11, 25, 30] {
            let pages = total_pages(n, STRINGS_PER_PAGE);
            let mut seen = Vec::new();
            for page in 0..pages {
                let range = page_range(page, n, STRINGS_PER_PAGE);
                assert_eq!(range.len(), STRINGS_PER_PAGE.min(n - page * STRINGS_PER_PAGE));
                seen.extend(range);
            }
            assert_eq!(seen, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_rendered_pages_cover_every_item_once() {
        let items = names(23);
        let mut session = HelpSession::new(HelpContent::listing("big", items.clone()));
        let mut seen = HashSet::new();
        loop {
            let page = session.render();
            for line in page.description.unwrap().lines() {
                assert!(seen.insert(line.to_string()), "{line} rendered twice");
            }
            if !session.navigate(Navigation::Next) {
                break;
            }
        }
        assert_eq!(seen, items.into_iter().collect::<HashSet<_>>());
    }

    #[test]
    fn test_greetings_single_page() {
        let session = HelpSession::new(HelpContent::listing(
            "greetings",
            vec!["horn".to_string(), "bell".to_string(), "chime".to_string()],
        ));

        assert_eq!(
            session.render(),
            RenderedPage {
                title: "greetings".to_string(),
                description: Some("bell\nchime\nhorn\n".to_string()),
                image_url: None,
                footer: "Page 1/1".to_string(),
            }
        );
    }

    #[test]
    fn test_boundaries_reject_transitions() {
        let mut session = HelpSession::new(HelpContent::listing("big", names(25)));
        assert_eq!(session.total_pages(), 3);

        assert!(!session.navigate(Navigation::Previous));
        assert_eq!(session.page(), 0);

        assert!(session.navigate(Navigation::Next));
        assert!(session.navigate(Navigation::Next));
        assert!(!session.navigate(Navigation::Next));
        assert_eq!(session.page(), 2);
        assert_eq!(session.render().footer, "Page 3/3");
        assert_eq!(
            session.render().description.unwrap(),
            "sound020\nsound021\nsound022\nsound023\nsound024\n"
        );

        assert!(session.navigate(Navigation::Previous));
        assert_eq!(session.page(), 1);
    }

    #[test]
    fn test_empty_listing_has_one_empty_page() {
        let mut session = HelpSession::new(HelpContent::listing("empty", Vec::new()));
        assert_eq!(session.total_pages(), 1);
        assert!(!session.navigate(Navigation::Next));
        assert_eq!(session.render().description.unwrap(), "");
        assert_eq!(session.render().footer, "Page 1/1");
    }

    #[test]
    fn test_sticker_pack_renders_page_url() {
        let mut session = HelpSession::new(HelpContent::StickerPack {
            pack: "cats".to_string(),
            pages: vec![
                "http://localhost:8080/cats-0.png".to_string(),
                "http://localhost:8080/cats-1.png".to_string(),
            ],
        });
        assert!(session.navigate(Navigation::Next));

        let page = session.render();
        assert_eq!(page.title, "cats");
        assert_eq!(page.description, None);
        assert_eq!(page.image_url.as_deref(), Some("http://localhost:8080/cats-1.png"));
        assert_eq!(page.footer, "Page 2/2");
    }

    #[test]
    fn test_navigation_from_emoji() {
        assert_eq!(Navigation::from_emoji("⬅️"), Some(Navigation::Previous));
        assert_eq!(Navigation::from_emoji("➡️"), Some(Navigation::Next));
        assert_eq!(Navigation::from_emoji("👍"), None);
    }
}
