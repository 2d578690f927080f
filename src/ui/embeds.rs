use serenity::builder::{CreateEmbed, CreateEmbedFooter};

use crate::help::RenderedPage;

/// Colour palette for bot embeds
pub mod colors {
    use serenity::all::Colour;

    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const STICKER_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Builds the embed for one help page.
pub fn help_page_embed(page: &RenderedPage) -> CreateEmbed {
    let color = if page.image_url.is_some() {
        colors::STICKER_PURPLE
    } else {
        colors::INFO_BLUE
    };

    let mut embed = CreateEmbed::new()
        .title(&page.title)
        .color(color)
        .footer(CreateEmbedFooter::new(&page.footer));

    if let Some(description) = &page.description {
        embed = embed.description(description);
    }

    // Discord embeds hold one image, so sticker pages are linked by URL
    if let Some(url) = &page.image_url {
        embed = embed.image(url);
    }

    embed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_page_embed_carries_page_fields() {
        let embed = help_page_embed(&RenderedPage {
            title: "greetings".to_string(),
            description: Some("bell\nchime\nhorn\n".to_string()),
            image_url: None,
            footer: "Page 1/1".to_string(),
        });
        let rendered = format!("{embed:?}");

        assert!(rendered.contains("greetings"));
        assert!(rendered.contains("Page 1/1"));
    }

    #[test]
    fn test_sticker_page_embed_links_image() {
        let embed = help_page_embed(&RenderedPage {
            title: "cats".to_string(),
            description: None,
            image_url: Some("http://localhost:8080/cats-0.png".to_string()),
            footer: "Page 1/2".to_string(),
        });

        assert!(format!("{embed:?}").contains("http://localhost:8080/cats-0.png"));
    }
}
