//! # Stickers Module
//!
//! Montage pages of sticker packs, served over HTTP for the help browser.
//!
//! Discord embeds carry a single image, so every page of a pack is rendered
//! once at startup into `<pack>-<page>.png` and the help message swaps the
//! embed image URL when the page changes. [`server`] hosts those files.

pub mod server;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context as _, Result};
use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info, warn};
use url::Url;

use crate::{
    catalog::AssetCatalog,
    help::{page_range, total_pages, HelpContent, STICKERS_PER_PAGE, STICKERS_PER_ROW},
};

const TILE_SIZE: u32 = 128;
const TILE_PAD_X: u32 = 16;
const TILE_PAD_Y: u32 = 8;
const BORDER_X: u32 = 32;
const BORDER_Y: u32 = 16;
const LABEL_HEIGHT: u32 = 18;
const LABEL_SCALE: f32 = 14.0;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 0]);
const LABEL_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

pub fn page_file_name(pack: &str, page: usize) -> String {
    format!("{pack}-{page}.png")
}

/// Rendered pages of every sticker pack, as public URLs.
pub struct StickerPages {
    dir: PathBuf,
    base_url: Url,
    font: Option<Arc<FontVec>>,
    pages: RwLock<HashMap<String, Vec<String>>>,
}

impl StickerPages {
    pub fn new(dir: impl Into<PathBuf>, base_url: &str, font_path: Option<&Path>) -> Result<Self> {
        let mut base_url = Url::parse(base_url).context("invalid sticker page base URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("cannot read sticker font {}", path.display()))?;
                Some(Arc::new(
                    FontVec::try_from_vec(bytes).context("invalid sticker font")?,
                ))
            }
            None => None,
        };

        Ok(Self {
            dir: dir.into(),
            base_url,
            font,
            pages: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute URL of one rendered page.
    pub fn permalink(&self, pack: &str, page: usize) -> String {
        let file_name = urlencoding::encode(&page_file_name(pack, page)).into_owned();
        match self.base_url.join(&file_name) {
            Ok(url) => url.into(),
            Err(_) => format!("{}{}", self.base_url, file_name),
        }
    }

    /// Renders every pack of `catalog` into a freshly emptied page directory.
    ///
    /// Failures are per pack. Returns the number of pages written.
    pub async fn generate(&self, catalog: &AssetCatalog) -> Result<usize> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut written = 0;
        for pack in catalog.category_names() {
            info!(pack = %pack, "🖼️ Creating sticker pack pages");
            let stickers: Vec<PathBuf> = catalog
                .category_entries(&pack)
                .into_iter()
                .map(|(_, path)| path)
                .collect();

            let dir = self.dir.clone();
            let font = self.font.clone();
            let name = pack.clone();
            let rendered = tokio::task::spawn_blocking(move || {
                render_pack(&dir, &name, &stickers, font.as_deref())
            })
            .await;

            match rendered {
                Ok(Ok(count)) => {
                    let urls = (0..count).map(|page| self.permalink(&pack, page)).collect();
                    self.pages.write().insert(pack, urls);
                    written += count;
                }
                Ok(Err(e)) => error!(pack = %pack, error = %e, "Failed to render sticker pack"),
                Err(e) => error!(pack = %pack, error = %e, "Sticker render task failed"),
            }
        }
        Ok(written)
    }

    /// Help browser content for one pack, if its pages were rendered.
    pub fn help_content(&self, pack: &str) -> Option<HelpContent> {
        self.pages
            .read()
            .get(pack)
            .map(|pages| HelpContent::StickerPack {
                pack: pack.to_string(),
                pages: pages.clone(),
            })
    }

    pub async fn clear(&self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => info!("🧹 Removed sticker pages at {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(path = %self.dir.display(), error = %e, "Failed to remove sticker page directory"),
        }
    }
}

/// Writes all montage pages of one pack, returning how many.
fn render_pack(dir: &Path, pack: &str, stickers: &[PathBuf], font: Option<&FontVec>) -> Result<usize> {
    let pages = total_pages(stickers.len(), STICKERS_PER_PAGE);
    for page in 0..pages {
        let range = page_range(page, stickers.len(), STICKERS_PER_PAGE);
        let montage = make_montage(&stickers[range], font);
        let out = dir.join(page_file_name(pack, page));
        montage
            .save(&out)
            .with_context(|| format!("cannot write {}", out.display()))?;
    }
    Ok(pages)
}

/// Lays stickers out on a transparent grid, labelled when a font is available.
fn make_montage(stickers: &[PathBuf], font: Option<&FontVec>) -> RgbaImage {
    let label_height = if font.is_some() { LABEL_HEIGHT } else { 0 };
    let cell_w = TILE_SIZE + 2 * TILE_PAD_X;
    let cell_h = TILE_SIZE + label_height + 2 * TILE_PAD_Y;
    let rows = stickers.len().div_ceil(STICKERS_PER_ROW).max(1) as u32;
    let width = 2 * BORDER_X + STICKERS_PER_ROW as u32 * cell_w;
    let height = 2 * BORDER_Y + rows * cell_h;

    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);

    for (i, path) in stickers.iter().enumerate() {
        let col = (i % STICKERS_PER_ROW) as u32;
        let row = (i / STICKERS_PER_ROW) as u32;
        let cell_x = BORDER_X + col * cell_w + TILE_PAD_X;
        let cell_y = BORDER_Y + row * cell_h + TILE_PAD_Y;

        match image::open(path) {
            Ok(sticker) => {
                let tile = sticker
                    .resize(TILE_SIZE, TILE_SIZE, FilterType::Lanczos3)
                    .to_rgba8();
                let x = cell_x + (TILE_SIZE - tile.width()) / 2;
                let y = cell_y + (TILE_SIZE - tile.height()) / 2;
                imageops::overlay(&mut canvas, &tile, x as i64, y as i64);
            }
            Err(e) => warn!(sticker = %path.display(), error = %e, "Skipping unreadable sticker"),
        }

        if let Some(font) = font {
            let label = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let scale = PxScale::from(LABEL_SCALE);
            let (text_w, _) = imageproc::drawing::text_size(scale, font, &label);
            let x = cell_x as i32 + (TILE_SIZE as i32 - text_w as i32) / 2;
            let y = (cell_y + TILE_SIZE + 2) as i32;
            imageproc::drawing::draw_text_mut(&mut canvas, LABEL_COLOR, x, y, scale, font, &label);
        }
    }

    canvas
}
