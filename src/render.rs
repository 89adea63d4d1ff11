//! HTML preview of a persisted gallery.
//!
//! Renders one self-contained page: the main photo large, the rest as a
//! numbered thumbnail strip in display order. Used by the `preview` command
//! to check what a published listing looks like without the marketplace UI.
//!
//! Uses [maud](https://maud.lambda.xyz/) for compile-time HTML templating,
//! so URLs and listing ids are escaped automatically.

use crate::storage::GalleryRow;
use maud::{DOCTYPE, Markup, html};
use std::path::Path;

const CSS: &str = "\
body{font-family:system-ui,sans-serif;margin:0;padding:1.5rem;background:#f5f5f4;color:#1c1917}\
.main-photo{position:relative;max-width:960px}\
.main-photo img{width:100%;height:auto;border-radius:6px}\
.badge{position:absolute;top:.75rem;left:.75rem;background:#1c1917;color:#fff;padding:.2rem .6rem;border-radius:4px;font-size:.8rem}\
.thumbs{display:flex;flex-wrap:wrap;gap:.5rem;list-style:none;padding:0;margin-top:1rem}\
.thumbs img{width:160px;height:120px;object-fit:cover;border-radius:4px}\
.order{display:block;font-size:.75rem;color:#57534e}\
.empty{color:#57534e}";

fn base_document(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (CSS) }
            }
            body {
                (content)
            }
        }
    }
}

/// Render the page for `rows`, which must already be in display order.
pub fn render_gallery_page(listing_id: &str, rows: &[GalleryRow]) -> Markup {
    let title = format!("Listing {listing_id}");
    let content = html! {
        h1 { (title) }
        @match rows.split_first() {
            Some((main, rest)) => {
                figure.main-photo {
                    img src=(main.url) alt="Main photo";
                    span.badge { "Main photo" }
                }
                @if !rest.is_empty() {
                    ol.thumbs {
                        @for row in rest {
                            li {
                                img src=(row.url) alt={ "Photo " (row.display_order + 1) } loading="lazy";
                                span.order { (row.display_order + 1) }
                            }
                        }
                    }
                }
            }
            None => {
                p.empty { "This listing has no photos yet." }
            }
        }
    };
    base_document(&title, content)
}

pub fn write_gallery_page(out: &Path, listing_id: &str, rows: &[GalleryRow]) -> std::io::Result<()> {
    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, render_gallery_page(listing_id, rows).into_string())
}
