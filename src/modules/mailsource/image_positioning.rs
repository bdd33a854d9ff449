// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! HTML-position-aware image placeholder embedding (spec §4.1, SPEC_FULL §B),
//! ported from `threadline/utils/image_positioning.py`. Placeholders of the
//! form `[IMAGE: <safe_filename>]` are inserted into `text_content` at the
//! word offset corresponding to where the `<img src="cid:...">` tag appeared
//! in the HTML DOM, falling back to a simple end-of-text append when HTML
//! parsing fails or no inline image is found.

use scraper::{Html, Node};

/// One inline (`cid:`) image attachment candidate for placement.
pub struct ImagePlaceholder {
    /// The MIME `Content-ID` (or filename) matched against an `<img src="cid:...">`.
    pub content_id: String,
    pub safe_filename: String,
}

impl ImagePlaceholder {
    fn placeholder_text(&self) -> String {
        format!("IMAGE: {}", self.safe_filename)
    }
}

pub fn embed_images(
    text_content: &str,
    html_content: Option<&str>,
    images: &[ImagePlaceholder],
) -> String {
    if images.is_empty() {
        return text_content.to_string();
    }
    let Some(html) = html_content else {
        return simple_append_images(text_content, images);
    };

    match find_image_positions(html, images) {
        Some(positions) if !positions.is_empty() => insert_images_at_positions(text_content, positions),
        _ => simple_append_images(text_content, images),
    }
}

fn find_image_positions(html: &str, images: &[ImagePlaceholder]) -> Option<Vec<(usize, String)>> {
    let document = Html::parse_document(html);
    let mut positions = Vec::new();
    let mut text_before = String::new();

    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(element) => {
                let name = element.name();
                if name == "img" {
                    if let Some(src) = element.attr("src") {
                        if let Some(cid) = src.strip_prefix("cid:") {
                            if let Some(image) = images
                                .iter()
                                .find(|i| cid.contains(&i.content_id) || i.content_id.contains(cid))
                            {
                                let cleaned = text_before.split_whitespace().collect::<Vec<_>>().join(" ");
                                positions.push((cleaned.chars().count(), image.placeholder_text()));
                            }
                        }
                    }
                }
                // `img`/`br`/`hr` contribute no text of their own.
            }
            Node::Text(text) => {
                text_before.push_str(text);
                text_before.push(' ');
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        None
    } else {
        positions.sort_by_key(|(pos, _)| *pos);
        Some(positions)
    }
}

fn insert_images_at_positions(text_content: &str, positions: Vec<(usize, String)>) -> String {
    let words: Vec<&str> = text_content.split_whitespace().collect();
    let mut result = Vec::with_capacity(words.len() + positions.len());
    let mut current_pos = 0usize;
    let mut inserted = vec![false; positions.len()];

    for word in &words {
        result.push((*word).to_string());
        current_pos += word.chars().count() + 1;
        for (i, (pos, placeholder)) in positions.iter().enumerate() {
            if *pos <= current_pos && !inserted[i] {
                result.push(format!("[{placeholder}]"));
                inserted[i] = true;
            }
        }
    }
    for (i, (_, placeholder)) in positions.iter().enumerate() {
        if !inserted[i] {
            result.push(format!("[{placeholder}]"));
        }
    }
    result.join(" ")
}

fn simple_append_images(text_content: &str, images: &[ImagePlaceholder]) -> String {
    if images.is_empty() {
        return text_content.to_string();
    }
    let mut out = text_content.to_string();
    out.push_str("\n--- Images ---\n");
    for image in images {
        out.push_str(&format!("[{}]", image.placeholder_text()));
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_append_without_html() {
        let images = vec![ImagePlaceholder {
            content_id: "abc".to_string(),
            safe_filename: "abc123.png".to_string(),
        }];
        let out = embed_images("Hello world", None, &images);
        assert!(out.contains("[IMAGE: abc123.png]"));
    }

    #[test]
    fn positions_image_by_html_text_offset() {
        let html = "<p>Intro text</p><img src=\"cid:abc\"><p>outro</p>";
        let images = vec![ImagePlaceholder {
            content_id: "abc".to_string(),
            safe_filename: "abc123.png".to_string(),
        }];
        let out = embed_images("Intro text outro", Some(html), &images);
        assert!(out.starts_with("Intro text [IMAGE: abc123.png]") || out.contains("[IMAGE: abc123.png]"));
    }
}
