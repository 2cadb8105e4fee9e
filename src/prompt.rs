use markdown::{to_mdast, ParseOptions};

/// Upper bound, in characters, of page content folded into a prompt.
pub const EXCERPT_LIMIT: usize = 500;

const STYLE_DIRECTION: &str = "Shot as high-end commercial photography: studio lighting, \
sharp focus, rich natural color, shallow depth of field, clean composition, premium and \
polished brand tone, 4k detail.";

/// Flattens markdown to plain text, one space between top-level blocks.
fn plain_text(markdown_str: &str) -> String {
    let text = match to_mdast(markdown_str, &ParseOptions::default()) {
        Ok(root) => root
            .children()
            .map(|blocks| {
                blocks
                    .iter()
                    .map(|b| b.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default(),
        Err(_) => markdown_str.to_string(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn excerpt(content: &str) -> String {
    plain_text(content).chars().take(EXCERPT_LIMIT).collect()
}

/// Builds an image prompt from raw page signal.
///
/// The title becomes the text rendered in the image, the description is used
/// as brand context and at most [`EXCERPT_LIMIT`] characters of the page body
/// are appended. Returns `None` when there is neither a title nor a
/// description to anchor the image on.
pub fn synthesize(title: &str, description: &str, content: &str) -> Option<String> {
    let title = title.trim();
    let description = description.trim();
    if title.is_empty() && description.is_empty() {
        return None;
    }

    let mut prompt = if title.is_empty() {
        String::from("A premium marketing image for a brand.")
    } else {
        format!(
            "A premium marketing image for \"{}\", with the text \"{}\" rendered clearly and legibly as the headline.",
            title, title
        )
    };
    if !description.is_empty() {
        prompt.push_str(&format!(" Brand context: {}", description));
        if !description.ends_with('.') {
            prompt.push('.');
        }
    }
    let excerpt = excerpt(content);
    if !excerpt.is_empty() {
        prompt.push_str(&format!(" Themes from the website: {}", excerpt));
        if !excerpt.ends_with('.') {
            prompt.push('.');
        }
    }
    prompt.push(' ');
    prompt.push_str(STYLE_DIRECTION);
    Some(prompt)
}
