use anyhow::Result;
use log::debug;
use regex_lite::Regex;

/// One `tv-box` block: the channel header text plus its listing rows as
/// (time text, title text) pairs, in page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChannelSection {
    pub(crate) name: String,
    pub(crate) rows: Vec<(String, String)>,
}

const BLOCK_OPEN: &str = "<div class=\"tv-box\"";

/// Pulls the per-channel listing sections out of a day page. Blocks without
/// a header are ignored; a header with no recognizable rows still yields an
/// (empty) section. A page with no blocks yields an empty list, which the
/// caller reports as an empty day.
pub(crate) fn channel_sections(html: &str) -> Result<Vec<ChannelSection>> {
    let header = Regex::new("(?s)<div class=\"tv-header\"[^>]*>.*?<h1[^>]*>(.*?)</h1>")?;
    let row =
        Regex::new("(?s)<li class=\"addBookmark tv-(?:passed|active|future)[^\"]*\"[^>]*>(.*?)</li>")?;
    let time = Regex::new("(?s)<div class=\"time\"[^>]*>(.*?)</div>")?;
    let program = Regex::new("(?s)<div class=\"program\"[^>]*>(.*?)</div>")?;

    // regex-lite has no lookahead, so blocks are sliced positionally
    let starts: Vec<usize> = html.match_indices(BLOCK_OPEN).map(|(i, _)| i).collect();
    let mut sections = Vec::new();
    for (b, &begin) in starts.iter().enumerate() {
        let end = starts.get(b + 1).copied().unwrap_or(html.len());
        let block = &html[begin..end];
        let Some(name) = header.captures(block).map(|c| plain_text(&c[1])) else {
            continue;
        };
        let mut rows = Vec::new();
        for item in row.captures_iter(block) {
            let li = &item[1];
            // a row missing either region never was a listing candidate
            let (Some(t), Some(p)) = (time.captures(li), program.captures(li)) else {
                continue;
            };
            rows.push((plain_text(&t[1]), plain_text(&p[1])));
        }
        debug!("section {:?}: {} row(s)", name, rows.len());
        sections.push(ChannelSection { name, rows });
    }
    Ok(sections)
}

/// Drops markup from an extracted fragment: strips tags, decodes the handful
/// of entities the site uses, trims. Inner whitespace is preserved.
fn plain_text(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
