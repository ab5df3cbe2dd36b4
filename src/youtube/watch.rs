use crate::model::{ChannelId, VideoRecord, MAX_RECOMMENDATIONS};
use chrono::Utc;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static RELATED_ITEM: Lazy<Selector> = Lazy::new(|| selector("li.related-list-item"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static TITLE_META: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="title"]"#));
static TITLE_LEGACY: Lazy<Selector> = Lazy::new(|| selector("#eow-title"));
static VIEW_COUNT: Lazy<Selector> = Lazy::new(|| selector("div.watch-view-count"));
static INTERACTION_COUNT: Lazy<Selector> =
    Lazy::new(|| selector(r#"meta[itemprop="interactionCount"]"#));
static LIKE_BUTTON: Lazy<Selector> =
    Lazy::new(|| selector("button.like-button-renderer-like-button"));
static DATE_PUBLISHED: Lazy<Selector> =
    Lazy::new(|| selector(r#"meta[itemprop="datePublished"]"#));
static DURATION: Lazy<Selector> = Lazy::new(|| selector(r#"meta[itemprop="duration"]"#));
static CHANNEL_ID_META: Lazy<Selector> = Lazy::new(|| selector(r#"meta[itemprop="channelId"]"#));
static CHANNEL_LINK: Lazy<Selector> = Lazy::new(|| selector("a.yt-uix-sessionlink[href]"));
static AUTHOR_NAME: Lazy<Selector> =
    Lazy::new(|| selector(r#"span[itemprop="author"] link[itemprop="name"]"#));

// Recommendations embedded in the page's ytInitialData when the related list
// is rendered client-side.
static COMPACT_VIDEO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""compactVideoRenderer":\{"videoId":"([\w-]{11})""#).unwrap());
static LOCKUP_VIDEO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""contentId":"([\w-]{11})","contentType":"LOCKUP_CONTENT_TYPE_VIDEO""#).unwrap()
});
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d,]+").unwrap());
static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?T?(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").unwrap()
});

/// What a watch page shows about a video and what it recommends next.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchPage {
    pub video_id: String,
    pub title: Option<String>,
    pub channel_id: Option<ChannelId>,
    pub channel_title: Option<String>,
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub published_at: Option<String>,
    pub duration_seconds: Option<u64>,
    /// Recommended video ids in displayed order, without repeats.
    pub recommendations: Vec<String>,
}

impl WatchPage {
    /// Fills the gaps of an API record with what the page showed.
    pub fn merge_into(&self, record: &mut VideoRecord) {
        record.title = record.title.take().or_else(|| self.title.clone());
        record.channel_id = record.channel_id.take().or_else(|| self.channel_id.clone());
        record.channel_title = record
            .channel_title
            .take()
            .or_else(|| self.channel_title.clone());
        record.views = record.views.or(self.views);
        record.likes = record.likes.or(self.likes);
        record.published_at = record
            .published_at
            .take()
            .or_else(|| self.published_at.clone());
        record.duration_seconds = record.duration_seconds.or(self.duration_seconds);
    }

    pub fn to_record(&self) -> VideoRecord {
        let mut record = VideoRecord::new(self.video_id.clone());
        self.merge_into(&mut record);
        record.fetched_at = Utc::now();
        record
    }
}

pub fn watch_url(base: &Url, video_id: &str) -> Option<Url> {
    let mut url = base.join("/watch").ok()?;
    url.query_pairs_mut().append_pair("v", video_id);
    Some(url)
}

/// Parses a watch page. Missing pieces stay `None`; nothing here fails.
pub fn parse_watch_page(video_id: &str, base: &Url, text: &str) -> WatchPage {
    let html = Html::parse_document(text);

    let title = meta_content(&html, &TITLE_META).or_else(|| {
        html.select(&TITLE_LEGACY)
            .next()
            .map(|e| element_text(&e))
            .filter(|t| !t.is_empty())
    });
    if title.is_none() {
        warn!("    Title not found on watch page of {video_id}");
    }

    let views = html
        .select(&VIEW_COUNT)
        .find_map(|e| clean_count(&element_text(&e)))
        .or_else(|| meta_content(&html, &INTERACTION_COUNT).and_then(|c| clean_count(&c)));
    let likes = html
        .select(&LIKE_BUTTON)
        .find_map(|e| clean_count(&element_text(&e)));
    let published_at = meta_content(&html, &DATE_PUBLISHED);
    let duration_seconds =
        meta_content(&html, &DURATION).and_then(|d| parse_iso_duration(&d));

    let channel_id = meta_content(&html, &CHANNEL_ID_META)
        .map(ChannelId::new)
        .or_else(|| {
            html.select(&CHANNEL_LINK)
                .filter_map(|a| a.value().attr("href"))
                .find_map(|href| channel_from_href(base, href))
        });
    let channel_title = html
        .select(&AUTHOR_NAME)
        .find_map(|e| e.value().attr("content").map(str::to_owned));

    let mut recommendations = related_list(&html, base);
    if recommendations.is_empty() {
        recommendations = initial_data_recommendations(text);
    }
    let mut seen = HashSet::new();
    recommendations.retain(|id| id != video_id && seen.insert(id.clone()));
    recommendations.truncate(MAX_RECOMMENDATIONS);

    WatchPage {
        video_id: video_id.to_owned(),
        title,
        channel_id,
        channel_title,
        views,
        likes,
        published_at,
        duration_seconds,
        recommendations,
    }
}

fn related_list(html: &Html, base: &Url) -> Vec<String> {
    html.select(&RELATED_ITEM)
        .filter_map(|item| {
            item.select(&LINK)
                .filter_map(|a| a.value().attr("href"))
                .find_map(|href| video_from_href(base, href))
        })
        .collect()
}

fn initial_data_recommendations(text: &str) -> Vec<String> {
    let compact: Vec<String> = COMPACT_VIDEO
        .captures_iter(text)
        .map(|c| c[1].to_owned())
        .collect();
    if !compact.is_empty() {
        return compact;
    }
    LOCKUP_VIDEO
        .captures_iter(text)
        .map(|c| c[1].to_owned())
        .collect()
}

fn meta_content(html: &Html, selector: &Selector) -> Option<String> {
    html.select(selector)
        .filter_map(|e| e.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_owned)
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_owned()
}

/// Resolves an href against the page, like a browser would.
///
/// Absolute hrefs parse as-is. Relative ones such as `/watch?v=...` are
/// joined with the base.
fn resolve(base: &Url, href: &str) -> Option<Url> {
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(_) => base.join(href).ok(),
    }
}

fn video_from_href(base: &Url, href: &str) -> Option<String> {
    let url = resolve(base, href)?;
    if url.path() != "/watch" {
        return None;
    }
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

fn channel_from_href(base: &Url, href: &str) -> Option<ChannelId> {
    let url = resolve(base, href)?;
    let mut segments = url.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("channel"), Some(id)) if !id.is_empty() => Some(ChannelId::from(id)),
        _ => None,
    }
}

/// Integer value of a displayed count such as "1,234,567 views".
pub fn clean_count(text: &str) -> Option<u64> {
    let ascii: String = text.chars().filter(char::is_ascii).collect();
    DIGITS
        .find(&ascii)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Seconds in an ISO-8601 duration such as `PT1H2M3S`.
pub fn parse_iso_duration(text: &str) -> Option<u64> {
    let caps = ISO_DURATION.captures(text.trim())?;
    if caps.iter().skip(1).all(|c| c.is_none()) {
        return None;
    }
    let part = |i: usize, scale: u64| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
            * scale
    };
    Some(part(1, 86_400) + part(2, 3_600) + part(3, 60) + part(4, 1))
}
