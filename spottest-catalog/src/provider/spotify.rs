//! Spotify Web API page source
//!
//! Reads the current user's top tracks (per time range) and saved
//! library. The bearer token is supplied by the caller; obtaining and
//! refreshing it happens elsewhere.
//!
//! API reference:
//! - `GET /v1/me/top/tracks?time_range=..&limit=..&offset=..`
//! - `GET /v1/me/tracks?limit=..&offset=..`

use crate::models::{parse_release_date, Page, Source, TrackId, TrackRecord};
use crate::pager::{FetchError, PageSource};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use spottest_common::config::MAX_PAGE_SIZE;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Spotify Web API base URL
const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

/// Default timeout for API requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("spottest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct PagingObject<T> {
    items: Vec<T>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct SavedTrackObject {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    album: AlbumObject,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    name: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<ImageObject>,
}

#[derive(Debug, Deserialize)]
struct ImageObject {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

impl TrackObject {
    /// Local files have no id and are skipped
    fn into_record(self) -> Option<TrackRecord> {
        let Some(id) = self.id else {
            trace!(name = %self.name, "Skipping track without id");
            return None;
        };
        Some(TrackRecord {
            id: TrackId::new(id),
            title: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            release_date: self.album.release_date.as_deref().and_then(parse_release_date),
            album: self.album.name,
            external_url: self.external_urls.spotify.unwrap_or_default(),
            // Images are ordered widest first; the last one is the thumbnail
            thumbnail: self.album.images.into_iter().last().map(|i| i.url),
        })
    }
}

fn top_tracks_page(body: PagingObject<TrackObject>, offset: usize) -> Page<TrackRecord> {
    Page {
        items: body.items.into_iter().filter_map(TrackObject::into_record).collect(),
        offset,
        total: body.total,
    }
}

fn saved_tracks_page(body: PagingObject<SavedTrackObject>, offset: usize) -> Page<TrackRecord> {
    Page {
        items: body
            .items
            .into_iter()
            .filter_map(|saved| saved.track.and_then(TrackObject::into_record))
            .collect(),
        offset,
        total: body.total,
    }
}

/// Parse a `Retry-After` header given in whole seconds
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Authenticated Spotify API session
///
/// One value per signed-in user; pass it explicitly to whatever needs it.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http_client: Client,
    base_url: String,
    access_token: String,
}

impl SpotifyClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: SPOTIFY_API_URL.to_string(),
            access_token: access_token.into(),
        })
    }

    /// Point the client at another API root (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Page source for one of the user's lists
    pub fn pager(self: &Arc<Self>, source: Source) -> SpotifyPager {
        SpotifyPager {
            client: Arc::clone(self),
            source,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, ?query, "Querying Spotify API");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(FetchError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("Failed to parse Spotify response: {}", e)))
    }
}

/// One of the user's lists as a [`PageSource`]
#[derive(Debug, Clone)]
pub struct SpotifyPager {
    client: Arc<SpotifyClient>,
    source: Source,
}

impl SpotifyPager {
    pub fn source(&self) -> Source {
        self.source
    }
}

#[async_trait]
impl PageSource for SpotifyPager {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page<TrackRecord>, FetchError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let mut query = vec![("limit", limit.to_string()), ("offset", offset.to_string())];

        match self.source.time_range() {
            Some(range) => {
                query.push(("time_range", range.to_string()));
                let body: PagingObject<TrackObject> =
                    self.client.get_json("/me/top/tracks", &query).await?;
                Ok(top_tracks_page(body, offset))
            }
            None => {
                let body: PagingObject<SavedTrackObject> =
                    self.client.get_json("/me/tracks", &query).await?;
                Ok(saved_tracks_page(body, offset))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const TOP_TRACKS: &str = r#"{
        "href": "https://api.spotify.com/v1/me/top/tracks?offset=50&limit=2",
        "limit": 2,
        "offset": 50,
        "total": 120,
        "items": [
            {
                "id": "4uLU6hMCjMI75M1A2tKUQC",
                "name": "Never Gonna Give You Up",
                "artists": [{"name": "Rick Astley"}],
                "album": {
                    "name": "Whenever You Need Somebody",
                    "release_date": "1987-11-12",
                    "release_date_precision": "day",
                    "images": [
                        {"url": "https://i.scdn.co/image/640", "width": 640, "height": 640},
                        {"url": "https://i.scdn.co/image/64", "width": 64, "height": 64}
                    ]
                },
                "external_urls": {"spotify": "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"}
            },
            {
                "id": null,
                "name": "Local File",
                "artists": [],
                "album": {"name": "", "release_date": null, "images": []},
                "external_urls": {}
            }
        ]
    }"#;

    #[test]
    fn test_top_tracks_page_conversion() {
        let body: PagingObject<TrackObject> = serde_json::from_str(TOP_TRACKS).unwrap();
        let page = top_tracks_page(body, 50);

        assert_eq!(page.total, 120);
        assert_eq!(page.offset, 50);
        assert_eq!(page.items.len(), 1);

        let record = &page.items[0];
        assert_eq!(record.id.as_str(), "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(record.artists, vec!["Rick Astley".to_string()]);
        assert_eq!(record.release_date, NaiveDate::from_ymd_opt(1987, 11, 12));
        assert_eq!(record.thumbnail.as_deref(), Some("https://i.scdn.co/image/64"));

        let tracks = page.into_tracks(Source::LongTerm);
        assert_eq!(tracks[0].rank, 51);
    }

    #[test]
    fn test_saved_tracks_page_conversion() {
        let body: PagingObject<SavedTrackObject> = serde_json::from_str(
            r#"{
                "total": 2,
                "items": [
                    {"added_at": "2024-01-01T00:00:00Z", "track": {
                        "id": "t1", "name": "Saved", "artists": [{"name": "A"}, {"name": "B"}],
                        "album": {"name": "Album", "release_date": "2024-03", "images": []},
                        "external_urls": {"spotify": "https://open.spotify.com/track/t1"}
                    }},
                    {"added_at": "2024-01-02T00:00:00Z", "track": null}
                ]
            }"#,
        )
        .unwrap();

        let page = saved_tracks_page(body, 0);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].release_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(page.items[0].thumbnail, None);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = SpotifyClient::new("token")
            .unwrap()
            .with_base_url("http://127.0.0.1:9/v1/");
        assert_eq!(client.base_url, "http://127.0.0.1:9/v1");
    }
}
