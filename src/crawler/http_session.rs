//! HTTP listing session
//!
//! Fetches the listing page once per session, indexes its rows by record
//! index and downloads artifacts by following the row's links. Each download
//! runs on its own task and lands in the download directory as a `.part`
//! file that is renamed once the body is complete.

use crate::config::SessionConfig;
use crate::crawler::session::{DownloadStatus, Session, SessionError, SessionFactory, Target};
use crate::state::ArtifactKind;
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::{header::CONTENT_DISPOSITION, Client};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Builds the HTTP client shared by a session's requests
pub fn build_http_client(config: &SessionConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// One record row of the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub label: String,
    /// `(visible text, href)` of every link in the row
    pub links: Vec<(String, String)>,
}

impl ListingRow {
    fn link_for(&self, text: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|(link_text, _)| link_text == text)
            .map(|(_, href)| href.as_str())
    }
}

/// Parsed listing page
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// First number in the total element's text
    pub total: Option<u64>,
    pub rows: HashMap<u64, ListingRow>,
}

fn selector(source: &str) -> Result<Selector, ConfigError> {
    Selector::parse(source).map_err(|e| ConfigError::InvalidSelector {
        selector: source.to_string(),
        message: e.to_string(),
    })
}

fn collapse(text: scraper::element_ref::Text<'_>) -> String {
    text.collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses the listing HTML into rows keyed by record index
///
/// Rows without a parseable index attribute are ignored.
pub fn parse_listing(html: &str, config: &SessionConfig) -> Result<Listing, ConfigError> {
    let document = Html::parse_document(html);
    let total_selector = selector(&config.total_selector)?;
    let row_selector = selector(&config.row_selector)?;
    let label_selector = selector(&config.label_selector)?;
    let link_selector = selector("a[href]")?;

    let total = document.select(&total_selector).next().and_then(|element| {
        let text = element.text().collect::<String>();
        let digits: String = text
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    });

    let mut rows = HashMap::new();
    for row in document.select(&row_selector) {
        let Some(index) = row
            .value()
            .attr(&config.index_attribute)
            .and_then(|value| value.trim().parse::<u64>().ok())
        else {
            continue;
        };

        let label = row
            .select(&label_selector)
            .next()
            .map(|element| collapse(element.text()))
            .unwrap_or_default();

        let links = row
            .select(&link_selector)
            .filter_map(|a| {
                let href = a.value().attr("href")?;
                Some((collapse(a.text()), href.to_string()))
            })
            .collect();

        rows.insert(index, ListingRow { label, links });
    }

    Ok(Listing { total, rows })
}

/// File name for a download, from `Content-Disposition` or the URL path
fn download_file_name(response: &reqwest::Response) -> String {
    let from_header = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value.split(';').map(str::trim).find_map(|part| {
                part.strip_prefix("filename=")
                    .map(|name| name.trim_matches('"').to_string())
            })
        })
        .filter(|name| !name.is_empty());

    from_header
        .or_else(|| {
            response
                .url()
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|name| !name.is_empty())
        })
        .map(|name| {
            Path::new(&name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".to_string())
        })
        .unwrap_or_else(|| "download".to_string())
}

async fn download(client: Client, url: Url, dir: PathBuf) -> Result<PathBuf, String> {
    let response = client.get(url.clone()).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("{} returned {}", url, response.status()));
    }

    let name = download_file_name(&response);
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;

    let final_path = dir.join(&name);
    let part_path = dir.join(format!("{}.part", name));
    tokio::fs::write(&part_path, &bytes)
        .await
        .map_err(|e| e.to_string())?;
    tokio::fs::rename(&part_path, &final_path)
        .await
        .map_err(|e| e.to_string())?;

    tracing::debug!("Downloaded {} ({} bytes)", final_path.display(), bytes.len());
    Ok(final_path)
}

/// Download started by the last `trigger`
struct PendingDownload {
    index: u64,
    handle: JoinHandle<Result<PathBuf, String>>,
}

pub struct HttpSession {
    client: Client,
    config: SessionConfig,
    listing_url: Url,
    download_dir: PathBuf,
    listing: Listing,
    pending: Option<PendingDownload>,
}

impl HttpSession {
    pub fn new(
        config: SessionConfig,
        download_dir: impl Into<PathBuf>,
    ) -> Result<Self, SessionError> {
        let client = build_http_client(&config).map_err(|e| SessionError::Fatal(e.to_string()))?;
        let listing_url = Url::parse(&config.listing_url)
            .map_err(|e| SessionError::Fatal(format!("{}: {}", config.listing_url, e)))?;

        Ok(Self {
            client,
            config,
            listing_url,
            download_dir: download_dir.into(),
            listing: Listing::default(),
            pending: None,
        })
    }

    /// Number of rows indexed from the listing
    pub fn row_count(&self) -> usize {
        self.listing.rows.len()
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn open(&mut self) -> Result<Option<u64>, SessionError> {
        let response = self
            .client
            .get(self.listing_url.clone())
            .send()
            .await
            .map_err(|e| SessionError::Fatal(format!("listing unavailable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Fatal(format!(
                "listing returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SessionError::Fatal(format!("listing body unreadable: {}", e)))?;
        self.listing =
            parse_listing(&body, &self.config).map_err(|e| SessionError::Fatal(e.to_string()))?;

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| SessionError::Fatal(format!("download directory: {}", e)))?;

        tracing::info!(
            "Listing loaded: {} rows, total {:?}",
            self.listing.rows.len(),
            self.listing.total
        );
        Ok(self.listing.total)
    }

    async fn seek(&mut self, index: u64) -> Result<(), SessionError> {
        tracing::debug!("Seeking to record {}", index);
        Ok(())
    }

    async fn locate(&mut self, index: u64) -> Result<Target, SessionError> {
        self.listing
            .rows
            .get(&index)
            .map(|row| Target {
                index,
                label: row.label.clone(),
            })
            .ok_or(SessionError::NotFound { index })
    }

    async fn trigger(&mut self, target: &Target, kind: ArtifactKind) -> Result<(), SessionError> {
        let index = target.index;
        let row = self
            .listing
            .rows
            .get(&index)
            .ok_or(SessionError::NotFound { index })?;

        let href = row
            .link_for(self.config.link_text.for_kind(kind))
            .ok_or(SessionError::ArtifactMissing { index, kind })?;
        let url = self.listing_url.join(href).map_err(|e| SessionError::Item {
            index,
            message: format!("bad link {}: {}", href, e),
        })?;

        if let Some(previous) = self.pending.take() {
            previous.handle.abort();
        }

        let handle = tokio::spawn(download(
            self.client.clone(),
            url,
            self.download_dir.clone(),
        ));
        self.pending = Some(PendingDownload { index, handle });
        Ok(())
    }

    async fn download_status(&mut self) -> Result<DownloadStatus, SessionError> {
        let Some(pending) = self.pending.as_ref() else {
            return Err(SessionError::Fatal("no download in progress".to_string()));
        };
        if !pending.handle.is_finished() {
            return Ok(DownloadStatus::InProgress);
        }

        let Some(PendingDownload { index, handle }) = self.pending.take() else {
            return Ok(DownloadStatus::InProgress);
        };
        match handle.await {
            Ok(Ok(path)) => Ok(DownloadStatus::Finished(path)),
            Ok(Err(message)) => Err(SessionError::Item { index, message }),
            Err(e) => Err(SessionError::Item {
                index,
                message: format!("download task failed: {}", e),
            }),
        }
    }

    async fn close(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
        self.listing = Listing::default();
    }
}

/// Opens a fresh `HttpSession` for every attempt
pub struct HttpSessionFactory {
    config: SessionConfig,
    download_dir: PathBuf,
}

impl HttpSessionFactory {
    pub fn new(config: SessionConfig, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            download_dir: download_dir.into(),
        }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    type Session = HttpSession;

    async fn create(&mut self) -> Result<HttpSession, SessionError> {
        HttpSession::new(self.config.clone(), self.download_dir.clone())
    }
}
