//! Streams audio from the catalog's CDN.
//!
//! A transfer is two requests: `tracks/{id}/playbackinfopostpaywall` returns
//! a base64 manifest naming one or more media URLs, then each URL is streamed
//! in order into the part file.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use futures::StreamExt;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::{CancelToken, TransferError, TransferredFile};
use crate::catalog::http::dto::{ApiError, BtsManifest, PlaybackInfo};
use crate::catalog::http::{HttpCatalog, Session};
use crate::model::{Quality, Track};

/// Catalog sub-status: the requested quality does not exist for the track.
const SUB_STATUS_QUALITY_NOT_FOUND: u32 = 2001;

/// Where the media bytes for one transfer come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    pub urls: Vec<String>,
    pub codec: Option<String>,
}

/// Production [`TransferApi`](super::TransferApi).
pub struct HttpTransfer {
    http_client: reqwest::Client,
    base_url: String,
    session: Session,
    /// Whole-request limit for the playback info call
    request_timeout: Duration,
    /// Max silence between two chunks of a stream
    read_timeout: Duration,
}

impl HttpTransfer {
    /// Share the catalog's HTTP client and session.
    pub fn new(catalog: &HttpCatalog, read_timeout: Duration) -> Self {
        Self {
            http_client: catalog.http_client().clone(),
            base_url: catalog.base_url().to_string(),
            session: catalog.session().clone(),
            request_timeout: catalog.request_timeout(),
            read_timeout,
        }
    }

    /// Fetch the manifest for `quality` and stream it into `part_path`.
    pub async fn transfer(
        &self,
        track: &Track,
        quality: Quality,
        part_path: &Path,
        cancel: &CancelToken,
    ) -> Result<TransferredFile, TransferError> {
        let info = self.playback_info(&track.id, quality).await?;
        let served = info
            .audio_quality
            .as_deref()
            .and_then(Quality::from_api_str)
            .unwrap_or(quality);
        if served != quality {
            tracing::info!(track_id = %track.id, requested = %quality, %served, "Catalog served a different quality");
        }

        let source = decode_manifest(&info)?;
        let bytes = self.stream_to_file(&source.urls, part_path, cancel).await?;

        tracing::debug!(track_id = %track.id, bytes, codec = ?source.codec, "Stream complete");
        Ok(TransferredFile {
            temp_path: part_path.to_path_buf(),
            quality: served,
            codec: source.codec,
            bytes,
        })
    }

    async fn playback_info(
        &self,
        track_id: &str,
        quality: Quality,
    ) -> Result<PlaybackInfo, TransferError> {
        let url = format!("{}/tracks/{track_id}/playbackinfopostpaywall", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.session.access_token)
            .query(&[
                ("countryCode", self.session.country_code.as_str()),
                ("audioquality", quality.as_api_str()),
                ("playbackmode", "STREAM"),
                ("assetpresentation", "FULL"),
            ])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ApiError>().await.ok();
            return Err(map_playback_status(status, quality, body));
        }

        response
            .json::<PlaybackInfo>()
            .await
            .map_err(|e| TransferError::UnsupportedStream(format!("playback info: {e}")))
    }

    async fn stream_to_file(
        &self,
        urls: &[String],
        part_path: &Path,
        cancel: &CancelToken,
    ) -> Result<u64, TransferError> {
        let mut file = tokio::fs::File::create(part_path).await?;
        let mut written: u64 = 0;

        for url in urls {
            let response = self.http_client.get(url).send().await.map_err(map_reqwest)?;
            let status = response.status();
            if !status.is_success() {
                return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                    TransferError::RateLimited
                } else {
                    TransferError::Network(format!("media HTTP {status}"))
                });
            }

            let mut stream = response.bytes_stream();
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                    next = tokio::time::timeout(self.read_timeout, stream.next()) => next,
                };
                let chunk = match next {
                    Err(_) => return Err(TransferError::Timeout),
                    Ok(None) => break,
                    Ok(Some(chunk)) => chunk.map_err(map_reqwest)?,
                };
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

/// Decode the manifest carried by a playback info response.
pub fn decode_manifest(info: &PlaybackInfo) -> Result<StreamSource, TransferError> {
    let raw = BASE64
        .decode(info.manifest.trim())
        .map_err(|e| TransferError::UnsupportedStream(format!("manifest is not base64: {e}")))?;
    let mime = info.manifest_mime_type.as_str();

    if mime.contains("vnd.tidal.bt") {
        let manifest: BtsManifest = serde_json::from_slice(&raw)
            .map_err(|e| TransferError::UnsupportedStream(format!("bad manifest: {e}")))?;
        let encrypted = manifest
            .encryption_type
            .as_deref()
            .is_some_and(|t| !t.eq_ignore_ascii_case("NONE"))
            || manifest.key_id.as_deref().is_some_and(|k| !k.is_empty());
        if encrypted {
            return Err(TransferError::UnsupportedStream("encrypted stream".to_string()));
        }
        if manifest.urls.is_empty() {
            return Err(TransferError::UnsupportedStream("manifest has no URLs".to_string()));
        }
        Ok(StreamSource {
            urls: manifest.urls,
            codec: manifest.codecs,
        })
    } else if mime.contains("dash+xml") {
        let xml = String::from_utf8(raw)
            .map_err(|_| TransferError::UnsupportedStream("manifest is not UTF-8".to_string()))?;
        parse_dash(&xml)
    } else {
        Err(TransferError::UnsupportedStream(format!("manifest type {mime}")))
    }
}

/// `SegmentTemplate` of a DASH representation.
#[derive(Debug, Default)]
struct SegmentTemplate {
    initialization: Option<String>,
    media: Option<String>,
    start_number: u64,
    segments: u64,
}

/// Media URLs and codec of a DASH manifest.
///
/// Either a list of `BaseURL`s, streamed in order, or a `SegmentTemplate`
/// whose timeline is expanded into the init segment followed by every
/// numbered media segment. `ContentProtection` anywhere means encrypted.
fn parse_dash(xml: &str) -> Result<StreamSource, TransferError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut base_urls = Vec::new();
    let mut codec = None;
    let mut template: Option<SegmentTemplate> = None;
    let mut in_base_url = false;
    let mut in_timeline = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| TransferError::UnsupportedStream(format!("bad DASH manifest: {e}")))?;
        let (element, is_start) = match event {
            Event::Start(e) => (e, true),
            Event::Empty(e) => (e, false),
            Event::Text(t) if in_base_url => {
                let url = t
                    .unescape()
                    .map_err(|e| TransferError::UnsupportedStream(format!("bad BaseURL: {e}")))?;
                base_urls.push(url.trim().to_string());
                continue;
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"BaseURL" => in_base_url = false,
                    b"SegmentTimeline" => in_timeline = false,
                    _ => {}
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        match element.local_name().as_ref() {
            b"ContentProtection" => {
                return Err(TransferError::UnsupportedStream("encrypted stream".to_string()));
            }
            b"AdaptationSet" | b"Representation" => {
                if codec.is_none() {
                    codec = attribute(&element, b"codecs");
                }
            }
            b"BaseURL" => in_base_url = is_start,
            b"SegmentTemplate" if template.is_none() => {
                template = Some(SegmentTemplate {
                    initialization: attribute(&element, b"initialization"),
                    media: attribute(&element, b"media"),
                    start_number: attribute(&element, b"startNumber")
                        .and_then(|n| n.parse().ok())
                        .unwrap_or(1),
                    segments: 0,
                });
            }
            b"SegmentTimeline" => in_timeline = is_start,
            b"S" if in_timeline => {
                if let Some(template) = template.as_mut() {
                    // r is the number of repeats after the first segment
                    let repeats: u64 = attribute(&element, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(0);
                    template.segments += 1 + repeats;
                }
            }
            _ => {}
        }
    }

    let urls = match template {
        Some(SegmentTemplate {
            initialization,
            media: Some(media),
            start_number,
            segments,
        }) if segments > 0 => {
            let base = match base_urls.as_slice() {
                [base] => base.as_str(),
                _ => "",
            };
            let resolve = |url: String| {
                if url.starts_with("http://") || url.starts_with("https://") {
                    url
                } else {
                    format!("{base}{url}")
                }
            };
            initialization
                .into_iter()
                .map(&resolve)
                .chain((start_number..start_number + segments).map(|n| {
                    resolve(media.replace("$Number$", &n.to_string()))
                }))
                .collect()
        }
        _ => base_urls,
    };

    if urls.is_empty() {
        return Err(TransferError::UnsupportedStream(
            "DASH manifest names no media URLs".to_string(),
        ));
    }
    Ok(StreamSource { urls, codec })
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn map_playback_status(status: StatusCode, quality: Quality, body: Option<ApiError>) -> TransferError {
    let sub_status = body.as_ref().and_then(|b| b.sub_status);
    let message = body
        .and_then(|b| b.user_message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());
    match status {
        StatusCode::NOT_FOUND if sub_status == Some(SUB_STATUS_QUALITY_NOT_FOUND) => {
            TransferError::QualityUnavailable(quality)
        }
        StatusCode::NOT_FOUND => TransferError::Removed,
        // 401 with sub-status 4005 is "asset not ready for playback"
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransferError::EntitlementDenied(message),
        StatusCode::TOO_MANY_REQUESTS => TransferError::RateLimited,
        s if s.is_server_error() => TransferError::Network(format!("HTTP {s}: {message}")),
        s => TransferError::UnsupportedStream(format!("HTTP {s}: {message}")),
    }
}

fn map_reqwest(e: reqwest::Error) -> TransferError {
    if e.is_timeout() {
        TransferError::Timeout
    } else {
        TransferError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(mime: &str, manifest: &str) -> PlaybackInfo {
        PlaybackInfo {
            track_id: None,
            audio_quality: Some("LOSSLESS".into()),
            manifest_mime_type: mime.into(),
            manifest: BASE64.encode(manifest),
        }
    }

    #[test]
    fn test_bts_manifest() {
        let json = r#"{"mimeType":"audio/flac","codecs":"flac","encryptionType":"NONE","urls":["https://cdn/a.flac"]}"#;
        let source = decode_manifest(&info("application/vnd.tidal.bts", json)).unwrap();
        assert_eq!(source.urls, ["https://cdn/a.flac"]);
        assert_eq!(source.codec.as_deref(), Some("flac"));
    }

    #[test]
    fn test_encrypted_bts_rejected() {
        let json = r#"{"codecs":"flac","encryptionType":"OLD_AES","keyId":"abc","urls":["https://cdn/a"]}"#;
        let err = decode_manifest(&info("application/vnd.tidal.bts", json)).unwrap_err();
        assert!(matches!(err, TransferError::UnsupportedStream(m) if m.contains("encrypted")));
    }

    #[test]
    fn test_dash_manifest_base_urls() {
        let xml = "<MPD>\n<AdaptationSet>\n<Representation codecs=\"mp4a.40.2\">\n<BaseURL>https://cdn/1.mp4</BaseURL>\n<BaseURL>https://cdn/2.mp4</BaseURL>\n</Representation>\n</AdaptationSet>\n</MPD>";
        let source = decode_manifest(&info("application/dash+xml", xml)).unwrap();
        assert_eq!(source.urls, ["https://cdn/1.mp4", "https://cdn/2.mp4"]);
        assert_eq!(source.codec.as_deref(), Some("mp4a.40.2"));
    }

    #[test]
    fn test_dash_manifest_on_one_line() {
        let xml = r#"<?xml version="1.0"?><MPD xmlns="urn:mpeg:dash:schema:mpd:2011"><Period><AdaptationSet><Representation codecs="flac"><BaseURL>https://cdn/1.flac?a=1&amp;b=2</BaseURL><BaseURL>https://cdn/2.flac</BaseURL></Representation></AdaptationSet></Period></MPD>"#;
        let source = decode_manifest(&info("application/dash+xml", xml)).unwrap();
        assert_eq!(source.urls, ["https://cdn/1.flac?a=1&b=2", "https://cdn/2.flac"]);
        assert_eq!(source.codec.as_deref(), Some("flac"));
    }

    #[test]
    fn test_dash_segment_template_expanded() {
        let xml = r#"<MPD><Period><AdaptationSet><Representation codecs="flac"><SegmentTemplate initialization="https://cdn/init.mp4" media="https://cdn/$Number$.mp4" startNumber="1"><SegmentTimeline><S d="4096" r="2"/><S d="1024"/></SegmentTimeline></SegmentTemplate></Representation></AdaptationSet></Period></MPD>"#;
        let source = decode_manifest(&info("application/dash+xml", xml)).unwrap();
        assert_eq!(
            source.urls,
            [
                "https://cdn/init.mp4",
                "https://cdn/1.mp4",
                "https://cdn/2.mp4",
                "https://cdn/3.mp4",
                "https://cdn/4.mp4"
            ]
        );
    }

    #[test]
    fn test_dash_content_protection_rejected() {
        let xml = r#"<MPD><AdaptationSet><ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011"/><Representation><BaseURL>https://cdn/1.mp4</BaseURL></Representation></AdaptationSet></MPD>"#;
        let err = decode_manifest(&info("application/dash+xml", xml)).unwrap_err();
        assert!(matches!(err, TransferError::UnsupportedStream(m) if m.contains("encrypted")));
    }

    #[test]
    fn test_dash_without_media_rejected() {
        let xml = "<MPD><SegmentTemplate media=\"x$Number$\"/></MPD>";
        assert!(decode_manifest(&info("application/dash+xml", xml)).is_err());
    }

    #[test]
    fn test_unknown_manifest_type() {
        assert!(matches!(
            decode_manifest(&info("text/plain", "hello")),
            Err(TransferError::UnsupportedStream(_))
        ));
    }

    #[test]
    fn test_playback_status_mapping() {
        let body = |sub| {
            Some(ApiError {
                status: None,
                sub_status: Some(sub),
                user_message: Some("nope".into()),
            })
        };
        assert!(matches!(
            map_playback_status(StatusCode::NOT_FOUND, Quality::HiRes, body(2001)),
            TransferError::QualityUnavailable(Quality::HiRes)
        ));
        assert!(matches!(
            map_playback_status(StatusCode::NOT_FOUND, Quality::HiRes, None),
            TransferError::Removed
        ));
        assert!(matches!(
            map_playback_status(StatusCode::UNAUTHORIZED, Quality::High, body(4005)),
            TransferError::EntitlementDenied(m) if m == "nope"
        ));
        assert!(map_playback_status(StatusCode::SERVICE_UNAVAILABLE, Quality::High, None).is_transient());
        assert!(matches!(
            map_playback_status(StatusCode::TOO_MANY_REQUESTS, Quality::High, None),
            TransferError::RateLimited
        ));
    }

    #[tokio::test]
    async fn test_slow_stream_outlives_request_timeout() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 60\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            for _ in 0..6 {
                socket.write_all(&[7u8; 10]).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(400)).await;
            }
        });

        let session = Session {
            access_token: "token".into(),
            user_id: "42".into(),
            country_code: "US".into(),
        };
        let catalog = HttpCatalog::new(format!("http://{addr}"), session, Duration::from_millis(500));
        let transfer = HttpTransfer::new(&catalog, Duration::from_secs(2));
        assert!(catalog.request_timeout() < Duration::from_secs(2));

        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("t1.flac.part");
        let written = transfer
            .stream_to_file(&[format!("http://{addr}/media")], &part, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(written, 60);
        assert_eq!(std::fs::metadata(&part).unwrap().len(), 60);
    }
}
