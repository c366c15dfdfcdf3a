//! URL resolution
//!
//! Turns a SoundCloud URL into a [`ResolvedItem`]. Collections get their
//! tracks completed through the batch `/tracks?ids=` endpoint.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::SoundCloudClient;
use crate::error::{excerpt, Result, SoundCloudError};
use crate::models::{MediaKind, Playlist, ResolvedItem, Track};

/// Upper bound of ids per `/tracks` request
pub const BATCH_SIZE: usize = 50;

/// Resolve attempts before giving up on 401
pub const MAX_RESOLVE_ATTEMPTS: usize = 2;

impl SoundCloudClient {
    /// Resolves a track, playlist or album URL
    pub async fn resolve(&self, reference: &str) -> Result<ResolvedItem> {
        let payload = self.resolve_raw(reference).await?;
        self.item_from_payload(payload).await
    }

    /// Resolves a track by id through its canonical URL
    pub async fn resolve_track_id(&self, id: u64) -> Result<Track> {
        let payload = self
            .resolve_raw(&format!("{}/tracks/{}", self.site_base, id))
            .await?;
        parse_track(payload)
    }

    /// Calls `/resolve` and returns the raw payload
    ///
    /// A 401 invalidates the client id and retries once with a fresh one.
    pub async fn resolve_raw(&self, reference: &str) -> Result<Value> {
        let mut client_id = match self.client_ids.get(false).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to get client_id initially: {}", e);
                self.client_ids.invalidate();
                self.client_ids.get(true).await?
            }
        };

        let url = self.api_url("/resolve");
        let mut last_excerpt = String::new();

        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            debug!("GET {} url={} (attempt {})", url, reference, attempt);

            let response = self
                .client
                .get(&url)
                .query(&[("url", reference), ("client_id", client_id.as_str())])
                .send()
                .await
                .map_err(|e| SoundCloudError::resolve(e.to_string()))?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                let body = response.text().await.unwrap_or_default();
                last_excerpt = if body.is_empty() {
                    "No error details".to_string()
                } else {
                    excerpt(&body)
                };

                if attempt < MAX_RESOLVE_ATTEMPTS {
                    warn!(
                        "Got 401, refreshing client_id (attempt {}/{})",
                        attempt, MAX_RESOLVE_ATTEMPTS
                    );
                    self.client_ids.invalidate();
                    match self.client_ids.get(true).await {
                        Ok(id) => client_id = id,
                        Err(e) => warn!("Failed to refresh client_id: {}", e),
                    }
                }
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!("Resolve failed ({}): {}", status.as_u16(), excerpt(&body));
                return Err(SoundCloudError::resolve_status(status.as_u16(), &body));
            }

            return response
                .json::<Value>()
                .await
                .map_err(|e| SoundCloudError::resolve(e.to_string()));
        }

        Err(SoundCloudError::AuthExpired {
            attempts: MAX_RESOLVE_ATTEMPTS,
            excerpt: last_excerpt,
        })
    }

    async fn item_from_payload(&self, payload: Value) -> Result<ResolvedItem> {
        let kind = payload
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("track")
            .to_string();

        match kind.as_str() {
            "track" => Ok(ResolvedItem::from_track(parse_track(payload)?)),
            "playlist" | "album" => {
                let playlist: Playlist = serde_json::from_value(payload)
                    .map_err(|e| SoundCloudError::resolve(e.to_string()))?;
                let kind = if kind == "album" || playlist.is_album == Some(true) {
                    MediaKind::Album
                } else {
                    MediaKind::Playlist
                };
                let children = self.collection_children(&playlist.tracks).await;
                Ok(ResolvedItem::from_playlist(playlist, kind, children))
            }
            other => Err(SoundCloudError::resolve(format!("Unsupported kind: {}", other))),
        }
    }

    /// Completes partial playlist tracks, keeping their order
    async fn collection_children(&self, stubs: &[Track]) -> Vec<ResolvedItem> {
        let ids: Vec<u64> = stubs.iter().map(|t| t.id).filter(|id| *id != 0).collect();
        let full = self.tracks_by_ids(&ids).await;

        let mut children = Vec::with_capacity(stubs.len());
        for stub in stubs {
            let child = if let Some(track) = full.get(&stub.id) {
                ResolvedItem::from_track(track.clone())
            } else if !stub.is_complete() && stub.id != 0 {
                match self.resolve_track_id(stub.id).await {
                    Ok(track) => ResolvedItem::from_track(track),
                    Err(e) => {
                        warn!("Failed to resolve track {}: {}", stub.id, e);
                        ResolvedItem::from_track(stub.clone())
                    }
                }
            } else {
                ResolvedItem::from_track(stub.clone())
            };
            children.push(child);
        }
        children
    }

    /// Fetches full track payloads in batches of [`BATCH_SIZE`]
    ///
    /// Any failure is logged and yields an empty map.
    pub async fn tracks_by_ids(&self, ids: &[u64]) -> HashMap<u64, Track> {
        if ids.is_empty() {
            return HashMap::new();
        }

        match self.fetch_tracks_by_ids(ids).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Failed to fetch tracks by IDs: {}", e);
                HashMap::new()
            }
        }
    }

    async fn fetch_tracks_by_ids(&self, ids: &[u64]) -> Result<HashMap<u64, Track>> {
        let client_id = self.client_ids.get(false).await?;
        let url = self.api_url("/tracks");
        let mut tracks = HashMap::new();

        for batch in ids.chunks(BATCH_SIZE) {
            let ids_param = batch
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");

            let body: Value = self
                .client
                .get(&url)
                .query(&[("ids", ids_param.as_str()), ("client_id", client_id.as_str())])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let items = match body {
                Value::Array(items) => items,
                Value::Object(mut map) => match map.remove("collection") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };

            for item in items {
                if let Ok(track) = serde_json::from_value::<Track>(item) {
                    if track.id != 0 {
                        tracks.insert(track.id, track);
                    }
                }
            }
        }

        debug!("Fetched {}/{} tracks by id", tracks.len(), ids.len());
        Ok(tracks)
    }
}

fn parse_track(payload: Value) -> Result<Track> {
    serde_json::from_value(payload).map_err(|e| SoundCloudError::resolve(e.to_string()))
}
