use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::error::PlaylistError;
use crate::models::{Asset, PlayPosition, Playlist};

const READABLE_NAME_LEN: usize = 48;

/// Result of adding a playlist to the store
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub added: bool,
    pub replaced: bool,
    pub evicted: Vec<String>,
}

/// Dirty state taken out of the store for writing
#[derive(Debug, Default)]
pub struct DirtySnapshot {
    pub playlists: Vec<Arc<Playlist>>,
    pub removed: Vec<String>,
    pub position: Option<PlayPosition>,
}

impl DirtySnapshot {
    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty() && self.removed.is_empty() && self.position.is_none()
    }
}

/// Known playlists plus the committed play position.
///
/// Playlists are shared as `Arc`s; every mutation goes through
/// `Arc::make_mut`, so snapshots handed to other threads never change.
pub struct PlaylistStore {
    playlists: Vec<Arc<Playlist>>,
    position: PlayPosition,
    removed: Vec<String>,
    max_playlists: usize,
}

impl PlaylistStore {
    pub fn new(max_playlists: usize) -> Self {
        Self {
            playlists: Vec::new(),
            position: PlayPosition::default(),
            removed: Vec::new(),
            max_playlists: max_playlists.max(1),
        }
    }

    /// Insert or replace by id. An update older than the stored copy is
    /// ignored. When over capacity, the oldest playlists other than
    /// `protected` and the new one are evicted.
    pub fn add(&mut self, mut playlist: Playlist, protected: Option<&str>) -> AddOutcome {
        let mut outcome = AddOutcome::default();
        let id = playlist.id.clone();
        playlist.dirty = true;

        match self.playlists.iter().position(|p| p.id == id) {
            Some(index) => {
                if playlist.timestamp < self.playlists[index].timestamp {
                    debug!("Ignoring stale update of playlist '{}'", id);
                    return outcome;
                }
                self.playlists[index] = Arc::new(playlist);
                outcome.replaced = true;
            }
            None => {
                self.playlists.push(Arc::new(playlist));
                self.removed.retain(|removed| removed != &id);
            }
        }
        outcome.added = true;

        while self.playlists.len() > self.max_playlists {
            let victim = self
                .playlists
                .iter()
                .enumerate()
                .filter(|(_, p)| p.id != id && Some(p.id.as_str()) != protected)
                .min_by_key(|(_, p)| p.timestamp)
                .map(|(index, _)| index);
            let Some(index) = victim else {
                break;
            };
            let evicted = self.playlists.remove(index);
            info!("Evicted playlist '{}'", evicted.id);
            self.removed.push(evicted.id.clone());
            outcome.evicted.push(evicted.id.clone());
        }

        outcome
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Playlist>> {
        self.playlists.iter().find(|p| p.id == id)
    }

    /// Copy-on-write access to a playlist
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Playlist> {
        self.playlists.iter_mut().find(|p| p.id == id).map(Arc::make_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Playlist>> {
        self.playlists.iter()
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn position(&self) -> &PlayPosition {
        &self.position
    }

    pub fn commit_position(&mut self, playlist_id: &str, slide_index: usize) {
        self.position = PlayPosition::new(playlist_id, slide_index);
    }

    /// Record the last slide shown so playback resumes there
    pub fn mark_played(&mut self, playlist_id: &str, slide_index: usize) {
        if let Some(playlist) = self.get_mut(playlist_id) {
            if playlist.last_played_item != slide_index {
                playlist.last_played_item = slide_index;
                playlist.dirty = true;
            }
        }
    }

    pub fn mark_dirty(&mut self, playlist_id: &str) {
        if let Some(playlist) = self.get_mut(playlist_id) {
            playlist.dirty = true;
        }
    }

    /// Replace the asset reference of every item using `asset.path`.
    /// Returns the number of items updated.
    pub fn attach_asset(&mut self, asset: &Arc<Asset>) -> usize {
        let mut updated = 0;
        for playlist in self.playlists.iter_mut() {
            let stale = playlist.items.iter().any(|item| {
                item.path == asset.path && !item.asset.as_ref().is_some_and(|current| Arc::ptr_eq(current, asset))
            });
            if !stale {
                continue;
            }
            let playlist = Arc::make_mut(playlist);
            for item in playlist.items.iter_mut().filter(|item| item.path == asset.path) {
                item.asset = Some(asset.clone());
                updated += 1;
            }
        }
        updated
    }

    /// Every asset path referenced by any playlist
    pub fn asset_paths(&self) -> BTreeSet<String> {
        self.playlists
            .iter()
            .flat_map(|p| p.items.iter())
            .filter(|item| !item.path.is_empty())
            .map(|item| item.path.clone())
            .collect()
    }

    /// Treat the current playlists and position as already written
    pub fn mark_clean(&mut self) {
        for playlist in self.playlists.iter_mut() {
            if playlist.dirty {
                Arc::make_mut(playlist).dirty = false;
            }
        }
        self.position.dirty = false;
    }

    /// Take everything that needs writing and clear the dirty flags
    pub fn take_dirty(&mut self) -> DirtySnapshot {
        let mut snapshot = DirtySnapshot {
            removed: std::mem::take(&mut self.removed),
            ..DirtySnapshot::default()
        };
        for playlist in self.playlists.iter_mut() {
            if playlist.dirty {
                Arc::make_mut(playlist).dirty = false;
                snapshot.playlists.push(playlist.clone());
            }
        }
        if self.position.dirty {
            self.position.dirty = false;
            snapshot.position = Some(self.position.clone());
        }
        snapshot
    }

    /// Put back state whose write failed so the next pass retries it
    pub fn restore_dirty(&mut self, snapshot: DirtySnapshot) {
        for playlist in &snapshot.playlists {
            self.mark_dirty(&playlist.id);
        }
        for id in snapshot.removed {
            if self.get(&id).is_none() && !self.removed.contains(&id) {
                self.removed.push(id);
            }
        }
        if let Some(position) = snapshot.position {
            if position.same_slide(&self.position) {
                self.position.dirty = true;
            }
        }
    }
}

/// On-disk layout: one JSON record per playlist plus the play position
pub struct StoreDir {
    root: PathBuf,
}

impl StoreDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn playlist_dir(&self) -> PathBuf {
        self.root.join("playlists")
    }

    fn playlist_path(&self, id: &str) -> PathBuf {
        self.playlist_dir().join(format!("{}.json", storage_name(id)))
    }

    fn position_path(&self) -> PathBuf {
        self.root.join("position.json")
    }

    /// Read every stored playlist and the position. Unreadable records are
    /// skipped with a warning.
    pub fn load(&self) -> Result<(Vec<Playlist>, Option<PlayPosition>), PlaylistError> {
        let mut playlists = Vec::new();
        let dir = self.playlist_dir();
        if dir.is_dir() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match read_playlist(&path) {
                    Ok(mut playlist) => {
                        playlist.dirty = false;
                        playlists.push(playlist);
                    }
                    Err(e) => warn!("Skipping unreadable playlist record {}: {}", path.display(), e),
                }
            }
        }
        playlists.sort_by_key(|p| p.timestamp);

        let position_path = self.position_path();
        let position = if position_path.is_file() {
            match serde_json::from_slice::<PlayPosition>(&fs::read(&position_path)?) {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!("Ignoring unreadable play position: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok((playlists, position))
    }

    pub fn write(&self, snapshot: &DirtySnapshot) -> Result<(), PlaylistError> {
        fs::create_dir_all(self.playlist_dir())?;
        for playlist in &snapshot.playlists {
            write_atomic(&self.playlist_path(&playlist.id), &serde_json::to_vec_pretty(playlist.as_ref())?)?;
        }
        for id in &snapshot.removed {
            let path = self.playlist_path(id);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        if let Some(position) = &snapshot.position {
            write_atomic(&self.position_path(), &serde_json::to_vec_pretty(position)?)?;
        }
        Ok(())
    }
}

/// Parse a playlist file
pub fn read_playlist(path: &Path) -> Result<Playlist, PlaylistError> {
    let text = fs::read(path)?;
    let playlist: Playlist = serde_json::from_slice(&text)?;
    if playlist.id.is_empty() {
        return Err(PlaylistError::InvalidFormat(format!("{}: playlist id is empty", path.display())));
    }
    Ok(playlist)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PlaylistError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// File-system name for an id or path: a readable, sanitised prefix plus
/// a digest of the full name, so distinct names never share a file.
pub fn storage_name(name: &str) -> String {
    let readable: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .chars()
        .take(READABLE_NAME_LEN)
        .collect();
    let digest = Sha256::digest(name.as_bytes());
    format!("{}-{}", readable, hex::encode(&digest[..16]))
}
