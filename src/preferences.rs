// SPDX-License-Identifier: MPL-2.0

//! # Display Preferences
//!
//! Background theme and brightness, persisted as a flat JSON object under
//! fixed keys so other tools can read them:
//!
//! ```text
//! {
//!   "repeater-monitor.background": "topo",
//!   "repeater-monitor.brightness": 80
//! }
//! ```
//!
//! Changes are saved immediately and announced on a broadcast channel;
//! the live view listens and re-themes without restarting.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

pub const BACKGROUND_KEY: &str = "repeater-monitor.background";
pub const BRIGHTNESS_KEY: &str = "repeater-monitor.brightness";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    #[default]
    Default,
    Dark,
    Mesh,
    Topo,
    Aurora,
    Plain,
}

impl Background {
    pub const ALL: [Background; 6] = [
        Background::Default,
        Background::Dark,
        Background::Mesh,
        Background::Topo,
        Background::Aurora,
        Background::Plain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Background::Default => "default",
            Background::Dark => "dark",
            Background::Mesh => "mesh",
            Background::Topo => "topo",
            Background::Aurora => "aurora",
            Background::Plain => "plain",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub background: Background,
    /// 0 to 100
    pub brightness: u8,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            background: Background::Default,
            brightness: 100,
        }
    }
}

impl Preferences {
    /// Read known keys from a flat JSON object; bad values fall back to defaults.
    fn from_map(map: &Map<String, Value>) -> Self {
        let mut prefs = Self::default();
        match map.get(BACKGROUND_KEY) {
            Some(Value::String(name)) => match Background::parse(name) {
                Some(bg) => prefs.background = bg,
                None => log::warn!("Unknown background {name:?}, using default"),
            },
            Some(other) => log::warn!("Ignoring non-string background {other}"),
            None => {}
        }
        if let Some(value) = map.get(BRIGHTNESS_KEY) {
            match value.as_u64() {
                Some(b) => prefs.brightness = b.min(100) as u8,
                None => log::warn!("Ignoring invalid brightness {value}"),
            }
        }
        prefs
    }

    fn write_into(&self, map: &mut Map<String, Value>) {
        map.insert(BACKGROUND_KEY.into(), Value::from(self.background.name()));
        map.insert(BRIGHTNESS_KEY.into(), Value::from(self.brightness));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceEvent {
    BackgroundChanged(Background),
    BrightnessChanged(u8),
}

/// Persisted preferences plus change notifications.
pub struct PreferenceStore {
    path: PathBuf,
    current: Preferences,
    /// Whole file, so keys written by other tools survive a save.
    raw: Map<String, Value>,
    events: broadcast::Sender<PreferenceEvent>,
}

impl PreferenceStore {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = read_map(&path)?;
        let current = Preferences::from_map(&raw);
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            path,
            current,
            raw,
            events,
        })
    }

    pub fn get(&self) -> Preferences {
        self.current
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreferenceEvent> {
        self.events.subscribe()
    }

    pub fn set_background(&mut self, background: Background) -> Result<()> {
        if self.current.background == background {
            return Ok(());
        }
        self.current.background = background;
        self.save()?;
        self.emit(PreferenceEvent::BackgroundChanged(background));
        Ok(())
    }

    /// Set brightness, clamped to 100.
    pub fn set_brightness(&mut self, brightness: u8) -> Result<()> {
        let brightness = brightness.min(100);
        if self.current.brightness == brightness {
            return Ok(());
        }
        self.current.brightness = brightness;
        self.save()?;
        self.emit(PreferenceEvent::BrightnessChanged(brightness));
        Ok(())
    }

    /// Re-read the file and emit an event for each preference another
    /// process changed. Returns whether anything changed.
    pub fn reload(&mut self) -> Result<bool> {
        let raw = read_map(&self.path)?;
        let fresh = Preferences::from_map(&raw);
        let previous = std::mem::replace(&mut self.current, fresh);
        self.raw = raw;

        if previous.background != fresh.background {
            log::info!("Background changed on disk to {}", fresh.background.name());
            self.emit(PreferenceEvent::BackgroundChanged(fresh.background));
        }
        if previous.brightness != fresh.brightness {
            log::info!("Brightness changed on disk to {}", fresh.brightness);
            self.emit(PreferenceEvent::BrightnessChanged(fresh.brightness));
        }
        Ok(previous != fresh)
    }

    fn emit(&self, event: PreferenceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn save(&mut self) -> Result<()> {
        self.current.write_into(&mut self.raw);
        let contents = serde_json::to_string_pretty(&self.raw)?;
        std::fs::write(&self.path, contents)?;
        log::debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }
}

/// The file as a flat JSON object. A missing file is an empty object.
fn read_map(path: &Path) -> Result<Map<String, Value>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => Ok(map),
            _ => {
                log::warn!("{} is not a JSON object, starting fresh", path.display());
                Ok(Map::new())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::load(dir.path().join("prefs.json")).unwrap();
        assert_eq!(store.get(), Preferences::default());
    }

    #[test]
    fn test_round_trip_through_fixed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"other.tool": true}"#).unwrap();

        let mut store = PreferenceStore::load(&path).unwrap();
        store.set_background(Background::Topo).unwrap();
        store.set_brightness(250).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[BACKGROUND_KEY], "topo");
        assert_eq!(raw[BRIGHTNESS_KEY], 100);
        assert_eq!(raw["other.tool"], true);

        let reloaded = PreferenceStore::load(&path).unwrap();
        assert_eq!(reloaded.get().background, Background::Topo);
    }

    #[test]
    fn test_changes_are_broadcast_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PreferenceStore::load(dir.path().join("p.json")).unwrap();
        let mut rx = store.subscribe();

        store.set_brightness(40).unwrap();
        store.set_brightness(40).unwrap();
        store.set_background(Background::Dark).unwrap();

        assert_eq!(rx.try_recv().unwrap(), PreferenceEvent::BrightnessChanged(40));
        assert_eq!(
            rx.try_recv().unwrap(),
            PreferenceEvent::BackgroundChanged(Background::Dark)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bad_values_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(
            &path,
            format!(r#"{{"{BACKGROUND_KEY}": "neon", "{BRIGHTNESS_KEY}": "bright"}}"#),
        )
        .unwrap();
        assert_eq!(PreferenceStore::load(&path).unwrap().get(), Preferences::default());
    }

    #[test]
    fn test_reload_picks_up_other_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let mut live = PreferenceStore::load(&path).unwrap();
        let mut rx = live.subscribe();

        let mut settings = PreferenceStore::load(&path).unwrap();
        settings.set_background(Background::Topo).unwrap();
        settings.set_brightness(60).unwrap();
        assert_eq!(live.get().background, Background::Default);

        assert!(live.reload().unwrap());
        assert_eq!(live.get().background, Background::Topo);
        assert_eq!(live.get().brightness, 60);
        assert_eq!(
            rx.try_recv().unwrap(),
            PreferenceEvent::BackgroundChanged(Background::Topo)
        );
        assert_eq!(rx.try_recv().unwrap(), PreferenceEvent::BrightnessChanged(60));

        assert!(!live.reload().unwrap());
        assert!(rx.try_recv().is_err());
    }
}
