//! Per-session server resources
//!
//! Bitmaps, cursors, fonts, recorded pictures and direct-window areas are
//! addressed by 32-bit tokens. Each kind lives in its own [`TokenSpace`];
//! a [`SessionResources`] bundles them for one desktop session.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::direct::{DirectWindowSession, Semaphore};
use crate::error::ServerError;
use crate::geometry::{Point, Rgba};
use crate::picture::ServerPicture;

/// Token to value map with an optional capacity limit.
#[derive(Debug)]
pub struct TokenSpace<T> {
    name: &'static str,
    items: RwLock<HashMap<u32, Arc<T>>>,
    next: AtomicU32,
    limit: usize,
}

impl<T> TokenSpace<T> {
    pub fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            items: RwLock::new(HashMap::new()),
            next: AtomicU32::new(1),
            limit,
        }
    }

    /// Stores `value` under a fresh token.
    pub fn insert(&self, value: T) -> Result<u32, ServerError> {
        let mut items = self.items.write();
        if items.len() >= self.limit {
            return Err(ServerError::ResourceExhausted(self.name));
        }
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        items.insert(token, Arc::new(value));
        Ok(token)
    }

    /// Stores a value built from its own token.
    pub fn insert_with<F>(&self, build: F) -> Result<(u32, Arc<T>), ServerError>
    where
        F: FnOnce(u32) -> T,
    {
        let mut items = self.items.write();
        if items.len() >= self.limit {
            return Err(ServerError::ResourceExhausted(self.name));
        }
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(build(token));
        items.insert(token, value.clone());
        Ok((token, value))
    }

    /// Replaces the value behind an existing token.
    pub fn replace(&self, token: u32, value: T) -> Result<(), ServerError> {
        let mut items = self.items.write();
        match items.get_mut(&token) {
            Some(slot) => {
                *slot = Arc::new(value);
                Ok(())
            }
            None => Err(ServerError::BadToken(token)),
        }
    }

    pub fn get(&self, token: u32) -> Option<Arc<T>> {
        self.items.read().get(&token).cloned()
    }

    pub fn remove(&self, token: u32) -> Option<Arc<T>> {
        self.items.write().remove(&token)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An immutable RGBA32 bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Rgba>,
}

impl ServerBitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<Rgba>) -> Result<Self, ServerError> {
        if pixels.len() != (width as usize) * (height as usize) {
            return Err(ServerError::BadValue("bitmap pixel count"));
        }
        Ok(Self { width, height, pixels })
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; (width as usize) * (height as usize)],
        }
    }

    pub fn average_color(&self) -> Rgba {
        if self.pixels.is_empty() {
            return Rgba::new(0, 0, 0, 0);
        }
        let n = self.pixels.len() as u64;
        let sum = self.pixels.iter().fold([0u64; 4], |mut acc, p| {
            acc[0] += p.red as u64;
            acc[1] += p.green as u64;
            acc[2] += p.blue as u64;
            acc[3] += p.alpha as u64;
            acc
        });
        Rgba::new(
            (sum[0] / n) as u8,
            (sum[1] / n) as u8,
            (sum[2] / n) as u8,
            (sum[3] / n) as u8,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ServerCursor {
    pub hotspot: Point,
    pub bitmap: Arc<ServerBitmap>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontInfo {
    pub family: String,
    pub style: String,
    pub size: f32,
}

impl Default for FontInfo {
    fn default() -> Self {
        Self {
            family: "Sans".to_string(),
            style: "Regular".to_string(),
            size: 12.0,
        }
    }
}

/// Font lookup. Token 0 is always the default font.
#[derive(Debug)]
pub struct FontManager {
    fonts: TokenSpace<FontInfo>,
    default: Arc<FontInfo>,
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: TokenSpace::new("fonts", usize::MAX),
            default: Arc::new(FontInfo::default()),
        }
    }

    pub fn register(&self, font: FontInfo) -> Result<u32, ServerError> {
        self.fonts.insert(font)
    }

    pub fn get(&self, token: u32) -> Option<Arc<FontInfo>> {
        if token == 0 {
            return Some(self.default.clone());
        }
        self.fonts.get(token)
    }

    pub fn default_font(&self) -> Arc<FontInfo> {
        self.default.clone()
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Every token space of one session.
#[derive(Debug)]
pub struct SessionResources {
    pub bitmaps: TokenSpace<ServerBitmap>,
    pub cursors: TokenSpace<ServerCursor>,
    pub fonts: FontManager,
    pub pictures: TokenSpace<ServerPicture>,
    pub direct_areas: TokenSpace<DirectWindowSession>,
    pub semaphores: TokenSpace<Semaphore>,
}

impl SessionResources {
    pub fn new(max_pictures: usize) -> Self {
        Self {
            bitmaps: TokenSpace::new("bitmaps", usize::MAX),
            cursors: TokenSpace::new("cursors", usize::MAX),
            fonts: FontManager::new(),
            pictures: TokenSpace::new("pictures", max_pictures),
            direct_areas: TokenSpace::new("direct areas", 256),
            semaphores: TokenSpace::new("semaphores", 512),
        }
    }

    /// Direct window session registered under `area_id`.
    pub fn direct_session(&self, area_id: i32) -> Option<Arc<DirectWindowSession>> {
        u32::try_from(area_id).ok().and_then(|id| self.direct_areas.get(id))
    }

    pub fn semaphore(&self, sem_id: i32) -> Option<Arc<Semaphore>> {
        u32::try_from(sem_id).ok().and_then(|id| self.semaphores.get(id))
    }

    /// Registers a cursor image; the bitmap must be non-empty.
    pub fn add_cursor(&self, bitmap: Arc<ServerBitmap>, hotspot: Point) -> Result<u32, ServerError> {
        if bitmap.width == 0 || bitmap.height == 0 {
            return Err(ServerError::BadValue("cursor bitmap"));
        }
        self.cursors.insert(ServerCursor { hotspot, bitmap })
    }

    pub fn cursor(&self, token: u32) -> Option<Arc<ServerCursor>> {
        self.cursors.get(token)
    }
}
