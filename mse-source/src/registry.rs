use crate::MediaSource;
use rand::Rng;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

/// Blob url to live media source mapping.
///
/// Entries are weak; a media source inserts itself on construction and
/// removes itself when dropped, so a lookup never yields a destroyed source.
#[derive(Default)]
pub struct Registry {
    sources: Mutex<HashMap<String, Weak<Mutex<MediaSource>>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sources(&self) -> MutexGuard<'_, HashMap<String, Weak<Mutex<MediaSource>>>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Panics
    ///
    /// If `url` is already registered.
    pub fn register(&self, url: &str, source: Weak<Mutex<MediaSource>>) {
        let previous = self.sources().insert(url.to_owned(), source);
        assert!(previous.is_none(), "MediaSource {} registered twice", url);
        log::debug!("registered {}", url);
    }

    /// # Panics
    ///
    /// If `url` is not registered.
    pub fn unregister(&self, url: &str) {
        let removed = self.sources().remove(url);
        assert!(removed.is_some(), "MediaSource {} is not registered", url);
        log::debug!("unregistered {}", url);
    }

    pub fn lookup(&self, url: &str) -> Option<Arc<Mutex<MediaSource>>> {
        self.sources().get(url).and_then(Weak::upgrade)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.sources().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.sources().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources().is_empty()
    }
}

/// A `blob:` url holding a random version 4 UUID.
pub fn random_url() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    let u16_at = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
    let u32_at =
        |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

    format!(
        "blob:{:08x}-{:04x}-{:04x}-{:04x}-{:08x}{:04x}",
        u32_at(0),
        u16_at(4),
        // Version 4 (random).
        (u16_at(6) & 0x0fff) | 0x4000,
        // Variant 0b10xx.
        (u16_at(8) & 0x3fff) | 0x8000,
        u32_at(10),
        u16_at(14)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn url_format() {
        let url = random_url();
        let uuid = url.strip_prefix("blob:").unwrap();
        let groups: Vec<&str> = uuid.split('-').collect();

        assert_eq!(
            groups.iter().map(|x| x.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(groups[2].starts_with('4'));
        assert!(matches!(groups[3].chars().next(), Some('8' | '9' | 'a' | 'b')));
        assert!(uuid.chars().all(|x| x == '-' || matches!(x, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn urls_do_not_repeat() {
        let urls: HashSet<String> = (0..1000).map(|_| random_url()).collect();
        assert_eq!(urls.len(), 1000);
    }

    #[test]
    fn unknown_url_is_absent() {
        let registry = Registry::new();
        assert!(registry.lookup("blob:nothing").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn unregister_requires_entry() {
        Registry::new().unregister("blob:nothing");
    }
}
