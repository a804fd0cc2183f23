//! Runtime configuration
//!
//! Every knob has a compiled-in default and an environment override.
//! The binary loads `.env` first, so the same variables work from a file.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_STORE_PATH: &str = "state/vector_store.json";
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_MAX_TEXT_CHARS: usize = 8_000;
pub const DEFAULT_OLLAMA_API: &str = "http://localhost:11434/api";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 3001;

/// Read `key` and parse it, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Flat embedding store settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// JSON file holding the persisted entries
    pub path: PathBuf,
    /// FIFO capacity; the oldest entry is evicted beyond this
    pub max_entries: usize,
    /// Stored and embedded text is cut to this many characters
    pub max_text_chars: usize,
    /// Characters of entry text returned in search hits
    pub display_chars: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            display_chars: 500,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: env::var("SEMANTIC_MEMORY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_entries: env_or("SEMANTIC_MEMORY_MAX_ENTRIES", defaults.max_entries).max(1),
            max_text_chars: env_or("SEMANTIC_MEMORY_MAX_TEXT", defaults.max_text_chars).max(1),
            display_chars: defaults.display_chars,
        }
    }

    /// Store rooted at `path` with default limits.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Ollama embedding endpoint settings
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
    pub max_text_chars: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_OLLAMA_API.to_string(),
            model: DEFAULT_EMBED_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_EMBED_TIMEOUT_SECS),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }
}

impl EmbedderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env::var("OLLAMA_API").unwrap_or(defaults.api_base),
            model: env::var("SEMANTIC_MEMORY_EMBED_MODEL").unwrap_or(defaults.model),
            timeout: Duration::from_secs(env_or(
                "SEMANTIC_MEMORY_EMBED_TIMEOUT_SECS",
                DEFAULT_EMBED_TIMEOUT_SECS,
            )),
            max_text_chars: env_or("SEMANTIC_MEMORY_MAX_TEXT", defaults.max_text_chars).max(1),
        }
    }
}

/// Fractal index tuning
#[derive(Debug, Clone)]
pub struct FractalConfig {
    /// Nodes kept per beam step
    pub beam_width: usize,
    /// Results returned when the caller does not ask for a count
    pub top_k: usize,
    /// Leaves shorter than this are not embedded
    pub min_leaf_chars: usize,
    /// Text preview length for internal nodes emitted as results
    pub preview_chars: usize,
    /// Leaf text sent to the provider is cut to this many characters
    pub max_text_chars: usize,
}

impl Default for FractalConfig {
    fn default() -> Self {
        Self {
            beam_width: 3,
            top_k: 5,
            min_leaf_chars: 10,
            preview_chars: 500,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }
}

/// HTTP adapter settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("SEMANTIC_MEMORY_PORT", DEFAULT_PORT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("SEMANTIC_MEMORY_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("SEMANTIC_MEMORY_TEST_GARBAGE", 42usize), 42);
        std::env::set_var("SEMANTIC_MEMORY_TEST_GOOD", " 7 ");
        assert_eq!(env_or("SEMANTIC_MEMORY_TEST_GOOD", 42usize), 7);
        assert_eq!(env_or("SEMANTIC_MEMORY_TEST_UNSET_KEY", 3u16), 3);
    }

    #[test]
    fn test_defaults() {
        let store = StoreConfig::default();
        assert_eq!(store.max_entries, 10_000);
        assert_eq!(store.max_text_chars, 8_000);

        let fractal = FractalConfig::default();
        assert_eq!(fractal.beam_width, 3);
        assert_eq!(fractal.top_k, 5);
    }
}
