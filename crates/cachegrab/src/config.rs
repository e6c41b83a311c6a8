//! Locating the cache root from the proxy's configuration file.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{GrabError, Result};

/// Cache root the proxy uses when its configuration does not set one.
pub const DEFAULT_CACHE_ROOT: &str = "/var/cache/polipo/";

/// Configuration files the proxy reads when started without `-c`.
pub const KNOWN_CONFIG_FILES: &[&str] = &["/etc/polipo/config", "~/.polipo"];

const DISK_CACHE_ROOT: &str = "diskCacheRoot";

/// Settings read from a Polipo configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Root directory of the on-disk cache.
    pub disk_cache_root: Option<PathBuf>,
}

impl CacheConfig {
    /// Load settings from a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GrabError::config(format!(
                "Config file parsing failed: {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&content).map_err(|e| match e {
            GrabError::Config(msg) => GrabError::config(format!(
                "Config file parsing failed: {}: {msg}",
                path.display()
            )),
            other => other,
        })
    }

    /// Parse `name = value` lines. Comments start with `#`; settings other
    /// than the cache root are accepted and ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();

        for (index, raw_line) in content.lines().enumerate() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            let Some((name, value)) = line.split_once('=') else {
                return Err(GrabError::config(format!(
                    "line {}: expected 'name = value', found '{line}'",
                    index + 1
                )));
            };

            let name = name.trim();
            let value = unquote(value.trim());

            if name == DISK_CACHE_ROOT {
                config.disk_cache_root = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
        }

        Ok(config)
    }

    /// Try the known configuration locations in order and return the first
    /// that loads.
    pub fn discover() -> Option<(PathBuf, Self)> {
        for candidate in KNOWN_CONFIG_FILES {
            let path = expand_tilde(Path::new(candidate));
            if !path.is_file() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => {
                    info!("Using configuration file {}", path.display());
                    return Some((path, config));
                }
                Err(e) => debug!("Skipping configuration file {}: {}", path.display(), e),
            }
        }
        None
    }
}

/// Drop a trailing `#` comment, leaving `#` inside quoted values alone.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Expand a leading `~` to the current user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Pick the cache root: an explicit override wins over the configuration
/// file, which wins over the built-in default.
pub fn resolve_cache_root(explicit: Option<&Path>, config: Option<&CacheConfig>) -> PathBuf {
    let root = explicit
        .map(Path::to_path_buf)
        .or_else(|| config.and_then(|c| c.disk_cache_root.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT));
    expand_tilde(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_quoted_cache_root() {
        let config = CacheConfig::parse(
            "# Polipo config\n\
             proxyAddress = \"0.0.0.0\"\n\
             diskCacheRoot = \"/srv/polipo/\"   # local disk\n\
             allowedClients = 127.0.0.1, 192.168.1.0/24\n",
        )
        .unwrap();
        assert_eq!(config.disk_cache_root, Some(PathBuf::from("/srv/polipo/")));
    }

    #[test]
    fn parses_unquoted_value_and_escapes() {
        let config = CacheConfig::parse("diskCacheRoot=/var/tmp/cache").unwrap();
        assert_eq!(config.disk_cache_root, Some(PathBuf::from("/var/tmp/cache")));

        let config = CacheConfig::parse(r#"diskCacheRoot = "/odd \"dir\" #1/""#).unwrap();
        assert_eq!(config.disk_cache_root, Some(PathBuf::from("/odd \"dir\" #1/")));
    }

    #[test]
    fn empty_value_disables_root() {
        let config = CacheConfig::parse("diskCacheRoot = \"\"").unwrap();
        assert_eq!(config.disk_cache_root, None);
    }

    #[test]
    fn malformed_line_is_config_error() {
        let err = CacheConfig::parse("diskCacheRoot /x\n").unwrap_err();
        assert!(matches!(err, GrabError::Config(_)));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "diskCacheRoot = \"/tmp/c/\"").unwrap();
        let config = CacheConfig::load(file.path()).unwrap();
        assert_eq!(config.disk_cache_root, Some(PathBuf::from("/tmp/c/")));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(CacheConfig::load(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn cache_root_precedence() {
        let config = CacheConfig {
            disk_cache_root: Some(PathBuf::from("/from/config")),
        };
        assert_eq!(
            resolve_cache_root(Some(Path::new("/explicit")), Some(&config)),
            PathBuf::from("/explicit")
        );
        assert_eq!(
            resolve_cache_root(None, Some(&config)),
            PathBuf::from("/from/config")
        );
        assert_eq!(
            resolve_cache_root(None, None),
            PathBuf::from(DEFAULT_CACHE_ROOT)
        );
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/.polipo")), home.join(".polipo"));
        }
        assert_eq!(expand_tilde(Path::new("/abs/~x")), PathBuf::from("/abs/~x"));
    }
}
