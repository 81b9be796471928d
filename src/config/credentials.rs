//! Station credentials and retry policy.
//!
//! These types are platform-independent and can be tested on the host.
//!
//! # Example
//!
//! ```
//! use prism_wifi::config::{ConnectionPolicy, Credentials};
//!
//! let credentials = Credentials::new("MyNetwork", "MyPassword").unwrap();
//! assert!(!credentials.is_open());
//!
//! let policy = ConnectionPolicy::default();
//! assert_eq!(policy.max_retries(), 50);
//! ```

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum passphrase length for WPA2.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Consecutive reconnects allowed before an attempt is reported as failed.
pub const DEFAULT_MAX_RETRIES: u32 = 50;

/// Network name and passphrase for the station interface.
///
/// Immutable once constructed. The passphrase is wiped from memory on drop
/// and never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    ssid: String,
    password: String,
}

impl Credentials {
    /// Create credentials for a WPA2-protected network.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let credentials = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Create credentials for an open network (no passphrase).
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new())
    }

    /// Network name.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Passphrase, empty for open networks.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Check if this is an open network.
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        // Empty is an open network
        if !self.password.is_empty() && self.password.len() < MIN_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooShort {
                len: self.password.len(),
                min: MIN_PASSWORD_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }

        Ok(())
    }

    /// Serialize for NVS storage.
    ///
    /// Format: `[ssid_len:1][ssid:N][password_len:1][password:M]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.ssid.len() + self.password.len());
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.password.len() as u8);
        bytes.extend_from_slice(self.password.as_bytes());
        bytes
    }

    /// Deserialize from the NVS format written by [`Credentials::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let (&ssid_len, rest) = bytes
            .split_first()
            .ok_or_else(|| ConfigError::InvalidFormat("empty data".into()))?;
        let ssid_len = ssid_len as usize;
        if rest.len() < ssid_len + 1 {
            return Err(ConfigError::InvalidFormat("truncated SSID".into()));
        }
        let (ssid, rest) = rest.split_at(ssid_len);

        let password_len = rest[0] as usize;
        let rest = &rest[1..];
        if rest.len() < password_len {
            return Err(ConfigError::InvalidFormat("truncated password".into()));
        }

        let ssid = std::str::from_utf8(ssid)
            .map_err(|_| ConfigError::InvalidFormat("invalid SSID UTF-8".into()))?;
        let password = std::str::from_utf8(&rest[..password_len])
            .map_err(|_| ConfigError::InvalidFormat("invalid password UTF-8".into()))?;

        Self::new(ssid, password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &if self.is_open() { "" } else { "****" })
            .finish()
    }
}

/// Retry policy for one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionPolicy {
    max_retries: u32,
}

impl ConnectionPolicy {
    /// Policy allowing `max_retries` consecutive reconnects.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Maximum consecutive reconnects before the attempt fails.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self::with_max_retries(DEFAULT_MAX_RETRIES)
    }
}

/// Errors that can occur while building or decoding credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Passphrase is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Passphrase exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Invalid data format during deserialization.
    InvalidFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_credentials() {
        let credentials = Credentials::new("chateau rose", "pinkcastle").unwrap();
        assert_eq!(credentials.ssid(), "chateau rose");
        assert_eq!(credentials.password(), "pinkcastle");
        assert!(!credentials.is_open());
    }

    #[test]
    fn test_open_network() {
        let credentials = Credentials::open("OpenNetwork").unwrap();
        assert!(credentials.is_open());
        assert_eq!(credentials.password(), "");
    }

    #[test]
    fn test_empty_ssid() {
        assert_eq!(
            Credentials::new("", "password123"),
            Err(ConfigError::SsidEmpty)
        );
    }

    #[test]
    fn test_ssid_length_limit() {
        assert!(Credentials::new("a".repeat(32), "password123").is_ok());
        assert!(matches!(
            Credentials::new("a".repeat(33), "password123"),
            Err(ConfigError::SsidTooLong { len: 33, max: 32 })
        ));
    }

    #[test]
    fn test_password_length_limits() {
        assert!(matches!(
            Credentials::new("Net", "short"),
            Err(ConfigError::PasswordTooShort { len: 5, min: 8 })
        ));
        assert!(Credentials::new("Net", "12345678").is_ok());
        assert!(Credentials::new("Net", "a".repeat(64)).is_ok());
        assert!(matches!(
            Credentials::new("Net", "a".repeat(65)),
            Err(ConfigError::PasswordTooLong { len: 65, max: 64 })
        ));
    }

    #[test]
    fn test_nvs_format() {
        let credentials = Credentials::new("ab", "12345678").unwrap();
        let bytes = credentials.to_bytes();
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..3], b"ab");
        assert_eq!(bytes[3], 8);
        assert_eq!(Credentials::from_bytes(&bytes).unwrap(), credentials);
    }

    #[test]
    fn test_decode_open_network() {
        let restored = Credentials::from_bytes(&[3, b'n', b'e', b't', 0]).unwrap();
        assert!(restored.is_open());
        assert_eq!(restored.ssid(), "net");
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            Credentials::from_bytes(&[]),
            Err(ConfigError::InvalidFormat(_))
        ));
        // Missing 'o' and the password length byte
        assert!(matches!(
            Credentials::from_bytes(&[5, b'h', b'e', b'l', b'l']),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            Credentials::from_bytes(&[1, b'x', 8, b'1', b'2']),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            Credentials::from_bytes(&[2, 0xff, 0xfe, 0]),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_decoded_credentials_are_validated() {
        // Well-formed bytes, but a 3-byte passphrase is too short for WPA2
        let result = Credentials::from_bytes(&[1, b'x', 3, b'a', b'b', b'c']);
        assert!(matches!(result, Err(ConfigError::PasswordTooShort { .. })));
    }

    #[test]
    fn test_debug_hides_password() {
        let credentials = Credentials::new("Home", "supersecret").unwrap();
        let debug_str = format!("{:?}", credentials);
        assert!(debug_str.contains("Home"));
        assert!(!debug_str.contains("supersecret"));
    }

    #[test]
    fn test_default_policy() {
        assert_eq!(ConnectionPolicy::default().max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(ConnectionPolicy::with_max_retries(3).max_retries(), 3);
    }
}
