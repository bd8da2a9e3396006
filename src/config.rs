//! SSH algorithm tiers and pool tuning.
//!
//! The algorithm tables feed the SSH transport provider. Each tier is a
//! superset of the previous one so that jump hosts fronting old network
//! gear can still be reached with [`crate::session::SecurityLevel::LegacyCompatible`].
//!
//! [`PoolSettings`] and [`ProtocolTimings`] carry the polling constants of the
//! tunnel read loops. Defaults reproduce the behaviour expected by existing
//! deployments; tests shrink them to keep the loops fast.

use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Transport port used when a request does not name one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Smallest accepted schedule period, in the caller's time unit.
pub const MIN_SCHEDULE_PERIOD: u64 = 20;

/// Key exchange algorithms for the secure tier.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_GEX_SHA256,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
];

/// Key exchange algorithms for the balanced tier.
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_GEX_SHA256,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::DH_G14_SHA1,
    kex::DH_GEX_SHA1,
];

/// Every key exchange algorithm russh speaks, legacy included.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::NONE,
];

pub const SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub const BALANCED_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

pub const LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
    cipher::CLEAR,
    cipher::NONE,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
    mac::NONE,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
];

/// Polling constants for tunnel negotiation and command execution.
///
/// The read loops are bounded by idle counts, not wall-clock deadlines: a loop
/// gives up after `max_idle_reads` consecutive polls that returned no bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProtocolTimings {
    /// Sleep between reads while negotiating the telnet tunnel (ms).
    pub negotiation_poll_ms: u64,
    /// Sleep between reads while waiting for a command's sentinel (ms).
    pub command_poll_ms: u64,
    /// Consecutive empty reads tolerated before a loop gives up.
    pub max_idle_reads: u32,
    /// Upper bound on bytes returned by a single read.
    pub read_buffer_size: usize,
    /// Transport connect timeout (ms).
    pub connect_timeout_ms: u64,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            negotiation_poll_ms: 20,
            command_poll_ms: 35,
            max_idle_reads: 100,
            read_buffer_size: 2000,
            connect_timeout_ms: 3000,
        }
    }
}

impl ProtocolTimings {
    pub fn negotiation_poll(&self) -> Duration {
        Duration::from_millis(self.negotiation_poll_ms)
    }

    pub fn command_poll(&self) -> Duration {
        Duration::from_millis(self.command_poll_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// How a negotiation that ran out of idle reads is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IdleNegotiationPolicy {
    /// Treat silence as a connected tunnel (historical behaviour).
    #[default]
    AssumeConnected,
    /// Treat silence as a failed negotiation.
    AssumeDisconnected,
}

/// Settings for a [`crate::session::SessionPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of establishment tasks running at once.
    pub worker_threads: usize,
    pub timings: ProtocolTimings,
    pub idle_negotiation_policy: IdleNegotiationPolicy,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            worker_threads: 10,
            timings: ProtocolTimings::default(),
            idle_negotiation_policy: IdleNegotiationPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timings_match_deployed_values() {
        let timings = ProtocolTimings::default();
        assert_eq!(timings.negotiation_poll(), Duration::from_millis(20));
        assert_eq!(timings.command_poll(), Duration::from_millis(35));
        assert_eq!(timings.max_idle_reads, 100);
        assert_eq!(timings.read_buffer_size, 2000);
        assert_eq!(timings.connect_timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let settings: PoolSettings = serde_json::from_str(
            r#"{"worker_threads":4,"timings":{"command_poll_ms":5},"idle_negotiation_policy":"assume_disconnected"}"#,
        )
        .expect("parse settings");

        assert_eq!(settings.worker_threads, 4);
        assert_eq!(settings.timings.command_poll_ms, 5);
        assert_eq!(settings.timings.negotiation_poll_ms, 20);
        assert_eq!(
            settings.idle_negotiation_policy,
            IdleNegotiationPolicy::AssumeDisconnected
        );
    }

    #[test]
    fn legacy_tier_is_a_superset_of_secure_tier() {
        assert!(SECURE_KEX_ORDER.iter().all(|k| LEGACY_KEX_ORDER.contains(k)));
        assert!(SECURE_CIPHERS.iter().all(|c| LEGACY_CIPHERS.contains(c)));
        assert!(
            SECURE_MAC_ALGORITHMS
                .iter()
                .all(|m| LEGACY_MAC_ALGORITHMS.contains(m))
        );
    }
}
