use super::*;

/// Algorithm tier offered to the jump host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SecurityLevel {
    /// Modern algorithms only (default).
    Secure,
    /// Adds SHA-1 and CBC fallbacks for older jump hosts.
    Balanced,
    /// Everything russh can negotiate.
    LegacyCompatible,
}

/// How [`SshTransport`] negotiates and verifies the jump host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecurityOptions {
    pub level: SecurityLevel,
    pub server_check: ServerCheckMethod,
    /// Idle time after which the SSH connection is dropped.
    pub inactivity_timeout: Option<Duration>,
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::secure_default()
    }
}

impl ConnectionSecurityOptions {
    pub fn secure_default() -> Self {
        Self {
            level: SecurityLevel::Secure,
            server_check: ServerCheckMethod::DefaultKnownHostsFile,
            inactivity_timeout: None,
        }
    }

    pub fn balanced() -> Self {
        Self {
            level: SecurityLevel::Balanced,
            ..Self::secure_default()
        }
    }

    /// Broadest algorithm set and no host key verification.
    ///
    /// Matches lab jump hosts whose keys are regenerated on every rebuild.
    pub fn legacy_compatible() -> Self {
        Self {
            level: SecurityLevel::LegacyCompatible,
            server_check: ServerCheckMethod::NoCheck,
            inactivity_timeout: None,
        }
    }

    /// Sessions sit idle between scheduled ticks, so no inactivity timeout
    /// is set unless asked for.
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = Some(timeout);
        self
    }

    pub(super) fn preferred(&self) -> Preferred {
        let (kex, key, cipher, mac) = match self.level {
            SecurityLevel::Secure => (
                config::SECURE_KEX_ORDER,
                config::SECURE_KEY_TYPES,
                config::SECURE_CIPHERS,
                config::SECURE_MAC_ALGORITHMS,
            ),
            SecurityLevel::Balanced => (
                config::BALANCED_KEX_ORDER,
                config::BALANCED_KEY_TYPES,
                config::BALANCED_CIPHERS,
                config::BALANCED_MAC_ALGORITHMS,
            ),
            SecurityLevel::LegacyCompatible => (
                config::LEGACY_KEX_ORDER,
                config::LEGACY_KEY_TYPES,
                config::LEGACY_CIPHERS,
                config::LEGACY_MAC_ALGORITHMS,
            ),
        };
        Preferred {
            kex: Cow::Borrowed(kex),
            key: Cow::Borrowed(key),
            cipher: Cow::Borrowed(cipher),
            mac: Cow::Borrowed(mac),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        }
    }

    pub(super) fn ssh_config(&self) -> Config {
        Config {
            preferred: self.preferred(),
            inactivity_timeout: self.inactivity_timeout,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::{cipher, kex, mac};

    #[test]
    fn default_options_verify_host_keys() {
        let options = ConnectionSecurityOptions::default();
        assert_eq!(options.level, SecurityLevel::Secure);
        assert!(matches!(
            options.server_check,
            ServerCheckMethod::DefaultKnownHostsFile
        ));
        assert_eq!(options.inactivity_timeout, None);
    }

    #[test]
    fn legacy_options_skip_host_key_check() {
        let options = ConnectionSecurityOptions::legacy_compatible();
        assert!(matches!(options.server_check, ServerCheckMethod::NoCheck));
        assert!(options.preferred().kex.contains(&kex::DH_G1_SHA1));
        assert!(options.preferred().cipher.contains(&cipher::NONE));
    }

    #[test]
    fn secure_and_balanced_exclude_null_algorithms() {
        for options in [
            ConnectionSecurityOptions::secure_default(),
            ConnectionSecurityOptions::balanced(),
        ] {
            let preferred = options.preferred();
            assert!(preferred.kex.iter().all(|alg| *alg != kex::NONE));
            assert!(preferred.cipher.iter().all(|alg| *alg != cipher::NONE));
            assert!(preferred.cipher.iter().all(|alg| *alg != cipher::CLEAR));
            assert!(preferred.mac.iter().all(|alg| *alg != mac::NONE));
        }
    }

    #[test]
    fn inactivity_timeout_reaches_ssh_config() {
        let config = ConnectionSecurityOptions::balanced()
            .with_inactivity_timeout(Duration::from_secs(600))
            .ssh_config();
        assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(600)));
        assert!(config.preferred.mac.contains(&mac::HMAC_SHA1));
    }
}
