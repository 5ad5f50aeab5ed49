use std::path::Path;

use ssh_key::PrivateKey;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyFormat {
    /// Legacy PEM `RSA PRIVATE KEY`.
    Rsa,
    /// Legacy PEM `EC PRIVATE KEY`.
    Ec,
    /// Legacy PEM `DSA PRIVATE KEY`.
    Dsa,
    Pkcs8,
    OpenSsh,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyStatus {
    Missing,
    Unreadable(String),
    Unencrypted(KeyFormat),
    Encrypted(KeyFormat),
    Unrecognized,
}

fn pem_label(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("-----BEGIN ")?.strip_suffix("-----"))
}

fn classify(text: &str) -> KeyStatus {
    let Some(label) = pem_label(text) else {
        return KeyStatus::Unrecognized;
    };

    let legacy = |format| {
        if text.lines().any(|l| l.trim() == "Proc-Type: 4,ENCRYPTED") {
            KeyStatus::Encrypted(format)
        } else {
            KeyStatus::Unencrypted(format)
        }
    };

    match label {
        "OPENSSH PRIVATE KEY" => match PrivateKey::from_openssh(text) {
            Ok(key) if key.is_encrypted() => KeyStatus::Encrypted(KeyFormat::OpenSsh),
            Ok(_) => KeyStatus::Unencrypted(KeyFormat::OpenSsh),
            Err(_) => KeyStatus::Unrecognized,
        },
        "ENCRYPTED PRIVATE KEY" => KeyStatus::Encrypted(KeyFormat::Pkcs8),
        "PRIVATE KEY" => KeyStatus::Unencrypted(KeyFormat::Pkcs8),
        "RSA PRIVATE KEY" => legacy(KeyFormat::Rsa),
        "EC PRIVATE KEY" => legacy(KeyFormat::Ec),
        "DSA PRIVATE KEY" => legacy(KeyFormat::Dsa),
        _ => KeyStatus::Unrecognized,
    }
}

/// Looks at a private key file without loading it into libssh2: which format it is in
/// and whether it is protected by a passphrase.
pub fn inspect_private_key(path: impl AsRef<Path>) -> KeyStatus {
    let path = path.as_ref();
    if !path.is_file() {
        return KeyStatus::Missing;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => classify(&text),
        Err(e) => KeyStatus::Unreadable(e.to_string()),
    }
}

/// Checks that the key file can be used: it exists, is a private key, and an encrypted
/// openssh key decrypts with `passphrase`. Legacy PEM keys are only checked for the
/// presence of a passphrase; libssh2 verifies it when authenticating.
///
/// Problems are logged; the caller decides whether to carry on.
pub fn validate_private_key(path: impl AsRef<Path>, passphrase: Option<&str>) -> bool {
    let path = path.as_ref();
    let status = inspect_private_key(path);

    match (status, passphrase) {
        (KeyStatus::Missing, _) => {
            warn!("Private key file {path:?} does not exist");
            false
        },
        (KeyStatus::Unreadable(reason), _) => {
            warn!("Private key file {path:?} could not be read: {reason}");
            false
        },
        (KeyStatus::Unrecognized, _) => {
            warn!("Private key file {path:?} is not in a recognized format");
            false
        },
        (KeyStatus::Encrypted(format), None) => {
            warn!("Private key {path:?} ({format:?}) is encrypted but no key_passphrase is configured");
            false
        },
        (KeyStatus::Encrypted(KeyFormat::OpenSsh), Some(passphrase)) => decrypts_with(path, passphrase),
        (KeyStatus::Encrypted(format), Some(_)) => {
            info!("Private key {path:?} ({format:?}) is encrypted; the passphrase is checked when authenticating");
            true
        },
        (KeyStatus::Unencrypted(format), passphrase) => {
            if passphrase.is_some() {
                info!("Private key {path:?} ({format:?}) is not encrypted; key_passphrase is not needed");
            } else {
                info!("Private key {path:?} ({format:?}) is not encrypted");
            }
            true
        },
    }
}

fn decrypts_with(path: &Path, passphrase: &str) -> bool {
    let decrypted = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| PrivateKey::from_openssh(text).map_err(|e| e.to_string()))
        .map(|key| key.decrypt(passphrase.as_bytes()));

    match decrypted {
        Ok(Ok(_)) => {
            info!("Private key {path:?} decrypted with the configured passphrase");
            true
        },
        Ok(Err(ssh_key::Error::Crypto)) => {
            warn!("Private key {path:?}: bad passphrase");
            false
        },
        Ok(Err(e)) => {
            warn!("Private key {path:?} could not be decrypted: {e}");
            false
        },
        Err(e) => {
            warn!("Private key {path:?} could not be loaded: {e}");
            false
        },
    }
}
