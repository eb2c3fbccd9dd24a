//! Persistent ed25519 identity of the node.
//!
//! The file holds the base58 public key next to the 64-byte secret||public
//! array, the layout Solana tooling reads.

use std::io;
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::KeypairError;

pub const KEYPAIR_FILE_NAME: &str = "pnode-keypair.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeypairFile {
    public_key: String,
    private_key: Vec<u8>,
}

/// Keypair file living in a fixed directory.
#[derive(Debug, Clone)]
pub struct KeypairStore {
    dir: PathBuf,
}

impl KeypairStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(KEYPAIR_FILE_NAME)
    }

    /// Generate and persist a new keypair, returning its base58 public key.
    ///
    /// Never overwrites an existing file.
    pub async fn generate(&self) -> Result<String, KeypairError> {
        let path = self.path();
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;

        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();
        let contents = serde_json::to_string_pretty(&KeypairFile {
            public_key: public_key.clone(),
            private_key: signing_key.to_keypair_bytes().to_vec(),
        })
        .map_err(|e| KeypairError::Invalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await.map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                KeypairError::AlreadyExists(path.clone())
            } else {
                io_error(&path, source)
            }
        })?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|source| io_error(&path, source))?;
        file.sync_all()
            .await
            .map_err(|source| io_error(&path, source))?;

        info!(path = %path.display(), public_key = %public_key, "Keypair generated");
        Ok(public_key)
    }

    /// Base58 public key of the stored keypair.
    ///
    /// The stored public key must match the one derived from the secret.
    pub async fn public_key(&self) -> Result<String, KeypairError> {
        let path = self.path();
        let contents = fs::read_to_string(&path).await.map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                KeypairError::NotFound(path.clone())
            } else {
                io_error(&path, source)
            }
        })?;

        let invalid = |reason: String| KeypairError::Invalid {
            path: path.clone(),
            reason,
        };
        let file: KeypairFile =
            serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
        let bytes: [u8; 64] = file.private_key.as_slice().try_into().map_err(|_| {
            invalid(format!(
                "expected 64 key bytes, found {}",
                file.private_key.len()
            ))
        })?;
        let signing_key =
            SigningKey::from_keypair_bytes(&bytes).map_err(|e| invalid(e.to_string()))?;

        let derived = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();
        if derived != file.public_key {
            return Err(invalid("public key does not match the secret key".to_string()));
        }
        Ok(derived)
    }
}

fn io_error(path: &Path, source: io::Error) -> KeypairError {
    KeypairError::Io {
        path: path.to_path_buf(),
        source,
    }
}
