use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::Connection;
use thiserror::Error;

use facewatch_core::{Embedding, EmbeddingGallery, GalleryEntry};

/// Dimensionality of the face embeddings this store accepts.
pub const EMBEDDING_DIM: usize = 128;
const EMBEDDING_BYTE_LEN: usize = EMBEDDING_DIM * 4;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("embedding encryption failed")]
    EncryptionFailed,
    #[error("embedding decryption failed — key mismatch or corrupted data")]
    DecryptionFailed,
    #[error("invalid embedding blob size: {0} bytes")]
    InvalidBlob(usize),
    #[error("invalid embedding dimension: {0} (expected {EMBEDDING_DIM})")]
    InvalidEmbeddingDim(usize),
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidEmbeddingValue,
    #[error("encryption key I/O error: {0}")]
    KeyIo(#[source] std::io::Error),
}

/// SQLite-backed embedding gallery with AES-256-GCM encryption at rest.
///
/// The gallery blob format is opaque to the rest of the system: embeddings
/// are encrypted before storage and decrypted on load. A per-installation
/// 32-byte key is generated at first use and stored as `{db_dir}/.key`
/// (mode 0600).
pub struct GalleryStore {
    conn: Connection,
    enc_key: [u8; 32],
}

impl GalleryStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let key_path = db_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(".key");
        let enc_key = load_or_generate_key(&key_path)?;

        let conn = Connection::open(db_path)?;
        Self::init(conn, enc_key)
    }

    /// In-memory store with a fixed all-zeros key, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, [0u8; 32])
    }

    fn init(conn: Connection, enc_key: [u8; 32]) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS gallery (
                 id TEXT PRIMARY KEY,
                 label TEXT NOT NULL,
                 embedding BLOB NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_gallery_label ON gallery(label);",
        )?;
        Ok(Self { conn, enc_key })
    }

    /// Insert one embedding under a label. Returns the generated row id.
    pub fn insert(&self, label: &str, embedding: &Embedding) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        let blob = self.encrypt_embedding(&embedding.values)?;

        self.conn.execute(
            "INSERT INTO gallery (id, label, embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, label, blob, created_at],
        )?;
        Ok(id)
    }

    /// Load the whole gallery in insertion order. This is the immutable
    /// matching set for a run; it is read once at startup.
    pub fn load_gallery(&self) -> Result<EmbeddingGallery, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT label, embedding FROM gallery ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (label, blob) in rows {
            let values = self.decrypt_embedding(&blob)?;
            entries.push(GalleryEntry {
                label,
                embedding: Embedding::new(values),
            });
        }
        Ok(EmbeddingGallery::new(entries))
    }

    /// List entry metadata (no embedding data), insertion order.
    pub fn list(&self) -> Result<Vec<EntryInfo>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, label, created_at FROM gallery ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EntryInfo {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Remove an entry by id. Returns whether a row was deleted.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM gallery WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Total enrolled embeddings.
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM gallery", [], |row| row.get(0))?;
        Ok(count)
    }

    // ── Encryption helpers ───────────────────────────────────────────────

    /// Blob layout: 12-byte random nonce || ciphertext || 16-byte GCM tag.
    fn encrypt_embedding(&self, values: &[f32]) -> Result<Vec<u8>, StoreError> {
        validate_embedding_values(values)?;

        let mut plaintext = Vec::with_capacity(EMBEDDING_BYTE_LEN);
        for &v in values {
            plaintext.extend_from_slice(&v.to_le_bytes());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.enc_key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| StoreError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn decrypt_embedding(&self, blob: &[u8]) -> Result<Vec<f32>, StoreError> {
        if blob.len() <= NONCE_LEN {
            return Err(StoreError::InvalidBlob(blob.len()));
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.enc_key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| StoreError::DecryptionFailed)?;

        if plaintext.len() != EMBEDDING_BYTE_LEN {
            return Err(StoreError::InvalidBlob(plaintext.len()));
        }

        let mut values = Vec::with_capacity(EMBEDDING_DIM);
        for chunk in plaintext.chunks_exact(4) {
            let v = f32::from_le_bytes(chunk.try_into().expect("chunks_exact(4)"));
            if !v.is_finite() {
                return Err(StoreError::InvalidEmbeddingValue);
            }
            values.push(v);
        }
        Ok(values)
    }
}

/// Load the encryption key from disk, or generate and persist a new one
/// with mode 0600.
fn load_or_generate_key(key_path: &Path) -> Result<[u8; 32], StoreError> {
    if key_path.exists() {
        let bytes = std::fs::read(key_path).map_err(StoreError::KeyIo)?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            StoreError::KeyIo(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("encryption key file has wrong length ({} bytes)", bytes.len()),
            ))
        })?;
        tracing::debug!(path = %key_path.display(), "loaded encryption key");
        Ok(key)
    } else {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);

        use std::io::Write;
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut f = opts.open(key_path).map_err(StoreError::KeyIo)?;
        f.write_all(&key).map_err(StoreError::KeyIo)?;

        tracing::info!(path = %key_path.display(), "generated new AES-256 encryption key");
        Ok(key)
    }
}

fn validate_embedding_values(values: &[f32]) -> Result<(), StoreError> {
    if values.len() != EMBEDDING_DIM {
        return Err(StoreError::InvalidEmbeddingDim(values.len()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::InvalidEmbeddingValue);
    }
    Ok(())
}

/// Metadata about one gallery entry (no embedding data).
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntryInfo {
    pub id: String,
    pub label: String,
    pub created_at: String,
}
