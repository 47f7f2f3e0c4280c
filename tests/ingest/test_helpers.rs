//! Shared test helpers: in-memory collaborators, archive fixtures and sealing.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use package_ingest_lib::config::{ENCRYPTION_KEY_LEN, EncryptionKey, IngestSettings};
use package_ingest_lib::db::PersistenceGateway;
use package_ingest_lib::error::{AppError, AppResult};
use package_ingest_lib::models::{
    CompletionNotice, ManifestEntry, ManifestField, RequestStatusRecord,
};
use package_ingest_lib::services::content_hash;
use package_ingest_lib::services::{CompletionNotifier, IngestPipeline, ObjectStore};

/// Preset file shared by the fixtures.
pub const PRESET: &[u8] =
    br#"{"name": "studio", "parameters": {"exposure": 1.5, "gamma": 2.2}}"#;

/// Object key the fixture preset is stored under.
pub fn preset_key() -> String {
    format!("psf/{}.psf", content_hash::preset_digest(PRESET).unwrap())
}

// === In-memory collaborators ===

#[derive(Default)]
pub struct MemoryGateway {
    pub entries: Mutex<Vec<ManifestEntry>>,
    pub statuses: Mutex<HashMap<Uuid, RequestStatusRecord>>,
    pub fail_inserts: bool,
}

impl MemoryGateway {
    /// Gateway whose manifest inserts always fail.
    pub fn failing_inserts() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn find_manifests(
        &self,
        field: ManifestField,
        value: &str,
    ) -> AppResult<Vec<ManifestEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.field(field) == value)
            .cloned()
            .collect())
    }

    async fn insert_manifests(&self, entries: &[ManifestEntry]) -> AppResult<usize> {
        if self.fail_inserts {
            return Err(AppError::Database("connection reset".to_string()));
        }
        self.entries.lock().unwrap().extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn delete_manifests(&self, field: ManifestField, value: &str) -> AppResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|entry| entry.field(field) != value);
        Ok((before - entries.len()) as u64)
    }

    async fn upsert_status(&self, record: &RequestStatusRecord) -> AppResult<()> {
        self.statuses
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get_status(&self, id: Uuid) -> AppResult<Option<RequestStatusRecord>> {
        Ok(self.statuses.lock().unwrap().get(&id).cloned())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub puts: Mutex<HashMap<String, usize>>,
    pub fail_keys: Vec<String>,
    pub delay: Option<Duration>,
}

impl MemoryStore {
    pub fn failing(keys: &[&str]) -> Self {
        Self {
            fail_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Store whose every put takes `delay` before landing.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn put_count(&self, key: &str) -> usize {
        self.puts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_puts(&self) -> usize {
        self.puts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn object_exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn put_object(&self, key: &str, data: Vec<u8>) -> AppResult<String> {
        *self.puts.lock().unwrap().entry(key.to_string()).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_keys.iter().any(|k| k == key) {
            return Err(AppError::Storage(format!("rejected '{}'", key)));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(format!("mem://bucket/{}", key))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<CompletionNotice>>,
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingNotifier {
    /// Notifier that counts calls but never delivers.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, notice: &CompletionNotice) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Webhook("503 Service Unavailable".to_string()));
        }
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

// === Pipeline wiring ===

pub struct Harness {
    pub dir: TempDir,
    pub key: EncryptionKey,
    pub gateway: Arc<MemoryGateway>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub pipeline: Arc<IngestPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::default())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self::build(
            MemoryGateway::default(),
            store,
            RecordingNotifier::default(),
            |_| {},
        )
    }

    /// Harness over the given collaborators; `tune` adjusts the settings.
    pub fn build(
        gateway: MemoryGateway,
        store: MemoryStore,
        notifier: RecordingNotifier,
        tune: impl FnOnce(&mut IngestSettings),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let key = EncryptionKey::new([7u8; ENCRYPTION_KEY_LEN]);

        let mut settings = IngestSettings::with_defaults(dir.path().to_path_buf(), key.clone());
        settings.upload_workers = 2;
        settings.queue_capacity = 2;
        settings.user = "ops@example.com".to_string();
        tune(&mut settings);

        let gateway = Arc::new(gateway);
        let store = Arc::new(store);
        let notifier = Arc::new(notifier);

        let pipeline = Arc::new(IngestPipeline::new(
            settings,
            gateway.clone(),
            store.clone(),
            notifier.clone(),
        ));

        Self {
            dir,
            key,
            gateway,
            store,
            notifier,
            pipeline,
        }
    }

    pub fn seal(&self, archive: &[u8]) -> Vec<u8> {
        seal(archive, &self.key)
    }

    pub fn status(&self, request_id: Uuid) -> RequestStatusRecord {
        self.gateway
            .statuses
            .lock()
            .unwrap()
            .get(&request_id)
            .cloned()
            .expect("status record should exist")
    }

    pub fn work_dir_exists(&self, request_id: Uuid) -> bool {
        self.dir.path().join(request_id.to_string()).exists()
    }
}

// === Fixtures ===

/// AES-256-GCM seal with a random nonce prefix.
pub fn seal(plaintext: &[u8], key: &EncryptionKey) -> Vec<u8> {
    let cipher = Aes256Gcm::new_from_slice(key.expose()).unwrap();
    let nonce_bytes = *Uuid::new_v4().as_bytes();
    let nonce = &nonce_bytes[..12];
    let mut payload = nonce.to_vec();
    payload.extend(cipher.encrypt(Nonce::from_slice(nonce), plaintext).unwrap());
    payload
}

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Two entries, two images, one preset and one model file.
pub fn car_manifest() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!([
        {
            "file_name": "car.obj",
            "image_file_names": ["front.png", "side.png"],
            "psf_file_name": "studio.psf",
            "sharpness": 0.93
        },
        {
            "file_name": "car_lod1.obj",
            "image_file_names": ["front.png"],
            "psf_file_name": "",
            "sharpness": 0.71
        }
    ]))
    .unwrap()
}

pub fn car_archive() -> Vec<u8> {
    let manifest = car_manifest();
    build_zip(&[
        ("img/front.png", b"front-png"),
        ("img/side.png", b"side-png"),
        ("psf/studio.psf", PRESET),
        ("car.obj", b"v 0 0 0"),
        ("info.json", manifest.as_slice()),
    ])
}

/// Hand-built multipart body with a single file field.
pub fn multipart_body(field: &str, file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "ingest-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
