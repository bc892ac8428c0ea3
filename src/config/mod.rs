use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Extra room granted on top of the raw file sizes for multipart framing.
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

/// Configuration for the upload-validate pipeline
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory retained uploads live in (default: "public")
    pub upload_dir: PathBuf,

    /// Validator type: "http" or "noop" (default: "http")
    pub validator_type: String,

    /// Base URL of the image validation service (default: "http://localhost:8000")
    pub validator_base_url: String,

    /// Path of the validation endpoint on the service (default: "/validate-image")
    pub validator_path: String,

    /// Per-file timeout for the remote validation call in seconds (default: 10)
    pub validation_timeout_secs: u64,

    /// Maximum number of validation calls in flight per batch (default: 4)
    pub validation_concurrency: usize,

    /// Maximum number of files accepted in one request (default: 10)
    pub max_files_per_request: usize,

    /// Maximum size of a single file in bytes (default: 20 MB)
    pub max_file_size: usize,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    /// Socket address the HTTP server binds to (default: "127.0.0.1:3000")
    pub bind_addr: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("public"),
            validator_type: "http".to_string(),
            validator_base_url: "http://localhost:8000".to_string(),
            validator_path: "/validate-image".to_string(),
            validation_timeout_secs: 10,
            validation_concurrency: 4,
            max_files_per_request: 10,
            max_file_size: 20 * 1024 * 1024, // 20 MB
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            validator_type: env::var("VALIDATOR_TYPE").unwrap_or(default.validator_type),

            validator_base_url: env::var("VALIDATOR_BASE_URL")
                .unwrap_or(default.validator_base_url),

            validator_path: env::var("VALIDATOR_PATH").unwrap_or(default.validator_path),

            validation_timeout_secs: env::var("VALIDATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.validation_timeout_secs),

            validation_concurrency: env::var("VALIDATION_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.validation_concurrency),

            max_files_per_request: env::var("MAX_FILES_PER_REQUEST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_files_per_request),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),

            bind_addr: env::var("BIND_ADDR").unwrap_or(default.bind_addr),
        }
        .validated()
    }

    /// Create config for development (validation disabled, files accepted as-is)
    pub fn development() -> Self {
        Self {
            validator_type: "noop".to_string(),
            validation_timeout_secs: 5,
            ..Self::default()
        }
    }

    /// Clamps values that would stall or disable the pipeline.
    pub fn validated(mut self) -> Self {
        self.validation_concurrency = self.validation_concurrency.max(1);
        self.max_files_per_request = self.max_files_per_request.max(1);
        self.validation_timeout_secs = self.validation_timeout_secs.max(1);
        self
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    /// Full URL of the validation endpoint: base URL joined with the fixed path.
    pub fn validator_endpoint(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/{}",
            self.validator_base_url.trim_end_matches('/'),
            self.validator_path.trim_start_matches('/')
        ))
    }

    /// Upper bound for a whole upload request body.
    pub fn request_body_limit(&self) -> usize {
        self.max_file_size
            .saturating_mul(self.max_files_per_request)
            .saturating_add(MULTIPART_OVERHEAD)
    }
}
