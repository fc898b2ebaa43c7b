use serde::Deserialize;

/// Application configuration loaded from environment variables. Only the
/// knobs the dispatch core consumes live here; listener and TLS tuning
/// belong to the surrounding protocol layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host the embedding engine should bind (default: 127.0.0.1)
    pub server_host: String,

    /// Server port (default: 3000)
    pub server_port: u16,

    /// Environment: development, production, test
    pub environment: String,

    /// Verbose dispatch: prepends a chain logger to every route.
    pub debug: bool,

    /// Idle request contexts retained by the pool (default: 512)
    pub context_pool_size: usize,
}

impl Config {
    /// Load configuration from environment variables (with .env support).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if present (ignore errors if missing)
        let _ = dotenvy::dotenv();

        Ok(Config {
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: std::env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            debug: matches!(
                std::env::var("DEBUG").unwrap_or_default().to_lowercase().as_str(),
                "true" | "1" | "yes"
            ),
            context_pool_size: std::env::var("CONTEXT_POOL_SIZE")
                .unwrap_or_else(|_| "512".to_string())
                .parse()
                .unwrap_or(512),
        })
    }

    /// Check if running in development mode.
    pub fn is_dev(&self) -> bool {
        self.environment == "development"
    }

    /// Get the full server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            environment: "development".to_string(),
            debug: false,
            context_pool_size: 512,
        }
    }
}
