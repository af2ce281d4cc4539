// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Asset settings for monster images.
    pub assets: AssetConfig,
    /// Directory containing pre-built frontend files to serve.
    /// When set, the backend serves static files from this path.
    pub static_dir: Option<PathBuf>,
    /// Hosted vision flow. `None` when the flow is not configured.
    pub langflow: Option<LangflowConfig>,
    /// Hosted knowledge-filter service. `None` when not configured.
    pub openrag: Option<OpenRagConfig>,
}

/// Where monster image directories live on disk and how they are addressed
/// once served.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Root holding one `<monster_id>/` directory per image asset.
    pub monsters_dir: PathBuf,
    /// Public URL prefix the monster directories are served under.
    pub cdn_prefix: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            monsters_dir: PathBuf::from("public/cdn/monsters"),
            cdn_prefix: "/cdn/monsters".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LangflowConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub flow_id: String,
    /// Component id of the flow's chat input; receives the uploaded file.
    pub chat_input_id: String,
}

#[derive(Debug, Clone)]
pub struct OpenRagConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:arena.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `MONSTERS_DIR` - Monster image tree (default: `public/cdn/monsters`)
    /// - `MONSTER_CDN_PREFIX` - Public prefix of that tree (default: `/cdn/monsters`)
    /// - `STATIC_DIR` - Path to frontend dist directory for static file serving
    /// - `LANGFLOW_SERVER_URL`, `LANGFLOW_FLOW_ID` - both required to enable vision
    /// - `LANGFLOW_API_KEY`, `LANGFLOW_CHAT_INPUT_ID` (default: `ChatInput`)
    /// - `OPENRAG_URL` - enables knowledge filters; `OPENRAG_API_KEY` optional
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:arena.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let defaults = AssetConfig::default();
        let assets = AssetConfig {
            monsters_dir: env_opt("MONSTERS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.monsters_dir),
            cdn_prefix: env_opt("MONSTER_CDN_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.cdn_prefix),
        };

        let static_dir = env_opt("STATIC_DIR").map(PathBuf::from);

        let langflow = match (env_opt("LANGFLOW_SERVER_URL"), env_opt("LANGFLOW_FLOW_ID")) {
            (Some(base_url), Some(flow_id)) => Some(LangflowConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: env_opt("LANGFLOW_API_KEY"),
                flow_id,
                chat_input_id: env_opt("LANGFLOW_CHAT_INPUT_ID")
                    .unwrap_or_else(|| "ChatInput".to_string()),
            }),
            _ => None,
        };

        let openrag = env_opt("OPENRAG_URL").map(|base_url| OpenRagConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: env_opt("OPENRAG_API_KEY"),
        });

        Config {
            database_url,
            port,
            assets,
            static_dir,
            langflow,
            openrag,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

/// Read an env var, treating empty values as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
