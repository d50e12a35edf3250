use serde::Deserialize;
use std::{env, fs};

#[derive(Debug, Clone)]
pub struct Config {
    pub http_address: String,
    pub db_path: String,
    pub default_width: u32,
    pub config_cache_capacity: usize,
    pub log_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TimelineApiConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    timeline: TimelineConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    http_listen_address: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_listen_address: Some("127.0.0.1:9090".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    db_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: Some(".devenv/state/timeline-api/checkins.db".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimelineConfig {
    default_width: Option<u32>,
    config_cache_capacity: Option<usize>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            default_width: Some(800),
            config_cache_capacity: Some(256),
        }
    }
}

fn flag_value(args: &[String], names: &[&str]) -> Option<String> {
    args.iter()
        .position(|arg| names.contains(&arg.as_str()))
        .and_then(|i| args.get(i + 1))
        .cloned()
}

impl Config {
    pub fn from_args() -> Result<Self, Box<dyn std::error::Error>> {
        let args: Vec<String> = env::args().collect();
        Self::from_arg_list(&args)
    }

    pub fn from_arg_list(args: &[String]) -> Result<Self, Box<dyn std::error::Error>> {
        let log_file = flag_value(args, &["-f", "--log-file"]);

        // Without a readable file every section keeps its defaults
        let file_config_str = flag_value(args, &["--config", "-c"])
            .and_then(|path| fs::read_to_string(path).ok())
            .unwrap_or_default();
        let file_config: TimelineApiConfig = if file_config_str.trim().is_empty() {
            TimelineApiConfig::default()
        } else {
            toml::from_str(&file_config_str)?
        };

        let http_address = flag_value(args, &["--http-address", "-h"])
            .or(file_config.server.http_listen_address)
            .ok_or("Missing required config: server.http_listen_address")?;

        let db_path = flag_value(args, &["--db-path"])
            .or(file_config.storage.db_path)
            .ok_or("Missing required config: storage.db_path")?;

        let default_width = file_config.timeline.default_width.unwrap_or(800);
        if default_width == 0 {
            return Err("timeline.default_width must be positive".into());
        }

        Ok(Config {
            http_address,
            db_path,
            default_width,
            config_cache_capacity: file_config.timeline.config_cache_capacity.unwrap_or(256),
            log_file,
        })
    }
}
