use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

#[derive(Clone, Debug, Parser)]
#[command(name = "versus-relay", version, about = "Same-origin relay for Versus AI providers and data", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "VERSUS_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// Directory backing the /api/data mirror
    #[arg(long, env = "VERSUS_DATA_DIR", default_value = "versus-data")]
    pub data_dir: PathBuf,

    /// Base URL of the Anthropic API.
    /// Override in tests to point at a mock server.
    #[arg(long, env = "VERSUS_ANTHROPIC_URL", default_value = DEFAULT_ANTHROPIC_URL)]
    pub anthropic_url: String,

    /// Base URL of the OpenAI API.
    #[arg(long, env = "VERSUS_OPENAI_URL", default_value = DEFAULT_OPENAI_URL)]
    pub openai_url: String,

    /// trace, debug, info, warn or error
    #[arg(long, env = "VERSUS_LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,
}

impl Config {
    pub fn anthropic_url(&self) -> &str {
        self.anthropic_url.trim_end_matches('/')
    }

    pub fn openai_url(&self) -> &str {
        self.openai_url.trim_end_matches('/')
    }
}
