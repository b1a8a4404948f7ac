use clap::Parser;

/// Minimal IRC-style chat relay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "irc-relayd", version, about)]
pub struct ServerConfig {
    /// TCP listener address.
    #[arg(long, default_value = "127.0.0.1:6667")]
    pub listen_addr: String,

    /// Server name used as prefix in server-originated messages.
    #[arg(long, default_value = "irc-relayd")]
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:6667".to_string(),
            server_name: "irc-relayd".to_string(),
        }
    }
}
