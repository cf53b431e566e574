use clap::Parser;

/// Command-line configuration of the server process.
#[derive(Parser, Clone, Debug)]
#[command(name = "fiefdom-server", version, about)]
pub struct ServerConfig {
    /// UDP-style listen port.
    #[arg(long, default_value_t = 7777)]
    pub port: u16,

    /// Path of the embedded SQL database.
    #[arg(long = "db", default_value = "game.db")]
    pub db_path: String,

    /// Path of the kingdoms configuration file.
    #[arg(long = "kingdoms-config", default_value = "kingdoms.json")]
    pub kingdoms_config_path: String,

    /// Simulation frequency in ticks per second.
    #[arg(long, default_value_t = 20)]
    pub tick_rate: u32,

    /// Maximum number of simultaneous connections.
    #[arg(long, default_value_t = 1000)]
    pub max_players: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(std::iter::empty::<&str>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 7777);
        assert_eq!(config.tick_rate, 20);
        assert_eq!(config.db_path, "game.db");
        assert_eq!(config.kingdoms_config_path, "kingdoms.json");
        assert_eq!(config.max_players, 1000);
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::parse_from([
            "fiefdom-server",
            "--port",
            "9000",
            "--db",
            "other.db",
            "--tick-rate",
            "30",
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.db_path, "other.db");
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_players, 1000);
    }
}
