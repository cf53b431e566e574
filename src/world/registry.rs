//! The static kingdom catalogue, read from `kingdoms.json`.

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

/// Kingdom status advertised to clients.
pub const STATUS_ONLINE: u8 = 1;

fn default_max_players() -> i32 {
    1000
}

fn default_status() -> u8 {
    STATUS_ONLINE
}

/// One configured kingdom entry.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct KingdomInfo {
    pub id: i32,
    pub name: String,
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_max_players")]
    pub max_players: i32,
    #[serde(skip_deserializing, default = "default_status")]
    pub status: u8,
}

/// The parsed kingdom list.
#[derive(Default, Debug)]
pub struct KingdomRegistry {
    kingdoms: Vec<KingdomInfo>,
}

impl KingdomRegistry {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to open kingdoms file {path}"))?;

        let registry = Self::from_json(&text)?;
        info!(count = registry.kingdoms.len(), path, "kingdom registry loaded");
        Ok(registry)
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let kingdoms: Vec<KingdomInfo> =
            serde_json::from_str(text).context("failed to parse kingdoms file")?;
        Ok(Self { kingdoms })
    }

    pub fn all(&self) -> &[KingdomInfo] {
        &self.kingdoms
    }

    pub fn get_by_id(&self, id: i32) -> Option<&KingdomInfo> {
        self.kingdoms.iter().find(|k| k.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.kingdoms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entries_with_defaults() {
        let registry = KingdomRegistry::from_json(
            r#"[
                {"id": 1, "name": "Royaume Principal", "ip": "127.0.0.1", "port": 7777},
                {"id": 2, "name": "Terres du Nord", "ip": "10.0.0.2", "port": 7778, "maxPlayers": 250}
            ]"#,
        )
        .unwrap();

        assert_eq!(registry.all().len(), 2);

        let first = registry.get_by_id(1).unwrap();
        assert_eq!(first.name, "Royaume Principal");
        assert_eq!(first.max_players, 1000);
        assert_eq!(first.status, STATUS_ONLINE);

        let second = registry.get_by_id(2).unwrap();
        assert_eq!(second.max_players, 250);

        assert!(registry.get_by_id(3).is_none());
    }

    #[test]
    fn empty_array_is_valid_but_empty() {
        let registry = KingdomRegistry::from_json("[]").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(KingdomRegistry::from_json("{not json").is_err());
        assert!(KingdomRegistry::from_json(r#"[{"id": 1}]"#).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(KingdomRegistry::load_from_file("/nonexistent/kingdoms.json").is_err());
    }
}
