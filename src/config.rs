use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::auth::Role;
use crate::mirror::SheetsConfig;

const DEFAULT_PORT: &str = "5000";
const DEFAULT_ADMIN_PASSWORD: &str = "Pass123";
const DEFAULT_VIEWER_PASSWORD: &str = "View123";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSettings {
    pub spreadsheet_id: String,
    pub access_token: Option<String>,
    pub endpoint: Option<String>,
    pub sheet_name: Option<String>,
}

impl MirrorSettings {
    pub fn sheets_config(&self) -> SheetsConfig {
        let mut config = SheetsConfig::new(self.spreadsheet_id.clone());
        if let Some(endpoint) = &self.endpoint {
            config = config.endpoint(endpoint.clone());
        }
        if let Some(sheet) = &self.sheet_name {
            config = config.sheet_name(sheet.clone());
        }
        if let Some(token) = &self.access_token {
            config = config.access_token(token.clone());
        }
        config
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_interval: Duration,
    pub backup_retain: usize,
    pub territory_count: u32,
    pub session_ttl: chrono::Duration,
    pub admin_password: String,
    pub viewer_password: String,
    /// Courier login is disabled unless a password is set.
    pub courier_password: Option<String>,
    /// Spreadsheet mirroring is disabled unless `SPREADSHEET_ID` is set.
    pub mirror: Option<MirrorSettings>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let bind_addr = match get("TERRITORY_BIND_ADDR") {
            Some(addr) => addr,
            None => format!("0.0.0.0:{}", get_or("PORT", DEFAULT_PORT)),
        }
        .parse::<SocketAddr>()
        .context("TERRITORY_BIND_ADDR/PORT must form a valid host:port")?;

        let data_dir = PathBuf::from(
            get("TERRITORY_DATA_DIR")
                .or_else(|| get("RAILWAY_VOLUME_MOUNT_PATH"))
                .unwrap_or_else(|| "data".to_string()),
        );
        let uploads_dir = get("TERRITORY_UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("uploads").join("territories"));
        let backup_dir = get("TERRITORY_BACKUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("backups"));

        let backup_interval_hours = get_or("TERRITORY_BACKUP_INTERVAL_HOURS", "24")
            .parse::<u64>()
            .context("TERRITORY_BACKUP_INTERVAL_HOURS must be a whole number of hours")?;
        anyhow::ensure!(
            backup_interval_hours > 0,
            "TERRITORY_BACKUP_INTERVAL_HOURS must be at least 1"
        );

        let backup_retain = get_or("TERRITORY_BACKUP_RETAIN", "7")
            .parse::<usize>()
            .context("TERRITORY_BACKUP_RETAIN must be usize")?;

        let territory_count = get_or("TERRITORY_COUNT", "182")
            .parse::<u32>()
            .context("TERRITORY_COUNT must be u32")?;

        let session_ttl_hours = get_or("TERRITORY_SESSION_TTL_HOURS", "12")
            .parse::<i64>()
            .context("TERRITORY_SESSION_TTL_HOURS must be a whole number of hours")?;
        let session_ttl = chrono::Duration::try_hours(session_ttl_hours)
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .context("TERRITORY_SESSION_TTL_HOURS is out of range")?;

        let mirror = get("SPREADSHEET_ID").map(|spreadsheet_id| MirrorSettings {
            spreadsheet_id,
            access_token: get("MIRROR_ACCESS_TOKEN"),
            endpoint: get("MIRROR_ENDPOINT"),
            sheet_name: get("MIRROR_SHEET"),
        });

        Ok(Self {
            bind_addr,
            data_dir,
            uploads_dir,
            backup_dir,
            backup_interval: Duration::from_secs(backup_interval_hours * 3600),
            backup_retain,
            territory_count,
            session_ttl,
            admin_password: get_or("APP_PASSWORD", DEFAULT_ADMIN_PASSWORD),
            viewer_password: get_or("VIEWER_PASSWORD", DEFAULT_VIEWER_PASSWORD),
            courier_password: get("COURIER_PASSWORD"),
            mirror,
        })
    }

    pub fn role_passwords(&self) -> Vec<(Role, String)> {
        let mut passwords = vec![
            (Role::Admin, self.admin_password.clone()),
            (Role::Viewer, self.viewer_password.clone()),
        ];
        if let Some(courier) = &self.courier_password {
            passwords.push((Role::Courier, courier.clone()));
        }
        passwords
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.backup_dir, PathBuf::from("data/backups"));
        assert_eq!(config.backup_interval, Duration::from_secs(24 * 3600));
        assert_eq!(config.backup_retain, 7);
        assert_eq!(config.territory_count, 182);
        assert_eq!(config.session_ttl, chrono::Duration::hours(12));
        assert!(config.mirror.is_none());
        assert_eq!(config.role_passwords().len(), 2);
    }

    #[test]
    fn platform_volume_and_port() {
        let config = config(&[
            ("PORT", "8081"),
            ("RAILWAY_VOLUME_MOUNT_PATH", "/mnt/volume"),
            ("COURIER_PASSWORD", "Run123"),
            ("SPREADSHEET_ID", "abc"),
            ("MIRROR_SHEET", "  "),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8081);
        assert_eq!(config.data_dir, PathBuf::from("/mnt/volume"));
        assert_eq!(
            config.uploads_dir,
            PathBuf::from("/mnt/volume/uploads/territories")
        );
        assert_eq!(config.role_passwords()[2].0, Role::Courier);

        let mirror = config.mirror.unwrap();
        assert_eq!(mirror.spreadsheet_id, "abc");
        assert_eq!(mirror.sheet_name, None);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = config(&[("TERRITORY_COUNT", "many")]).unwrap_err();
        assert!(err.to_string().contains("TERRITORY_COUNT"));
        assert!(config(&[("TERRITORY_BACKUP_INTERVAL_HOURS", "0")]).is_err());
        assert!(config(&[("TERRITORY_BIND_ADDR", "nowhere")]).is_err());
    }
}
