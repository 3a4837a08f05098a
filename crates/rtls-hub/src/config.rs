use clap::Parser;
use rtls_core::{ResolverConfig, DEFAULT_HYSTERESIS_DB};
use std::collections::BTreeMap;
use std::path::PathBuf;

const DEFAULT_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_LOG_FILE: &str = "rtls-hub.log";
const DEFAULT_LOCATIONS: [(&str, &str); 2] = [("M501", "M501호"), ("M502", "M502호")];

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub debug: bool,
    pub log_dir: String,
    pub log_file: String,
    pub db_path: Option<PathBuf>,
    pub resolver: ResolverConfig,
    pub locations: BTreeMap<String, String>,
}

#[derive(Parser, Debug)]
#[command(name = "rtls-hub")]
pub struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, default_value = "")]
    log_file: String,
    #[arg(long, default_value = "")]
    db_path: String,
    #[arg(long, default_value_t = 5)]
    stale_seconds: u64,
    /// Required margin in dB before a challenger may start its dwell window.
    #[arg(
        long,
        default_value_t = DEFAULT_HYSTERESIS_DB,
        value_parser = clap::value_parser!(i32).range(0..)
    )]
    hysteresis_db: i32,
    #[arg(long, default_value_t = 2)]
    dwell_seconds: u64,
    /// Reader location as READER_ID=NAME; repeatable. Replaces the built-in map.
    #[arg(long = "location", value_parser = parse_location)]
    locations: Vec<(String, String)>,
}

pub fn load_config() -> Config {
    from_args(Args::parse())
}

pub fn from_args(args: Args) -> Config {
    let addr = resolve_addr(&args.addr);
    let debug = args.debug || env_true("RTLS_HUB_DEBUG");
    let log_dir = resolve_log_dir(&args.log_dir);
    let log_file = resolve_log_file(&args.log_file);
    let db_path = resolve_db_path(&args.db_path);
    let locations = if args.locations.is_empty() {
        DEFAULT_LOCATIONS
            .iter()
            .map(|(reader_id, name)| (reader_id.to_string(), name.to_string()))
            .collect()
    } else {
        args.locations.into_iter().collect()
    };
    Config {
        addr,
        debug,
        log_dir,
        log_file,
        db_path,
        resolver: ResolverConfig::from_seconds(
            args.stale_seconds,
            args.hysteresis_db,
            args.dwell_seconds,
        ),
        locations,
    }
}

fn parse_location(raw: &str) -> Result<(String, String), String> {
    let (reader_id, name) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected READER_ID=NAME, got {raw:?}"))?;
    let reader_id = reader_id.trim();
    let name = name.trim();
    if reader_id.is_empty() || name.is_empty() {
        return Err(format!("expected READER_ID=NAME, got {raw:?}"));
    }
    Ok((reader_id.to_string(), name.to_string()))
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    env_non_empty("RTLS_HUB_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

fn resolve_log_dir(log_dir_flag: &str) -> String {
    if !log_dir_flag.trim().is_empty() {
        return log_dir_flag.to_string();
    }
    env_non_empty("RTLS_LOG_DIR").unwrap_or_default()
}

fn resolve_log_file(log_file_flag: &str) -> String {
    if !log_file_flag.trim().is_empty() {
        return log_file_flag.trim().to_string();
    }
    env_non_empty("RTLS_LOG_FILE").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string())
}

fn resolve_db_path(db_path_flag: &str) -> Option<PathBuf> {
    if !db_path_flag.trim().is_empty() {
        return Some(PathBuf::from(db_path_flag));
    }
    env_non_empty("RTLS_DB_PATH").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn location_flags_replace_builtin_map() {
        let args = Args::try_parse_from([
            "rtls-hub",
            "--addr",
            "127.0.0.1:9000",
            "--location",
            "M601=Radiology",
            "--location",
            "M602 = ICU",
            "--dwell-seconds",
            "4",
            "--log-file",
            "ward5.log",
        ])
        .expect("parse args");
        let config = from_args(args);

        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.log_file, "ward5.log");
        assert_eq!(config.locations.len(), 2);
        assert_eq!(config.locations["M602"], "ICU");
        assert_eq!(config.resolver.dwell, Duration::seconds(4));
        assert_eq!(config.resolver.stale_window, Duration::seconds(5));
        assert_eq!(config.resolver.hysteresis_db, 8);
    }

    #[test]
    fn builtin_locations_apply_without_flags() {
        let args = Args::try_parse_from(["rtls-hub", "--addr", "127.0.0.1:9000"])
            .expect("parse args");
        let config = from_args(args);
        assert_eq!(config.locations["M501"], "M501호");
        assert_eq!(config.locations["M502"], "M502호");
    }

    #[test]
    fn malformed_location_is_rejected() {
        assert!(parse_location("M501").is_err());
        assert!(parse_location("=Lobby").is_err());
        assert_eq!(
            parse_location("M501=Lobby"),
            Ok(("M501".to_string(), "Lobby".to_string()))
        );
    }

    #[test]
    fn negative_hysteresis_margin_is_rejected() {
        assert!(Args::try_parse_from(["rtls-hub", "--hysteresis-db=-3"]).is_err());

        let args = Args::try_parse_from(["rtls-hub", "--hysteresis-db", "0"]).expect("parse args");
        assert_eq!(from_args(args).resolver.hysteresis_db, 0);
    }
}
