use crate::config::Overrides;
use clap::builder::BoolishValueParser;
use clap::Parser;
use std::path::PathBuf;

/// Relay IdőKép observations to a Weather Underground personal weather station.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run a single cycle and exit
    #[arg(
        short,
        long,
        env = "RUN_ONCE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub once: Option<bool>,

    /// Weather Underground station ID
    #[arg(long, env = "WUNDERGROUND_ID")]
    pub wunderground_id: Option<String>,

    /// Weather Underground station key
    #[arg(long, env = "WUNDERGROUND_KEY", hide_env_values = true)]
    pub wunderground_key: Option<String>,

    /// IdőKép location name, e.g. Velence
    #[arg(long, env = "IDOKEP_LOCATION")]
    pub idokep_location: Option<String>,

    /// IdőKép automata station ID, e.g. fejnto
    #[arg(long, env = "IDOKEP_AUTOMATA_ID")]
    pub idokep_automata_id: Option<String>,

    /// Scrape the automata station page instead of the location page
    #[arg(
        long,
        env = "USE_AUTOMATA",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub use_automata: Option<bool>,

    /// Seconds between cycles
    #[arg(long, env = "SCAN_INTERVAL")]
    pub scan_interval: Option<u64>,

    /// Optional YAML configuration file
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            wunderground_id: self.wunderground_id.clone(),
            wunderground_key: self.wunderground_key.clone(),
            idokep_location: self.idokep_location.clone(),
            idokep_automata_id: self.idokep_automata_id.clone(),
            use_automata: self.use_automata,
            scan_interval: self.scan_interval,
            run_once: self.once,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_map_to_overrides() {
        let cli = Cli::parse_from([
            "idokep-wunderground",
            "--once",
            "--wunderground-id",
            "IVELEN12",
            "--wunderground-key",
            "secret",
            "--idokep-automata-id",
            "fejnto",
            "--use-automata",
            "--scan-interval",
            "300",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.run_once, Some(true));
        assert_eq!(overrides.wunderground_id.as_deref(), Some("IVELEN12"));
        assert_eq!(overrides.idokep_automata_id.as_deref(), Some("fejnto"));
        assert_eq!(overrides.use_automata, Some(true));
        assert_eq!(overrides.scan_interval, Some(300));
    }

    #[test]
    fn test_explicit_false_flag() {
        let cli = Cli::parse_from(["idokep-wunderground", "--use-automata=false", "-o"]);
        assert_eq!(cli.use_automata, Some(false));
        assert_eq!(cli.once, Some(true));
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let result = Cli::try_parse_from(["idokep-wunderground", "--scan-interval", "soon"]);
        assert!(result.is_err());
    }
}
