//! Configuration merging utilities
//!
//! This module provides functions to merge configuration from files
//! with command-line arguments, where CLI arguments take precedence.

use super::args::ServerArgs;
use super::file::ConfigFile;
use super::*;

/// Merge configuration file values with CLI arguments.
/// CLI arguments take precedence over config file values.
/// Only applies config file values where CLI uses defaults.
pub fn merge_config_with_args(mut args: ServerArgs, config: &ConfigFile) -> ServerArgs {
    // Helper macro to apply config value if CLI is at default
    macro_rules! apply_if_default {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(val) = $config_val {
                if args.$field == $default {
                    args.$field = val;
                }
            }
        };
    }

    macro_rules! apply_if_default_string {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(ref val) = $config_val {
                if args.$field == $default {
                    args.$field = val.clone();
                }
            }
        };
    }

    macro_rules! apply_if_default_path {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(ref path) = $config_val {
                if args.$field == std::path::Path::new($default) {
                    args.$field = path.clone();
                }
            }
        };
    }

    macro_rules! apply_option {
        ($field:ident, $config_val:expr) => {
            if args.$field.is_none() {
                if let Some(ref val) = $config_val {
                    args.$field = Some(val.clone());
                }
            }
        };
    }

    // Extension section
    apply_if_default_string!(extension_id, config.extension.id, DEFAULT_EXTENSION_ID);
    apply_if_default_string!(
        extension_version,
        config.extension.version,
        DEFAULT_EXTENSION_VERSION
    );
    apply_option!(display_name, config.extension.display_name);
    apply_option!(description, config.extension.description);

    // Server section
    apply_if_default_string!(mode, config.server.mode, DEFAULT_MODE);
    apply_if_default_string!(http_addr, config.server.http_addr, DEFAULT_HTTP_ADDR);
    apply_if_default_string!(log_level, config.server.log_level, DEFAULT_LOG_LEVEL);
    apply_if_default!(watch, config.server.watch, false);

    // Functions section
    apply_if_default_path!(functions_dir, config.functions.dir, DEFAULT_FUNCTIONS_DIR);
    apply_if_default_path!(dist_dir, config.functions.dist_dir, DEFAULT_DIST_DIR);
    apply_if_default!(
        poll_interval_ms,
        config.functions.poll_interval_ms,
        DEFAULT_POLL_INTERVAL_MS
    );
    apply_if_default!(
        retain_builds,
        config.functions.retain_builds,
        DEFAULT_RETAIN_BUILDS
    );

    // Runtime section
    apply_if_default_string!(freshness, config.runtime.freshness, DEFAULT_FRESHNESS);
    apply_option!(remote_url, config.runtime.remote_url);
    apply_if_default!(
        remote_timeout_ms,
        config.runtime.remote_timeout_ms,
        DEFAULT_REMOTE_TIMEOUT_MS
    );
    apply_if_default!(fuel, config.runtime.fuel, DEFAULT_FUEL);
    apply_if_default!(
        max_memory_mb,
        config.runtime.max_memory_mb,
        DEFAULT_MAX_MEMORY_MB
    );

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_file_fills_defaults() {
        let args = ServerArgs::parse_from(["pulse-remote"]);
        let file: ConfigFile = toml::from_str(
            r#"
            [extension]
            id = "wheel"
            display_name = "Wheel"

            [functions]
            dir = "./src/server"
            retain_builds = 5
            "#,
        )
        .unwrap();

        let merged = merge_config_with_args(args, &file);
        assert_eq!(merged.extension_id, "wheel");
        assert_eq!(merged.display_name.as_deref(), Some("Wheel"));
        assert_eq!(merged.functions_dir, std::path::PathBuf::from("./src/server"));
        assert_eq!(merged.retain_builds, 5);
        assert_eq!(merged.http_addr, DEFAULT_HTTP_ADDR);
    }

    #[test]
    fn test_cli_wins_over_file() {
        let args = ServerArgs::parse_from([
            "pulse-remote",
            "--extension-id",
            "cli_id",
            "--mode",
            "preview",
        ]);
        let file: ConfigFile = toml::from_str(
            r#"
            [extension]
            id = "file_id"

            [server]
            mode = "production"
            "#,
        )
        .unwrap();

        let merged = merge_config_with_args(args, &file);
        assert_eq!(merged.extension_id, "cli_id");
        assert_eq!(merged.mode, "preview");
    }
}
