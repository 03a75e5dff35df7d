#[cfg(test)]
mod tests {
    use crate::config::args::*;

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "./src", "s3://target-bucket"];

        let config = build_config_from_args(args).unwrap();

        assert!(!config.sync_policy.dry_run);
    }

    #[test]
    fn with_custom_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "--dry-run", "./src", "s3://target-bucket"];

        let config = build_config_from_args(args).unwrap();

        assert!(config.sync_policy.dry_run);
        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Info
        );
        assert!(!config.tracing_config.unwrap().json_tracing);
    }

    #[test]
    fn with_custom_value_with_tracing_option() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--dry-run",
            "--json-tracing",
            "-vv",
            "./src",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Debug
        );
        assert!(config.tracing_config.unwrap().json_tracing);
    }

    #[test]
    fn with_quiet() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--dry-run",
            "-qq",
            "--disable-color-tracing",
            "./src",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Info
        );
        assert!(config.sync_policy.quiet);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
