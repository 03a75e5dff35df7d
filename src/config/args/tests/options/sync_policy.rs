#[cfg(test)]
mod tests {
    use crate::config::args::*;

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "./src", "s3://target-bucket"];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(
            config.sync_policy,
            SyncPolicy {
                report_level: DEFAULT_REPORT_LEVEL,
                ..Default::default()
            }
        );
    }

    #[test]
    fn with_custom_value() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--keep",
            "--no-delete",
            "--report-level",
            "3",
            "--no-progress",
            "./src",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert!(config.sync_policy.keep_conflicting);
        assert!(config.sync_policy.no_delete);
        assert!(!config.sync_policy.force);
        assert_eq!(config.sync_policy.report_level, 3);
        assert!(config.sync_policy.no_progress);
    }

    #[test]
    fn with_force_and_move() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--force",
            "--move",
            "./src",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert!(config.sync_policy.force);
        assert!(config.sync_policy.move_items);
    }

    #[test]
    fn error_move_with_no_delete() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--move",
            "--no-delete",
            "./src",
            "s3://target-bucket",
        ];

        assert!(build_config_from_args(args).is_err());
    }

    #[test]
    fn error_force_with_keep() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--force",
            "--keep",
            "./src",
            "s3://target-bucket",
        ];

        assert!(build_config_from_args(args).is_err());
    }

    #[test]
    fn error_report_level_out_of_range() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--report-level",
            "4",
            "./src",
            "s3://target-bucket",
        ];

        assert!(build_config_from_args(args).is_err());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
