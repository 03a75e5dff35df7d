#[cfg(test)]
mod tests {
    use crate::config::args::*;

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "./src", "s3://target-bucket"];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(config.comparer_config, ComparerConfig::default());
        assert_eq!(config.comparer_config.conflict_policy, ConflictPolicy::Fail);
        assert!(!config.walker_config.sidecar_hashes);
    }

    #[test]
    fn with_custom_value() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--assume-local-newer",
            "--use-md5-sidecar",
            "--generate-md5-sidecar",
            "./src",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(
            config.comparer_config,
            ComparerConfig {
                conflict_policy: ConflictPolicy::AssumeLocalNewer,
                use_sidecar_hashes: true,
                generate_sidecar_hashes: true,
            }
        );
        assert!(config.walker_config.sidecar_hashes);
    }

    #[test]
    fn generating_sidecars_hides_them_from_the_walk() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--generate-md5-sidecar",
            "./src",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert!(!config.comparer_config.use_sidecar_hashes);
        assert!(config.walker_config.sidecar_hashes);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
