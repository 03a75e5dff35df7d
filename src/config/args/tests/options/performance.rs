#[cfg(test)]
mod tests {
    use crate::config::args::*;

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "./src", "s3://target-bucket"];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(
            config.executor_config.max_concurrency,
            Some(DEFAULT_WORKER_SIZE as usize)
        );
        assert_eq!(
            config.executor_config.poll_interval,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MILLISECONDS)
        );
    }

    #[test]
    fn with_custom_value() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--worker-size",
            "64",
            "--poll-interval-milliseconds",
            "10",
            "./src",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(config.executor_config.max_concurrency, Some(64));
        assert_eq!(
            config.executor_config.poll_interval,
            Duration::from_millis(10)
        );
    }

    #[test]
    fn with_unbounded_workers() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--unbounded-workers",
            "./src",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert!(config.executor_config.max_concurrency.is_none());
    }

    #[test]
    fn error_zero_worker_size() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--worker-size",
            "0",
            "./src",
            "s3://target-bucket",
        ];

        assert!(build_config_from_args(args).is_err());
    }

    #[test]
    fn error_zero_poll_interval() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--poll-interval-milliseconds",
            "0",
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
