mod comparison;
mod dry_run;
mod performance;
mod sync_policy;
mod tracing;
