/*!
# Overview
s3mirror mirrors a local directory tree to an S3 bucket prefix, or a bucket
prefix to a local directory tree.

Both sides are listed and every path is sorted into exactly one category:
only local, only remote, newer local, newer remote or unchanged. Content is
compared by MD5. When the content differs, the modification times decide the
direction, using the original last-modified time stored in object metadata when
it is present. A policy then turns the categories into actions that are printed
as one letter code per path and executed through a bounded pool of concurrent
workers.

## Features
- Upload (local to S3) and download (S3 to local). The direction follows the
  argument order.
- `.s3mirror-ignore` files with glob rules, inherited by subdirectories.
- Optional `<file>.md5` sidecar hashes so unchanged large files are not read
  again.
- Policies: `--force`, `--keep`, `--no-delete`, `--move`, `--dry-run`.
- Progress events (`Started`, `Progress`, `Completed`, `Cancelled`, `Error`)
  delivered to registered callbacks.
- Ctrl-C cancels running transfers. Partial files are never left behind.

## Action codes
| code | meaning                                        |
|------|------------------------------------------------|
| `N`  | new, transferred                               |
| `U`  | updated, transferred                           |
| `F`  | unchanged, transferred anyway by `--force`     |
| `R`  | newer on the target, reverted                  |
| `r`  | newer on the target, kept by `--keep`          |
| `D`  | only on the target, deleted                    |
| `d`  | only on the target, kept by `--no-delete`      |
| `-`  | unchanged                                      |

## As a library
The CLI is a thin wrapper of the library. Arguments are the same as the CLI.

```no_run
use async_trait::async_trait;

use s3mirror::config::Config;
use s3mirror::config::args::parse_from_args;
use s3mirror::pipeline::Pipeline;
use s3mirror::types::event_callback::{BatchEvent, EventCallback, EventType};
use s3mirror::types::token::create_pipeline_cancellation_token;

pub struct DebugEventCallback;

#[async_trait]
impl EventCallback for DebugEventCallback {
    async fn on_event(&mut self, event: BatchEvent) {
        println!("{event:?}");
    }
}

#[tokio::main]
async fn main() {
    let args = vec!["program_name", "./src", "s3://test-bucket/src/"];

    let mut config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
    config
        .event_manager
        .register_callback(EventType::ALL_EVENTS, DebugEventCallback);

    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = Pipeline::new(config, cancellation_token).await;

    pipeline.run().await;

    if pipeline.has_error() {
        println!("An error has occurred.\n\n");
        println!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
        return;
    }

    println!("{:?}", pipeline.get_sync_summary());
}
```
*/

pub use config::Config;
pub use config::args::CLIArgs;

pub mod comparer;
pub mod config;
pub mod executor;
pub mod pipeline;
pub mod planner;
pub mod storage;
pub mod types;
