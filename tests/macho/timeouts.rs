//! Async timeouts and cancellation of long scans.

use std::sync::Arc;
use std::time::Duration;

use crate::common::{self, Spec};
use machoscope::formats::macho::MachoParser;
use machoscope::timeout::{parse_with_timeout, with_timeout, IterationTimeout, TimeoutConfig};
use machoscope::{CancellationToken, MachoError};

#[tokio::test]
async fn parse_finishes_inside_the_deadline() {
    let data: Arc<[u8]> = common::universal().into();
    let model = parse_with_timeout(data, common::config().parser, TimeoutConfig::fast("parse"))
        .await
        .unwrap();
    assert_eq!(model.slices.len(), 2);
}

#[tokio::test]
async fn slow_operation_times_out() {
    let mut config = TimeoutConfig::new(0, "sleep");
    config.duration = Duration::from_millis(20);
    config.log_warnings = false;
    let result: machoscope::Result<()> = with_timeout(config, async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(MachoError::Timeout { .. })));
}

#[test]
fn cancelled_parse_stops() {
    let data = common::executable(Spec::arm64());
    let mut config = common::config().parser;
    config.scan_chunk = 1;
    let token = CancellationToken::new();
    token.cancel();

    let err = MachoParser::new(&data)
        .with_config(config)
        .with_cancellation(token)
        .parse()
        .unwrap_err();
    assert!(matches!(err, MachoError::Cancelled));
}

#[test]
fn cancellation_is_shared_between_clones() {
    let token = CancellationToken::new();
    let other = token.clone();
    assert!(!other.is_cancelled());
    token.cancel();
    assert!(other.is_cancelled());
}

#[test]
fn iteration_timeout_passes_fast_loops() {
    let mut guard = IterationTimeout::new(60, "loop").with_check_interval(10);
    for _ in 0..100 {
        guard.check().unwrap();
    }
    assert_eq!(guard.iterations(), 100);
}
