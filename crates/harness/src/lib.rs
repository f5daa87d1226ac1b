pub mod flaky;
pub mod workspace;

pub use flaky::{FailPoint, FlakyStore};
pub use workspace::{TestWorkspace, draft_content, item_ids, snapshot_subsystems};

use std::sync::Once;

use tracing_subscriber::filter::LevelFilter;

static LOGGING: Once = Once::new();

/// Route engine logs to the test writer. Safe to call from every test.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(LevelFilter::DEBUG)
            .with_test_writer()
            .try_init();
    });
}
