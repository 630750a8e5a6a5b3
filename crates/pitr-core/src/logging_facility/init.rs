//! Process-wide subscriber setup.

use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output profile, selected by `logging_profile` in the engine config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Human-readable lines, `pitr=debug`
    #[default]
    Development,
    /// One JSON object per line, `pitr=info`
    Production,
    /// Bare registry; pair with `init_test_capture()`
    Test,
}

impl Profile {
    /// Directive used when `RUST_LOG` is unset
    pub fn default_directive(self) -> &'static str {
        match self {
            Profile::Development => "pitr=debug",
            Profile::Production | Profile::Test => "pitr=info",
        }
    }

    fn filter(self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }
}

static INIT: Once = Once::new();

/// Install the global subscriber for `profile`.
///
/// Output goes to stderr so command output on stdout stays machine-readable.
/// Only the first call has any effect.
pub fn init(profile: Profile) {
    INIT.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(profile.filter())
            .with_writer(std::io::stderr);
        match profile {
            Profile::Development => builder.init(),
            Profile::Production => builder.json().init(),
            Profile::Test => tracing_subscriber::registry().init(),
        }
    });
}
