//! Tracing subscriber setup.

use std::fs::File;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter directive for a `-v` count.
///
/// With no `-v` the configured directive applies, else `error`. Three or more
/// also surface the FUSE protocol trace.
pub fn filter_directive(verbose: u8, configured: Option<&str>) -> String {
    match verbose {
        0 => configured.unwrap_or("error").to_string(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the computed filter.
///
/// In daemon mode events go to `log_file` without ANSI colors; otherwise to
/// stderr.
pub fn init(verbose: u8, configured: Option<&str>, log_file: Option<File>) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        let directive = filter_directive(verbose, configured);
        EnvFilter::try_new(&directive)
            .with_context(|| format!("invalid log filter '{}'", directive))?
    };

    let (stderr_layer, file_layer) = match log_file {
        Some(file) => (
            None,
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
        ),
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")
}

/// Emit a failed mount through the subscriber before it reaches `main`.
///
/// A daemon's stderr is `/dev/null`, so this is the only trace the error
/// leaves in the log file.
pub fn report_failure<T>(result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "mount failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn verbosity_levels() {
        assert_eq!(filter_directive(0, None), "error");
        assert_eq!(filter_directive(1, None), "info");
        assert_eq!(filter_directive(2, None), "debug");
        assert_eq!(filter_directive(3, None), "trace");
        assert_eq!(filter_directive(7, None), "trace");
    }

    #[test]
    fn configured_filter_only_without_flags() {
        assert_eq!(filter_directive(0, Some("gitfs_kernel=debug")), "gitfs_kernel=debug");
        assert_eq!(filter_directive(1, Some("gitfs_kernel=debug")), "info");
    }

    #[test]
    fn failures_reach_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitfs.log");
        let file = File::create(&path).unwrap();
        let subscriber = fmt()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let failed: Result<()> =
                Err(anyhow!("no such remote").context("failed to clone repository"));
            assert!(report_failure(failed).is_err());
            assert_eq!(report_failure(Ok(5)).unwrap(), 5);
        });

        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.contains("mount failed"), "{log}");
        assert!(
            log.contains("failed to clone repository: no such remote"),
            "{log}"
        );
        assert_eq!(log.lines().count(), 1, "{log}");
    }
}
