//! Provider activation and socket handoff.

use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use datashare_transport::{endpoint_path, IpcStream, UnixDomainSocket};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};

/// Starts provider processes and hands out sockets connected to them.
pub trait Activator {
    /// Make sure the provider is running.
    ///
    /// `ErrorKind::InvalidInput` means the request can never succeed and is
    /// not retried; any other error is treated as transient.
    fn launch(&mut self, caller_id: &str, provider_id: &str) -> std::io::Result<()>;

    /// A socket connected to the running provider.
    fn connect(&mut self, caller_id: &str, provider_id: &str) -> Result<IpcStream>;
}

/// Launch `provider_id`, retrying transient failures.
pub fn launch_with_retry<A: Activator + ?Sized>(
    activator: &mut A,
    caller_id: &str,
    provider_id: &str,
    attempts: u32,
    backoff: Duration,
) -> Result<()> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match activator.launch(caller_id, provider_id) {
            Ok(()) => {
                debug!(provider = provider_id, attempt, "provider launched");
                return Ok(());
            }
            Err(source) if source.kind() == ErrorKind::InvalidInput || attempt >= attempts => {
                return Err(PeerError::Launch {
                    provider_id: provider_id.to_string(),
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                warn!(provider = provider_id, attempt, error = %err, "launch failed, retrying");
                std::thread::sleep(backoff);
            }
        }
    }
}

/// Providers listening at `<dir>/<provider_id>.sock`.
///
/// Launching only checks that the endpoint socket exists; some other
/// process is responsible for starting providers.
#[derive(Debug, Clone)]
pub struct SocketDirActivator {
    dir: PathBuf,
}

impl SocketDirActivator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn validate_endpoint_id(provider_id: &str) -> std::io::Result<()> {
    if provider_id.is_empty()
        || provider_id.contains(['/', '\0'])
        || provider_id == "."
        || provider_id == ".."
    {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid provider id '{provider_id}'"),
        ));
    }
    Ok(())
}

impl Activator for SocketDirActivator {
    fn launch(&mut self, _caller_id: &str, provider_id: &str) -> std::io::Result<()> {
        validate_endpoint_id(provider_id)?;
        let path = endpoint_path(&self.dir, provider_id);
        let metadata = std::fs::metadata(&path)?;
        if !metadata.file_type().is_socket() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a socket", path.display()),
            ));
        }
        Ok(())
    }

    fn connect(&mut self, _caller_id: &str, provider_id: &str) -> Result<IpcStream> {
        Ok(UnixDomainSocket::connect(endpoint_path(&self.dir, provider_id))?)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/dsa-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    struct Flaky {
        failures_left: u32,
        kind: ErrorKind,
        calls: u32,
    }

    impl Activator for Flaky {
        fn launch(&mut self, _caller_id: &str, _provider_id: &str) -> std::io::Result<()> {
            self.calls += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(std::io::Error::from(self.kind));
            }
            Ok(())
        }

        fn connect(&mut self, _caller_id: &str, _provider_id: &str) -> Result<IpcStream> {
            Ok(IpcStream::pair()?.0)
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let mut activator = Flaky {
            failures_left: 3,
            kind: ErrorKind::NotFound,
            calls: 0,
        };
        launch_with_retry(&mut activator, "c", "p", 4, Duration::ZERO).expect("fourth try succeeds");
        assert_eq!(activator.calls, 4);
    }

    #[test]
    fn retries_are_bounded() {
        let mut activator = Flaky {
            failures_left: 10,
            kind: ErrorKind::NotFound,
            calls: 0,
        };
        let err = launch_with_retry(&mut activator, "c", "p", 4, Duration::ZERO).unwrap_err();
        assert!(matches!(err, PeerError::Launch { attempts: 4, .. }));
        assert_eq!(activator.calls, 4);
    }

    #[test]
    fn invalid_input_fails_immediately() {
        let mut activator = Flaky {
            failures_left: 10,
            kind: ErrorKind::InvalidInput,
            calls: 0,
        };
        let err = launch_with_retry(&mut activator, "c", "p", 4, Duration::ZERO).unwrap_err();
        assert!(matches!(err, PeerError::Launch { attempts: 1, .. }));
        assert_eq!(activator.calls, 1);
    }

    #[test]
    fn socket_dir_checks_endpoint() {
        let dir = temp_dir("launch");
        let mut activator = SocketDirActivator::new(&dir);

        let missing = activator.launch("c", "absent").unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        let bad = activator.launch("c", "../escape").unwrap_err();
        assert_eq!(bad.kind(), ErrorKind::InvalidInput);

        let _listener =
            UnixDomainSocket::bind_endpoint(&dir, "present").expect("listener should bind");
        activator.launch("c", "present").expect("endpoint should be found");
        activator
            .connect("c", "present")
            .expect("connect should succeed");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
