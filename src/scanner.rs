//! Barcode scanning as an explicit camera resource.
//!
//! The camera is acquired by [`ScanSession::start`] and released on every
//! exit path — a delivered code, user cancel, an error, or plain teardown —
//! because the session closes its device in `Drop`. Frame decoding itself is
//! the backend's concern; the session only manages the resource lifecycle.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::error::AppError;

/// Why a scanning session could not run. The three acquisition causes must
/// stay distinguishable to the caller; they get different user-facing copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("camera access denied")]
    PermissionDenied,
    #[error("no camera available")]
    NoCamera,
    #[error("camera requires a secure context")]
    InsecureContext,
    #[error("camera failure: {0}")]
    Failed(String),
}

impl From<ScanError> for AppError {
    fn from(error: ScanError) -> Self {
        let code = match &error {
            ScanError::PermissionDenied => "SCAN/PERMISSION_DENIED",
            ScanError::NoCamera => "SCAN/NO_CAMERA",
            ScanError::InsecureContext => "SCAN/INSECURE_CONTEXT",
            ScanError::Failed(_) => "SCAN/FAILED",
        };
        AppError::new(code, error.to_string())
    }
}

/// Source of camera devices (platform integration point).
pub trait CameraBackend: Send + Sync {
    fn open(&self) -> Result<Box<dyn CameraDevice>, ScanError>;
}

/// An open camera stream. `next_code` yields decoded barcodes; `Ok(None)`
/// means the stream ended. `close` must be idempotent.
pub trait CameraDevice: Send {
    fn next_code(&mut self) -> BoxFuture<'_, Result<Option<String>, ScanError>>;
    fn close(&mut self);
}

/// Scoped camera acquisition with guaranteed release.
pub struct ScanSession {
    device: Option<Box<dyn CameraDevice>>,
}

impl ScanSession {
    pub fn start(backend: &dyn CameraBackend) -> Result<ScanSession, ScanError> {
        let device = backend.open()?;
        tracing::debug!(target = "mealtrack", event = "scan_session_started");
        Ok(ScanSession {
            device: Some(device),
        })
    }

    pub fn is_active(&self) -> bool {
        self.device.is_some()
    }

    /// Next decoded barcode. An error stops the session and releases the
    /// camera before propagating.
    pub async fn next_code(&mut self) -> Result<Option<String>, ScanError> {
        let Some(device) = self.device.as_mut() else {
            return Ok(None);
        };
        match device.next_code().await {
            Ok(code) => Ok(code),
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    /// Explicitly release the camera. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
            tracing::debug!(target = "mealtrack", event = "scan_session_stopped");
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeDevice {
        codes: Vec<Result<Option<String>, ScanError>>,
        closes: Arc<AtomicUsize>,
    }

    impl CameraDevice for FakeDevice {
        fn next_code(&mut self) -> BoxFuture<'_, Result<Option<String>, ScanError>> {
            let next = if self.codes.is_empty() {
                Ok(None)
            } else {
                self.codes.remove(0)
            };
            Box::pin(async move { next })
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeBackend {
        fail_with: Option<ScanError>,
        codes: Vec<Result<Option<String>, ScanError>>,
        closes: Arc<AtomicUsize>,
    }

    impl CameraBackend for FakeBackend {
        fn open(&self) -> Result<Box<dyn CameraDevice>, ScanError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            Ok(Box::new(FakeDevice {
                codes: self.codes.clone(),
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    fn backend(codes: Vec<Result<Option<String>, ScanError>>) -> (FakeBackend, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            FakeBackend {
                fail_with: None,
                codes,
                closes: Arc::clone(&closes),
            },
            closes,
        )
    }

    #[tokio::test]
    async fn delivers_code_and_releases_on_drop() {
        let (backend, closes) = backend(vec![Ok(Some("4000417025005".into()))]);
        let mut session = ScanSession::start(&backend).unwrap();
        assert_eq!(
            session.next_code().await.unwrap(),
            Some("4000417025005".into())
        );
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_path_releases_camera_before_propagating() {
        let (backend, closes) = backend(vec![Err(ScanError::Failed("stream died".into()))]);
        let mut session = ScanSession::start(&backend).unwrap();
        let err = session.next_code().await.unwrap_err();
        assert_eq!(err, ScanError::Failed("stream died".into()));
        assert!(!session.is_active());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        // Drop must not double-close.
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_stop_is_idempotent() {
        let (backend, closes) = backend(vec![]);
        let mut session = ScanSession::start(&backend).unwrap();
        session.stop();
        session.stop();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.next_code().await.unwrap(), None);
    }

    #[test]
    fn acquisition_failures_stay_distinguishable() {
        for (error, code) in [
            (ScanError::PermissionDenied, "SCAN/PERMISSION_DENIED"),
            (ScanError::NoCamera, "SCAN/NO_CAMERA"),
            (ScanError::InsecureContext, "SCAN/INSECURE_CONTEXT"),
        ] {
            let backend = FakeBackend {
                fail_with: Some(error.clone()),
                codes: vec![],
                closes: Arc::new(AtomicUsize::new(0)),
            };
            let err = match ScanSession::start(&backend) {
                Ok(_) => panic!("acquisition should fail with {error:?}"),
                Err(e) => e,
            };
            assert_eq!(err, error);
            assert_eq!(AppError::from(err).code(), code);
        }
    }
}
