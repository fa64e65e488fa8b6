use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, watch};

use crate::config::AppConfig;
use crate::inference::{Classifier, LabelTable, LoadError};
use crate::provision::{Fetcher, ProvisionError, Provisioner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Provisioning,
    Loading,
    Ready,
    Failed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Provisioning => "provisioning",
            ServiceState::Loading => "loading",
            ServiceState::Ready => "ready",
            ServiceState::Failed => "failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadyError {
    #[error("classifier is not ready")]
    NotReady,
    #[error("classifier did not become ready within {0:?}")]
    StartupTimeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Owns the classifier lifecycle: `Uninitialized → Provisioning → Loading →
/// Ready`, with `Failed` terminal on a startup error. Handlers receive this
/// as injected app data and reach the classifier only through `wait_ready`,
/// so no request ever observes a partially loaded engine.
pub struct ClassifierService {
    state: watch::Sender<ServiceState>,
    classifier: OnceCell<Arc<Classifier>>,
}

impl ClassifierService {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ServiceState::Uninitialized);
        Self {
            state,
            classifier: OnceCell::new(),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// One-time blocking initialization: provision the artifact, load the
    /// engine, publish it. Any error leaves the service `Failed` and is a
    /// fatal startup condition for the caller.
    pub async fn bootstrap<F: Fetcher>(
        &self,
        provisioner: &Provisioner<F>,
        config: &AppConfig,
    ) -> Result<(), StartupError> {
        match self.try_bootstrap(provisioner, config).await {
            Ok(()) => {
                self.transition(ServiceState::Ready);
                Ok(())
            }
            Err(e) => {
                self.transition(ServiceState::Failed);
                Err(e)
            }
        }
    }

    async fn try_bootstrap<F: Fetcher>(
        &self,
        provisioner: &Provisioner<F>,
        config: &AppConfig,
    ) -> Result<(), StartupError> {
        self.transition(ServiceState::Provisioning);
        let model_path = provisioner.ensure(&config.artifact()).await?;

        self.transition(ServiceState::Loading);
        let labels = LabelTable::new(config.labels.clone());
        let classifier = Classifier::build(&model_path, labels, config.image.size)?;
        let _ = self.classifier.set(Arc::new(classifier));
        Ok(())
    }

    /// Returns the classifier, blocking until the service is `Ready` for at
    /// most `timeout`. A `Failed` service reports `NotReady`; an elapsed
    /// deadline reports `StartupTimeout`.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<Arc<Classifier>, ReadyError> {
        if let Some(classifier) = self.classifier.get() {
            return Ok(Arc::clone(classifier));
        }

        let mut rx = self.state.subscribe();
        let wait = async {
            loop {
                match *rx.borrow_and_update() {
                    ServiceState::Ready => {
                        // the classifier cell is set before the Ready transition
                        return self
                            .classifier
                            .get()
                            .map(Arc::clone)
                            .ok_or(ReadyError::NotReady);
                    }
                    ServiceState::Failed => return Err(ReadyError::NotReady),
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(ReadyError::NotReady);
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ReadyError::StartupTimeout(timeout))?
    }

    fn transition(&self, next: ServiceState) {
        let previous = self.state.send_replace(next);
        log::info!("classifier state: {} -> {}", previous.as_str(), next.as_str());
    }
}

impl Default for ClassifierService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn wait_ready_times_out_before_bootstrap() {
        let service = ClassifierService::new();
        let err = service
            .wait_ready(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ReadyError::StartupTimeout(_)));
    }

    #[actix_web::test]
    async fn failed_service_reports_not_ready() {
        let service = ClassifierService::new();
        service.transition(ServiceState::Failed);
        let err = service
            .wait_ready(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ReadyError::NotReady));
    }

    #[actix_web::test]
    async fn waiter_observes_failure_transition() {
        let service = Arc::new(ClassifierService::new());
        let waiter = {
            let service = Arc::clone(&service);
            async move { service.wait_ready(Duration::from_secs(5)).await }
        };

        let (result, _) = futures::join!(waiter, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            service.transition(ServiceState::Provisioning);
            service.transition(ServiceState::Failed);
        });

        assert!(matches!(result.unwrap_err(), ReadyError::NotReady));
    }

    #[test]
    fn starts_uninitialized() {
        let service = ClassifierService::new();
        assert_eq!(service.state(), ServiceState::Uninitialized);
    }
}
