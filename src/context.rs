use crate::bootstrap::ensure_schema;
use crate::config::Config;
use crate::db::factory::WorkerFactory;
use crate::db::records::PatientStore;
use crate::db::worker::ConnectionHandle;
use crate::error::SessionError;
use crate::notify::{ChangeEvent, Notifier, Subscription};
use crate::retry::RetryPolicy;
use crate::session::Session;
use tokio::sync::OnceCell;

/// Everything one context (one running copy of the application) needs: its session, its view of
/// the change channel, and the retry policy its operations run under.
pub struct AppContext {
    session: Session<WorkerFactory>,
    notifier: Notifier,
    policy: RetryPolicy,
    schema: OnceCell<()>,
}

impl AppContext {
    pub fn open(cfg: &Config) -> Self {
        Self {
            session: Session::new(WorkerFactory::new(cfg.basic.database_url.clone())),
            notifier: Notifier::from_config(&cfg.session),
            policy: RetryPolicy::from(&cfg.session),
            schema: OnceCell::new(),
        }
    }

    pub fn session(&self) -> &Session<WorkerFactory> {
        &self.session
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn connection(&self) -> Result<ConnectionHandle, SessionError> {
        Ok(self.session.acquire().await?)
    }

    /// Patient queries on this context's connection. The schema is ensured once per context;
    /// a failed bootstrap is retried on the next call.
    pub async fn patients(&self) -> Result<PatientStore<'_>, SessionError> {
        let conn = self.connection().await?;
        self.schema
            .get_or_try_init(|| ensure_schema(&conn, &self.policy))
            .await?;
        Ok(PatientStore::new(conn, &self.notifier, self.policy))
    }

    /// Subscribes `handler` to change events on this context's channel.
    pub fn watch<H>(&self, handler: H) -> Result<Subscription, SessionError>
    where
        H: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        Ok(self.notifier.subscribe(handler)?)
    }
}
