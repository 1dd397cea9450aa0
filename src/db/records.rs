use crate::db::models::{DbPatient, PatientCreate};
use crate::db::worker::ConnectionHandle;
use crate::error::SessionError;
use crate::notify::{ChangeEvent, Notifier};
use crate::retry::RetryPolicy;
use crate::utils::logging::with_pretty_json_debug;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Query surface for the `patients` table.
///
/// Every statement runs under the retry policy with its parameters bound, and every mutation that
/// changed a row announces `update` on the change channel.
pub struct PatientStore<'a> {
    conn: ConnectionHandle,
    notifier: &'a Notifier,
    policy: RetryPolicy,
}

impl<'a> PatientStore<'a> {
    pub fn new(conn: ConnectionHandle, notifier: &'a Notifier, policy: RetryPolicy) -> Self {
        Self {
            conn,
            notifier,
            policy,
        }
    }

    /// All patients, newest first.
    pub async fn list(&self) -> Result<Vec<DbPatient>, SessionError> {
        let rows = self
            .policy
            .run(|| {
                self.conn.query(
                    r#"
        SELECT id, name, age, gender, address, created_at
        FROM patients
        ORDER BY created_at DESC, id DESC
        "#,
                    Vec::new(),
                )
            })
            .await?;

        with_pretty_json_debug(&rows, |rows| debug!("patients rows: {rows}"));

        rows.into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(SessionError::from))
            .collect()
    }

    /// Registers a patient and returns its id.
    pub async fn insert(&self, create: &PatientCreate) -> Result<i64, SessionError> {
        create.validate()?;

        let outcome = self
            .policy
            .run(|| {
                self.conn.execute(
                    r#"
        INSERT INTO patients (name, age, gender, address)
        VALUES (?, ?, ?, ?)
        "#,
                    vec![
                        json!(create.name),
                        json!(create.age),
                        json!(create.gender),
                        json!(create.address),
                    ],
                )
            })
            .await?;

        self.announce();
        Ok(outcome.last_insert_id)
    }

    /// Deletes a patient. Returns whether a row was removed; nothing is announced otherwise.
    pub async fn delete(&self, id: i64) -> Result<bool, SessionError> {
        let outcome = self
            .policy
            .run(|| {
                self.conn
                    .execute("DELETE FROM patients WHERE id = ?", vec![json!(id)])
            })
            .await?;

        let removed = outcome.rows_affected > 0;
        if removed {
            self.announce();
        }
        Ok(removed)
    }

    // The write already committed; a lost notification only delays other contexts until their
    // next re-synchronization, so it is logged rather than returned.
    fn announce(&self) {
        if let Err(e) = self.notifier.publish(&ChangeEvent::Update) {
            warn!(channel = %self.notifier.channel_name(), error = %e, "Failed to announce change");
        }
    }
}
