use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use anyhow::Result;
use shared::types::{Medication, MedicationId};
use crate::store::{db::MedicationDb, hash};

/// Commands sent to the store thread
pub enum StoreCommand {
    LoadAll(oneshot::Sender<Result<Vec<Medication>>>),
    SaveAll(Vec<Medication>, oneshot::Sender<Result<()>>),
    Get(MedicationId, oneshot::Sender<Result<Option<Medication>>>),
    HighWater(oneshot::Sender<Result<MedicationId>>),
    Shutdown,
}

/// Handle to the medication store. A single thread owns the connection,
/// so every load and save is applied in the order it was sent.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn the store thread for the given database
    pub fn spawn(db: MedicationDb, hash_tx: watch::Sender<String>) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(64);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::LoadAll(reply) => {
                        let _ = reply.send(db.load_all());
                    }
                    StoreCommand::SaveAll(medications, reply) => {
                        let result = db.save_all(&medications);
                        if result.is_ok() {
                            let _ = hash_tx.send(hash::compute_hash(&medications));
                        }
                        let _ = reply.send(result);
                    }
                    StoreCommand::Get(medication_id, reply) => {
                        let _ = reply.send(db.get(medication_id));
                    }
                    StoreCommand::HighWater(reply) => {
                        let _ = reply.send(db.high_water());
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Load the whole collection
    pub async fn load_all(&self) -> Result<Vec<Medication>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::LoadAll(reply)).await?;
        rx.await?
    }

    /// Atomically replace the whole collection
    pub async fn save_all(&self, medications: Vec<Medication>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::SaveAll(medications, reply)).await?;
        rx.await?
    }

    /// Get a single medication by id
    pub async fn get(&self, medication_id: MedicationId) -> Result<Option<Medication>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::Get(medication_id, reply)).await?;
        rx.await?
    }

    /// Largest medication id ever saved
    pub async fn high_water(&self) -> Result<MedicationId> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::HighWater(reply)).await?;
        rx.await?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StoreCommand::Shutdown).await?;
        Ok(())
    }
}
