use std::sync::Arc;
use std::time::SystemTime;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database,
    bson::{DateTime, Document, doc},
    error::UNKNOWN_TRANSACTION_COMMIT_RESULT,
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoBookingDocument, MongoFacilityDocument, MongoLobbyDocument, doc_id, status_label,
        uuid_as_binary, versioned_id,
    },
};
use crate::dao::{
    lobby_store::{FacilityCatalog, LobbyStore},
    models::{BookingEntity, FacilityEntity, LobbyEntity, LobbyStatusEntity},
    storage::{CommitOutcome, LobbyFilter, StorageResult},
};

const LOBBY_COLLECTION_NAME: &str = "lobbies";
const BOOKING_COLLECTION_NAME: &str = "bookings";
const FACILITY_COLLECTION_NAME: &str = "facilities";

/// MongoDB implementation of the storage traits.
///
/// A lobby lives in a single document, so every membership change is one
/// conditional `replace_one` on `(_id, version)`. When a booking rides along,
/// the replace and the booking insert share a session transaction; a unique
/// index on `bookings.lobby_id` backstops the one-booking-per-lobby rule.
#[derive(Clone)]
pub struct MongoLobbyStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoLobbyStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let lobbies = database.collection::<Document>(LOBBY_COLLECTION_NAME);
        let facility_index = mongodb::IndexModel::builder()
            .keys(doc! {"facility_id": 1, "status": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("lobby_facility_status_idx".to_owned()))
                    .build(),
            )
            .build();
        lobbies
            .create_index(facility_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: LOBBY_COLLECTION_NAME,
                index: "facility_id,status",
                source,
            })?;

        let expiry_index = mongodb::IndexModel::builder()
            .keys(doc! {"status": 1, "window.starts_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("lobby_expiry_scan_idx".to_owned()))
                    .build(),
            )
            .build();
        lobbies
            .create_index(expiry_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: LOBBY_COLLECTION_NAME,
                index: "status,window.starts_at",
                source,
            })?;

        // One booking per lobby, enforced server-side as well.
        let bookings = database.collection::<Document>(BOOKING_COLLECTION_NAME);
        let booking_index = mongodb::IndexModel::builder()
            .keys(doc! {"lobby_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("booking_lobby_unique_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        bookings
            .create_index(booking_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: BOOKING_COLLECTION_NAME,
                index: "lobby_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn client_and_database(&self) -> (Client, Database) {
        let guard = self.inner.state.read().await;
        (guard.client.clone(), guard.database.clone())
    }

    async fn lobby_collection(&self) -> Collection<MongoLobbyDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoLobbyDocument>(LOBBY_COLLECTION_NAME)
    }

    async fn booking_collection(&self) -> Collection<MongoBookingDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoBookingDocument>(BOOKING_COLLECTION_NAME)
    }

    async fn facility_collection(&self) -> Collection<MongoFacilityDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoFacilityDocument>(FACILITY_COLLECTION_NAME)
    }

    async fn insert_lobby(
        &self,
        lobby: LobbyEntity,
        booking: Option<BookingEntity>,
    ) -> MongoResult<()> {
        let id = lobby.id;
        let document: MongoLobbyDocument = lobby.into();

        let Some(booking) = booking else {
            let collection = self.lobby_collection().await;
            collection
                .insert_one(&document)
                .await
                .map_err(|source| MongoDaoError::InsertLobby { id, source })?;
            return Ok(());
        };

        // Creation crossed the fill threshold; the lobby and its booking
        // must land together.
        let booking_id = booking.id;
        let booking_document: MongoBookingDocument = booking.into();
        let (client, database) = self.client_and_database().await;
        let lobbies = database.collection::<MongoLobbyDocument>(LOBBY_COLLECTION_NAME);
        let bookings = database.collection::<MongoBookingDocument>(BOOKING_COLLECTION_NAME);

        let mut session = start_transaction(&client, id).await?;
        let written = async {
            lobbies
                .insert_one(&document)
                .session(&mut session)
                .await
                .map_err(|source| MongoDaoError::InsertLobby { id, source })?;
            bookings
                .insert_one(&booking_document)
                .session(&mut session)
                .await
                .map_err(|source| MongoDaoError::InsertBooking {
                    id: booking_id,
                    source,
                })?;
            Ok(())
        }
        .await;

        finish_transaction(session, id, written.map(|()| CommitOutcome::Applied))
            .await
            .map(|_| ())
    }

    async fn commit_lobby(
        &self,
        expected_version: u64,
        lobby: LobbyEntity,
        booking: Option<BookingEntity>,
    ) -> MongoResult<CommitOutcome> {
        let id = lobby.id;
        let filter = versioned_id(id, expected_version);
        let document: MongoLobbyDocument = lobby.into();

        let Some(booking) = booking else {
            let collection = self.lobby_collection().await;
            let result = collection
                .replace_one(filter, &document)
                .await
                .map_err(|source| MongoDaoError::CommitLobby { id, source })?;
            return Ok(if result.matched_count == 0 {
                CommitOutcome::Conflict
            } else {
                CommitOutcome::Applied
            });
        };

        let booking_id = booking.id;
        let booking_document: MongoBookingDocument = booking.into();
        let (client, database) = self.client_and_database().await;
        let lobbies = database.collection::<MongoLobbyDocument>(LOBBY_COLLECTION_NAME);
        let bookings = database.collection::<MongoBookingDocument>(BOOKING_COLLECTION_NAME);

        let mut session = start_transaction(&client, id).await?;
        let written = async {
            let result = lobbies
                .replace_one(filter, &document)
                .session(&mut session)
                .await
                .map_err(|source| MongoDaoError::CommitLobby { id, source })?;
            if result.matched_count == 0 {
                return Ok(CommitOutcome::Conflict);
            }
            bookings
                .insert_one(&booking_document)
                .session(&mut session)
                .await
                .map_err(|source| MongoDaoError::InsertBooking {
                    id: booking_id,
                    source,
                })?;
            Ok(CommitOutcome::Applied)
        }
        .await;

        match finish_transaction(session, id, written).await {
            // Inside a transaction the server reports a lost document race
            // as a labelled write conflict, not as an unmatched filter.
            Err(err) if err.is_transient_transaction_error() => Ok(CommitOutcome::Conflict),
            outcome => outcome,
        }
    }

    async fn find_lobby(&self, id: Uuid) -> MongoResult<Option<LobbyEntity>> {
        let collection = self.lobby_collection().await;

        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadLobby { id, source })?;

        Ok(document.map(Into::into))
    }

    async fn list_lobbies(&self, filter: LobbyFilter) -> MongoResult<Vec<LobbyEntity>> {
        let collection = self.lobby_collection().await;

        let mut query = Document::new();
        if let Some(facility_id) = filter.facility_id {
            query.insert("facility_id", uuid_as_binary(facility_id));
        }
        if let Some(status) = filter.status {
            query.insert("status", status_label(status));
        }

        let documents: Vec<MongoLobbyDocument> = collection
            .find(query)
            .sort(doc! {"window.starts_at": 1})
            .await
            .map_err(|source| MongoDaoError::ListLobbies { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListLobbies { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn list_overdue(&self, before: SystemTime) -> MongoResult<Vec<LobbyEntity>> {
        let collection = self.lobby_collection().await;

        let query = doc! {
            "status": status_label(LobbyStatusEntity::Open),
            "window.starts_at": { "$lte": DateTime::from_system_time(before) },
        };

        let documents: Vec<MongoLobbyDocument> = collection
            .find(query)
            .await
            .map_err(|source| MongoDaoError::ListLobbies { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListLobbies { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_booking(&self, id: Uuid) -> MongoResult<Option<BookingEntity>> {
        let collection = self.booking_collection().await;

        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadBooking { id, source })?;

        Ok(document.map(Into::into))
    }

    async fn find_facility(&self, id: Uuid) -> MongoResult<Option<FacilityEntity>> {
        let collection = self.facility_collection().await;

        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadFacility { id, source })?;

        Ok(document.map(Into::into))
    }

    async fn upsert_facility(&self, facility: FacilityEntity) -> MongoResult<()> {
        let id = facility.id;
        let document: MongoFacilityDocument = facility.into();
        let collection = self.facility_collection().await;

        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveFacility { id, source })?;

        Ok(())
    }
}

async fn start_transaction(client: &Client, lobby_id: Uuid) -> MongoResult<ClientSession> {
    let mut session = client
        .start_session()
        .await
        .map_err(|source| MongoDaoError::StartSession { source })?;
    session
        .start_transaction()
        .await
        .map_err(|source| MongoDaoError::Transaction {
            id: lobby_id,
            source,
        })?;
    Ok(session)
}

/// Commit on `Applied`, abort otherwise. Abort errors are ignored, the server
/// expires an unfinished transaction together with its session. A commit
/// whose outcome is unknown (the label the driver attaches after a network
/// fault) is retried until the server reports a definite result.
async fn finish_transaction(
    mut session: ClientSession,
    lobby_id: Uuid,
    written: MongoResult<CommitOutcome>,
) -> MongoResult<CommitOutcome> {
    match written {
        Ok(CommitOutcome::Applied) => loop {
            match session.commit_transaction().await {
                Ok(()) => return Ok(CommitOutcome::Applied),
                Err(source) if source.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => {}
                Err(source) => {
                    return Err(MongoDaoError::Transaction {
                        id: lobby_id,
                        source,
                    });
                }
            }
        },
        Ok(CommitOutcome::Conflict) => {
            let _ = session.abort_transaction().await;
            Ok(CommitOutcome::Conflict)
        }
        Err(err) => {
            let _ = session.abort_transaction().await;
            Err(err)
        }
    }
}

impl LobbyStore for MongoLobbyStore {
    fn insert_lobby(
        &self,
        lobby: LobbyEntity,
        booking: Option<BookingEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_lobby(lobby, booking).await.map_err(Into::into) })
    }

    fn find_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_lobby(id).await.map_err(Into::into) })
    }

    fn list_lobbies(
        &self,
        filter: LobbyFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_lobbies(filter).await.map_err(Into::into) })
    }

    fn list_overdue(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_overdue(before).await.map_err(Into::into) })
    }

    fn commit_lobby(
        &self,
        expected_version: u64,
        lobby: LobbyEntity,
        booking: Option<BookingEntity>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .commit_lobby(expected_version, lobby, booking)
                .await
                .map_err(Into::into)
        })
    }

    fn find_booking(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BookingEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_booking(id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

impl FacilityCatalog for MongoLobbyStore {
    fn find_facility(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FacilityEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_facility(id).await.map_err(Into::into) })
    }

    fn upsert_facility(&self, facility: FacilityEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_facility(facility).await.map_err(Into::into) })
    }
}
