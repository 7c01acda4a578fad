use std::time::Instant;

use futures::future::try_join_all;

use crate::model::*;
use crate::observability::SEARCH_DURATION_SECONDS;

use super::overlap::validate_window;
use super::{Engine, EngineError};

impl Engine {
    /// Every room with no interval overlapping `stay`, by ascending id.
    /// Advisory only: nothing is held for the caller.
    pub async fn search_all_rooms(&self, stay: Stay) -> Result<Vec<Room>, EngineError> {
        validate_window(&stay)?;
        let started = Instant::now();

        let checks = self.store.room_ids().into_iter().map(move |id| async move {
            let guard = self.read_room(id).await?;
            Ok::<_, EngineError>((!guard.exists_overlap(&stay, None)).then(|| guard.room.clone()))
        });
        let free: Vec<Room> = try_join_all(checks).await?.into_iter().flatten().collect();

        metrics::histogram!(SEARCH_DURATION_SECONDS, "scope" => "all")
            .record(started.elapsed().as_secs_f64());
        Ok(free)
    }

    /// Whether `room_id` is free for the whole of `stay`.
    pub async fn search_room_availability(
        &self,
        room_id: RoomId,
        stay: Stay,
    ) -> Result<bool, EngineError> {
        validate_window(&stay)?;
        let started = Instant::now();
        let guard = self.read_room(room_id).await?;
        let available = !guard.exists_overlap(&stay, None);
        metrics::histogram!(SEARCH_DURATION_SECONDS, "scope" => "room")
            .record(started.elapsed().as_secs_f64());
        Ok(available)
    }

    /// Single entry point for the request layer: one room if given, else all.
    pub async fn search(&self, stay: Stay, room_id: Option<RoomId>) -> Result<Availability, EngineError> {
        match room_id {
            Some(room_id) => Ok(Availability::Room {
                room_id,
                available: self.search_room_availability(room_id, stay).await?,
            }),
            None => Ok(Availability::Rooms(self.search_all_rooms(stay).await?)),
        }
    }
}
