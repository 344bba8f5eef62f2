use async_trait::async_trait;
use uuid::Uuid;

use crate::reference::{City, CityRates, Guide, Hotel, Poi, RoomType};
use crate::CoreResult;

/// Read-only lookups into reference data (cities, hotels, POIs, guides, tags).
/// Implementations never participate in booking transactions.
#[async_trait]
pub trait ReferenceData: Send + Sync {
    async fn city(&self, id: Uuid) -> CoreResult<Option<City>>;

    /// Latest recorded meal and transport rates for a city.
    async fn city_rates(&self, city_id: Uuid) -> CoreResult<CityRates>;

    async fn hotel(&self, id: Uuid) -> CoreResult<Option<Hotel>>;

    async fn room_type(&self, id: Uuid) -> CoreResult<Option<RoomType>>;

    /// POIs found among `ids`; missing ids are simply absent from the result.
    async fn pois(&self, ids: &[Uuid]) -> CoreResult<Vec<Poi>>;

    async fn guide(&self, id: Uuid) -> CoreResult<Option<Guide>>;

    /// Ids from `ids` with no matching tag row.
    async fn missing_tags(&self, ids: &[Uuid]) -> CoreResult<Vec<Uuid>>;
}
