use chrono::{DateTime, Utc};

use crate::{ActorId, MovementType, ProductId, StockMovement};

/// Order in which movements are returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Insertion order, oldest first.
    #[default]
    OldestFirst,
    /// Reverse insertion order.
    NewestFirst,
}

/// Builder for constructing movement history queries.
///
/// Allows filtering movements by product, type, actor and time range.
#[derive(Debug, Clone, Default)]
pub struct MovementQuery {
    /// Filter by product.
    pub product_id: Option<ProductId>,

    /// Filter by movement types (any of these types).
    pub movement_types: Option<Vec<MovementType>>,

    /// Filter by the actor that recorded the movement.
    pub actor_id: Option<ActorId>,

    /// Filter by movements at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Filter by movements at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    pub order: SortOrder,

    /// Maximum number of movements to return.
    pub limit: Option<usize>,

    /// Number of movements to skip.
    pub offset: Option<usize>,
}

impl MovementQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a specific product.
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    /// The newest `limit` movements for a product since `since`.
    pub fn recent(product_id: ProductId, since: DateTime<Utc>, limit: usize) -> Self {
        Self::for_product(product_id)
            .from_timestamp(since)
            .newest_first()
            .limit(limit)
    }

    /// Sets the product filter.
    pub fn product_id(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    /// Adds a movement type to the filter.
    pub fn movement_type(mut self, movement_type: MovementType) -> Self {
        self.movement_types
            .get_or_insert_with(Vec::new)
            .push(movement_type);
        self
    }

    /// Sets the actor filter.
    pub fn actor_id(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Sets the minimum timestamp filter (inclusive).
    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    /// Sets the maximum timestamp filter (inclusive).
    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    /// Returns the most recent movements first.
    pub fn newest_first(mut self) -> Self {
        self.order = SortOrder::NewestFirst;
        self
    }

    /// Sets the maximum number of movements to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of movements to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the movement passes every filter of this query.
    ///
    /// Ordering, limit and offset are applied by the store.
    pub fn matches(&self, movement: &StockMovement) -> bool {
        if let Some(id) = self.product_id
            && movement.product_id != id
        {
            return false;
        }
        if let Some(ref types) = self.movement_types
            && !types.contains(&movement.movement_type)
        {
            return false;
        }
        if let Some(ref actor) = self.actor_id
            && &movement.actor_id != actor
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && movement.created_at < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && movement.created_at > to
        {
            return false;
        }
        true
    }
}
