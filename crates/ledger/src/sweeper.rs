//! Periodic removal of expired reservations.

use std::future::Future;
use std::time::Duration;

use stock_store::StockStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::reservation::ReservationManager;

/// Runs `cleanup_expired` on a fixed interval until shut down.
pub struct ExpirySweeper<S> {
    reservations: ReservationManager<S>,
    interval: Duration,
}

impl<S: StockStore + 'static> ExpirySweeper<S> {
    pub fn new(reservations: ReservationManager<S>, interval: Duration) -> Self {
        Self {
            reservations,
            interval,
        }
    }

    /// Sweeps immediately, then once per interval, until `shutdown` resolves.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("expiry sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.reservations.cleanup_expired().await {
                        tracing::warn!(error = %err, "reservation sweep failed");
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: impl Future<Output = ()> + Send + 'static) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::ActorId;
    use stock_store::{InMemoryStockStore, Product, StockReservation};
    use tokio::sync::oneshot;

    use super::*;
    use crate::events::{EventPublisher, StockEvent};

    #[tokio::test]
    async fn sweeps_until_shutdown() {
        let store = InMemoryStockStore::new();
        let product = Product::new("Widget", 10, 1);
        store.insert_product(&product).await.unwrap();
        store
            .seed_reservation(StockReservation::new(
                product.id,
                3,
                "stale",
                ActorId::new("sales"),
                Utc::now() - chrono::Duration::hours(1),
                chrono::Duration::minutes(5),
            ))
            .await
            .unwrap();

        let events = EventPublisher::new(8);
        let mut rx = events.subscribe();
        let manager = ReservationManager::new(store.clone(), events, 30);
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = ExpirySweeper::new(manager, Duration::from_secs(3600)).spawn(async move {
            let _ = stopped.await;
        });

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, StockEvent::ReservationsExpired { count: 1 }));
        assert_eq!(store.reservation_total().await, 0);

        stop.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
