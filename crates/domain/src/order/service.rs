//! Order service: the command API used by checkout, fulfillment and payments.

use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{CancelOrder, Order, OrderEvent, PaymentEvent, PlaceOrder, UpdateStatus};

pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Persists a new order. Fails with a conflict if the id is already taken.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, order_number = %cmd.order_number))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute(cmd.order_id, |order| order.place(&cmd))
            .await?;
        record_transitions(&result.events);
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, to = %cmd.status))]
    pub async fn update_status(
        &self,
        cmd: UpdateStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute_with_retry(cmd.order_id, |order| {
                order.change_status(
                    cmd.status,
                    cmd.note.clone(),
                    cmd.tracking_number.clone(),
                    cmd.actor_id,
                )
            })
            .await?;
        record_transitions(&result.events);
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn cancel_order(&self, cmd: CancelOrder) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute_with_retry(cmd.order_id, |order| {
                order.cancel(cmd.requester, cmd.reason.clone())
            })
            .await?;
        record_transitions(&result.events);
        Ok(result)
    }

    /// Applies a verified payment outcome. Concurrent deliveries of the same
    /// outcome race on the journal version; the loser re-evaluates against
    /// the winner's state and ends up a no-op.
    #[tracing::instrument(skip(self, event), fields(source = event.source().as_str()))]
    pub async fn apply_payment(
        &self,
        order_id: AggregateId,
        event: PaymentEvent,
    ) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute_with_retry(order_id, |order| order.apply_payment_event(&event))
            .await?;
        if !result.events.is_empty() {
            metrics::counter!("payment_events_applied_total", "source" => event.source().as_str())
                .increment(1);
        }
        record_transitions(&result.events);
        Ok(result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_gateway_order(
        &self,
        order_id: AggregateId,
        external_order_id: String,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_retry(order_id, |order| {
                order.record_gateway_order(&external_order_id)
            })
            .await
    }

    /// Returns `None` for unknown ids.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }
}

fn record_transitions(events: &[OrderEvent]) {
    for status in events.iter().filter_map(OrderEvent::resulting_status) {
        metrics::counter!("order_status_transitions_total", "to" => status.as_str()).increment(1);
    }
}
