use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    DisputeOpenedEvent,
    DisputeResolvedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderAssignedEvent,
    OrderCompletedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_assigned_producer: Vec<EventProducer<OrderAssignedEvent>>,
    pub order_completed_producer: Vec<EventProducer<OrderCompletedEvent>>,
    pub dispute_opened_producer: Vec<EventProducer<DisputeOpenedEvent>>,
    pub dispute_resolved_producer: Vec<EventProducer<DisputeResolvedEvent>>,
}

pub struct EventHandlers {
    pub on_order_assigned: Option<EventHandler<OrderAssignedEvent>>,
    pub on_order_completed: Option<EventHandler<OrderCompletedEvent>>,
    pub on_dispute_opened: Option<EventHandler<DisputeOpenedEvent>>,
    pub on_dispute_resolved: Option<EventHandler<DisputeResolvedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_assigned = hooks.on_order_assigned.map(|f| EventHandler::new(buffer_size, f));
        let on_order_completed = hooks.on_order_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_dispute_opened = hooks.on_dispute_opened.map(|f| EventHandler::new(buffer_size, f));
        let on_dispute_resolved = hooks.on_dispute_resolved.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_assigned, on_order_completed, on_dispute_opened, on_dispute_resolved }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_assigned {
            result.order_assigned_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_completed {
            result.order_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispute_opened {
            result.dispute_opened_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispute_resolved {
            result.dispute_resolved_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_assigned {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_dispute_opened {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_dispute_resolved {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_assigned: Option<Handler<OrderAssignedEvent>>,
    pub on_order_completed: Option<Handler<OrderCompletedEvent>>,
    pub on_dispute_opened: Option<Handler<DisputeOpenedEvent>>,
    pub on_dispute_resolved: Option<Handler<DisputeResolvedEvent>>,
}

impl EventHooks {
    pub fn on_order_assigned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAssignedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_assigned = Some(Arc::new(f));
        self
    }

    pub fn on_order_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_completed = Some(Arc::new(f));
        self
    }

    pub fn on_dispute_opened<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DisputeOpenedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_dispute_opened = Some(Arc::new(f));
        self
    }

    pub fn on_dispute_resolved<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DisputeResolvedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_dispute_resolved = Some(Arc::new(f));
        self
    }
}
