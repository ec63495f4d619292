//! Order Lifecycle Manager: the canonical record for every in-flight order.
//!
//! One `RwLock` guards the order map and its status index ("a
//! single read/write lock around the map and indices"). Event handlers run
//! after the lock is released so a slow or panicking handler never blocks a
//! concurrent submit/fill.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{CoreError, CoreResult};
use crate::order::{is_valid_transition, Order, OrderFill, OrderId, OrderStatus};

/// Invoked after an order's fills or status change, outside the OMS lock.
///
/// Default methods are no-ops so a handler only needs to implement the
/// callback it cares about.
pub trait OrderEventHandler: Send + Sync {
    fn on_fill(&self, _order: &Order, _fill: &OrderFill) {}
    fn on_status_change(&self, _order: &Order, _old: OrderStatus, _new: OrderStatus) {}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmsConfig {
    pub max_orders: usize,
    pub max_history_per_order: usize,
    pub cleanup_retention: Duration,
}

impl Default for OmsConfig {
    fn default() -> Self {
        Self {
            max_orders: 100_000,
            max_history_per_order: 1_000,
            cleanup_retention: Duration::from_secs(3_600),
        }
    }
}

struct OmsState {
    orders: HashMap<OrderId, Order>,
    by_status: HashMap<OrderStatus, HashSet<OrderId>>,
}

impl OmsState {
    fn new() -> Self {
        Self {
            orders: HashMap::new(),
            by_status: HashMap::new(),
        }
    }

    fn index(&mut self, id: OrderId, status: OrderStatus) {
        self.by_status.entry(status).or_default().insert(id);
    }

    fn deindex(&mut self, id: OrderId, status: OrderStatus) {
        if let Some(set) = self.by_status.get_mut(&status) {
            set.remove(&id);
        }
    }
}

/// Pending (order, fill-or-status) side effects to dispatch once the lock
/// guarding [`OmsState`] has been released.
enum PendingEvent {
    Fill(Order, OrderFill),
    StatusChange(Order, OrderStatus, OrderStatus),
}

pub struct OrderManager {
    state: RwLock<OmsState>,
    handlers: RwLock<Vec<Arc<dyn OrderEventHandler>>>,
    config: OmsConfig,
    cleanup_running: Arc<AtomicBool>,
}

impl OrderManager {
    pub fn new(config: OmsConfig) -> Self {
        Self {
            state: RwLock::new(OmsState::new()),
            handlers: RwLock::new(Vec::new()),
            config,
            cleanup_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_handler(&self, handler: Arc<dyn OrderEventHandler>) {
        self.handlers.write().push(handler);
    }

    fn dispatch(&self, events: Vec<PendingEvent>) {
        if events.is_empty() {
            return;
        }
        let handlers = self.handlers.read();
        for event in events {
            for handler in handlers.iter() {
                match &event {
                    PendingEvent::Fill(order, fill) => {
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            handler.on_fill(order, fill)
                        }))
                        .unwrap_or_else(|_| warn!("order event handler panicked on_fill"));
                    }
                    PendingEvent::StatusChange(order, old, new) => {
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            handler.on_status_change(order, *old, *new)
                        }))
                        .unwrap_or_else(|_| warn!("order event handler panicked on_status_change"));
                    }
                }
            }
        }
    }

    /// Track a newly built order. reject if at capacity, reject
    /// on duplicate id. Emits no event.
    pub fn submit(&self, order: Order) -> CoreResult<OrderId> {
        let mut state = self.state.write();
        if state.orders.len() >= self.config.max_orders {
            return Err(CoreError::CapacityExceeded {
                active: state.orders.len(),
                max: self.config.max_orders,
            });
        }
        if state.orders.contains_key(&order.id) {
            return Err(CoreError::already_exists(format!("order {} already tracked", order.id)));
        }

        let id = order.id;
        let status = order.status;
        state.orders.insert(id, order);
        state.index(id, status);
        Ok(id)
    }

    /// Append a fill, recompute `filled_qty`/`avg_fill_price`, and transition
    /// to `Filled` or `PartiallyFilled`. History is truncated to
    /// `max_history_per_order`, dropping the oldest fill.
    pub fn process_fill(&self, fill: OrderFill) -> CoreResult<()> {
        fill.validate()?;

        let mut events = Vec::new();
        {
            let mut state = self.state.write();
            let order = state
                .orders
                .get_mut(&fill.order_id)
                .ok_or_else(|| CoreError::not_found(format!("order {} not tracked", fill.order_id)))?;

            if order.status.is_terminal() {
                return Err(CoreError::invalid_state(format!(
                    "order {} is in terminal status {:?}",
                    order.id, order.status
                )));
            }

            let old_status = order.status;
            order.apply_fill(fill.clone())?;

            if order.fills.len() > self.config.max_history_per_order {
                let drop = order.fills.len() - self.config.max_history_per_order;
                order.fills.drain(0..drop);
            }

            let new_status = if order.is_fully_filled() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };

            if !is_valid_transition(old_status, new_status) && old_status != new_status {
                return Err(CoreError::invalid_state(format!(
                    "fill would move order {} from {:?} to {:?}, not a permitted transition",
                    order.id, old_status, new_status
                )));
            }

            order.status = new_status;
            state.deindex(order.id, old_status);
            state.index(order.id, new_status);

            let snapshot = order.clone();
            events.push(PendingEvent::Fill(snapshot.clone(), fill));
            if old_status != new_status {
                events.push(PendingEvent::StatusChange(snapshot, old_status, new_status));
            }
        }
        self.dispatch(events);
        Ok(())
    }

    pub fn process_reject(&self, id: OrderId, reason: impl Into<String>) -> CoreResult<()> {
        let reason = reason.into();
        let event = {
            let mut state = self.state.write();
            let order = state
                .orders
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(format!("order {} not tracked", id)))?;

            let old_status = order.status;
            if !is_valid_transition(old_status, OrderStatus::Rejected) {
                return Err(CoreError::invalid_state(format!(
                    "cannot reject order {} from status {:?}: {}",
                    id, old_status, reason
                )));
            }
            order.status = OrderStatus::Rejected;
            state.deindex(id, old_status);
            state.index(id, OrderStatus::Rejected);
            PendingEvent::StatusChange(order.clone(), old_status, OrderStatus::Rejected)
        };
        self.dispatch(vec![event]);
        Ok(())
    }

    /// Move an order to `new` status if the transition table permits it
    ///. Emits a status event.
    pub fn update_status(&self, id: OrderId, new: OrderStatus, now: i64) -> CoreResult<()> {
        let event = {
            let mut state = self.state.write();
            let order = state
                .orders
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(format!("order {} not tracked", id)))?;

            let old = order.status;
            if !is_valid_transition(old, new) {
                return Err(CoreError::invalid_state(format!(
                    "transition {:?} -> {:?} is not permitted for order {}",
                    old, new, id
                )));
            }

            order.status = new;
            order.updated_at = now;
            match new {
                OrderStatus::Filled => order.filled_at = Some(now),
                OrderStatus::Cancelled => order.cancelled_at = Some(now),
                OrderStatus::Submitted => order.submitted_at = Some(now),
                _ => {}
            }

            state.deindex(id, old);
            state.index(id, new);
            PendingEvent::StatusChange(order.clone(), old, new)
        };
        self.dispatch(vec![event]);
        Ok(())
    }

    /// A pure predicate over the transition table; does not mutate state.
    pub fn validate_transition(&self, id: OrderId, new: OrderStatus) -> CoreResult<bool> {
        let state = self.state.read();
        let order = state
            .orders
            .get(&id)
            .ok_or_else(|| CoreError::not_found(format!("order {} not tracked", id)))?;
        Ok(is_valid_transition(order.status, new))
    }

    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.state.read().orders.get(&id).cloned()
    }

    pub fn get_by_status(&self, status: OrderStatus) -> Vec<Order> {
        let state = self.state.read();
        match state.by_status.get(&status) {
            Some(ids) => ids.iter().filter_map(|id| state.orders.get(id).cloned()).collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove terminal orders whose `updated_at` is older than `now -
    /// retention`, reclaiming their map slot. `updated_at` is nanoseconds
    /// since the epoch, same units as `retention`.
    pub fn sweep_terminal_orders(&self, now_nanos: i64, retention: Duration) -> usize {
        let cutoff = now_nanos.saturating_sub(retention.as_nanos() as i64);
        let mut state = self.state.write();
        let stale: Vec<OrderId> = state
            .orders
            .values()
            .filter(|o| o.status.is_terminal() && o.updated_at < cutoff)
            .map(|o| o.id)
            .collect();

        for id in &stale {
            if let Some(order) = state.orders.remove(id) {
                state.deindex(*id, order.status);
            }
        }
        stale.len()
    }

    /// Spawn a background thread that periodically calls
    /// [`sweep_terminal_orders`](Self::sweep_terminal_orders). Returns a
    /// handle whose `JoinHandle` is dropped when the manager is dropped; the
    /// loop itself exits once `stop_cleanup` flips the running flag.
    pub fn start_cleanup_loop(self: &Arc<Self>, interval: Duration) -> thread::JoinHandle<()> {
        self.cleanup_running.store(true, Ordering::SeqCst);
        let manager = Arc::clone(self);
        let running = Arc::clone(&self.cleanup_running);
        let retention = self.config.cleanup_retention;

        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(interval);
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let now = now_unix_nanos();
                let swept = manager.sweep_terminal_orders(now, retention);
                if swept > 0 {
                    tracing::debug!(swept, "oms cleanup loop reclaimed terminal orders");
                }
            }
        })
    }

    pub fn stop_cleanup(&self) {
        self.cleanup_running.store(false, Ordering::SeqCst);
    }
}

fn now_unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, AssetType};
    use crate::decimal::Decimal;
    use crate::order::{OrderType, Side};
    use std::sync::atomic::AtomicUsize;

    fn asset() -> Asset {
        Asset::builder("AAPL", AssetType::Stock)
            .tick_size(Decimal::new(1, 2))
            .build()
            .unwrap()
    }

    fn new_order() -> Order {
        Order::builder(asset(), Side::Buy, OrderType::Limit, Decimal::from_i64(100))
            .price(Decimal::from_i64(150))
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_submit_is_rejected() {
        let oms = OrderManager::new(OmsConfig::default());
        let order = new_order();
        let dup = order.clone();
        oms.submit(order).unwrap();
        assert!(oms.submit(dup).is_err());
    }

    #[test]
    fn capacity_is_enforced() {
        let oms = OrderManager::new(OmsConfig {
            max_orders: 1,
            ..OmsConfig::default()
        });
        oms.submit(new_order()).unwrap();
        let result = oms.submit(new_order());
        assert!(matches!(result, Err(CoreError::CapacityExceeded { .. })));
    }

    #[test]
    fn average_fill_price_scenario_via_oms() {
        let oms = OrderManager::new(OmsConfig::default());
        let order = new_order();
        let id = oms.submit(order).unwrap();
        oms.update_status(id, OrderStatus::Submitted, 1).unwrap();

        oms.process_fill(OrderFill {
            id: 1,
            order_id: id,
            price: Decimal::from_i64(150),
            quantity: Decimal::from_i64(50),
            fee: Decimal::ZERO,
            timestamp: 2,
        })
        .unwrap();
        oms.process_fill(OrderFill {
            id: 2,
            order_id: id,
            price: Decimal::new(15010, 2),
            quantity: Decimal::from_i64(50),
            fee: Decimal::ZERO,
            timestamp: 3,
        })
        .unwrap();

        let order = oms.get(id).unwrap();
        assert_eq!(order.avg_fill_price, Decimal::new(15005, 2));
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn terminal_order_rejects_further_transitions() {
        let oms = OrderManager::new(OmsConfig::default());
        let id = oms.submit(new_order()).unwrap();
        oms.update_status(id, OrderStatus::Submitted, 1).unwrap();
        oms.update_status(id, OrderStatus::Cancelled, 2).unwrap();
        assert!(oms.update_status(id, OrderStatus::Submitted, 3).is_err());
    }

    #[test]
    fn reject_from_pending_is_terminal() {
        let oms = OrderManager::new(OmsConfig::default());
        let id = oms.submit(new_order()).unwrap();
        oms.process_reject(id, "venue closed").unwrap();
        let order = oms.get(id).unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(oms.update_status(id, OrderStatus::Cancelled, 1).is_err());
    }

    #[test]
    fn get_by_status_reflects_index() {
        let oms = OrderManager::new(OmsConfig::default());
        let id = oms.submit(new_order()).unwrap();
        assert_eq!(oms.get_by_status(OrderStatus::Pending).len(), 1);
        oms.update_status(id, OrderStatus::Submitted, 1).unwrap();
        assert_eq!(oms.get_by_status(OrderStatus::Pending).len(), 0);
        assert_eq!(oms.get_by_status(OrderStatus::Submitted).len(), 1);
    }

    #[test]
    fn handlers_run_after_lock_release_and_see_final_state() {
        let oms = Arc::new(OrderManager::new(OmsConfig::default()));
        let seen_fills = Arc::new(AtomicUsize::new(0));

        struct Counter(Arc<AtomicUsize>);
        impl OrderEventHandler for Counter {
            fn on_fill(&self, _order: &Order, _fill: &OrderFill) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        oms.register_handler(Arc::new(Counter(Arc::clone(&seen_fills))));

        let id = oms.submit(new_order()).unwrap();
        oms.update_status(id, OrderStatus::Submitted, 1).unwrap();
        oms.process_fill(OrderFill {
            id: 1,
            order_id: id,
            price: Decimal::from_i64(150),
            quantity: Decimal::from_i64(100),
            fee: Decimal::ZERO,
            timestamp: 2,
        })
        .unwrap();

        assert_eq!(seen_fills.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sweep_reclaims_only_stale_terminal_orders() {
        let oms = OrderManager::new(OmsConfig::default());
        let id = oms.submit(new_order()).unwrap();
        oms.process_reject(id, "test").unwrap();

        // Not stale yet: retention window hasn't elapsed.
        assert_eq!(oms.sweep_terminal_orders(1_000, Duration::from_secs(1)), 0);

        // Advance far beyond the retention window in nanoseconds.
        let far_future = 1_000 + Duration::from_secs(2).as_nanos() as i64;
        assert_eq!(oms.sweep_terminal_orders(far_future, Duration::from_secs(1)), 1);
        assert!(oms.get(id).is_none());
    }
}
