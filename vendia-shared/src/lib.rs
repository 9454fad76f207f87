pub mod models;
pub mod pii;

pub use models::earning::{Earning, EarningStatus};
pub use models::events::{OrderEvent, StatusChangedEvent, TrackingUpdatedEvent};
pub use models::order::{Order, OrderItem, OrderStatus, OrderStatusEvent, SubOrder};
